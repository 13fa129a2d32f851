//! Human-readable error descriptions and structured JSON error formatting.

use shrub_core::error::{BuildError, CalibrationError, ShrubError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensors => {
                "What happened: No sensors were provided to the controller.\nLikely causes: The sonar, ADC, or 1-wire probe failed to initialize.\nHow to fix: Check the [pins] section and that I2C and 1-wire are enabled.".to_string()
            }
            BuildError::MissingHydroActuators => {
                "What happened: No pump, valve, or lamp outputs were provided.\nLikely causes: GPIO pins could not be claimed.\nHow to fix: Check the [pins] values and GPIO permissions.".to_string()
            }
            BuildError::MissingDoseActuators => {
                "What happened: No dosing pump outputs were provided.\nLikely causes: GPIO pins could not be claimed.\nHow to fix: Check acid_pump, base_pump, and nutrient_pump in [pins].".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML or settings CSV.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::InvalidReading => {
                "What happened: The probe reading is not usable.\nLikely causes: Probe unplugged or ADC not responding.\nHow to fix: Check the probe connection and run self-check.".to_string()
            }
            CalibrationError::OutOfRange(v) => format!(
                "What happened: Reading {v:.2} does not match a known buffer solution.\nLikely causes: Wrong buffer, probe not rinsed, or reading taken before it settled.\nHow to fix: Use the pH 7.0/4.0 or 1.413/12.88 mS/cm buffers and wait for a stable value."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ShrubError>() {
        return match se {
            ShrubError::Sensor(msg) => format!(
                "What happened: Sensor check {msg}.\nLikely causes: Loose wiring, missing pull-up on the 1-wire bus, or sonar out of range.\nHow to fix: Check the wiring of the named sensors and rerun self-check."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hardware pins") || lower.contains("gpio") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("must have headers") {
        return format!("Invalid CSV headers. {msg}");
    }

    if lower.contains("settings csv") {
        return format!(
            "What happened: The operator settings file could not be used.\nDetails: {msg}\nHow to fix: Each row must be 'label,value', e.g. 'Flood Timer,1140'."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid.\nDetails: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes by error family.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<CalibrationError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return 4;
    }
    if let Some(ShrubError::Sensor(_)) = err.downcast_ref::<ShrubError>() {
        return 5;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = err.downcast_ref::<CalibrationError>() {
        return match ce {
            CalibrationError::InvalidReading => "InvalidReading",
            CalibrationError::OutOfRange(_) => "OutOfRange",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if let Some(se) = err.downcast_ref::<ShrubError>() {
        return match se {
            ShrubError::Sensor(_) => "Sensor",
            ShrubError::Actuator(_) | ShrubError::ActuatorFault(_) => "Actuator",
        };
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    match err.downcast_ref::<CalibrationError>() {
        Some(CalibrationError::OutOfRange(v)) => {
            json!({ "reason": reason_name(err), "details": { "reading": v }, "message": msg })
                .to_string()
        }
        _ => json!({ "reason": reason_name(err), "message": msg }).to_string(),
    }
}
