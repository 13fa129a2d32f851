use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ShrubError {
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("sensor error: {0}")]
    Sensor(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("missing sensors")]
    MissingSensors,
    #[error("missing hydro actuators")]
    MissingHydroActuators,
    #[error("missing dose actuators")]
    MissingDoseActuators,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Misuse of the timer primitive.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum TimerError {
    #[error("timer interval must be a finite, non-negative number of seconds (got {0})")]
    InvalidInterval(f64),
}

/// Invalid low-pass filter design parameters.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum FilterError {
    #[error("filter order must be >= 1")]
    ZeroOrder,
    #[error("cutoff frequency must be finite and > 0 (got {0} Hz)")]
    InvalidCutoff(f64),
    #[error("sample frequency must be finite and > 0 (got {0} Hz)")]
    InvalidSampleRate(f64),
    #[error("cutoff {cutoff_hz} Hz must be below Nyquist ({nyquist_hz} Hz)")]
    AboveNyquist { cutoff_hz: f64, nyquist_hz: f64 },
}

/// A UI or internal event name no state machine recognises.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognised event {0:?}")]
pub struct UnknownEvent(pub String);

/// Probe calibration reading rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    #[error("invalid sensor reading; check wiring and sensor initialization")]
    InvalidReading,
    #[error("buffer solution out of range ({0:.2}); measurement discarded")]
    OutOfRange(f64),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
