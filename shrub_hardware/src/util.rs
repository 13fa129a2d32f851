use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Speed of sound at room temperature, cm/s.
pub const SOUND_CM_PER_S: f64 = 34_300.0;

/// Wait while `cond` holds, returning the instant it stopped holding, or
/// `on_timeout` once `timeout` has passed. A zero `poll_interval` spins
/// instead of sleeping, for edges that must be timed closely.
pub fn wait_while(
    mut cond: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    on_timeout: fn() -> HwError,
) -> Result<Instant> {
    let deadline = Instant::now() + timeout;
    while cond() {
        if Instant::now() >= deadline {
            return Err(on_timeout());
        }
        if poll_interval.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(poll_interval);
        }
    }
    Ok(Instant::now())
}

/// One-way distance for a round-trip echo.
pub fn echo_to_cm(round_trip: Duration) -> f64 {
    round_trip.as_secs_f64() * SOUND_CM_PER_S / 2.0
}

/// ADS1115 conversion register to millivolts at the ±4.096 V range.
pub fn ads1115_counts_to_mv(raw: i16) -> f64 {
    f64::from(raw) * 4096.0 / 32768.0
}

/// Parse a DS18B20 `w1_slave` file into °C.
///
/// The first line must end in `YES` (CRC ok); the second carries `t=<milli °C>`.
pub fn parse_w1_slave(text: &str) -> Result<f64> {
    let mut lines = text.lines();
    let crc = lines.next().unwrap_or_default();
    if !crc.trim_end().ends_with("YES") {
        return Err(HwError::Parse("DS18B20 CRC check failed".into()));
    }
    let data = lines.next().unwrap_or_default();
    let Some((_, milli)) = data.rsplit_once("t=") else {
        return Err(HwError::Parse("DS18B20 reading has no t= field".into()));
    };
    let milli: i64 = milli
        .trim()
        .parse()
        .map_err(|e| HwError::Parse(format!("DS18B20 temperature {milli:?}: {e}")))?;
    Ok(milli as f64 / 1000.0)
}

/// `w1_slave` file of the DS18B20 under the 1-wire sysfs `root`: the
/// configured device id, or else the first `28-*` entry.
pub fn find_ds18b20(root: &Path, configured: Option<&str>) -> Result<PathBuf> {
    if let Some(id) = configured {
        return Ok(root.join(id).join("w1_slave"));
    }
    let entries = std::fs::read_dir(root)
        .map_err(|e| HwError::NoDevice(format!("{}: {e}", root.display())))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with("28-") {
            return Ok(entry.path().join("w1_slave"));
        }
    }
    Err(HwError::NoDevice(format!(
        "no 28-* device under {}",
        root.display()
    )))
}

/// Read one temperature from a `w1_slave` file. A missing file is reported
/// as `NoDevice`: the probe was unplugged or the driver is not loaded.
pub fn read_w1_slave(path: &Path) -> Result<f64> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => HwError::NoDevice(path.display().to_string()),
        _ => HwError::Io(e),
    })?;
    parse_w1_slave(&text)
}
