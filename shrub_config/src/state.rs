//! Durable controller state: cycle position and probe calibration.
use std::path::Path;

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use crate::{ProbesCfg, write_atomic};

/// Where the flood/drain schedule was when last saved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub phase_index: usize,
    pub remaining_secs: f64,
}

const STATE_HEADERS: [&str; 2] = ["phase_index", "remaining_secs"];

fn expect_headers(
    rdr: &mut csv::Reader<std::fs::File>,
    path: &Path,
    expected: &[&str],
) -> eyre::Result<()> {
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "{} must have headers '{}', got: {}",
            path.display(),
            expected.join(","),
            actual.join(",")
        );
    }
    Ok(())
}

/// Read the saved cycle position; `Ok(None)` when nothing was saved yet.
pub fn load_cycle_state(path: &Path) -> eyre::Result<Option<CycleState>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open cycle state CSV {:?}: {}", path, e))?;
    expect_headers(&mut rdr, path, &STATE_HEADERS)?;

    let Some(rec) = rdr.deserialize::<CycleState>().next() else {
        return Ok(None);
    };
    let state = rec.map_err(|e| eyre::eyre!("invalid cycle state row: {}", e))?;
    if !(state.remaining_secs.is_finite() && state.remaining_secs >= 0.0) {
        eyre::bail!("cycle state remaining_secs must be >= 0");
    }
    Ok(Some(state))
}

pub fn save_cycle_state(path: &Path, state: &CycleState) -> eyre::Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.serialize(state)?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| eyre::eyre!("flush cycle state CSV: {}", e.error()))?;
    write_atomic(path, &bytes).wrap_err_with(|| format!("write cycle state {}", path.display()))
}

/// Probe calibration captured against buffer solutions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeCalibration {
    pub ph_neutral_mv: f64,
    pub ph_acid_mv: f64,
    pub ec_k_low: f64,
    pub ec_k_high: f64,
}

impl From<&ProbesCfg> for ProbeCalibration {
    fn from(p: &ProbesCfg) -> Self {
        Self {
            ph_neutral_mv: p.ph_neutral_mv,
            ph_acid_mv: p.ph_acid_mv,
            ec_k_low: p.ec_k_low,
            ec_k_high: p.ec_k_high,
        }
    }
}

impl ProbeCalibration {
    pub fn apply_to(&self, p: &mut ProbesCfg) {
        p.ph_neutral_mv = self.ph_neutral_mv;
        p.ph_acid_mv = self.ph_acid_mv;
        p.ec_k_low = self.ec_k_low;
        p.ec_k_high = self.ec_k_high;
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationRow {
    name: String,
    value: f64,
}

/// Load `name,value` rows over `base`. Unknown names are rejected.
pub fn load_probe_calibration(
    path: &Path,
    base: ProbeCalibration,
) -> eyre::Result<ProbeCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;
    expect_headers(&mut rdr, path, &["name", "value"])?;

    let mut out = base;
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !row.value.is_finite() {
            eyre::bail!("calibration row {}: {} must be finite", idx + 2, row.name);
        }
        match row.name.as_str() {
            "ph_neutral_mv" => out.ph_neutral_mv = row.value,
            "ph_acid_mv" => out.ph_acid_mv = row.value,
            "ec_k_low" => out.ec_k_low = row.value,
            "ec_k_high" => out.ec_k_high = row.value,
            other => eyre::bail!("calibration row {}: unknown name {:?}", idx + 2, other),
        }
    }
    Ok(out)
}

pub fn save_probe_calibration(path: &Path, cal: &ProbeCalibration) -> eyre::Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for (name, value) in [
        ("ph_neutral_mv", cal.ph_neutral_mv),
        ("ph_acid_mv", cal.ph_acid_mv),
        ("ec_k_low", cal.ec_k_low),
        ("ec_k_high", cal.ec_k_high),
    ] {
        wtr.serialize(CalibrationRow {
            name: name.to_string(),
            value,
        })?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| eyre::eyre!("flush calibration CSV: {}", e.error()))?;
    write_atomic(path, &bytes).wrap_err_with(|| format!("write calibration {}", path.display()))
}
