//! Operator settings file.
//!
//! Headerless `label,value` rows using the menu labels shown on the panel.
//! Rows may appear in any order; labels are matched case-insensitively and
//! missing rows keep the value the caller passed in. Files written by early
//! firmware used "Channel Pump timer" and "Empty timer"; both are accepted.
use std::io::Read;
use std::path::Path;

use eyre::WrapErr;

use crate::{MAX_DURATION_SECS, write_atomic};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserSettings {
    pub flood_secs: f64,
    pub active_pump_secs: f64,
    pub drain_secs: f64,
    /// "Gap from top": water height that counts as overflow.
    pub overflow_height_cm: f64,
    pub ph_high: f64,
    pub ph_low: f64,
    pub ec_high: f64,
    pub ec_low: f64,
}

/// A settings value pulled into its valid range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingClamp {
    pub label: &'static str,
    pub from: f64,
    pub to: f64,
}

impl Default for UserSettings {
    fn default() -> Self {
        crate::Config::default().user_settings()
    }
}

const LABELS: [&str; 8] = [
    "Flood Timer",
    "Active Pump Timer",
    "Drain Timer",
    "Gap from top",
    "pH High Threshold",
    "pH Low Threshold",
    "EC High Threshold",
    "EC Low Threshold",
];

const ALIASES: [(&str, usize); 2] = [("Channel Pump timer", 1), ("Empty timer", 2)];

fn slot_for(label: &str) -> Option<usize> {
    let label = label.trim();
    LABELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(label))
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(label))
                .map(|(_, slot)| *slot)
        })
}

impl UserSettings {
    fn values(&self) -> [f64; 8] {
        [
            self.flood_secs,
            self.active_pump_secs,
            self.drain_secs,
            self.overflow_height_cm,
            self.ph_high,
            self.ph_low,
            self.ec_high,
            self.ec_low,
        ]
    }

    fn slot_mut(&mut self, slot: usize) -> &mut f64 {
        match slot {
            0 => &mut self.flood_secs,
            1 => &mut self.active_pump_secs,
            2 => &mut self.drain_secs,
            3 => &mut self.overflow_height_cm,
            4 => &mut self.ph_high,
            5 => &mut self.ph_low,
            6 => &mut self.ec_high,
            _ => &mut self.ec_low,
        }
    }

    /// Copy with every value inside the range the controller accepts:
    /// timers in `[0, MAX_DURATION_SECS]`, the overflow height within the
    /// hole, pH in `[0, 14]` with the low threshold not above the high one,
    /// and EC thresholds non-negative.
    pub fn clamped(&self, hole_depth_cm: f64) -> (Self, Vec<SettingClamp>) {
        const PH_MAX: f64 = 14.0;
        let ranges = [
            (0.0, MAX_DURATION_SECS),
            (0.0, MAX_DURATION_SECS),
            (0.0, MAX_DURATION_SECS),
            (0.0, hole_depth_cm.max(0.0)),
            (0.0, PH_MAX),
            (0.0, PH_MAX),
            (0.0, f64::MAX),
            (0.0, f64::MAX),
        ];
        let mut out = *self;
        let mut changes = Vec::new();
        for (slot, (lo, hi)) in ranges.into_iter().enumerate() {
            let value = out.slot_mut(slot);
            let to = value.clamp(lo, hi);
            if to != *value {
                changes.push(SettingClamp {
                    label: LABELS[slot],
                    from: *value,
                    to,
                });
                *value = to;
            }
        }
        if out.ph_low > out.ph_high {
            changes.push(SettingClamp {
                label: LABELS[5],
                from: out.ph_low,
                to: out.ph_high,
            });
            out.ph_low = out.ph_high;
        }
        (out, changes)
    }

    /// Parse rows over `base`.
    pub fn parse(reader: impl Read, base: Self) -> eyre::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut out = base;
        for (idx, rec) in rdr.records().enumerate() {
            let rec = rec.map_err(|e| eyre::eyre!("invalid settings row {}: {}", idx + 1, e))?;
            if rec.iter().all(str::is_empty) {
                continue;
            }
            if rec.len() != 2 {
                eyre::bail!(
                    "settings row {} must be 'label,value', got {} fields",
                    idx + 1,
                    rec.len()
                );
            }
            let label = &rec[0];
            let Some(slot) = slot_for(label) else {
                eyre::bail!("settings row {}: unknown label {:?}", idx + 1, label);
            };
            let value: f64 = rec[1].parse().map_err(|e| {
                eyre::eyre!("settings row {}: {:?} is not a number: {}", idx + 1, &rec[1], e)
            })?;
            if !value.is_finite() {
                eyre::bail!("settings row {}: {label} must be finite", idx + 1);
            }
            *out.slot_mut(slot) = value;
        }
        Ok(out)
    }

    /// Serialize with the canonical labels, one row per setting.
    pub fn to_csv(&self) -> eyre::Result<Vec<u8>> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for (label, value) in LABELS.iter().zip(self.values()) {
            wtr.write_record([*label, value.to_string().as_str()])?;
        }
        wtr.into_inner()
            .map_err(|e| eyre::eyre!("flush settings CSV: {}", e.error()))
    }
}

pub fn load_settings_csv(path: &Path, base: UserSettings) -> eyre::Result<UserSettings> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open settings CSV {:?}: {}", path, e))?;
    UserSettings::parse(file, base).wrap_err_with(|| format!("settings CSV {}", path.display()))
}

pub fn save_settings_csv(path: &Path, settings: &UserSettings) -> eyre::Result<()> {
    let bytes = settings.to_csv()?;
    write_atomic(path, &bytes).wrap_err_with(|| format!("write settings CSV {}", path.display()))
}

/// Load the settings file, creating it from `base` on first boot.
pub fn load_or_create_settings(path: &Path, base: UserSettings) -> eyre::Result<UserSettings> {
    if path.exists() {
        load_settings_csv(path, base)
    } else {
        save_settings_csv(path, &base)?;
        Ok(base)
    }
}
