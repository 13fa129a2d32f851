//! pH and conductivity probe conversion with two-point calibration.

use crate::error::CalibrationError;

/// Probe output at the mid-scale reference, mV.
const PH_MID_MV: f64 = 1500.0;
const TEMP_COEFF: f64 = 0.0185;
const REFERENCE_C: f64 = 25.0;

/// Temperature compensation divisor relative to 25 °C.
#[inline]
fn temp_factor(temp_c: f64) -> f64 {
    1.0 + TEMP_COEFF * (temp_c - REFERENCE_C)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhBuffer {
    /// pH 7.0
    Neutral,
    /// pH 4.0
    Acid,
}

impl PhBuffer {
    pub fn ph(self) -> f64 {
        match self {
            PhBuffer::Neutral => 7.0,
            PhBuffer::Acid => 4.0,
        }
    }
}

/// Linear pH probe model through the neutral and acid buffer voltages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhProbe {
    pub neutral_mv: f64,
    pub acid_mv: f64,
}

impl Default for PhProbe {
    fn default() -> Self {
        Self {
            neutral_mv: 1500.0,
            acid_mv: 2032.44,
        }
    }
}

impl PhProbe {
    pub fn new(neutral_mv: f64, acid_mv: f64) -> Self {
        Self {
            neutral_mv,
            acid_mv,
        }
    }

    pub fn read_ph(&self, mv: f64) -> f64 {
        let neutral = (self.neutral_mv - PH_MID_MV) / 3.0;
        let acid = (self.acid_mv - PH_MID_MV) / 3.0;
        let slope = (7.0 - 4.0) / (neutral - acid);
        let intercept = 7.0 - slope * neutral;
        slope * (mv - PH_MID_MV) / 3.0 + intercept
    }

    /// Forget both buffer readings and go back to the factory curve.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `mv` as the voltage of whichever buffer it falls in.
    pub fn calibrate(&mut self, mv: f64) -> Result<PhBuffer, CalibrationError> {
        if mv == 0.0 || !mv.is_finite() {
            return Err(CalibrationError::InvalidReading);
        }
        if mv > 1322.0 && mv < 1678.0 {
            self.neutral_mv = mv;
            Ok(PhBuffer::Neutral)
        } else if mv > 1854.0 && mv < 2210.0 {
            self.acid_mv = mv;
            Ok(PhBuffer::Acid)
        } else {
            Err(CalibrationError::OutOfRange(mv))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EcBuffer {
    /// 1.413 mS/cm
    Low,
    /// 12.88 mS/cm
    High,
}

impl EcBuffer {
    pub fn ms_per_cm(self) -> f64 {
        match self {
            EcBuffer::Low => 1.413,
            EcBuffer::High => 12.88,
        }
    }
}

/// Conductivity probe with separate cell constants for low and high range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EcProbe {
    pub k_low: f64,
    pub k_high: f64,
    // active constant; switches with hysteresis between 2.0 and 2.5
    k: f64,
}

impl Default for EcProbe {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl EcProbe {
    pub fn new(k_low: f64, k_high: f64) -> Self {
        Self {
            k_low,
            k_high,
            k: 1.0,
        }
    }

    /// Uncompensated conductivity before the cell constant is applied.
    #[inline]
    pub fn raw(mv: f64) -> f64 {
        1000.0 * mv / 820.0 / 200.0
    }

    /// Conductivity in mS/cm, compensated to 25 °C.
    pub fn read_ec(&mut self, mv: f64, temp_c: f64) -> f64 {
        let raw = Self::raw(mv);
        let estimate = raw * self.k;
        if estimate > 2.5 {
            self.k = self.k_high;
        } else if estimate < 2.0 {
            self.k = self.k_low;
        }
        raw * self.k / temp_factor(temp_c)
    }

    /// Both cell constants back to 1.0.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn calibrate(&mut self, mv: f64, temp_c: f64) -> Result<EcBuffer, CalibrationError> {
        if mv == 0.0 || !mv.is_finite() || !temp_c.is_finite() {
            return Err(CalibrationError::InvalidReading);
        }
        let raw = Self::raw(mv);
        let buffer = if raw > 0.9 && raw < 1.9 {
            EcBuffer::Low
        } else if raw > 9.0 && raw < 16.8 {
            EcBuffer::High
        } else {
            return Err(CalibrationError::OutOfRange(raw));
        };
        let compensated = buffer.ms_per_cm() * temp_factor(temp_c);
        let k = 820.0 * 200.0 * compensated / 1000.0 / mv;
        match buffer {
            EcBuffer::Low => self.k_low = k,
            EcBuffer::High => self.k_high = k,
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ph_curve_passes_through_buffers() {
        let p = PhProbe::default();
        assert!((p.read_ph(1500.0) - 7.0).abs() < 1e-9);
        assert!((p.read_ph(2032.44) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn ph_calibration_picks_buffer() {
        let mut p = PhProbe::default();
        assert_eq!(p.calibrate(1510.0), Ok(PhBuffer::Neutral));
        assert_eq!(p.neutral_mv, 1510.0);
        assert_eq!(p.calibrate(2000.0), Ok(PhBuffer::Acid));
        assert_eq!(p.calibrate(0.0), Err(CalibrationError::InvalidReading));
        assert_eq!(p.calibrate(1750.0), Err(CalibrationError::OutOfRange(1750.0)));
    }

    #[test]
    fn ec_low_buffer_sets_k_low() {
        let mut e = EcProbe::default();
        // raw = 1.413 exactly at 25 °C
        let mv = 1.413 * 820.0 * 200.0 / 1000.0;
        assert_eq!(e.calibrate(mv * 1.1, 25.0), Ok(EcBuffer::Low));
        assert!((e.k_low - 1.0 / 1.1).abs() < 1e-9);
        let v = e.read_ec(mv * 1.1, 25.0);
        assert!((v - 1.413).abs() < 1e-9);
    }

    #[test]
    fn reset_restores_factory_calibration() {
        let mut p = PhProbe::new(1400.0, 2100.0);
        p.reset();
        assert_eq!(p, PhProbe::default());

        let mut e = EcProbe::default();
        let mv = 12.88 * 820.0 * 200.0 / 1000.0;
        assert_eq!(e.calibrate(mv * 0.9, 25.0), Ok(EcBuffer::High));
        e.read_ec(mv * 0.9, 25.0);
        e.reset();
        assert_eq!(e, EcProbe::default());
        assert!((e.read_ec(mv, 25.0) - 12.88).abs() < 1e-9);
    }

    #[test]
    fn ec_temperature_compensation() {
        let mut e = EcProbe::default();
        let mv = 1.0 * 820.0 * 200.0 / 1000.0;
        assert!((e.read_ec(mv, 25.0) - 1.0).abs() < 1e-9);
        assert!((e.read_ec(mv, 35.0) - 1.0 / 1.185).abs() < 1e-9);
    }
}
