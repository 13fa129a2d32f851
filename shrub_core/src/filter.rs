//! Discrete Butterworth low-pass filter.
//!
//! Coefficients are designed once from the analog prototype
//! `H(s) = 1 / Σ a[k] (s/ωc)^k` and discretized with the bilinear transform
//! (generalized bilinear, α = 0.5). Each call to [`LowPassFilter::filter`]
//! runs one step of the direct-form recurrence
//!
//! ```text
//! y[n] = ff[0]·x[n] + Σ_{i=1..=N} ( fb[i]·y[n-i] + ff[i]·x[n-i] )
//! ```
//!
//! where `fb` holds the negated, normalized denominator. History starts at
//! zero, so the first `order` outputs ramp up from 0 toward the input.

use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::error::FilterError;

/// Immutable recurrence coefficients, `order + 1` of each.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    /// Negated denominator; `feedback[0]` is always `-1.0`.
    pub feedback: Vec<f64>,
    pub feedforward: Vec<f64>,
}

impl FilterCoefficients {
    /// Design an `order`-pole Butterworth low-pass for the given rates.
    pub fn butterworth(cutoff_hz: f64, sample_hz: f64, order: usize) -> Result<Self, FilterError> {
        if order == 0 {
            return Err(FilterError::ZeroOrder);
        }
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
            return Err(FilterError::InvalidCutoff(cutoff_hz));
        }
        if !sample_hz.is_finite() || sample_hz <= 0.0 {
            return Err(FilterError::InvalidSampleRate(sample_hz));
        }
        let nyquist_hz = sample_hz / 2.0;
        if cutoff_hz >= nyquist_hz {
            return Err(FilterError::AboveNyquist {
                cutoff_hz,
                nyquist_hz,
            });
        }

        let analog = analog_prototype(cutoff_hz, order);
        let (num, den) = bilinear(&analog, sample_hz);

        // Descending powers of z, normalized so the z^N term of the
        // denominator is 1.
        let d0 = den[order];
        let feedforward = num.iter().rev().map(|b| b / d0).collect();
        let feedback = den.iter().rev().map(|a| -a / d0).collect();
        Ok(Self {
            feedback,
            feedforward,
        })
    }

    pub fn order(&self) -> usize {
        self.feedforward.len() - 1
    }

    /// Steady-state response to a constant input.
    pub fn dc_gain(&self) -> f64 {
        let num: f64 = self.feedforward.iter().sum();
        let den: f64 = -self.feedback.iter().sum::<f64>();
        num / den
    }
}

/// Butterworth polynomial coefficients scaled by the angular cutoff:
/// `c[k] = a[k] / ωc^k`, ascending powers of `s`.
fn analog_prototype(cutoff_hz: f64, order: usize) -> Vec<f64> {
    let wc = 2.0 * PI * cutoff_hz;
    let gamma = PI / (2.0 * order as f64);

    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    for k in 0..order {
        let rfac = (k as f64 * gamma).cos() / ((k + 1) as f64 * gamma).sin();
        a[k + 1] = rfac * a[k];
    }

    a.iter()
        .enumerate()
        .map(|(k, ak)| ak / wc.powi(k as i32))
        .collect()
}

/// Substitute `s = K (z - 1) / (z + 1)` with `K = 2 fs` into `1 / D(s)` and
/// clear the `(z + 1)^N` denominators. Returns `(num, den)` in ascending
/// powers of `z`.
fn bilinear(analog: &[f64], sample_hz: f64) -> (Vec<f64>, Vec<f64>) {
    let order = analog.len() - 1;
    let k_tustin = 2.0 * sample_hz;

    let mut den = vec![0.0; order + 1];
    for (k, ck) in analog.iter().enumerate() {
        let mut term = vec![ck * k_tustin.powi(k as i32)];
        for _ in 0..k {
            term = poly_mul(&term, &[-1.0, 1.0]);
        }
        for _ in k..order {
            term = poly_mul(&term, &[1.0, 1.0]);
        }
        for (d, t) in den.iter_mut().zip(term) {
            *d += t;
        }
    }

    let mut num = vec![1.0];
    for _ in 0..order {
        num = poly_mul(&num, &[1.0, 1.0]);
    }
    (num, den)
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Streaming low-pass filter for one physical signal.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    cutoff_hz: f64,
    sample_hz: f64,
    coeffs: FilterCoefficients,
    // oldest first, newest last; exactly `order` entries each
    filtered: VecDeque<f64>,
    raw: VecDeque<f64>,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64, sample_hz: f64, order: usize) -> Result<Self, FilterError> {
        let coeffs = FilterCoefficients::butterworth(cutoff_hz, sample_hz, order)?;
        Ok(Self {
            cutoff_hz,
            sample_hz,
            coeffs,
            filtered: VecDeque::from(vec![0.0; order]),
            raw: VecDeque::from(vec![0.0; order]),
        })
    }

    /// Re-discretize for a new sampling rate and cutoff. History is kept.
    pub fn recalc(&mut self, sample_hz: f64, cutoff_hz: f64) -> Result<(), FilterError> {
        let coeffs = FilterCoefficients::butterworth(cutoff_hz, sample_hz, self.order())?;
        self.install(coeffs, sample_hz, cutoff_hz);
        Ok(())
    }

    /// Coefficients this filter would use at `sample_hz`, keeping its cutoff.
    /// The filter itself is left untouched.
    pub fn design_for(&self, sample_hz: f64) -> Result<FilterCoefficients, FilterError> {
        FilterCoefficients::butterworth(self.cutoff_hz, sample_hz, self.order())
    }

    /// Swap in coefficients from [`LowPassFilter::design_for`].
    pub fn install(&mut self, coeffs: FilterCoefficients, sample_hz: f64, cutoff_hz: f64) {
        self.coeffs = coeffs;
        self.sample_hz = sample_hz;
        self.cutoff_hz = cutoff_hz;
        tracing::debug!(sample_hz, cutoff_hz, "filter coefficients recalculated");
    }

    /// Feed one raw sample, return the next filtered value.
    pub fn filter(&mut self, sample: f64) -> f64 {
        let fb = &self.coeffs.feedback;
        let ff = &self.coeffs.feedforward;

        let mut out = ff[0] * sample;
        for (i, (y, x)) in self.filtered.iter().rev().zip(self.raw.iter().rev()).enumerate() {
            out += fb[i + 1] * y + ff[i + 1] * x;
        }

        self.filtered.pop_front();
        self.filtered.push_back(out);
        self.raw.pop_front();
        self.raw.push_back(sample);
        out
    }

    /// Most recent filtered output (0.0 before the first sample).
    pub fn last(&self) -> f64 {
        self.filtered.back().copied().unwrap_or(0.0)
    }

    /// Zero the history window.
    pub fn reset(&mut self) {
        self.filtered.iter_mut().for_each(|v| *v = 0.0);
        self.raw.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn order(&self) -> usize {
        self.coeffs.order()
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn sample_hz(&self) -> f64 {
        self.sample_hz
    }

    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.coeffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn second_order_coefficients() {
        let c = FilterCoefficients::butterworth(5.0, 50.0, 2).unwrap();
        let ff = [0.063_964_384_855_588, 0.127_928_769_711_176, 0.063_964_384_855_588];
        let fb = [-1.0, 1.168_260_667_193_264, -0.424_118_206_615_616];
        for (got, want) in c.feedforward.iter().zip(ff) {
            assert!(close(*got, want), "ff {got} != {want}");
        }
        for (got, want) in c.feedback.iter().zip(fb) {
            assert!(close(*got, want), "fb {got} != {want}");
        }
    }

    #[test]
    fn first_outputs_ramp_from_zero_history() {
        let mut f = LowPassFilter::new(5.0, 50.0, 2).unwrap();
        let expected = [0.063_964_384_855_588, 0.266_620_229_494_760, 0.540_211_006_426_898];
        for want in expected {
            let got = f.filter(1.0);
            assert!(close(got, want), "{got} != {want}");
        }
    }

    #[test]
    fn third_order_has_unit_dc_gain() {
        let c = FilterCoefficients::butterworth(1.0, 10.0, 3).unwrap();
        assert_eq!(c.order(), 3);
        assert!((c.dc_gain() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_designs() {
        assert_eq!(
            FilterCoefficients::butterworth(5.0, 50.0, 0),
            Err(FilterError::ZeroOrder)
        );
        assert!(matches!(
            FilterCoefficients::butterworth(30.0, 50.0, 2),
            Err(FilterError::AboveNyquist { .. })
        ));
        assert!(matches!(
            FilterCoefficients::butterworth(-1.0, 50.0, 2),
            Err(FilterError::InvalidCutoff(_))
        ));
    }

    #[test]
    fn reset_zeroes_history() {
        let mut f = LowPassFilter::new(5.0, 50.0, 2).unwrap();
        let first = f.filter(3.0);
        f.filter(3.0);
        f.reset();
        assert!(close(f.filter(3.0), first));
    }
}
