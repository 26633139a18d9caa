//! Biquad filter implementation using Transposed Direct Form II.
//!
//! TDF-II is numerically well behaved for floating-point arithmetic and keeps
//! state to two registers per channel, which is what the EQ cascade and the
//! bass/vocal enhancers build on.

use loopfx_core::{flush_denormal, Sample};
use std::f64::consts::PI;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Denormals below this magnitude are flushed to zero every sample so a
/// cascade left ringing near silence never stalls the audio thread.
const DENORMAL_THRESHOLD: f64 = 1e-15;

/// Filter shapes the parametric EQ and the enhancers are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
    Peaking,
    LowShelf,
    HighShelf,
}

/// Coefficients `(b0, b1, b2, a1, a2)` for a normalized (a0 = 1) biquad.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    pub fn design(filter_type: FilterType, freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        match filter_type {
            FilterType::Lowpass => Self::lowpass(freq, q, sample_rate),
            FilterType::Highpass => Self::highpass(freq, q, sample_rate),
            FilterType::Bandpass => Self::bandpass(freq, q, sample_rate),
            FilterType::Notch => Self::notch(freq, q, sample_rate),
            FilterType::Allpass => Self::allpass(freq, q, sample_rate),
            FilterType::Peaking => Self::peaking(freq, q, gain_db, sample_rate),
            FilterType::LowShelf => Self::low_shelf(freq, q, gain_db, sample_rate),
            FilterType::HighShelf => Self::high_shelf(freq, q, gain_db, sample_rate),
        }
    }

    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = (1.0 + cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn bandpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn notch(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn allpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0 - alpha;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 + alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha / a;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    pub fn bypass() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }

    #[inline]
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self { b0: b0 / a0, b1: b1 / a0, b2: b2 / a0, a1: a1 / a0, a2: a2 / a0 }
    }

    /// Magnitude response at `freq`, used for UI display and for designing
    /// the linear-phase FIR from the same target curve.
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq / sample_rate;
        let z_re = omega.cos();
        let z_im = -omega.sin();
        // H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
        let (num_re, num_im) = complex_poly(self.b0, self.b1, self.b2, z_re, z_im);
        let (den_re, den_im) = complex_poly(1.0, self.a1, self.a2, z_re, z_im);
        let num_mag = (num_re * num_re + num_im * num_im).sqrt();
        let den_mag = (den_re * den_re + den_im * den_im).sqrt();
        if den_mag < 1e-30 {
            0.0
        } else {
            num_mag / den_mag
        }
    }
}

/// Evaluates `c0 + c1*z^-1 + c2*z^-2` at `z^-1 = (re, im)`.
fn complex_poly(c0: f64, c1: f64, c2: f64, re: f64, im: f64) -> (f64, f64) {
    let z2_re = re * re - im * im;
    let z2_im = 2.0 * re * im;
    (c0 + c1 * re + c2 * z2_re, c1 * im + c2 * z2_im)
}

/// Transposed Direct Form II biquad filter: `y = b0*x + z1; z1' = b1*x - a1*y
/// + z2; z2' = b2*x - a2*y`.
#[derive(Debug, Clone)]
pub struct BiquadTdf2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTdf2 {
    pub fn new(sample_rate: f64) -> Self {
        Self { coeffs: BiquadCoeffs::bypass(), z1: 0.0, z2: 0.0, sample_rate }
    }

    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn set_design(&mut self, filter_type: FilterType, freq: f64, q: f64, gain_db: f64) {
        self.coeffs = BiquadCoeffs::design(filter_type, freq, q, gain_db, self.sample_rate);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl Processor for BiquadTdf2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTdf2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = flush_denormal(self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2, DENORMAL_THRESHOLD);
        self.z2 = flush_denormal(self.coeffs.b2 * input - self.coeffs.a2 * output, DENORMAL_THRESHOLD);
        output
    }
}

impl ProcessorConfig for BiquadTdf2 {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_is_identity() {
        let mut f = BiquadTdf2::new(48_000.0);
        for i in 0..16 {
            let x = (i as f64 * 0.1).sin();
            assert_eq!(f.process_sample(x), x);
        }
    }

    #[test]
    fn peaking_unity_gain_is_near_transparent() {
        let mut f = BiquadTdf2::new(48_000.0);
        f.set_design(FilterType::Peaking, 1_000.0, 1.0, 0.0);
        let mut max_dev: f64 = 0.0;
        for i in 0..48_000 {
            let x = (2.0 * PI * 1_000.0 * i as f64 / 48_000.0).sin() * 0.5;
            let y = f.process_sample(x);
            if i > 1024 {
                max_dev = max_dev.max((y - x).abs());
            }
        }
        assert!(max_dev < 1e-3, "max_dev={max_dev}");
    }

    #[test]
    fn lowpass_is_stable_for_low_q() {
        let mut f = BiquadTdf2::new(48_000.0);
        f.set_design(FilterType::Lowpass, 200.0, 10.0, 0.0);
        for i in 0..480_000 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            let y = f.process_sample(x);
            assert!(y.is_finite());
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut f = BiquadTdf2::new(48_000.0);
        f.set_design(FilterType::Lowpass, 1_000.0, 0.707, 0.0);
        f.process_sample(1.0);
        f.reset();
        assert_eq!(f.process_sample(0.0), 0.0);
    }
}
