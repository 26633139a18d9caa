//! Dynamics processors: feed-forward compressor and true-peak limiter.

use loopfx_core::{db_to_linear, flush_denormal, linear_to_db, Sample};

use crate::delay::DelayLine;
use crate::{Processor, ProcessorConfig, StereoProcessor};

const DENORMAL_THRESHOLD: f64 = 1e-15;

/// Envelope follower with independent attack/release time constants,
/// `exp(-1/(time_ms * 0.001 * sample_rate))` per the source's convention.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f64) -> Self {
        let mut f = Self { attack_coeff: 0.0, release_coeff: 0.0, envelope: 0.0, sample_rate };
        f.set_times(10.0, 100.0);
        f
    }

    pub fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.attack_coeff = (-1.0 / (attack_ms.max(0.001) * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_ms.max(0.001) * 0.001 * self.sample_rate)).exp();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample) -> f64 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope { self.attack_coeff } else { self.release_coeff };
        self.envelope = flush_denormal(abs_input + coeff * (self.envelope - abs_input), DENORMAL_THRESHOLD);
        self.envelope
    }

    /// Instant-attack variant for the limiter: jumps to any higher peak
    /// immediately, only the decay is smoothed.
    #[inline(always)]
    pub fn process_instant_attack(&mut self, input: Sample) -> f64 {
        let abs_input = input.abs();
        if abs_input > self.envelope {
            self.envelope = abs_input;
        } else {
            self.envelope = flush_denormal(abs_input + self.release_coeff * (self.envelope - abs_input), DENORMAL_THRESHOLD);
        }
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    pub fn current(&self) -> f64 {
        self.envelope
    }
}

/// Feed-forward peak compressor, linked stereo (shared envelope over the
/// instantaneous `max(|L|, |R|)` peak).
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f64,
    ratio: f64,
    makeup_db: f64,
    envelope: EnvelopeFollower,
    gain_reduction_db: f64,
    sample_rate: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            threshold_db: -12.0,
            ratio: 4.0,
            makeup_db: 0.0,
            envelope: EnvelopeFollower::new(sample_rate),
            gain_reduction_db: 0.0,
            sample_rate,
        }
    }

    pub fn set_threshold_db(&mut self, db: f64) {
        self.threshold_db = db.clamp(-60.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn set_attack_ms(&mut self, ms: f64) {
        self.attack_release(ms.clamp(0.1, 100.0), None);
    }

    pub fn set_release_ms(&mut self, ms: f64) {
        self.attack_release(None, ms.clamp(10.0, 2000.0));
    }

    fn attack_release(&mut self, attack_ms: impl Into<Option<f64>>, release_ms: impl Into<Option<f64>>) {
        // The envelope stores both coefficients together; recompute from the
        // currently configured pair whenever either one changes.
        let attack_ms = attack_ms.into();
        let release_ms = release_ms.into();
        let current_attack = self.attack_ms_from_coeff();
        let current_release = self.release_ms_from_coeff();
        self.envelope
            .set_times(attack_ms.unwrap_or(current_attack), release_ms.unwrap_or(current_release));
    }

    fn attack_ms_from_coeff(&self) -> f64 {
        -1.0 / (self.envelope.attack_coeff.ln() * 0.001 * self.sample_rate)
    }

    fn release_ms_from_coeff(&self) -> f64 {
        -1.0 / (self.envelope.release_coeff.ln() * 0.001 * self.sample_rate)
    }

    pub fn set_makeup_db(&mut self, db: f64) {
        self.makeup_db = db.clamp(-12.0, 24.0);
    }

    pub fn gain_reduction_db(&self) -> f64 {
        self.gain_reduction_db
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.envelope.reset();
        self.gain_reduction_db = 0.0;
    }
}

impl ProcessorConfig for Compressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.envelope.set_sample_rate(sample_rate);
    }
}

impl StereoProcessor for Compressor {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let peak = left.abs().max(right.abs());
        let env_lin = self.envelope.process(peak);
        let env_db = linear_to_db(env_lin, -120.0);

        let gr_db = if env_db < self.threshold_db {
            0.0
        } else {
            (env_db - self.threshold_db) * (1.0 - 1.0 / self.ratio)
        };
        self.gain_reduction_db = gr_db;

        let gain = db_to_linear(-gr_db + self.makeup_db);
        (left * gain, right * gain)
    }
}

/// True-peak brickwall limiter with a small fixed look-ahead.
#[derive(Debug, Clone)]
pub struct Limiter {
    ceiling_db: f64,
    envelope: EnvelopeFollower,
    lookahead_l: DelayLine,
    lookahead_r: DelayLine,
    lookahead_samples: usize,
    gain_reduction_db: f64,
}

/// Look-ahead window, fixed at ~5 ms per the spec.
const LOOKAHEAD_MS: f64 = 5.0;

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        let lookahead_samples = ((LOOKAHEAD_MS * 0.001 * sample_rate).ceil() as usize).max(1);
        let mut envelope = EnvelopeFollower::new(sample_rate);
        envelope.set_times(0.1, 50.0);
        Self {
            ceiling_db: -0.3,
            envelope,
            lookahead_l: DelayLine::new(lookahead_samples + 1),
            lookahead_r: DelayLine::new(lookahead_samples + 1),
            lookahead_samples,
            gain_reduction_db: 0.0,
        }
    }

    pub fn set_ceiling_db(&mut self, db: f64) {
        self.ceiling_db = db.clamp(-12.0, 0.0);
    }

    pub fn set_release_ms(&mut self, ms: f64) {
        self.envelope.set_times(0.1, ms.clamp(10.0, 500.0));
    }

    pub fn gain_reduction_db(&self) -> f64 {
        self.gain_reduction_db
    }
}

impl Processor for Limiter {
    fn reset(&mut self) {
        self.envelope.reset();
        self.lookahead_l.reset();
        self.lookahead_r.reset();
        self.gain_reduction_db = 0.0;
    }

    fn latency(&self) -> usize {
        self.lookahead_samples
    }
}

impl ProcessorConfig for Limiter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let lookahead_samples = ((LOOKAHEAD_MS * 0.001 * sample_rate).ceil() as usize).max(1);
        self.lookahead_samples = lookahead_samples;
        self.lookahead_l = DelayLine::new(lookahead_samples + 1);
        self.lookahead_r = DelayLine::new(lookahead_samples + 1);
        self.envelope.set_sample_rate(sample_rate);
    }
}

impl StereoProcessor for Limiter {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let peak = left.abs().max(right.abs());
        let env = self.envelope.process_instant_attack(peak);

        let ceiling_lin = db_to_linear(self.ceiling_db);
        let gain = if env > ceiling_lin { (ceiling_lin / env).min(1.0) } else { 1.0 };
        self.gain_reduction_db = linear_to_db(gain, -120.0) * -1.0;

        self.lookahead_l.write(left);
        self.lookahead_r.write(right);
        let delayed_l = self.lookahead_l.read(self.lookahead_samples);
        let delayed_r = self.lookahead_r.read(self.lookahead_samples);

        (delayed_l * gain, delayed_r * gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn compressor_two_to_one_matches_scenario() {
        let mut c = Compressor::new(48_000.0);
        c.set_ratio(2.0);
        c.set_threshold_db(-20.0);
        c.set_attack_ms(1.0);
        c.set_release_ms(50.0);
        c.set_makeup_db(0.0);

        let mut peak: f64 = 0.0;
        for i in 0..(48_000 * 1 / 5) {
            let x = (2.0 * PI * 1_000.0 * i as f64 / 48_000.0).sin();
            let (l, r) = c.process_sample(x, x);
            peak = peak.max(l.abs()).max(r.abs());
        }
        assert!((c.gain_reduction_db() - 10.0).abs() < 0.5, "gr={}", c.gain_reduction_db());
        let peak_db = linear_to_db(peak, -120.0);
        assert!((peak_db - (-10.0)).abs() < 0.5, "peak_db={peak_db}");
    }

    #[test]
    fn compressor_below_threshold_is_unity() {
        let mut c = Compressor::new(48_000.0);
        c.set_threshold_db(-12.0);
        c.set_ratio(4.0);
        let (l, r) = c.process_sample(0.01, -0.01);
        assert!((l - 0.01).abs() < 1e-6);
        assert!((r - (-0.01)).abs() < 1e-6);
    }

    #[test]
    fn limiter_never_exceeds_ceiling() {
        let mut l = Limiter::new(48_000.0);
        l.set_ceiling_db(-0.3);
        l.set_release_ms(50.0);
        let ceiling = db_to_linear(-0.3);
        let mut max_out: f64 = 0.0;
        for i in 0..10_000 {
            let x = 2.0 * (2.0 * PI * 1_000.0 * i as f64 / 48_000.0).sin();
            let (out_l, out_r) = l.process_sample(x, x);
            max_out = max_out.max(out_l.abs()).max(out_r.abs());
        }
        assert!(max_out <= ceiling + 1e-6, "max_out={max_out} ceiling={ceiling}");
    }

    #[test]
    fn limiter_latency_matches_lookahead() {
        let l = Limiter::new(48_000.0);
        assert_eq!(l.latency(), (0.005 * 48_000.0).ceil() as usize);
    }
}
