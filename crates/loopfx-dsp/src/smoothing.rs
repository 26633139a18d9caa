//! Lock-free parameter smoothing: the cross-thread primitive the controller
//! uses to hand the audio thread a moving target without ever blocking it.
//!
//! A `SmoothedParam` publishes its target as an `AtomicU64`-encoded `f64`. The
//! UI thread calls `set_target` from anywhere, anytime; the audio thread calls
//! `next()` once per sample to advance `current` a step closer. No lock, no
//! allocation, and a torn read is impossible because the whole f64 travels as
//! one atomic word.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// How `current` chases `target` each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingType {
    /// One-pole exponential approach; reaches ~63% of the remaining distance
    /// every `smoothing_samples` samples. The default — used for delay time,
    /// EQ gain ramps, and anything where an instant jump would click.
    #[default]
    Exponential,
    /// Constant-rate ramp computed fresh whenever the target changes.
    Linear,
    /// Snaps immediately; smoothing is a no-op. Used for parameters where a
    /// block-rate step is acceptable (e.g. filter type switches).
    None,
}

/// A single smoothed parameter, safely shared between one writer (the
/// controller) and one reader (the audio thread).
#[derive(Debug)]
pub struct SmoothedParam {
    target: AtomicU64,
    current: f64,
    coeff: f64,
    smoothing_type: SmoothingType,
    smoothing_samples: f64,
    linear_step: f64,
    linear_remaining: i64,
    dirty: AtomicBool,
    sample_rate: f64,
    min_value: f64,
    max_value: f64,
}

impl SmoothedParam {
    pub fn new(initial: f64, smoothing_time_ms: f64, sample_rate: f64, smoothing_type: SmoothingType) -> Self {
        Self::with_range(initial, smoothing_time_ms, sample_rate, smoothing_type, f64::MIN, f64::MAX)
    }

    pub fn with_range(
        initial: f64,
        smoothing_time_ms: f64,
        sample_rate: f64,
        smoothing_type: SmoothingType,
        min_value: f64,
        max_value: f64,
    ) -> Self {
        let initial = initial.clamp(min_value, max_value);
        let smoothing_samples = smoothing_time_ms * 0.001 * sample_rate;
        Self {
            target: AtomicU64::new(initial.to_bits()),
            current: initial,
            coeff: calculate_coeff(smoothing_samples),
            smoothing_type,
            smoothing_samples,
            linear_step: 0.0,
            linear_remaining: 0,
            dirty: AtomicBool::new(false),
            sample_rate,
            min_value,
            max_value,
        }
    }

    /// Thread-safe: call from the controller thread at any time.
    pub fn set_target(&self, value: f64) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.target.store(clamped.to_bits(), Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn target(&self) -> f64 {
        f64::from_bits(self.target.load(Ordering::Relaxed))
    }

    /// Audio-thread-only: the last value `next()` produced, without advancing.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Snap `current` to `target` immediately, clearing any in-flight ramp.
    pub fn set_immediate(&mut self, value: f64) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.target.store(clamped.to_bits(), Ordering::Relaxed);
        self.current = clamped;
        self.linear_remaining = 0;
        self.dirty.store(false, Ordering::Release);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.smoothing_samples = self.smoothing_samples.max(1.0);
        self.coeff = calculate_coeff(self.smoothing_samples);
    }

    pub fn is_smoothing(&self) -> bool {
        match self.smoothing_type {
            SmoothingType::None => false,
            SmoothingType::Linear => self.linear_remaining > 0,
            SmoothingType::Exponential => (self.current - self.target()).abs() > 1e-9,
        }
    }

    /// Advance one sample and return the new current value. Audio-thread-only.
    pub fn next(&mut self) -> f64 {
        let target = self.target();
        match self.smoothing_type {
            SmoothingType::None => {
                self.current = target;
            }
            SmoothingType::Exponential => {
                self.current += self.coeff * (target - self.current);
            }
            SmoothingType::Linear => {
                if self.dirty.swap(false, Ordering::Acquire) {
                    let samples = self.smoothing_samples.max(1.0) as i64;
                    self.linear_step = (target - self.current) / samples as f64;
                    self.linear_remaining = samples;
                }
                if self.linear_remaining > 0 {
                    self.current += self.linear_step;
                    self.linear_remaining -= 1;
                } else {
                    self.current = target;
                }
            }
        }
        self.current
    }

    /// Preview the next value without mutating state.
    pub fn peek_next(&self) -> f64 {
        let target = self.target();
        match self.smoothing_type {
            SmoothingType::None => target,
            SmoothingType::Exponential => self.current + self.coeff * (target - self.current),
            SmoothingType::Linear => self.current,
        }
    }

    pub fn reset(&mut self) {
        let target = self.target();
        self.current = target;
        self.linear_remaining = 0;
        self.dirty.store(false, Ordering::Release);
    }
}

/// `coeff` such that one-pole smoothing reaches ~63% of the remaining
/// distance in `samples` samples.
#[inline]
fn calculate_coeff(samples: f64) -> f64 {
    if samples <= 0.0 {
        1.0
    } else {
        1.0 - (-1.0 / samples).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_converges_toward_target() {
        let mut p = SmoothedParam::new(0.0, 10.0, 48_000.0, SmoothingType::Exponential);
        p.set_target(1.0);
        let mut last = 0.0;
        for _ in 0..10_000 {
            last = p.next();
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn linear_reaches_target_in_expected_samples() {
        let mut p = SmoothedParam::new(0.0, 1.0, 1_000.0, SmoothingType::Linear);
        p.set_target(1.0);
        // smoothing_samples = 1.0 * 0.001 * 1000 = 1 sample
        let v = p.next();
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn none_snaps_instantly() {
        let mut p = SmoothedParam::new(0.0, 50.0, 48_000.0, SmoothingType::None);
        p.set_target(0.7);
        assert_eq!(p.next(), 0.7);
    }

    #[test]
    fn range_clamped_on_set() {
        let p = SmoothedParam::with_range(0.0, 10.0, 48_000.0, SmoothingType::Exponential, 0.0, 1.0);
        p.set_target(5.0);
        assert_eq!(p.target(), 1.0);
        p.set_target(-5.0);
        assert_eq!(p.target(), 0.0);
    }

    #[test]
    fn immediate_set_clears_ramp() {
        let mut p = SmoothedParam::new(0.0, 50.0, 48_000.0, SmoothingType::Exponential);
        p.set_target(1.0);
        p.next();
        p.set_immediate(0.25);
        assert_eq!(p.current(), 0.25);
        assert_eq!(p.next(), 0.25);
    }
}
