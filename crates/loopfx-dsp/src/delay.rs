//! Delay line primitive and the stereo delay effect built on it.

use loopfx_core::{flush_denormal, Sample};

use crate::smoothing::{SmoothedParam, SmoothingType};
use crate::{Processor, ProcessorConfig, StereoProcessor};

const DENORMAL_THRESHOLD: f64 = 1e-15;

/// Contiguous delay buffer with fractional (linearly interpolated) read.
/// Allocates once at construction; never allocates again.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_samples: usize) -> Self {
        Self { buffer: vec![0.0; max_samples.max(1)], write_pos: 0 }
    }

    #[inline]
    pub fn write(&mut self, value: Sample) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Read `delay_samples` behind the current write position.
    #[inline]
    pub fn read(&self, delay_samples: usize) -> Sample {
        let len = self.buffer.len();
        let offset = delay_samples.min(len - 1);
        let idx = (self.write_pos + len - offset - 1) % len;
        self.buffer[idx]
    }

    /// Read at a fractional delay via linear interpolation between the two
    /// integer taps bracketing it.
    #[inline]
    pub fn read_fractional(&self, delay_samples: f64) -> Sample {
        let len = self.buffer.len();
        let max_delay = (len - 1) as f64;
        let delay = delay_samples.clamp(0.0, max_delay);
        let base = delay.floor() as usize;
        let frac = delay - base as f64;
        let a = self.read(base);
        let b = self.read((base + 1).min(len - 1));
        a + (b - a) * frac
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

/// Stereo delay with feedback, parameter-smoothed delay time so a live time
/// change ramps instead of clicking.
#[derive(Debug)]
pub struct StereoDelay {
    line_l: DelayLine,
    line_r: DelayLine,
    feedback: f64,
    time_samples: SmoothedParam,
    sample_rate: f64,
}

const MAX_DELAY_MS: f64 = 2000.0;

impl StereoDelay {
    pub fn new(sample_rate: f64) -> Self {
        let max_samples = (MAX_DELAY_MS * 0.001 * sample_rate).ceil() as usize + 2;
        let default_samples = 250.0 * 0.001 * sample_rate;
        Self {
            line_l: DelayLine::new(max_samples),
            line_r: DelayLine::new(max_samples),
            feedback: 0.3,
            time_samples: SmoothedParam::with_range(
                default_samples,
                10.0,
                sample_rate,
                SmoothingType::Exponential,
                0.0,
                max_samples as f64 - 2.0,
            ),
            sample_rate,
        }
    }

    pub fn set_time_ms(&mut self, ms: f64) {
        let ms = ms.clamp(1.0, MAX_DELAY_MS);
        self.time_samples.set_target(ms * 0.001 * self.sample_rate);
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }
}

impl Processor for StereoDelay {
    fn reset(&mut self) {
        self.line_l.reset();
        self.line_r.reset();
        self.time_samples.reset();
    }
}

impl ProcessorConfig for StereoDelay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let max_samples = (MAX_DELAY_MS * 0.001 * sample_rate).ceil() as usize + 2;
        self.line_l = DelayLine::new(max_samples);
        self.line_r = DelayLine::new(max_samples);
        self.time_samples.set_sample_rate(sample_rate);
    }
}

impl StereoProcessor for StereoDelay {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let delay_samples = self.time_samples.next();

        let delayed_l = self.line_l.read_fractional(delay_samples);
        let delayed_r = self.line_r.read_fractional(delay_samples);

        self.line_l.write(flush_denormal(left + delayed_l * self.feedback, DENORMAL_THRESHOLD));
        self.line_r.write(flush_denormal(right + delayed_r * self.feedback, DENORMAL_THRESHOLD));

        (delayed_l, delayed_r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_line_basic_read_write() {
        let mut d = DelayLine::new(4);
        d.write(1.0);
        d.write(2.0);
        d.write(3.0);
        d.write(4.0);
        assert_eq!(d.read(0), 4.0);
        assert_eq!(d.read(1), 3.0);
        assert_eq!(d.read(3), 1.0);
    }

    #[test]
    fn stereo_delay_500ms_no_feedback_impulse() {
        let fs = 48_000.0;
        let mut delay = StereoDelay::new(fs);
        delay.set_time_ms(500.0);
        delay.set_feedback(0.0);
        // let the smoothed time converge before the impulse
        for _ in 0..20_000 {
            delay.process_sample(0.0, 0.0);
        }

        let (l0, r0) = delay.process_sample(1.0, 1.0);
        assert_eq!(l0, 0.0);
        assert_eq!(r0, 0.0);

        let mut peak_index = None;
        let mut peak_val = 0.0;
        for i in 1..30_000 {
            let (l, r) = delay.process_sample(0.0, 0.0);
            if l.abs() > peak_val {
                peak_val = l.abs();
                peak_index = Some(i);
            }
            let _ = r;
        }
        let expected = (0.500 * fs) as usize;
        let idx = peak_index.unwrap();
        assert!((idx as i64 - expected as i64).abs() <= 2, "idx={idx} expected={expected}");
        assert!(peak_val > 0.9, "peak_val={peak_val}");
    }
}
