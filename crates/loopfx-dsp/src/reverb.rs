//! Schroeder-style reverb: a bank of damped comb filters in parallel feeding
//! a short chain of series allpass filters, per channel, cross-mixed for
//! width. Deliberately simpler than a full FDN — this is the three-knob
//! (room size, damping, width) reverb the parameter surface calls for, not a
//! multi-algorithm convolution engine.

use loopfx_core::{flush_denormal, Sample};

use crate::{Processor, ProcessorConfig, StereoProcessor};

const DENORMAL_THRESHOLD: f64 = 1e-15;

/// Comb delay lengths in samples at the 48 kHz reference rate; scaled by
/// `sample_rate / 48000` at construction for other rates. Prime-ish spacing
/// avoids resonances lining up between combs.
const COMB_LENGTHS_48K: [usize; 4] = [1557, 1617, 1491, 1422];
/// A small per-channel stagger so the left and right comb banks decorrelate.
const STEREO_SPREAD_48K: usize = 23;
const ALLPASS_LENGTHS_48K: [usize; 2] = [556, 441];
const ALLPASS_FEEDBACK: f64 = 0.5;

/// One damped feedback comb filter: `y = x + damped_feedback * lowpass(y)`.
#[derive(Debug, Clone)]
struct DampedComb {
    buffer: Vec<Sample>,
    pos: usize,
    feedback: f64,
    damp: f64,
    filter_state: f64,
}

impl DampedComb {
    fn new(length: usize) -> Self {
        Self { buffer: vec![0.0; length.max(1)], pos: 0, feedback: 0.5, damp: 0.5, filter_state: 0.0 }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let output = self.buffer[self.pos];
        self.filter_state = flush_denormal(output * (1.0 - self.damp) + self.filter_state * self.damp, DENORMAL_THRESHOLD);
        self.buffer[self.pos] = flush_denormal(input + self.filter_state * self.feedback, DENORMAL_THRESHOLD);
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

/// Simple allpass diffuser: `out = -feedback*x + buf; buf' = x + feedback*out`.
#[derive(Debug, Clone)]
struct DiffusionAllpass {
    buffer: Vec<Sample>,
    pos: usize,
    feedback: f64,
}

impl DiffusionAllpass {
    fn new(length: usize, feedback: f64) -> Self {
        Self { buffer: vec![0.0; length.max(1)], pos: 0, feedback }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let delayed = self.buffer[self.pos];
        let output = delayed - input * self.feedback;
        self.buffer[self.pos] = flush_denormal(input + delayed * self.feedback, DENORMAL_THRESHOLD);
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel's worth of comb bank + allpass chain.
#[derive(Debug, Clone)]
struct ReverbChannel {
    combs: Vec<DampedComb>,
    allpasses: Vec<DiffusionAllpass>,
}

impl ReverbChannel {
    fn new(comb_lengths: &[usize], allpass_lengths: &[usize]) -> Self {
        Self {
            combs: comb_lengths.iter().map(|&l| DampedComb::new(l)).collect(),
            allpasses: allpass_lengths.iter().map(|&l| DiffusionAllpass::new(l, ALLPASS_FEEDBACK)).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let mut sum = 0.0;
        for comb in self.combs.iter_mut() {
            sum += comb.process(input);
        }
        let mut out = sum / self.combs.len() as f64;
        for allpass in self.allpasses.iter_mut() {
            out = allpass.process(out);
        }
        out
    }

    fn reset(&mut self) {
        for comb in self.combs.iter_mut() {
            comb.reset();
        }
        for allpass in self.allpasses.iter_mut() {
            allpass.reset();
        }
    }

    fn set_room_size(&mut self, room_size: f64) {
        // room_size in [0,1] maps to comb feedback in [0.7, 0.98]
        let fb = 0.7 + room_size.clamp(0.0, 1.0) * 0.28;
        for comb in self.combs.iter_mut() {
            comb.feedback = fb;
        }
    }

    fn set_damping(&mut self, damping: f64) {
        let damp = damping.clamp(0.0, 1.0);
        for comb in self.combs.iter_mut() {
            comb.damp = damp;
        }
    }
}

/// Stereo Schroeder reverb with `roomSize`, `damping`, and `width` controls.
#[derive(Debug, Clone)]
pub struct Reverb {
    left: ReverbChannel,
    right: ReverbChannel,
    room_size: f64,
    damping: f64,
    width: f64,
    sample_rate: f64,
}

impl Reverb {
    pub fn new(sample_rate: f64) -> Self {
        let mut reverb = Self {
            left: Self::build_channel(sample_rate, 0),
            right: Self::build_channel(sample_rate, STEREO_SPREAD_48K),
            room_size: 0.5,
            damping: 0.5,
            width: 1.0,
            sample_rate,
        };
        reverb.apply_params();
        reverb
    }

    fn build_channel(sample_rate: f64, stereo_spread: usize) -> ReverbChannel {
        let scale = sample_rate / 48_000.0;
        let comb_lengths: Vec<usize> = COMB_LENGTHS_48K
            .iter()
            .map(|&l| (((l + stereo_spread) as f64) * scale).round().max(1.0) as usize)
            .collect();
        let allpass_lengths: Vec<usize> = ALLPASS_LENGTHS_48K
            .iter()
            .map(|&l| ((l as f64) * scale).round().max(1.0) as usize)
            .collect();
        ReverbChannel::new(&comb_lengths, &allpass_lengths)
    }

    fn apply_params(&mut self) {
        self.left.set_room_size(self.room_size);
        self.right.set_room_size(self.room_size);
        self.left.set_damping(self.damping);
        self.right.set_damping(self.damping);
    }

    pub fn set_room_size(&mut self, room_size: f64) {
        self.room_size = room_size.clamp(0.0, 1.0);
        self.apply_params();
    }

    pub fn set_damping(&mut self, damping: f64) {
        self.damping = damping.clamp(0.0, 1.0);
        self.apply_params();
    }

    pub fn set_width(&mut self, width: f64) {
        self.width = width.clamp(0.0, 1.0);
    }
}

impl Processor for Reverb {
    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

impl ProcessorConfig for Reverb {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.left = Self::build_channel(sample_rate, 0);
        self.right = Self::build_channel(sample_rate, STEREO_SPREAD_48K);
        self.apply_params();
    }
}

impl StereoProcessor for Reverb {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let wet_l = self.left.process(left);
        let wet_r = self.right.process(right);

        // width cross-mix: width=1 keeps channels independent, width=0 sums to mono
        let mid = (wet_l + wet_r) * 0.5;
        let side = (wet_l - wet_r) * 0.5 * self.width;
        (mid + side, mid - side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverb_tail_stays_bounded() {
        let mut r = Reverb::new(48_000.0);
        r.set_room_size(0.9);
        r.set_damping(0.2);
        let (mut l, mut rr) = (0.0, 0.0);
        for i in 0..48_000 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            let (out_l, out_r) = r.process_sample(x, x);
            l = out_l;
            rr = out_r;
            assert!(out_l.is_finite() && out_r.is_finite());
            assert!(out_l.abs() < 4.0 && out_r.abs() < 4.0);
        }
        let _ = (l, rr);
    }

    #[test]
    fn reset_clears_tail() {
        let mut r = Reverb::new(48_000.0);
        r.process_sample(1.0, 1.0);
        r.reset();
        let (l, rr) = r.process_sample(0.0, 0.0);
        assert_eq!(l, 0.0);
        assert_eq!(rr, 0.0);
    }
}
