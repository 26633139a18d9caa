//! Fixed-order DSP chain: EQ -> bass enhancer -> vocal clarity -> compressor
//! -> reverb -> delay -> stereo widener -> output gain -> limiter, with
//! atomic input/output peak meters sampled by the UI.
//!
//! Effect order never changes after construction. Membership is not dynamic
//! (the core specification forbids reordering or adding effects while
//! streaming); only parameters, bypass, and wet/dry are live-mutable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use loopfx_core::{db_to_linear, flush_denormal, Sample, StereoSample};

use crate::delay::StereoDelay;
use crate::dynamics::{Compressor, Limiter};
use crate::enhancer::{BassEnhancer, VocalClarity};
use crate::eq::ParametricEq;
use crate::reverb::Reverb;
use crate::spatial::StereoWidener;
use crate::{Processor, ProcessorConfig, StereoProcessor};

const METER_DENORMAL_THRESHOLD: f64 = 1e-10;

/// An `f64` meter value published lock-free via atomic bit-encoding, read by
/// the controller thread at its own cadence.
#[derive(Debug, Default)]
struct AtomicMeter(AtomicU64);

impl AtomicMeter {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Asymmetric-ballistics peak envelope: fast attack (~1 ms), slow release
/// (~300 ms), flushed to zero below the metering denormal floor.
struct PeakEnvelope {
    value: f64,
    attack_coeff: f64,
    release_coeff: f64,
}

impl PeakEnvelope {
    fn new(sample_rate: f64) -> Self {
        Self {
            value: 0.0,
            attack_coeff: (-1.0 / (1.0 * 0.001 * sample_rate)).exp(),
            release_coeff: (-1.0 / (300.0 * 0.001 * sample_rate)).exp(),
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.attack_coeff = (-1.0 / (1.0 * 0.001 * sample_rate)).exp();
        self.release_coeff = (-1.0 / (300.0 * 0.001 * sample_rate)).exp();
    }

    #[inline]
    fn update(&mut self, target: f64) -> f64 {
        let coeff = if target > self.value { self.attack_coeff } else { self.release_coeff };
        self.value = flush_denormal(coeff * self.value + (1.0 - coeff) * target, METER_DENORMAL_THRESHOLD);
        self.value
    }

    fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Output trim stage: applies a controller-set gain in dB to both channels.
/// Wrapped in a `ChainSlot` like every other named stage so it carries the
/// same bypass flag and wet/dry scalar.
struct OutputGain {
    gain_db: AtomicMeter,
}

impl OutputGain {
    fn new() -> Self {
        let gain_db = AtomicMeter::new();
        gain_db.store(0.0);
        Self { gain_db }
    }

    fn set_gain_db(&self, db: f64) {
        self.gain_db.store(db.clamp(-24.0, 24.0));
    }
}

impl Processor for OutputGain {
    fn reset(&mut self) {}

    fn latency(&self) -> usize {
        0
    }
}

impl ProcessorConfig for OutputGain {
    fn set_sample_rate(&mut self, _sample_rate: f64) {}
}

impl StereoProcessor for OutputGain {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let gain = db_to_linear(self.gain_db.load());
        (left * gain, right * gain)
    }
}

/// Wraps a stereo processor with a live bypass flag and wet/dry mix,
/// uniform across every leaf effect in the chain.
struct ChainSlot<P> {
    processor: P,
    bypass: AtomicBool,
    wet: AtomicMeter,
}

impl<P: StereoProcessor> ChainSlot<P> {
    fn new(processor: P) -> Self {
        Self { processor, bypass: AtomicBool::new(false), wet: { let m = AtomicMeter::new(); m.store(1.0); m } }
    }

    fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
    }

    fn set_wet(&self, wet: f64) {
        self.wet.store(wet.clamp(0.0, 1.0));
    }

    #[inline]
    fn process(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        if self.bypass.load(Ordering::Relaxed) {
            return (left, right);
        }
        let (wet_l, wet_r) = self.processor.process_sample(left, right);
        let wet = self.wet.load();
        if wet >= 1.0 {
            (wet_l, wet_r)
        } else {
            (left * (1.0 - wet) + wet_l * wet, right * (1.0 - wet) + wet_r * wet)
        }
    }
}

/// The fixed-order effect chain plus its metering.
pub struct DspChain {
    eq: ChainSlot<ParametricEq>,
    bass: ChainSlot<BassEnhancer>,
    vocal: ChainSlot<VocalClarity>,
    compressor: ChainSlot<Compressor>,
    reverb: ChainSlot<Reverb>,
    delay: ChainSlot<StereoDelay>,
    widener: ChainSlot<StereoWidener>,
    limiter: ChainSlot<Limiter>,
    output_gain: ChainSlot<OutputGain>,

    input_meter_l: PeakEnvelope,
    input_meter_r: PeakEnvelope,
    output_meter_l: PeakEnvelope,
    output_meter_r: PeakEnvelope,

    input_peak_l: AtomicMeter,
    input_peak_r: AtomicMeter,
    output_peak_l: AtomicMeter,
    output_peak_r: AtomicMeter,

    sample_rate: f64,
}

impl DspChain {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            eq: ChainSlot::new(ParametricEq::new(sample_rate)),
            bass: ChainSlot::new(BassEnhancer::new(sample_rate)),
            vocal: ChainSlot::new(VocalClarity::new(sample_rate)),
            compressor: ChainSlot::new(Compressor::new(sample_rate)),
            reverb: ChainSlot::new(Reverb::new(sample_rate)),
            delay: ChainSlot::new(StereoDelay::new(sample_rate)),
            widener: ChainSlot::new(StereoWidener::new()),
            limiter: ChainSlot::new(Limiter::new(sample_rate)),
            output_gain: ChainSlot::new(OutputGain::new()),
            input_meter_l: PeakEnvelope::new(sample_rate),
            input_meter_r: PeakEnvelope::new(sample_rate),
            output_meter_l: PeakEnvelope::new(sample_rate),
            output_meter_r: PeakEnvelope::new(sample_rate),
            input_peak_l: AtomicMeter::new(),
            input_peak_r: AtomicMeter::new(),
            output_peak_l: AtomicMeter::new(),
            output_peak_r: AtomicMeter::new(),
            sample_rate,
        }
    }

    pub fn eq_mut(&mut self) -> &mut ParametricEq {
        &mut self.eq.processor
    }

    pub fn bass_mut(&mut self) -> &mut BassEnhancer {
        &mut self.bass.processor
    }

    pub fn vocal_mut(&mut self) -> &mut VocalClarity {
        &mut self.vocal.processor
    }

    pub fn compressor_mut(&mut self) -> &mut Compressor {
        &mut self.compressor.processor
    }

    pub fn reverb_mut(&mut self) -> &mut Reverb {
        &mut self.reverb.processor
    }

    pub fn delay_mut(&mut self) -> &mut StereoDelay {
        &mut self.delay.processor
    }

    pub fn widener_mut(&mut self) -> &mut StereoWidener {
        &mut self.widener.processor
    }

    pub fn limiter_mut(&mut self) -> &mut Limiter {
        &mut self.limiter.processor
    }

    pub fn set_output_gain_db(&self, db: f64) {
        self.output_gain.processor.set_gain_db(db);
    }

    pub fn set_eq_bypass(&self, bypass: bool) {
        self.eq.set_bypass(bypass);
    }
    pub fn set_bass_bypass(&self, bypass: bool) {
        self.bass.set_bypass(bypass);
    }
    pub fn set_vocal_bypass(&self, bypass: bool) {
        self.vocal.set_bypass(bypass);
    }
    pub fn set_compressor_bypass(&self, bypass: bool) {
        self.compressor.set_bypass(bypass);
    }
    pub fn set_reverb_bypass(&self, bypass: bool) {
        self.reverb.set_bypass(bypass);
    }
    pub fn set_delay_bypass(&self, bypass: bool) {
        self.delay.set_bypass(bypass);
    }
    pub fn set_widener_bypass(&self, bypass: bool) {
        self.widener.set_bypass(bypass);
    }
    pub fn set_limiter_bypass(&self, bypass: bool) {
        self.limiter.set_bypass(bypass);
    }
    pub fn set_output_gain_bypass(&self, bypass: bool) {
        self.output_gain.set_bypass(bypass);
    }

    pub fn set_reverb_wet(&self, wet: f64) {
        self.reverb.set_wet(wet);
    }
    pub fn set_delay_wet(&self, wet: f64) {
        self.delay.set_wet(wet);
    }

    /// Process one stereo frame through the fixed chain. Updates input and
    /// output peak meters with asymmetric ballistics.
    #[inline]
    pub fn process(&mut self, frame: StereoSample) -> StereoSample {
        let in_peak_l = self.input_meter_l.update(frame.left.abs());
        let in_peak_r = self.input_meter_r.update(frame.right.abs());
        self.input_peak_l.store(in_peak_l);
        self.input_peak_r.store(in_peak_r);

        let (mut l, mut r) = (frame.left, frame.right);
        (l, r) = self.eq.process(l, r);
        (l, r) = self.bass.process(l, r);
        (l, r) = self.vocal.process(l, r);
        (l, r) = self.compressor.process(l, r);
        (l, r) = self.reverb.process(l, r);
        (l, r) = self.delay.process(l, r);
        (l, r) = self.widener.process(l, r);
        (l, r) = self.output_gain.process(l, r);
        (l, r) = self.limiter.process(l, r);

        let out_peak_l = self.output_meter_l.update(l.abs());
        let out_peak_r = self.output_meter_r.update(r.abs());
        self.output_peak_l.store(out_peak_l);
        self.output_peak_r.store(out_peak_r);

        StereoSample::new(l, r)
    }

    pub fn input_peaks(&self) -> (f64, f64) {
        (self.input_peak_l.load(), self.input_peak_r.load())
    }

    pub fn output_peaks(&self) -> (f64, f64) {
        (self.output_peak_l.load(), self.output_peak_r.load())
    }

    pub fn reset(&mut self) {
        self.eq.processor.reset();
        self.bass.processor.reset();
        self.vocal.processor.reset();
        self.compressor.processor.reset();
        self.reverb.processor.reset();
        self.delay.processor.reset();
        self.widener.processor.reset();
        self.limiter.processor.reset();
        self.output_gain.processor.reset();
        self.input_meter_l.reset();
        self.input_meter_r.reset();
        self.output_meter_l.reset();
        self.output_meter_r.reset();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.eq.processor.set_sample_rate(sample_rate);
        self.bass.processor.set_sample_rate(sample_rate);
        self.vocal.processor.set_sample_rate(sample_rate);
        self.compressor.processor.set_sample_rate(sample_rate);
        self.reverb.processor.set_sample_rate(sample_rate);
        self.delay.processor.set_sample_rate(sample_rate);
        self.limiter.processor.set_sample_rate(sample_rate);
        self.output_gain.processor.set_sample_rate(sample_rate);
        self.input_meter_l.set_sample_rate(sample_rate);
        self.input_meter_r.set_sample_rate(sample_rate);
        self.output_meter_l.set_sample_rate(sample_rate);
        self.output_meter_r.set_sample_rate(sample_rate);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_bypassed_chain_is_identity() {
        let mut chain = DspChain::new(48_000.0);
        chain.set_eq_bypass(true);
        chain.set_bass_bypass(true);
        chain.set_vocal_bypass(true);
        chain.set_compressor_bypass(true);
        chain.set_reverb_bypass(true);
        chain.set_delay_bypass(true);
        chain.set_widener_bypass(true);
        chain.set_limiter_bypass(true);
        chain.set_output_gain_bypass(true);

        for i in 0..1000 {
            let x = (i as f64 * 0.01).sin() * 0.5;
            let out = chain.process(StereoSample::new(x, -x));
            assert!((out.left - x).abs() < 1e-9);
            assert!((out.right - (-x)).abs() < 1e-9);
        }
    }

    #[test]
    fn output_gain_bypass_ignores_nonzero_gain() {
        let mut chain = DspChain::new(48_000.0);
        chain.set_eq_bypass(true);
        chain.set_bass_bypass(true);
        chain.set_vocal_bypass(true);
        chain.set_compressor_bypass(true);
        chain.set_reverb_bypass(true);
        chain.set_delay_bypass(true);
        chain.set_widener_bypass(true);
        chain.set_limiter_bypass(true);
        chain.set_output_gain_db(-12.0);
        chain.set_output_gain_bypass(true);

        let out = chain.process(StereoSample::new(0.5, -0.5));
        assert!((out.left - 0.5).abs() < 1e-9);
        assert!((out.right - (-0.5)).abs() < 1e-9);
    }

    #[test]
    fn meters_are_non_negative_and_finite() {
        let mut chain = DspChain::new(48_000.0);
        for i in 0..4_000 {
            let x = (i as f64 * 0.07).sin();
            chain.process(StereoSample::new(x, x));
        }
        let (il, ir) = chain.input_peaks();
        let (ol, or_) = chain.output_peaks();
        for v in [il, ir, ol, or_] {
            assert!(v >= 0.0 && v.is_finite());
        }
    }
}
