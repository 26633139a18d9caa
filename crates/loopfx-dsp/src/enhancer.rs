//! Psychoacoustic enhancers: bass harmonic generation and vocal clarity/air.

use loopfx_core::Sample;

use crate::biquad::{BiquadCoeffs, FilterType};
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

/// Low-pass split feeding a tanh-based harmonic generator, remixed with dry.
#[derive(Debug, Clone)]
pub struct BassEnhancer {
    split_l: [crate::biquad::BiquadTdf2; 2],
    split_r: [crate::biquad::BiquadTdf2; 2],
    amount: f64,
    low_freq: f64,
    harmonics: f64,
    sample_rate: f64,
}

impl BassEnhancer {
    pub fn new(sample_rate: f64) -> Self {
        let mut e = Self {
            split_l: [crate::biquad::BiquadTdf2::new(sample_rate), crate::biquad::BiquadTdf2::new(sample_rate)],
            split_r: [crate::biquad::BiquadTdf2::new(sample_rate), crate::biquad::BiquadTdf2::new(sample_rate)],
            amount: 50.0,
            low_freq: 100.0,
            harmonics: 30.0,
            sample_rate,
        };
        e.apply_filters();
        e
    }

    pub fn set_amount(&mut self, amount: f64) {
        self.amount = amount.clamp(0.0, 100.0);
    }

    pub fn set_low_freq(&mut self, hz: f64) {
        self.low_freq = hz.clamp(40.0, 250.0);
        self.apply_filters();
    }

    pub fn set_harmonics(&mut self, harmonics: f64) {
        self.harmonics = harmonics.clamp(0.0, 100.0);
    }

    fn apply_filters(&mut self) {
        // 12 dB/oct lowpass split: two cascaded 1-pole-equivalent biquads
        for f in self.split_l.iter_mut().chain(self.split_r.iter_mut()) {
            f.set_design(FilterType::Lowpass, self.low_freq, 0.707, 0.0);
        }
    }

    #[inline]
    fn generate(&self, band: Sample) -> Sample {
        // 2nd/3rd-order tanh waveshaper biased toward low-order harmonics
        let drive = 1.0 + self.harmonics * 0.05;
        (band * drive).tanh()
    }
}

impl Processor for BassEnhancer {
    fn reset(&mut self) {
        for f in self.split_l.iter_mut().chain(self.split_r.iter_mut()) {
            f.reset();
        }
    }
}

impl ProcessorConfig for BassEnhancer {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for f in self.split_l.iter_mut().chain(self.split_r.iter_mut()) {
            f.set_sample_rate(sample_rate);
        }
        self.apply_filters();
    }
}

impl StereoProcessor for BassEnhancer {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let band_l = self.split_l[1].process_sample(self.split_l[0].process_sample(left));
        let band_r = self.split_r[1].process_sample(self.split_r[0].process_sample(right));

        let mix = self.amount / 100.0;
        let out_l = left + self.generate(band_l) * mix;
        let out_r = right + self.generate(band_r) * mix;
        (out_l, out_r)
    }
}

/// Band-pass split in the presence/air region, spectral emphasis only (no
/// harmonic synthesis, so it has no `harmonics` parameter).
#[derive(Debug, Clone)]
pub struct VocalClarity {
    presence_l: crate::biquad::BiquadTdf2,
    presence_r: crate::biquad::BiquadTdf2,
    air_l: crate::biquad::BiquadTdf2,
    air_r: crate::biquad::BiquadTdf2,
    clarity: f64,
    air: f64,
    sample_rate: f64,
}

const PRESENCE_FREQ: f64 = 3_000.0;
const AIR_FREQ: f64 = 12_000.0;

impl VocalClarity {
    pub fn new(sample_rate: f64) -> Self {
        let mut e = Self {
            presence_l: crate::biquad::BiquadTdf2::new(sample_rate),
            presence_r: crate::biquad::BiquadTdf2::new(sample_rate),
            air_l: crate::biquad::BiquadTdf2::new(sample_rate),
            air_r: crate::biquad::BiquadTdf2::new(sample_rate),
            clarity: 50.0,
            air: 25.0,
            sample_rate,
        };
        e.apply_filters();
        e
    }

    pub fn set_clarity(&mut self, clarity: f64) {
        self.clarity = clarity.clamp(0.0, 100.0);
        self.apply_filters();
    }

    pub fn set_air(&mut self, air: f64) {
        self.air = air.clamp(0.0, 100.0);
        self.apply_filters();
    }

    fn apply_filters(&mut self) {
        // clarity: 0..100 -> 0..+9 dB bell around 3 kHz
        let presence_gain = self.clarity / 100.0 * 9.0;
        self.presence_l.set_design(FilterType::Peaking, PRESENCE_FREQ, 1.0, presence_gain);
        self.presence_r.set_design(FilterType::Peaking, PRESENCE_FREQ, 1.0, presence_gain);

        // air: 0..100 -> 0..+6 dB high shelf above 10 kHz (centered 12 kHz)
        let air_gain = self.air / 100.0 * 6.0;
        self.air_l.set_design(FilterType::HighShelf, AIR_FREQ, 0.707, air_gain);
        self.air_r.set_design(FilterType::HighShelf, AIR_FREQ, 0.707, air_gain);
    }
}

impl Processor for VocalClarity {
    fn reset(&mut self) {
        self.presence_l.reset();
        self.presence_r.reset();
        self.air_l.reset();
        self.air_r.reset();
    }
}

impl ProcessorConfig for VocalClarity {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.presence_l.set_sample_rate(sample_rate);
        self.presence_r.set_sample_rate(sample_rate);
        self.air_l.set_sample_rate(sample_rate);
        self.air_r.set_sample_rate(sample_rate);
        self.apply_filters();
    }
}

impl StereoProcessor for VocalClarity {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let l = self.air_l.process_sample(self.presence_l.process_sample(left));
        let r = self.air_r.process_sample(self.presence_r.process_sample(right));
        (l, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bass_enhancer_zero_amount_is_dry() {
        let mut e = BassEnhancer::new(48_000.0);
        e.set_amount(0.0);
        let (l, r) = e.process_sample(0.2, -0.2);
        assert!((l - 0.2).abs() < 1e-9);
        assert!((r - (-0.2)).abs() < 1e-9);
    }

    #[test]
    fn vocal_clarity_zero_params_is_near_unity() {
        let mut v = VocalClarity::new(48_000.0);
        v.set_clarity(0.0);
        v.set_air(0.0);
        let mut max_dev: f64 = 0.0;
        for i in 0..4_000 {
            let x = (i as f64 * 0.01).sin() * 0.3;
            let (l, _) = v.process_sample(x, x);
            if i > 512 {
                max_dev = max_dev.max((l - x).abs());
            }
        }
        assert!(max_dev < 1e-3, "max_dev={max_dev}");
    }
}
