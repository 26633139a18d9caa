//! Spectrum analyzer: a second SPSC tap on the output stream, windowed and
//! DFT'd on the UI thread at ~60 Hz. Not used on the audio thread.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

const FFT_SIZE: usize = 2048;
const DB_FLOOR: f64 = -80.0;
const EMA_COEFF: f64 = 0.7;

/// Forward-DFT spectrum analyzer fed by the output tap's monoized signal.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f64>>,
    input_buffer: Vec<f64>,
    scratch_windowed: Vec<f64>,
    output_buffer: Vec<Complex<f64>>,
    window: Vec<f64>,
    magnitudes_db: Vec<f64>,
    write_pos: usize,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let output_len = FFT_SIZE / 2 + 1;

        let window: Vec<f64> =
            (0..FFT_SIZE).map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (FFT_SIZE - 1) as f64).cos())).collect();

        Self {
            fft,
            input_buffer: vec![0.0; FFT_SIZE],
            scratch_windowed: vec![0.0; FFT_SIZE],
            output_buffer: vec![Complex::new(0.0, 0.0); output_len],
            window,
            magnitudes_db: vec![DB_FLOOR; output_len],
            write_pos: 0,
        }
    }

    /// Push monoized output-tap samples `(l+r)/2` into the ring buffer.
    pub fn push_samples(&mut self, samples: &[f64]) {
        for &sample in samples {
            self.input_buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
        }
    }

    /// Apply the Hann window, run the forward DFT, and update the smoothed
    /// dB magnitude vector. Call from the UI thread, not the audio thread.
    pub fn analyze(&mut self) {
        // `input_buffer[write_pos]` is the oldest sample in the ring; bring
        // the samples into chronological order before windowing so taper
        // position `j` lands on logical sample `j`, not raw index `j`.
        for (j, slot) in self.scratch_windowed.iter_mut().enumerate() {
            let raw_idx = (self.write_pos + j) % FFT_SIZE;
            *slot = self.input_buffer[raw_idx];
        }
        for (slot, &win) in self.scratch_windowed.iter_mut().zip(&self.window) {
            *slot *= win;
        }

        if self.fft.process(&mut self.scratch_windowed, &mut self.output_buffer).is_err() {
            self.magnitudes_db.fill(DB_FLOOR);
            return;
        }

        let scale = 2.0 / FFT_SIZE as f64;
        for (i, c) in self.output_buffer.iter().enumerate() {
            let magnitude = (c.re * c.re + c.im * c.im).sqrt() * scale;
            let db = (20.0 * magnitude.max(1e-10).log10()).max(DB_FLOOR);
            self.magnitudes_db[i] = self.magnitudes_db[i] * (1.0 - EMA_COEFF) + db * EMA_COEFF;
        }
    }

    pub fn magnitudes_db(&self) -> &[f64] {
        &self.magnitudes_db
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes_db.len()
    }

    pub fn bin_to_freq(&self, bin: usize, sample_rate: f64) -> f64 {
        bin as f64 * sample_rate / FFT_SIZE as f64
    }

    pub fn reset(&mut self) {
        self.input_buffer.fill(0.0);
        self.magnitudes_db.fill(DB_FLOOR);
        self.write_pos = 0;
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_settles_at_the_floor() {
        let mut analyzer = SpectrumAnalyzer::new();
        let silence = vec![0.0; FFT_SIZE];
        for _ in 0..5 {
            analyzer.push_samples(&silence);
            analyzer.analyze();
        }
        for &db in analyzer.magnitudes_db() {
            assert!(db <= DB_FLOOR + 1e-6);
        }
    }

    #[test]
    fn sine_tone_produces_a_dominant_bin_near_its_frequency() {
        let sample_rate = 48_000.0;
        let freq = 1_000.0;
        let mut analyzer = SpectrumAnalyzer::new();
        let tone: Vec<f64> = (0..FFT_SIZE).map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin()).collect();

        for _ in 0..3 {
            analyzer.push_samples(&tone);
            analyzer.analyze();
        }

        let target_bin = (freq * FFT_SIZE as f64 / sample_rate).round() as usize;
        let peak_bin = (0..analyzer.bin_count()).max_by(|&a, &b| analyzer.magnitudes_db()[a].partial_cmp(&analyzer.magnitudes_db()[b]).unwrap()).unwrap();

        assert!((peak_bin as i64 - target_bin as i64).abs() <= 2, "peak_bin={peak_bin} target_bin={target_bin}");
    }

    #[test]
    fn sine_tone_survives_chunked_pushes_with_nonzero_write_pos() {
        let sample_rate = 48_000.0;
        let freq = 1_000.0;
        let mut analyzer = SpectrumAnalyzer::new();
        let total = FFT_SIZE * 3;
        let tone: Vec<f64> = (0..total).map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin()).collect();

        // push in odd-sized chunks so write_pos is nonzero at most analyze() calls
        for chunk in tone.chunks(777) {
            analyzer.push_samples(chunk);
            analyzer.analyze();
        }

        let target_bin = (freq * FFT_SIZE as f64 / sample_rate).round() as usize;
        let peak_bin = (0..analyzer.bin_count()).max_by(|&a, &b| analyzer.magnitudes_db()[a].partial_cmp(&analyzer.magnitudes_db()[b]).unwrap()).unwrap();

        assert!((peak_bin as i64 - target_bin as i64).abs() <= 2, "peak_bin={peak_bin} target_bin={target_bin}");
    }

    #[test]
    fn reset_clears_history() {
        let mut analyzer = SpectrumAnalyzer::new();
        let tone: Vec<f64> = (0..FFT_SIZE).map(|i| (i as f64 * 0.1).sin()).collect();
        analyzer.push_samples(&tone);
        analyzer.analyze();
        analyzer.reset();
        for &db in analyzer.magnitudes_db() {
            assert_eq!(db, DB_FLOOR);
        }
    }
}
