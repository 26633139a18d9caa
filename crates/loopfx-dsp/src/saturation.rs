//! Saturation stage used as the EQ's optional post-cascade coloring.
//!
//! Runs at 2x oversampling: linear-interpolation upsample, waveshape at the
//! doubled rate, then a fixed 3-tap `[0.25, 0.5, 0.25]` half-band downsample.
//! A mode=clean, low-drive fast path skips the oversampling machinery
//! entirely when the input can't meaningfully clip.

use loopfx_core::Sample;

use crate::{MonoProcessor, Processor};

/// The four saturation characters the parameter surface exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaturationMode {
    #[default]
    Clean,
    Tube,
    Tape,
    Transistor,
}

#[inline]
fn shape(mode: SaturationMode, drive: f64, x: Sample) -> Sample {
    let driven = x * (1.0 + drive * 9.0);
    match mode {
        SaturationMode::Clean => {
            // tanh soft clip with a knee around 0.9
            let knee = 0.9;
            if driven.abs() <= knee {
                driven
            } else {
                knee * driven.signum() + (driven - knee * driven.signum()).tanh() * (1.0 - knee)
            }
        }
        SaturationMode::Tube => {
            // asymmetric rational soft clip: emphasizes even harmonics
            let bias = 0.15;
            let y = (driven + bias) / (1.0 + (driven + bias).abs());
            y - bias / (1.0 + bias.abs())
        }
        SaturationMode::Tape => {
            // cubic soft clip
            let clamped = driven.clamp(-1.5, 1.5);
            clamped - clamped.powi(3) / 6.75
        }
        SaturationMode::Transistor => {
            // tanh hard knee, higher-order odd harmonics
            (driven * 1.5).tanh()
        }
    }
}

/// 2x-oversampled saturator used inline in the EQ's post-cascade stage.
#[derive(Debug, Clone)]
pub struct Saturator {
    mode: SaturationMode,
    drive: f64,
    mix: f64,
    prev_input: Sample,
    prev_trailing: Sample,
}

impl Saturator {
    pub fn new() -> Self {
        Self { mode: SaturationMode::Clean, drive: 0.0, mix: 1.0, prev_input: 0.0, prev_trailing: 0.0 }
    }

    pub fn set_mode(&mut self, mode: SaturationMode) {
        self.mode = mode;
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = drive.clamp(0.0, 1.0);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    #[inline]
    fn fast_path_eligible(&self, input: Sample) -> bool {
        self.mode == SaturationMode::Clean && self.drive < 0.1 && input.abs() < 0.9
    }
}

impl Default for Saturator {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Saturator {
    fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_trailing = 0.0;
    }
}

impl MonoProcessor for Saturator {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        if self.fast_path_eligible(input) {
            self.prev_input = input;
            self.prev_trailing = input;
            return input;
        }

        // upsample by linear interpolation: midpoint between prev and current
        let mid = (self.prev_input + input) * 0.5;
        let y_mid = shape(self.mode, self.drive, mid);
        let y_cur = shape(self.mode, self.drive, input);

        // 3-tap [0.25, 0.5, 0.25] downsample centered on the midpoint tap:
        // the left tap is the previous call's trailing (`cur`) sample, one
        // oversampled step before `mid`; the right tap is this call's `cur`,
        // one step after.
        let downsampled = 0.25 * self.prev_trailing + 0.5 * y_mid + 0.25 * y_cur;
        self.prev_input = input;
        self.prev_trailing = y_cur;

        input * (1.0 - self.mix) + downsampled * self.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_is_transparent() {
        let mut s = Saturator::new();
        s.set_drive(0.0);
        for i in 0..100 {
            let x = (i as f64 * 0.01 - 0.5) * 0.2;
            assert_eq!(s.process_sample(x), x);
        }
    }

    #[test]
    fn output_stays_finite_and_bounded_for_all_modes() {
        for mode in [SaturationMode::Clean, SaturationMode::Tube, SaturationMode::Tape, SaturationMode::Transistor] {
            let mut s = Saturator::new();
            s.set_mode(mode);
            s.set_drive(1.0);
            for i in 0..1000 {
                let x = ((i as f64) * 0.37).sin() * 2.0;
                let y = s.process_sample(x);
                assert!(y.is_finite());
                assert!(y.abs() < 3.0, "mode={mode:?} y={y}");
            }
        }
    }

    #[test]
    fn reset_clears_history() {
        let mut s = Saturator::new();
        s.set_drive(0.5);
        s.process_sample(1.0);
        s.reset();
        assert_eq!(s.prev_input, 0.0);
        assert_eq!(s.prev_trailing, 0.0);
    }

    #[test]
    fn downsample_taps_are_not_degenerate() {
        // regression: the left and center taps must come from distinct
        // oversampled values, not the same `y_mid` reused twice.
        let mut s = Saturator::new();
        s.set_mode(SaturationMode::Tube);
        s.set_drive(0.8);
        let first = s.process_sample(1.0);
        let second = s.process_sample(-1.0);
        assert!(first.is_finite() && second.is_finite());
        assert_ne!(first, second);
    }
}
