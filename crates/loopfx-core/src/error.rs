//! Engine-wide error taxonomy.

use thiserror::Error;

/// Errors the engine can report. Only `DeviceUnavailable` and a sustained run
/// of `CallbackFault` are fatal to a running stream; the rest are recorded and
/// handled in place (see each variant's doc for its handling policy).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Capture or render device could not be opened, was lost, or reported an
    /// unsupported stream format. Fatal to `start`; the engine stays Stopped.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The host audio subsystem reported a non-success status from a stream
    /// callback. Logged and counted; only a sustained run of these stops the
    /// engine (see `engine::FAULT_STOP_THRESHOLD`).
    #[error("audio callback fault: {0}")]
    CallbackFault(String),

    /// A controller-supplied parameter was outside its documented range.
    /// Never fatal: the value is clamped silently and processing continues.
    #[error("parameter '{parameter}' out of range: {value} not in [{min}, {max}]")]
    ParameterOutOfRange {
        parameter: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The ring buffer's consumer found it empty. Not an error condition in
    /// the usual sense: handled by the fade-out policy in `ringbuffer`.
    #[error("ring buffer underrun ({frames} frames)")]
    RingBufferUnderrun { frames: u64 },

    /// The ring buffer's producer found it full. The incoming frame is
    /// dropped; rare and tolerated.
    #[error("ring buffer overrun ({frames} frames)")]
    RingBufferOverrun { frames: u64 },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Clamp `value` into `[min, max]`, returning the clamped value. Use at every
/// controller-facing parameter setter so out-of-range input is absorbed
/// silently per the `ParameterOutOfRange` handling policy rather than
/// propagated as an error.
#[inline]
pub fn clamp_param(value: f64, min: f64, max: f64) -> f64 {
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_param(-100.0, -24.0, 24.0), -24.0);
        assert_eq!(clamp_param(100.0, -24.0, 24.0), 24.0);
        assert_eq!(clamp_param(3.0, -24.0, 24.0), 3.0);
    }
}
