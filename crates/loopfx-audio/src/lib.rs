//! loopfx-audio: cpal device bindings, the capture/render ring buffer, the
//! FFT spectrum analyzer, and the engine lifecycle state machine.
//!
//! ## Modules
//! - `ringbuffer` - SPSC stereo frame transport with underrun fade-out
//! - `analysis` - windowed-DFT spectrum analyzer for the UI thread
//! - `thread_priority` - platform real-time scheduling for the audio threads
//! - `engine` - the `Stopped -> Starting -> Running -> Stopping -> Stopped` state machine
//! - `stream` - cpal stream construction wiring capture and render callbacks

mod analysis;
mod engine;
mod ringbuffer;
mod stream;
mod thread_priority;

pub use analysis::SpectrumAnalyzer;
pub use engine::{Engine, EngineState, MeterSnapshot};
pub use ringbuffer::{Frame, StereoRingBuffer};
pub use thread_priority::{set_realtime_priority, PriorityResult};
