//! The engine lifecycle state machine: `Stopped -> Starting -> Running ->
//! Stopping -> Stopped`. Owns the ring buffers, the DSP chain, and the
//! spectrum analyzer tap; hands capture/render callbacks to `stream`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use loopfx_core::{EngineError, EngineResult, SampleRate};
use loopfx_dsp::chain::DspChain;

use crate::analysis::SpectrumAnalyzer;
use crate::ringbuffer::{Frame, RingBufferConsumer, StereoRingBuffer};
use crate::thread_priority;

/// Bootstrap configuration the host process supplies at construction. Not a
/// persisted preset format — just the values a real engine needs before it
/// can open a device.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub buffer_size_hint: usize,
    pub ring_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { sample_rate: 48_000, buffer_size_hint: 512, ring_capacity: 4_096 }
    }
}

impl EngineConfig {
    pub fn validated_sample_rate(&self) -> EngineResult<SampleRate> {
        SampleRate::new(self.sample_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::Stopping,
            _ => EngineState::Stopped,
        }
    }
}

/// Four peak scalars plus the ring buffer's underrun/overrun counters,
/// refreshed at the UI's own cadence. Stale reads are acceptable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeterSnapshot {
    pub input_peak_l: f64,
    pub input_peak_r: f64,
    pub output_peak_l: f64,
    pub output_peak_r: f64,
    pub underrun_count: u64,
    pub overrun_count: u64,
}

/// Central hub: the capture/render ring buffer, the DSP chain, and the
/// analyzer tap, plus the lifecycle state machine that owns them.
pub struct Engine {
    config: EngineConfig,
    state: AtomicU8,
    fault_count: AtomicU64,
    chain: Arc<Mutex<DspChain>>,
    ring: Arc<StereoRingBuffer>,
    spectrum_ring: Arc<StereoRingBuffer>,
    analyzer: Arc<Mutex<SpectrumAnalyzer>>,
    streams: Option<crate::stream::EngineStreams>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let sample_rate = config.validated_sample_rate()?;
        Ok(Self {
            config,
            state: AtomicU8::new(EngineState::Stopped as u8),
            fault_count: AtomicU64::new(0),
            chain: Arc::new(Mutex::new(DspChain::new(sample_rate.as_f64()))),
            ring: Arc::new(StereoRingBuffer::new(config.ring_capacity)),
            spectrum_ring: Arc::new(StereoRingBuffer::new(config.ring_capacity)),
            analyzer: Arc::new(Mutex::new(SpectrumAnalyzer::new())),
            streams: None,
        })
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn chain(&self) -> &Arc<Mutex<DspChain>> {
        &self.chain
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Resolves devices, installs both callbacks, and starts them. Rolls
    /// back to `Stopped` on any failure; never leaves the engine `Starting`.
    pub fn start(&mut self, capture_device: &cpal::Device, render_device: &cpal::Device) -> EngineResult<()> {
        if self.state() != EngineState::Stopped {
            return Ok(());
        }
        self.set_state(EngineState::Starting);
        log::info!("engine starting");

        let sample_rate = match self.config.validated_sample_rate() {
            Ok(rate) => rate,
            Err(err) => {
                self.set_state(EngineState::Stopped);
                return Err(err);
            }
        };

        {
            let mut chain = self.chain.lock();
            chain.set_sample_rate(sample_rate.as_f64());
            chain.reset();
        }
        self.ring.clear();
        self.spectrum_ring.clear();
        self.analyzer.lock().reset();

        let build_result = crate::stream::build_streams(
            capture_device,
            render_device,
            sample_rate.as_u32(),
            self.config.buffer_size_hint,
            Arc::clone(&self.ring),
            Arc::clone(&self.spectrum_ring),
            Arc::clone(&self.chain),
            Arc::clone(&self.fault_count),
        );

        match build_result {
            Ok(streams) => {
                self.streams = Some(streams);
                self.set_state(EngineState::Running);
                log::info!("engine running at {} Hz", sample_rate.as_u32());
                Ok(())
            }
            Err(err) => {
                log::error!("engine failed to start: {err}");
                self.set_state(EngineState::Stopped);
                Err(err)
            }
        }
    }

    /// Halts both callbacks, disposes the streams, clears the ring buffer
    /// and resets effect state. Always succeeds.
    pub fn stop(&mut self) -> EngineResult<()> {
        if self.state() != EngineState::Running {
            return Ok(());
        }
        self.set_state(EngineState::Stopping);
        log::info!("engine stopping");

        self.streams = None; // dropping halts the cpal streams
        self.ring.clear();
        self.chain.lock().reset();

        self.set_state(EngineState::Stopped);
        log::info!("engine stopped");
        Ok(())
    }

    pub fn restart(&mut self, capture_device: &cpal::Device, render_device: &cpal::Device) -> EngineResult<()> {
        self.stop()?;
        self.start(capture_device, render_device)
    }

    pub fn meters(&self) -> MeterSnapshot {
        let chain = self.chain.lock();
        let (in_l, in_r) = chain.input_peaks();
        let (out_l, out_r) = chain.output_peaks();
        MeterSnapshot {
            input_peak_l: in_l,
            input_peak_r: in_r,
            output_peak_l: out_l,
            output_peak_r: out_r,
            underrun_count: self.ring.underrun_count(),
            overrun_count: self.ring.overrun_count(),
        }
    }

    pub fn fault_count(&self) -> u64 {
        self.fault_count.load(Ordering::Relaxed)
    }

    /// Drains whatever the render callback has mirrored into the analyzer
    /// tap since the last call, runs the windowed DFT, and returns the
    /// smoothed dB magnitude vector. Called from the UI thread at ~60 Hz.
    pub fn poll_spectrum(&self) -> Vec<f64> {
        let mut mono = Vec::with_capacity(self.spectrum_ring.len());
        let mut consumer = RingBufferConsumer::new(Arc::clone(&self.spectrum_ring));
        while !self.spectrum_ring.is_empty() {
            mono.push(consumer.pop().left as f64);
        }

        let mut analyzer = self.analyzer.lock();
        if !mono.is_empty() {
            analyzer.push_samples(&mono);
            analyzer.analyze();
        }
        analyzer.magnitudes_db().to_vec()
    }

    /// Records a callback fault. Repeated faults transition the engine to
    /// `Stopped`; a single fault is only logged. Called from the non-audio
    /// thread that observes the cpal error callback.
    pub fn record_callback_fault(&mut self, message: &str) {
        let count = self.fault_count.fetch_add(1, Ordering::Relaxed) + 1;
        log::error!("audio callback fault ({count}): {message}");
        const FAULT_THRESHOLD: u64 = 8;
        if count >= FAULT_THRESHOLD && self.state() == EngineState::Running {
            log::error!("repeated callback faults, stopping engine");
            let _ = self.stop();
        }
    }
}

/// Drains frames from the ring buffer into an interleaved output block,
/// running each through the DSP chain. Called from the render callback.
pub(crate) fn render_block(chain: &mut DspChain, consumer: &mut RingBufferConsumer, output: &mut [f32], channels: usize) {
    thread_priority::set_realtime_priority();
    let frames = output.len() / channels;
    for i in 0..frames {
        let frame: Frame = consumer.pop();
        let stereo = loopfx_core::StereoSample::new(frame.left as f64, frame.right as f64);
        let processed = chain.process(stereo);
        match channels {
            1 => {
                output[i] = ((processed.left + processed.right) * 0.5) as f32;
            }
            _ => {
                output[i * channels] = processed.left as f32;
                output[i * channels + 1] = processed.right as f32;
                for extra in output[i * channels + 2..(i + 1) * channels].iter_mut() {
                    *extra = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn rejects_invalid_sample_rate() {
        let config = EngineConfig { sample_rate: 1, ..EngineConfig::default() };
        assert!(Engine::new(config).is_err());
    }

    #[test]
    fn fault_threshold_stops_running_engine() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.set_state(EngineState::Running);
        for _ in 0..8 {
            engine.record_callback_fault("synthetic");
        }
        assert_eq!(engine.state(), EngineState::Stopped);
    }
}
