//! cpal stream construction: wires the capture callback into the stereo
//! ring buffer and the render callback out of it, through the DSP chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;

use loopfx_core::EngineError;
use loopfx_dsp::chain::DspChain;

use crate::engine::render_block;
use crate::ringbuffer::{Frame, RingBufferConsumer, StereoRingBuffer};
use crate::thread_priority;

/// Owns the two live cpal streams. Dropping this halts both callbacks.
pub struct EngineStreams {
    _capture: Stream,
    _render: Stream,
}

fn matching_config(device: &Device, channels: u16, sample_rate: u32, is_input: bool) -> Result<SupportedStreamConfig, EngineError> {
    let target_rate = cpal::SampleRate(sample_rate);
    let configs_result = if is_input { device.supported_input_configs() } else { device.supported_output_configs() };

    let configs = configs_result.map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

    for supported in configs {
        if supported.channels() >= channels
            && supported.min_sample_rate() <= target_rate
            && supported.max_sample_rate() >= target_rate
            && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(target_rate));
        }
    }

    Err(EngineError::DeviceUnavailable(format!(
        "no {} channel F32 config at {} Hz",
        if is_input { "input" } else { "output" },
        sample_rate
    )))
}

/// Builds and starts the capture and render streams. The capture callback
/// deinterleaves host frames and pushes them into `ring` (fixing the
/// discarded-consumer mistake a naive rtrb wiring invites: the producer half
/// must feed the exact queue the render callback drains); the render
/// callback pops from `ring`, runs the DSP chain under a brief per-block
/// lock, writes the host's output region, and mirrors the monoized output
/// into `spectrum_ring` for the analyzer.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_streams(
    capture_device: &Device,
    render_device: &Device,
    sample_rate: u32,
    buffer_size_hint: usize,
    ring: Arc<StereoRingBuffer>,
    spectrum_ring: Arc<StereoRingBuffer>,
    chain: Arc<Mutex<DspChain>>,
    fault_count: Arc<AtomicU64>,
) -> Result<EngineStreams, EngineError> {
    let capture_config = matching_config(capture_device, 2, sample_rate, true)?;
    let capture_stream_config = StreamConfig {
        channels: capture_config.channels(),
        sample_rate: capture_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size_hint as u32),
    };
    let capture_channels = capture_stream_config.channels as usize;

    let capture_ring = Arc::clone(&ring);
    let capture_fault_count = Arc::clone(&fault_count);
    let capture = capture_device
        .build_input_stream(
            &capture_stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                thread_priority::set_realtime_priority();
                for frame in data.chunks(capture_channels) {
                    let left = frame[0];
                    let right = if frame.len() > 1 { frame[1] } else { left };
                    capture_ring.push(Frame::new(left, right));
                }
            },
            move |err| {
                log::error!("capture stream error: {err}");
                capture_fault_count.fetch_add(1, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

    let render_config = matching_config(render_device, 2, sample_rate, false)?;
    let render_stream_config = StreamConfig {
        channels: render_config.channels(),
        sample_rate: render_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size_hint as u32),
    };
    let render_channels = render_stream_config.channels as usize;

    let mut render_consumer = RingBufferConsumer::new(Arc::clone(&ring));
    let render_fault_count = Arc::clone(&fault_count);
    let render = render_device
        .build_output_stream(
            &render_stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                thread_priority::set_realtime_priority();
                let mut guard = chain.lock();
                render_block(&mut guard, &mut render_consumer, data, render_channels);
                drop(guard);

                for frame in data.chunks(render_channels) {
                    let l = frame[0] as f64;
                    let r = if frame.len() > 1 { frame[1] as f64 } else { l };
                    let mono = ((l + r) * 0.5) as f32;
                    spectrum_ring.push(Frame::new(mono, mono));
                }
            },
            move |err| {
                log::error!("render stream error: {err}");
                render_fault_count.fetch_add(1, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

    capture.play().map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;
    render.play().map_err(|e| EngineError::DeviceUnavailable(e.to_string()))?;

    Ok(EngineStreams { _capture: capture, _render: render })
}
