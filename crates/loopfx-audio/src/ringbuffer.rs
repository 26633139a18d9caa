//! SPSC stereo frame transport between the capture and render callbacks.
//!
//! Wait-free for both producer and consumer. Cache-line padded to prevent
//! false sharing between the write index (producer-owned) and the read index
//! (consumer-owned).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// One interleaved stereo sample pair at the host's native `f32` width. The
/// ring buffer transports this width directly; conversion to the `f64` DSP
/// domain happens once, in the render callback, after `pop`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub const fn silence() -> Self {
        Self { left: 0.0, right: 0.0 }
    }
}

const FADE_SAMPLES: u32 = 64;

/// Consumer-private underrun fade state: holds the last valid frame and a
/// fade counter. While the counter is within `FADE_SAMPLES` the consumer
/// emits `lastValid * (1-p)^2` with `p = counter/FADE_SAMPLES`; beyond that,
/// silence. Reset by the controller via a test-and-clear flag so it can ask
/// the consumer to drop stale fade state without touching it directly.
struct UnderrunFadeState {
    last_valid: Frame,
    counter: u32,
}

impl UnderrunFadeState {
    fn new() -> Self {
        Self { last_valid: Frame::silence(), counter: 0 }
    }

    #[inline]
    fn on_pop(&mut self, frame: Frame) {
        self.last_valid = frame;
        self.counter = 0;
    }

    #[inline]
    fn on_underrun(&mut self) -> Frame {
        if self.counter >= FADE_SAMPLES {
            return Frame::silence();
        }
        let p = self.counter as f64 / FADE_SAMPLES as f64;
        let envelope = (1.0 - p) * (1.0 - p);
        self.counter += 1;
        Frame::new((self.last_valid.left as f64 * envelope) as f32, (self.last_valid.right as f64 * envelope) as f32)
    }

    fn reset(&mut self) {
        self.last_valid = Frame::silence();
        self.counter = 0;
    }
}

/// Single-producer/single-consumer, power-of-two, lock-free queue of stereo
/// frames with explicit underrun handling. Exactly one producer thread (the
/// capture callback) and one consumer thread (the render callback).
#[repr(align(64))]
pub struct StereoRingBuffer {
    buffer: Box<[std::cell::UnsafeCell<Frame>]>,
    mask: usize,
    write_pos: AtomicUsize,
    _pad_write: [u8; 56],
    read_pos: AtomicUsize,
    _pad_read: [u8; 56],
    underrun_count: AtomicU64,
    overrun_count: AtomicU64,
    reset_fade_requested: AtomicBool,
}

// SAFETY: `buffer` cells are only ever written by the single producer thread
// and read by the single consumer thread, each at its own index range, as
// serialized by the acquire/release handoff on `write_pos`/`read_pos`.
unsafe impl Sync for StereoRingBuffer {}

impl StereoRingBuffer {
    /// `min_capacity` is rounded up to a power of two; one slot is always
    /// kept empty to disambiguate full from empty, so effective capacity is
    /// `capacity - 1` frames.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(2).next_power_of_two();
        let buffer = (0..capacity).map(|_| std::cell::UnsafeCell::new(Frame::silence())).collect();
        Self {
            buffer,
            mask: capacity - 1,
            write_pos: AtomicUsize::new(0),
            _pad_write: [0; 56],
            read_pos: AtomicUsize::new(0),
            _pad_read: [0; 56],
            underrun_count: AtomicU64::new(0),
            overrun_count: AtomicU64::new(0),
            reset_fade_requested: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Producer-only. Returns `false` (and increments the overrun counter)
    /// if the buffer is full; the caller drops the frame.
    #[inline]
    pub fn push(&self, frame: Frame) -> bool {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);

        if write.wrapping_sub(read) >= self.mask {
            self.overrun_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let idx = write & self.mask;
        // SAFETY: only the producer writes, and this slot is not in the
        // consumer's visible range until the release store below.
        unsafe {
            *self.buffer[idx].get() = frame;
        }
        self.write_pos.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Consumer-only. Returns `None` (incrementing the underrun counter) if
    /// the buffer is empty.
    #[inline]
    fn pop_raw(&self) -> Option<Frame> {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);

        if read == write {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let idx = read & self.mask;
        // SAFETY: the acquire load above ensures the producer's write to
        // this slot happened-before this read.
        let frame = unsafe { *self.buffer[idx].get() };
        self.read_pos.store(read.wrapping_add(1), Ordering::Release);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn available_space(&self) -> usize {
        self.mask - self.len()
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    /// Called only when the stream is stopped: resets both indices and asks
    /// the consumer's fade state to clear on its next pop.
    pub fn clear(&self) {
        let write = self.write_pos.load(Ordering::Relaxed);
        self.read_pos.store(write, Ordering::Release);
        self.reset_fade_requested.store(true, Ordering::Release);
    }
}

/// Consumer-side wrapper pairing a `StereoRingBuffer` with its private fade
/// state. Owned exclusively by the render callback; holds the ring by `Arc`
/// so it can be moved into a callback closure and outlive any single
/// invocation — the fade counter must persist across callback calls, not
/// reset on every one.
pub struct RingBufferConsumer {
    ring: std::sync::Arc<StereoRingBuffer>,
    fade: UnderrunFadeState,
}

impl RingBufferConsumer {
    pub fn new(ring: std::sync::Arc<StereoRingBuffer>) -> Self {
        Self { ring, fade: UnderrunFadeState::new() }
    }

    /// Pop one frame, substituting the quadratic fade-out on underrun.
    #[inline]
    pub fn pop(&mut self) -> Frame {
        if self.ring.reset_fade_requested.swap(false, Ordering::Acquire) {
            self.fade.reset();
        }
        match self.ring.pop_raw() {
            Some(frame) => {
                self.fade.on_pop(frame);
                frame
            }
            None => self.fade.on_underrun(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip_in_order() {
        let ring = std::sync::Arc::new(StereoRingBuffer::new(8));
        for i in 0..5 {
            assert!(ring.push(Frame::new(i as f32, -(i as f32))));
        }
        let mut consumer = RingBufferConsumer::new(std::sync::Arc::clone(&ring));
        for i in 0..5 {
            let frame = consumer.pop();
            assert_eq!(frame, Frame::new(i as f32, -(i as f32)));
        }
    }

    #[test]
    fn overrun_increments_counter_and_drops_frame() {
        let ring = StereoRingBuffer::new(4);
        let mut pushed = 0;
        for i in 0..10 {
            if ring.push(Frame::new(i as f32, i as f32)) {
                pushed += 1;
            }
        }
        assert!(pushed < 10);
        assert!(ring.overrun_count() > 0);
    }

    #[test]
    fn underrun_fade_is_monotonically_non_increasing_quadratic_then_silent() {
        let ring = std::sync::Arc::new(StereoRingBuffer::new(128));
        ring.push(Frame::new(1.0, 1.0));
        let mut consumer = RingBufferConsumer::new(std::sync::Arc::clone(&ring));

        let first = consumer.pop();
        assert_eq!(first, Frame::new(1.0, 1.0));

        let mut prev_mag = 1.0f32;
        for i in 0..FADE_SAMPLES {
            let frame = consumer.pop();
            assert!(frame.left.abs() <= prev_mag + 1e-6, "fade not monotone at {i}");
            prev_mag = frame.left.abs();
        }

        for _ in 0..10 {
            let frame = consumer.pop();
            assert_eq!(frame, Frame::silence());
        }
    }

    #[test]
    fn clear_resets_indices_and_requests_fade_reset() {
        let ring = std::sync::Arc::new(StereoRingBuffer::new(8));
        ring.push(Frame::new(1.0, 1.0));
        ring.push(Frame::new(2.0, 2.0));
        ring.clear();
        assert_eq!(ring.len(), 0);

        let mut consumer = RingBufferConsumer::new(std::sync::Arc::clone(&ring));
        consumer.fade.last_valid = Frame::new(5.0, 5.0);
        consumer.fade.counter = 10;
        let frame = consumer.pop();
        // fade state was cleared before this pop observed the underrun
        assert_eq!(frame, Frame::silence());
    }
}
