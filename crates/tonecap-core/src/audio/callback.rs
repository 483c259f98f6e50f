//! Real-time callback bodies shared by every stream backend
//!
//! Backends own the driver threads and timing; they hand each period's
//! buffer to [`PlaybackCallback::process`] or [`CaptureCallback::process`].
//! Both bodies only do arithmetic, buffer writes, atomic flag updates and
//! non-blocking ring pushes: no allocation, no locking, no I/O.
//!
//! Coordination with the session thread goes through [`StreamFlags`],
//! single-word atomics written with `Release` and read with `Acquire`.

use super::barrier::{BarrierRole, StartBarrier};
use super::ring::{BlockProducer, SampleBlock, MAX_BLOCK_FRAMES};
use super::waveform::{self, WaveformSpec};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic flags shared between callbacks and the session thread
#[derive(Debug, Default)]
pub struct StreamFlags {
    stop_requested: AtomicBool,
    shutting_down: AtomicBool,
    paused: AtomicBool,
    fault: AtomicBool,
    playback_complete: AtomicBool,
    capture_complete: AtomicBool,
    played_frames: AtomicU64,
    captured_frames: AtomicU64,
}

impl StreamFlags {
    /// Fresh flags with everything cleared
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to stop; idempotent
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Tell callbacks to stop producing and consuming data
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Whether teardown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Pause or resume capture
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Whether capture is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Record a driver-side fault
    pub fn raise_fault(&self) {
        self.fault.store(true, Ordering::Release);
    }

    /// Whether a driver-side fault was recorded
    pub fn has_fault(&self) -> bool {
        self.fault.load(Ordering::Acquire)
    }

    /// Whether playback emitted its last frame
    pub fn playback_complete(&self) -> bool {
        self.playback_complete.load(Ordering::Acquire)
    }

    /// Whether capture reached its frame target
    pub fn capture_complete(&self) -> bool {
        self.capture_complete.load(Ordering::Acquire)
    }

    /// Frames of tone written so far
    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Acquire)
    }

    /// Frames delivered by the input device so far, including dropped ones
    pub fn captured_frames(&self) -> u64 {
        self.captured_frames.load(Ordering::Acquire)
    }
}

/// Output-direction callback: synthesizes the tone
pub struct PlaybackCallback {
    spec: WaveformSpec,
    total_frames: u64,
    cursor: u64,
    channels: usize,
    flags: Arc<StreamFlags>,
    barrier: Option<Arc<StartBarrier>>,
    released: bool,
}

impl PlaybackCallback {
    /// Play `total_frames` frames of `spec`, then silence
    pub fn new(spec: WaveformSpec, total_frames: u64, flags: Arc<StreamFlags>) -> Self {
        Self {
            spec,
            total_frames,
            cursor: 0,
            channels: 1,
            flags,
            barrier: None,
            released: true,
        }
    }

    /// Hold output at silence until `barrier` releases
    pub fn with_barrier(mut self, barrier: Arc<StartBarrier>) -> Self {
        self.barrier = Some(barrier);
        self.released = false;
        self
    }

    /// Set the interleaved channel count of the output buffer
    ///
    /// The mono tone is written to every channel.
    pub fn bind_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1) as usize;
        self
    }

    /// Frames written so far
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Fill one interleaved output period
    pub fn process(&mut self, data: &mut [f32]) {
        if self.flags.is_shutting_down() || self.cursor >= self.total_frames {
            data.fill(0.0);
            return;
        }

        if !self.released {
            match &self.barrier {
                Some(barrier) if barrier.try_arrive(BarrierRole::Playback).is_released() => {
                    self.released = true;
                }
                _ => {
                    data.fill(0.0);
                    return;
                }
            }
        }

        for frame in data.chunks_mut(self.channels) {
            let value = if self.cursor < self.total_frames {
                let v = waveform::sample(&self.spec, self.cursor);
                self.cursor += 1;
                v
            } else {
                0.0
            };
            frame.fill(value);
        }

        self.flags.played_frames.store(self.cursor, Ordering::Release);
        if self.cursor >= self.total_frames {
            self.flags.playback_complete.store(true, Ordering::Release);
        }
    }
}

/// Input-direction callback: moves captured frames into the ring
pub struct CaptureCallback {
    producer: BlockProducer,
    total_frames: u64,
    captured: u64,
    channels: usize,
    flags: Arc<StreamFlags>,
    barrier: Option<Arc<StartBarrier>>,
    released: bool,
}

impl CaptureCallback {
    /// Capture `total_frames` frames into `producer`
    pub fn new(producer: BlockProducer, total_frames: u64, flags: Arc<StreamFlags>) -> Self {
        Self {
            producer,
            total_frames,
            captured: 0,
            channels: 1,
            flags,
            barrier: None,
            released: true,
        }
    }

    /// Discard input until `barrier` releases
    pub fn with_barrier(mut self, barrier: Arc<StartBarrier>) -> Self {
        self.barrier = Some(barrier);
        self.released = false;
        self
    }

    /// Set the interleaved channel count of the input buffer
    ///
    /// Only channel 0 is captured.
    pub fn bind_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1) as usize;
        self
    }

    /// Frames accepted so far, including ones in dropped blocks
    pub fn captured(&self) -> u64 {
        self.captured
    }

    /// Consume one interleaved input period
    pub fn process(&mut self, data: &[f32]) {
        if self.flags.is_shutting_down() || self.captured >= self.total_frames {
            return;
        }

        if !self.released {
            match &self.barrier {
                Some(barrier) if barrier.try_arrive(BarrierRole::Capture).is_released() => {
                    self.released = true;
                }
                _ => return,
            }
        }

        if self.flags.is_paused() {
            return;
        }

        let mut frames = data.chunks(self.channels).filter_map(|f| f.first().copied());
        while self.captured < self.total_frames {
            let remaining = (self.total_frames - self.captured).min(MAX_BLOCK_FRAMES as u64);
            let mut block = SampleBlock::new();
            let n = block.fill_from(&mut frames, remaining as usize);
            if n == 0 {
                break;
            }
            self.captured += n as u64;
            // A full ring drops the block; the producer counts it
            self.producer.try_push(block);
        }

        self.flags.captured_frames.store(self.captured, Ordering::Release);
        if self.captured >= self.total_frames {
            self.flags.capture_complete.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::SampleRingBuffer;
    use crate::audio::waveform::WaveformKind;

    fn flags() -> Arc<StreamFlags> {
        Arc::new(StreamFlags::new())
    }

    #[test]
    fn test_playback_writes_exact_frame_count() {
        let spec = WaveformSpec::new(WaveformKind::Sine, 440.0, 0.5, 44100);
        let f = flags();
        let mut cb = PlaybackCallback::new(spec, 1000, Arc::clone(&f));
        let mut buf = vec![0.0f32; 256];
        let mut out = Vec::new();
        for _ in 0..5 {
            cb.process(&mut buf);
            out.extend_from_slice(&buf);
        }
        assert_eq!(f.played_frames(), 1000);
        assert!(f.playback_complete());
        for (i, v) in out.iter().take(1000).enumerate() {
            assert_eq!(*v, waveform::sample(&spec, i as u64));
        }
        assert!(out[1000..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_playback_fills_every_channel() {
        let spec = WaveformSpec::new(WaveformKind::Square, 100.0, 0.3, 48000);
        let mut cb = PlaybackCallback::new(spec, 10, flags()).bind_channels(2);
        let mut buf = vec![0.0f32; 8];
        cb.process(&mut buf);
        for frame in buf.chunks(2) {
            assert_eq!(frame[0], frame[1]);
            assert_eq!(frame[0].abs(), 0.3);
        }
        assert_eq!(cb.cursor(), 4);
    }

    #[test]
    fn test_capture_takes_first_channel_in_blocks() {
        let (tx, mut rx) = SampleRingBuffer::with_capacity(8);
        let f = flags();
        let mut cb = CaptureCallback::new(tx, 6, Arc::clone(&f)).bind_channels(2);
        cb.process(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0]);
        assert_eq!(f.captured_frames(), 4);
        assert!(!f.capture_complete());
        cb.process(&[5.0, -5.0, 6.0, -6.0, 7.0, -7.0]);
        assert!(f.capture_complete());

        let mut out = Vec::new();
        rx.drain_into(&mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_capture_splits_oversized_periods() {
        let (tx, mut rx) = SampleRingBuffer::with_capacity(8);
        let mut cb = CaptureCallback::new(tx, 10_000, flags());
        let period = vec![0.1f32; MAX_BLOCK_FRAMES * 2 + 7];
        cb.process(&period);
        assert_eq!(rx.queued_blocks(), 3);
        let mut out = Vec::new();
        assert_eq!(rx.drain_into(&mut out), period.len());
    }

    #[test]
    fn test_capture_pause_discards_input() {
        let (tx, mut rx) = SampleRingBuffer::with_capacity(8);
        let f = flags();
        let mut cb = CaptureCallback::new(tx, 100, Arc::clone(&f));
        f.set_paused(true);
        cb.process(&[1.0; 16]);
        f.set_paused(false);
        cb.process(&[2.0; 16]);
        let mut out = Vec::new();
        rx.drain_into(&mut out);
        assert_eq!(out, vec![2.0; 16]);
    }

    #[test]
    fn test_shutdown_silences_both_directions() {
        let spec = WaveformSpec::new(WaveformKind::Sine, 440.0, 1.0, 44100);
        let f = flags();
        let (tx, mut rx) = SampleRingBuffer::with_capacity(4);
        let mut play = PlaybackCallback::new(spec, 1000, Arc::clone(&f));
        let mut cap = CaptureCallback::new(tx, 1000, Arc::clone(&f));
        f.begin_shutdown();

        let mut buf = vec![1.0f32; 32];
        play.process(&mut buf);
        cap.process(&[0.5; 32]);
        assert!(buf.iter().all(|&v| v == 0.0));
        assert!(rx.try_pop().is_none());
        assert_eq!(f.played_frames(), 0);
    }

    #[test]
    fn test_barrier_holds_both_until_release() {
        let spec = WaveformSpec::new(WaveformKind::Square, 440.0, 0.5, 44100);
        let f = flags();
        let barrier = Arc::new(StartBarrier::new());
        barrier.arm().unwrap();
        let (tx, mut rx) = SampleRingBuffer::with_capacity(8);
        let mut play =
            PlaybackCallback::new(spec, 1000, Arc::clone(&f)).with_barrier(Arc::clone(&barrier));
        let mut cap =
            CaptureCallback::new(tx, 1000, Arc::clone(&f)).with_barrier(Arc::clone(&barrier));

        // Playback arrives first and keeps emitting silence
        let mut buf = vec![1.0f32; 64];
        play.process(&mut buf);
        play.process(&mut buf);
        assert!(buf.iter().all(|&v| v == 0.0));
        assert_eq!(play.cursor(), 0);

        // Capture arrival releases; its first period is kept
        cap.process(&[0.25; 64]);
        assert!(barrier.is_released());
        assert_eq!(cap.captured(), 64);

        // Playback's next period starts at frame 0 of the tone
        play.process(&mut buf);
        assert_eq!(buf[0], waveform::sample(&spec, 0));
        assert_eq!(play.cursor(), 64);

        let mut out = Vec::new();
        rx.drain_into(&mut out);
        assert_eq!(out.len(), 64);
    }

    /// Duplex periods over a loopback wire until 640 frames are captured.
    /// With `capture_first` the capture side sees the previous period's output.
    fn barrier_loopback(capture_first: bool) -> (WaveformSpec, Vec<f32>) {
        let spec = WaveformSpec::new(WaveformKind::Square, 440.0, 0.5, 44100);
        let f = flags();
        let barrier = Arc::new(StartBarrier::new());
        barrier.arm().unwrap();
        let (tx, mut rx) = SampleRingBuffer::with_capacity(32);
        let mut play =
            PlaybackCallback::new(spec, 2000, Arc::clone(&f)).with_barrier(Arc::clone(&barrier));
        let mut cap =
            CaptureCallback::new(tx, 640, Arc::clone(&f)).with_barrier(Arc::clone(&barrier));

        let mut wire = vec![0.0f32; 64];
        let mut out = vec![0.0f32; 64];
        for _ in 0..16 {
            if capture_first {
                cap.process(&wire);
                play.process(&mut out);
                wire.copy_from_slice(&out);
            } else {
                play.process(&mut out);
                wire.copy_from_slice(&out);
                cap.process(&wire);
            }
        }
        assert!(barrier.is_released());

        let mut captured = Vec::new();
        rx.drain_into(&mut captured);
        assert_eq!(captured.len(), 640);
        (spec, captured)
    }

    fn first_tone_index(captured: &[f32]) -> usize {
        captured.iter().position(|v| v.abs() > 1e-3).unwrap()
    }

    #[test]
    fn test_loopback_alignment_playback_arrives_first() {
        let (spec, captured) = barrier_loopback(false);
        let first = first_tone_index(&captured);
        assert!(first <= 64, "tone first captured at {first}");
        for (i, v) in captured[first..].iter().enumerate() {
            assert_eq!(*v, waveform::sample(&spec, i as u64));
        }
    }

    #[test]
    fn test_loopback_alignment_capture_arrives_first() {
        let (spec, captured) = barrier_loopback(true);
        let first = first_tone_index(&captured);
        assert!(first <= 64, "tone first captured at {first}");
        for (i, v) in captured[first..].iter().enumerate() {
            assert_eq!(*v, waveform::sample(&spec, i as u64));
        }
    }

    #[test]
    fn test_unarmed_barrier_never_releases() {
        let spec = WaveformSpec::sine(440.0);
        let barrier = Arc::new(StartBarrier::new());
        let mut play = PlaybackCallback::new(spec, 100, flags()).with_barrier(barrier);
        let mut buf = vec![0.5f32; 16];
        play.process(&mut buf);
        assert_eq!(play.cursor(), 0);
        assert!(buf.iter().all(|&v| v == 0.0));
    }
}
