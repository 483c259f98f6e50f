//! Virtual duplex device for tests and hardware-free runs
//!
//! Each started stream gets a worker thread that calls the stream's
//! callback once per block period, standing in for the driver thread.
//! Time can be compressed, and faults can be injected per direction:
//! failing to open, faulting after a number of frames, or never
//! delivering a callback at all.
//!
//! In loopback mode the output worker drives both directions like a
//! duplex driver: each period the input callback receives what the output
//! callback wrote. If input runs first in a period it sees the previous
//! period's output.

use super::callback::{CaptureCallback, PlaybackCallback};
use super::engine::{
    AudioBackend, Direction, EngineError, FaultReporter, StreamHandle, StreamSettings,
};
use super::waveform::{self, WaveformSpec};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default frames per simulated callback
const DEFAULT_BLOCK_FRAMES: usize = 512;

type Tick = Box<dyn FnMut(&mut [f32]) + Send>;

/// Input callback parked by a loopback input stream until the output
/// worker feeds it
#[derive(Default)]
struct LoopbackLink {
    input: Mutex<Option<Tick>>,
}

impl LoopbackLink {
    fn park(&self, tick: Tick) {
        if let Ok(mut slot) = self.input.lock() {
            *slot = Some(tick);
        }
    }

    fn unpark(&self) -> Option<Tick> {
        self.input.lock().ok().and_then(|mut slot| slot.take())
    }

    fn feed(&self, buf: &mut [f32]) {
        if let Ok(mut slot) = self.input.lock() {
            if let Some(tick) = slot.as_mut() {
                tick(buf);
            }
        }
    }
}

impl fmt::Debug for LoopbackLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackLink").finish_non_exhaustive()
    }
}

/// Role of a stream in loopback mode
enum Duplex {
    Off,
    /// Input stream whose callback runs on the output worker
    Follower(Arc<LoopbackLink>),
    /// Output stream driving the parked input callback
    Driver {
        link: Arc<LoopbackLink>,
        input_first: bool,
    },
}

/// Simulated audio backend
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    block_frames: usize,
    channels: u16,
    time_scale: f64,
    fail_open: Option<Direction>,
    fault_after: Option<(Direction, u64)>,
    stalled: Option<Direction>,
    input_signal: Option<WaveformSpec>,
    loopback: Option<Direction>,
    link: Arc<LoopbackLink>,
    open_streams: Arc<AtomicUsize>,
}

impl SimulatedBackend {
    /// Real-time mono device with 512-frame callbacks and a silent input
    pub fn new() -> Self {
        Self {
            block_frames: DEFAULT_BLOCK_FRAMES,
            channels: 1,
            time_scale: 1.0,
            fail_open: None,
            fault_after: None,
            stalled: None,
            input_signal: None,
            loopback: None,
            link: Arc::new(LoopbackLink::default()),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Frames per callback
    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    /// Interleaved channel count of both directions
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Run `scale` times faster than real time
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale.max(1e-3);
        self
    }

    /// Feed `signal` into the input direction instead of silence
    pub fn with_input_signal(mut self, signal: WaveformSpec) -> Self {
        self.input_signal = Some(signal);
        self
    }

    /// Route output back into input, running `first`'s callback first in
    /// every period
    ///
    /// Only the output stream has a worker in this mode, so an input stream
    /// without an output stream never receives a callback.
    pub fn with_loopback(mut self, first: Direction) -> Self {
        self.loopback = Some(first);
        self
    }

    /// Make opening `direction` fail as if the device were busy
    pub fn failing_open(mut self, direction: Direction) -> Self {
        self.fail_open = Some(direction);
        self
    }

    /// Report a fault on `direction` once `frames` frames were delivered
    pub fn fault_after(mut self, direction: Direction, frames: u64) -> Self {
        self.fault_after = Some((direction, frames));
        self
    }

    /// Open and start `direction` normally but never call its callback
    pub fn stalled(mut self, direction: Direction) -> Self {
        self.stalled = Some(direction);
        self
    }

    /// Shared counter of streams opened and not yet closed
    pub fn open_stream_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.open_streams)
    }

    /// Streams currently open
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn open(
        &self,
        direction: Direction,
        settings: &StreamSettings,
        tick: Tick,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        if self.fail_open == Some(direction) {
            return Err(EngineError::OpenFailed {
                direction,
                reason: "simulated device busy".to_string(),
            });
        }

        let block_frames = settings
            .block_frames
            .map(|f| f as usize)
            .unwrap_or(self.block_frames)
            .max(1);
        let period = Duration::from_secs_f64(
            block_frames as f64 / settings.sample_rate.max(1) as f64 / self.time_scale,
        );

        let duplex = match (self.loopback, direction) {
            (None, _) => Duplex::Off,
            (Some(_), Direction::Input) => Duplex::Follower(Arc::clone(&self.link)),
            (Some(first), Direction::Output) => Duplex::Driver {
                link: Arc::clone(&self.link),
                input_first: first == Direction::Input,
            },
        };

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%direction, block_frames, ?period, "Simulated stream opened");

        Ok(Box::new(SimulatedStream {
            direction,
            tick: Some(tick),
            buffer_len: block_frames * self.channels as usize,
            block_frames: block_frames as u64,
            period,
            fault_after: self
                .fault_after
                .filter(|(d, _)| *d == direction)
                .map(|(_, frames)| frames),
            stalled: self.stalled == Some(direction),
            duplex,
            faults,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            open_streams: Arc::clone(&self.open_streams),
            closed: false,
        }))
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open_output(
        &self,
        settings: &StreamSettings,
        callback: PlaybackCallback,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        let mut callback = callback.bind_channels(self.channels);
        let tick: Tick = Box::new(move |buf: &mut [f32]| callback.process(buf));
        self.open(Direction::Output, settings, tick, faults)
    }

    fn open_input(
        &self,
        settings: &StreamSettings,
        callback: CaptureCallback,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        let mut callback = callback.bind_channels(self.channels);
        if self.loopback.is_some() {
            let tick: Tick = Box::new(move |buf: &mut [f32]| callback.process(buf));
            return self.open(Direction::Input, settings, tick, faults);
        }
        let channels = self.channels as usize;
        let signal = self.input_signal;
        let mut cursor = 0u64;
        let tick: Tick = Box::new(move |buf: &mut [f32]| {
            for frame in buf.chunks_mut(channels) {
                let value = signal.map_or(0.0, |s| waveform::sample(&s, cursor));
                frame.fill(value);
                cursor += 1;
            }
            callback.process(buf);
        });
        self.open(Direction::Input, settings, tick, faults)
    }
}

struct SimulatedStream {
    direction: Direction,
    tick: Option<Tick>,
    buffer_len: usize,
    block_frames: u64,
    period: Duration,
    fault_after: Option<u64>,
    stalled: bool,
    duplex: Duplex,
    faults: FaultReporter,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    open_streams: Arc<AtomicUsize>,
    closed: bool,
}

impl StreamHandle for SimulatedStream {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::StartFailed {
                direction: self.direction,
                reason: "stream already closed".to_string(),
            });
        }
        if self.stalled || self.worker.is_some() {
            return Ok(());
        }
        let Some(mut tick) = self.tick.take() else {
            return Ok(());
        };
        let loopback = match &self.duplex {
            Duplex::Off => None,
            Duplex::Follower(link) => {
                link.park(tick);
                return Ok(());
            }
            Duplex::Driver { link, input_first } => Some((Arc::clone(link), *input_first)),
        };

        let direction = self.direction;
        let stop = Arc::clone(&self.stop);
        let faults = self.faults.clone();
        let period = self.period;
        let block_frames = self.block_frames;
        let fault_after = self.fault_after;
        let mut buffer = vec![0.0f32; self.buffer_len];
        let mut wire = vec![0.0f32; self.buffer_len];
        let mut scratch = vec![0.0f32; self.buffer_len];

        let worker = std::thread::Builder::new()
            .name(format!("sim-{}", direction))
            .spawn(move || {
                let mut delivered = 0u64;
                let mut next = Instant::now();
                while !stop.load(Ordering::Acquire) {
                    if let Some((link, true)) = &loopback {
                        scratch.copy_from_slice(&wire);
                        link.feed(&mut scratch);
                    }
                    tick(&mut buffer);
                    if let Some((link, input_first)) = &loopback {
                        wire.copy_from_slice(&buffer);
                        if !input_first {
                            scratch.copy_from_slice(&wire);
                            link.feed(&mut scratch);
                        }
                    }
                    delivered += block_frames;

                    if fault_after.is_some_and(|limit| delivered >= limit) {
                        faults.report(direction, "simulated device disconnected");
                        break;
                    }

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    }
                }
            })
            .map_err(|e| EngineError::StartFailed {
                direction,
                reason: e.to_string(),
            })?;

        self.worker = Some(worker);
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.tick = None;
        if let Duplex::Follower(link) = &self.duplex {
            drop(link.unpark());
        }
        if !self.closed {
            self.closed = true;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(direction = %self.direction, "Simulated stream closed");
        }
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::callback::StreamFlags;
    use crate::audio::ring::SampleRingBuffer;
    use crate::audio::waveform::WaveformKind;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_output_stream_plays_to_completion() {
        let backend = SimulatedBackend::new().with_time_scale(50.0);
        let flags = Arc::new(StreamFlags::new());
        let (faults, _rx) = FaultReporter::new(Arc::clone(&flags));
        let cb = PlaybackCallback::new(WaveformSpec::sine(440.0), 4410, Arc::clone(&flags));

        let mut stream = backend
            .open_output(&StreamSettings::new(44100), cb, faults)
            .unwrap();
        assert_eq!(stream.direction(), Direction::Output);
        stream.start().unwrap();
        assert!(wait_until(|| flags.playback_complete()));
        assert_eq!(flags.played_frames(), 4410);
        stream.close();
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_input_signal_reaches_capture() {
        let signal = WaveformSpec::new(WaveformKind::Square, 100.0, 0.25, 48000);
        let backend = SimulatedBackend::new()
            .with_time_scale(50.0)
            .with_channels(2)
            .with_input_signal(signal);
        let flags = Arc::new(StreamFlags::new());
        let (faults, _rx) = FaultReporter::new(Arc::clone(&flags));
        let (tx, mut rx) = SampleRingBuffer::with_capacity(64);
        let cb = CaptureCallback::new(tx, 2000, Arc::clone(&flags));

        let mut stream = backend
            .open_input(&StreamSettings::new(48000), cb, faults)
            .unwrap();
        stream.start().unwrap();
        assert!(wait_until(|| flags.capture_complete()));
        stream.close();

        let mut out = Vec::new();
        rx.drain_into(&mut out);
        assert_eq!(out.len(), 2000);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, waveform::sample(&signal, i as u64));
        }
    }

    fn loopback_capture(first: Direction) -> (WaveformSpec, Vec<f32>) {
        let spec = WaveformSpec::new(WaveformKind::Square, 441.0, 0.5, 44100);
        let backend = SimulatedBackend::new()
            .with_time_scale(50.0)
            .with_block_frames(256)
            .with_loopback(first);
        let flags = Arc::new(StreamFlags::new());
        let (faults, _rx) = FaultReporter::new(Arc::clone(&flags));
        let (tx, mut rx) = SampleRingBuffer::with_capacity(64);
        let settings = StreamSettings::new(44100);

        let cap = CaptureCallback::new(tx, 2048, Arc::clone(&flags));
        let mut input = backend.open_input(&settings, cap, faults.clone()).unwrap();
        let play = PlaybackCallback::new(spec, 4096, Arc::clone(&flags));
        let mut output = backend.open_output(&settings, play, faults).unwrap();
        input.start().unwrap();
        output.start().unwrap();
        assert!(wait_until(|| flags.capture_complete()));
        output.close();
        input.close();
        assert_eq!(backend.open_streams(), 0);

        let mut out = Vec::new();
        rx.drain_into(&mut out);
        (spec, out)
    }

    #[test]
    fn test_loopback_output_first_has_no_latency() {
        let (spec, out) = loopback_capture(Direction::Output);
        assert_eq!(out.len(), 2048);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, waveform::sample(&spec, i as u64));
        }
    }

    #[test]
    fn test_loopback_input_first_lags_one_period() {
        let (spec, out) = loopback_capture(Direction::Input);
        assert_eq!(out.len(), 2048);
        assert!(out[..256].iter().all(|&v| v == 0.0));
        for (i, v) in out[256..].iter().enumerate() {
            assert_eq!(*v, waveform::sample(&spec, i as u64));
        }
    }

    #[test]
    fn test_failing_open_leaves_nothing_open() {
        let backend = SimulatedBackend::new().failing_open(Direction::Input);
        let flags = Arc::new(StreamFlags::new());
        let (faults, _rx) = FaultReporter::new(Arc::clone(&flags));
        let (tx, _rx2) = SampleRingBuffer::with_capacity(4);
        let cb = CaptureCallback::new(tx, 10, flags);
        let err = backend
            .open_input(&StreamSettings::new(44100), cb, faults)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::OpenFailed { direction: Direction::Input, .. }));
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_fault_injection_reports_once() {
        let backend = SimulatedBackend::new()
            .with_time_scale(50.0)
            .fault_after(Direction::Output, 1024);
        let flags = Arc::new(StreamFlags::new());
        let (faults, rx) = FaultReporter::new(Arc::clone(&flags));
        let cb = PlaybackCallback::new(WaveformSpec::sine(440.0), 44100, Arc::clone(&flags));

        let mut stream = backend
            .open_output(&StreamSettings::new(44100), cb, faults)
            .unwrap();
        stream.start().unwrap();
        let fault = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(fault.direction, Direction::Output);
        assert!(flags.has_fault());
        stream.close();
        assert_eq!(flags.played_frames(), 1024);
    }

    #[test]
    fn test_stalled_stream_never_calls_back() {
        let backend = SimulatedBackend::new().stalled(Direction::Output);
        let flags = Arc::new(StreamFlags::new());
        let (faults, _rx) = FaultReporter::new(Arc::clone(&flags));
        let cb = PlaybackCallback::new(WaveformSpec::sine(440.0), 100, Arc::clone(&flags));
        let mut stream = backend
            .open_output(&StreamSettings::new(44100), cb, faults)
            .unwrap();
        stream.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(flags.played_frames(), 0);
        drop(stream);
        assert_eq!(backend.open_streams(), 0);
    }
}
