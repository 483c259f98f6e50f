//! Recording sessions: one logical play, record, or play-and-record operation
//!
//! A session validates its parameters, opens the needed streams through a
//! [`StreamEngine`], waits for the start barrier in combined mode, polls the
//! callbacks' completion flags on a bounded interval, drains the capture ring,
//! and always tears the streams down before producing its [`SessionResult`].
//!
//! ## States
//!
//! `Created → Starting → Running → Draining → Completed`, with `Failed`
//! reachable from every non-terminal state. The current state is readable
//! from any thread through [`SessionControl::state`].

pub mod error;
pub mod live;
pub mod result;

pub use error::SessionError;
pub use live::LiveSnapshot;
pub use result::{CaptureExport, SessionEvent, SessionResult, SessionStatus};

use crate::audio::barrier::StartBarrier;
use crate::audio::callback::{CaptureCallback, PlaybackCallback, StreamFlags};
use crate::audio::engine::{AudioBackend, FaultReporter, StreamEngine, StreamFault, StreamSettings};
use crate::audio::ring::{BlockConsumer, BlockProducer, SampleRingBuffer};
use crate::audio::waveform::WaveformSpec;
use crate::config::EngineConfig;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Longest accepted play or record duration (24 hours)
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Upper bound on capture pre-allocation (10 minutes at 48 kHz)
const MAX_PREALLOC_SAMPLES: u64 = 48_000 * 600;

/// What a session does with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Emit the tone only
    PlayOnly,
    /// Capture only
    RecordOnly,
    /// Emit the tone and capture, start-aligned
    PlayAndRecord,
}

impl SessionMode {
    /// Whether an output stream is needed
    pub fn plays(&self) -> bool {
        matches!(self, SessionMode::PlayOnly | SessionMode::PlayAndRecord)
    }

    /// Whether an input stream is needed
    pub fn records(&self) -> bool {
        matches!(self, SessionMode::RecordOnly | SessionMode::PlayAndRecord)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::PlayOnly => f.write_str("play"),
            SessionMode::RecordOnly => f.write_str("record"),
            SessionMode::PlayAndRecord => f.write_str("play+record"),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Parameters validated, nothing opened
    Created = 0,
    /// Opening and starting streams
    Starting = 1,
    /// Streams active
    Running = 2,
    /// Streams stopped, collecting remaining samples
    Draining = 3,
    /// Finished (terminal)
    Completed = 4,
    /// Ended by an error (terminal)
    Failed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::Starting,
            2 => SessionState::Running,
            3 => SessionState::Draining,
            4 => SessionState::Completed,
            _ => SessionState::Failed,
        }
    }

    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Parameters of one session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Tone to play (its sample rate also drives capture)
    pub spec: WaveformSpec,
    /// Play duration, or capture duration in record-only mode
    pub duration_secs: f64,
    /// Operating mode
    pub mode: SessionMode,
    /// Combined mode capture duration; defaults to play duration plus the configured tail
    #[serde(default)]
    pub record_duration_secs: Option<f64>,
}

impl SessionRequest {
    /// Request `mode` for `duration_secs` with tone `spec`
    pub fn new(spec: WaveformSpec, duration_secs: f64, mode: SessionMode) -> Self {
        Self {
            spec,
            duration_secs,
            mode,
            record_duration_secs: None,
        }
    }

    /// Set an explicit combined mode capture duration
    pub fn with_record_duration(mut self, secs: f64) -> Self {
        self.record_duration_secs = Some(secs);
        self
    }

    /// Check every parameter before any hardware is touched
    pub fn validate(&self) -> Result<(), SessionError> {
        let spec = &self.spec;
        if !spec.frequency_hz.is_finite() || spec.frequency_hz <= 0.0 {
            return Err(SessionError::InvalidParameter(format!(
                "frequency must be positive, got {}",
                spec.frequency_hz
            )));
        }
        if !(0.0..=1.0).contains(&spec.amplitude) {
            return Err(SessionError::InvalidParameter(format!(
                "amplitude must be within [0, 1], got {}",
                spec.amplitude
            )));
        }
        if spec.sample_rate == 0 {
            return Err(SessionError::InvalidParameter(
                "sample rate must be positive".to_string(),
            ));
        }
        check_duration("duration", self.duration_secs, spec.sample_rate)?;
        if let Some(secs) = self.record_duration_secs {
            check_duration("record duration", secs, spec.sample_rate)?;
        }
        Ok(())
    }
}

fn check_duration(name: &str, secs: f64, sample_rate: u32) -> Result<(), SessionError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(SessionError::InvalidParameter(format!(
            "{} must be positive, got {}",
            name, secs
        )));
    }
    if secs > MAX_DURATION_SECS {
        return Err(SessionError::InvalidParameter(format!(
            "{} must not exceed {} s, got {}",
            name, MAX_DURATION_SECS, secs
        )));
    }
    if frames_for(secs, sample_rate) == 0 {
        return Err(SessionError::InvalidParameter(format!(
            "{} of {} s is shorter than one frame",
            name, secs
        )));
    }
    Ok(())
}

fn frames_for(secs: f64, sample_rate: u32) -> u64 {
    (secs * sample_rate as f64) as u64
}

/// Thread-safe handle for steering a session from outside `run`
#[derive(Clone)]
pub struct SessionControl {
    flags: Arc<StreamFlags>,
    state: Arc<AtomicU8>,
    live: Arc<LiveSnapshot>,
}

impl SessionControl {
    fn new(live_len: usize) -> Self {
        Self {
            flags: Arc::new(StreamFlags::new()),
            state: Arc::new(AtomicU8::new(SessionState::Created as u8)),
            live: Arc::new(LiveSnapshot::new(live_len)),
        }
    }

    /// Ask the session to stop
    ///
    /// Idempotent and callable from any thread, before, during, or after
    /// `run`. `run` observes it within one polling interval.
    pub fn request_stop(&self) {
        if !self.flags.stop_requested() {
            tracing::info!(state = ?self.state(), "Stop requested");
        }
        self.flags.request_stop();
    }

    /// Pause or resume capture; paused input is discarded
    pub fn set_paused(&self, paused: bool) {
        self.flags.set_paused(paused);
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the session reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Frames of tone emitted so far
    pub fn played_frames(&self) -> u64 {
        self.flags.played_frames()
    }

    /// Latest `n` captured samples for live display; never blocks the session
    pub fn live_snapshot(&self, n: usize) -> Vec<f32> {
        self.live.latest(n)
    }

    fn transition(&self, to: SessionState) {
        let from = SessionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        tracing::debug!(?from, ?to, "Session state transition");
    }
}

/// One play, record, or play-and-record operation
pub struct RecordingSession {
    request: SessionRequest,
    config: EngineConfig,
    backend: Box<dyn AudioBackend>,
    control: SessionControl,
}

impl RecordingSession {
    /// Validate `request` and create a session on `backend` with default tuning
    ///
    /// Invalid parameters are rejected here, before any stream is opened.
    pub fn new(
        request: SessionRequest,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self, SessionError> {
        Self::with_config(request, backend, EngineConfig::default())
    }

    /// Validate `request` and create a session with explicit tuning
    pub fn with_config(
        request: SessionRequest,
        backend: Box<dyn AudioBackend>,
        config: EngineConfig,
    ) -> Result<Self, SessionError> {
        if let Err(e) = request.validate() {
            tracing::warn!(error = %e, "Rejected session parameters");
            return Err(e);
        }
        if request.mode.plays() && request.spec.aliases() {
            tracing::warn!(
                frequency = request.spec.frequency_hz,
                nyquist = request.spec.nyquist_hz(),
                "Tone is above Nyquist and will alias"
            );
        }

        Ok(Self {
            control: SessionControl::new(config.live_snapshot_len),
            request,
            config,
            backend,
        })
    }

    /// Handle for stopping, pausing, and observing this session
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// The validated request
    pub fn request(&self) -> &SessionRequest {
        &self.request
    }

    /// Frames of tone to emit (zero when not playing)
    pub fn play_frames(&self) -> u64 {
        if self.request.mode.plays() {
            frames_for(self.request.duration_secs, self.request.spec.sample_rate)
        } else {
            0
        }
    }

    /// Frames to capture (zero when not recording)
    pub fn record_frames(&self) -> u64 {
        let secs = match self.request.mode {
            SessionMode::PlayOnly => return 0,
            SessionMode::RecordOnly => self.request.duration_secs,
            SessionMode::PlayAndRecord => self
                .request
                .record_duration_secs
                .unwrap_or(self.request.duration_secs + self.config.record_tail_secs.max(0.0)),
        };
        frames_for(secs, self.request.spec.sample_rate)
    }

    /// Run the session to completion
    ///
    /// Synchronous; every wait inside is bounded, so a stop request is
    /// honored within one polling interval. Streams are closed on every
    /// exit path and exactly one result is produced.
    pub fn run(self) -> SessionResult {
        let play_frames = self.play_frames();
        let record_frames = self.record_frames();
        let RecordingSession {
            request,
            config,
            backend,
            control,
        } = self;

        tracing::info!(
            mode = %request.mode,
            waveform = %request.spec.kind,
            frequency = request.spec.frequency_hz,
            amplitude = request.spec.amplitude,
            sample_rate = request.spec.sample_rate,
            play_frames,
            record_frames,
            "Session starting"
        );

        let mut runner = Runner::new(request, config, backend, control, play_frames, record_frames);
        runner.run()
    }
}

enum Outcome {
    Finished,
    Cancelled,
    Failed(SessionError),
}

struct Runner {
    request: SessionRequest,
    config: EngineConfig,
    control: SessionControl,
    engine: StreamEngine,
    barrier: Option<Arc<StartBarrier>>,
    consumer: BlockConsumer,
    producer: Option<BlockProducer>,
    fault_rx: Receiver<StreamFault>,
    faults: FaultReporter,
    captured: Vec<f32>,
    play_frames: u64,
    record_frames: u64,
    started: Instant,
}

impl Runner {
    fn new(
        request: SessionRequest,
        config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        control: SessionControl,
        play_frames: u64,
        record_frames: u64,
    ) -> Self {
        let (producer, consumer) = SampleRingBuffer::with_capacity(config.ring_capacity_blocks);
        let (faults, fault_rx) = FaultReporter::new(Arc::clone(&control.flags));
        let barrier =
            (request.mode == SessionMode::PlayAndRecord).then(|| Arc::new(StartBarrier::new()));

        Self {
            request,
            config,
            control,
            engine: StreamEngine::new(backend),
            barrier,
            consumer,
            producer: Some(producer),
            fault_rx,
            faults,
            captured: Vec::with_capacity(record_frames.min(MAX_PREALLOC_SAMPLES) as usize),
            play_frames,
            record_frames,
            started: Instant::now(),
        }
    }

    fn run(&mut self) -> SessionResult {
        let start_timestamp = Utc::now();
        self.started = Instant::now();

        let outcome = match self.start_streams() {
            Err(e) => Outcome::Failed(e),
            Ok(()) => {
                self.control.transition(SessionState::Running);
                match self.await_start() {
                    Some(early) => early,
                    None => self.poll_running(),
                }
            }
        };

        // Teardown happens here, outside any callback, on every path
        self.control.flags.begin_shutdown();
        self.control.transition(SessionState::Draining);
        self.engine.close();
        self.drain();

        self.finish(outcome, start_timestamp)
    }

    fn start_streams(&mut self) -> Result<(), SessionError> {
        self.control.transition(SessionState::Starting);

        let settings = StreamSettings {
            sample_rate: self.request.spec.sample_rate,
            block_frames: self.config.block_frames,
        };
        if let Some(barrier) = &self.barrier {
            barrier.arm()?;
        }

        if self.request.mode.records() {
            let producer = self
                .producer
                .take()
                .ok_or_else(|| {
                    SessionError::StreamFault("capture ring already in use".to_string())
                })?;
            let mut callback =
                CaptureCallback::new(producer, self.record_frames, Arc::clone(&self.control.flags));
            if let Some(barrier) = &self.barrier {
                callback = callback.with_barrier(Arc::clone(barrier));
            }
            self.engine.open_input(&settings, callback, self.faults.clone())?;
        }

        if self.request.mode.plays() {
            let mut callback = PlaybackCallback::new(
                self.request.spec,
                self.play_frames,
                Arc::clone(&self.control.flags),
            );
            if let Some(barrier) = &self.barrier {
                callback = callback.with_barrier(Arc::clone(barrier));
            }
            self.engine.open_output(&settings, callback, self.faults.clone())?;
        }

        self.engine.start()?;
        Ok(())
    }

    /// Combined mode: wait, in bounded slices, for both streams to arrive
    fn await_start(&mut self) -> Option<Outcome> {
        let barrier = Arc::clone(self.barrier.as_ref()?);
        let timeout = self.config.barrier_timeout();
        let poll = self.config.poll_interval();
        let waiting_since = Instant::now();

        loop {
            if barrier.wait_released(poll) {
                tracing::info!(after = ?barrier.released_after(), "Start barrier released");
                return None;
            }
            if let Some(fault) = self.take_fault() {
                return Some(Outcome::Failed(fault));
            }
            if self.control.flags.stop_requested() {
                return Some(Outcome::Cancelled);
            }
            if waiting_since.elapsed() >= timeout {
                tracing::error!(?timeout, state = ?barrier.state(), "Start barrier timed out");
                return Some(Outcome::Failed(SessionError::BarrierTimeout(timeout)));
            }
        }
    }

    fn poll_running(&mut self) -> Outcome {
        let poll = self.config.poll_interval();
        let grace = self.config.stall_grace();
        let mut last_progress = self.progress();
        let mut progressed_at = Instant::now();

        loop {
            self.drain();

            if let Some(fault) = self.take_fault() {
                return Outcome::Failed(fault);
            }
            if self.control.flags.stop_requested() {
                return Outcome::Cancelled;
            }
            if self.is_done() {
                return Outcome::Finished;
            }

            // Watchdog: a stream that stops calling back must not hang `run`
            let progress = self.progress();
            if progress != last_progress || self.control.flags.is_paused() {
                last_progress = progress;
                progressed_at = Instant::now();
            } else if progressed_at.elapsed() >= grace {
                let flags = &self.control.flags;
                return Outcome::Failed(SessionError::StreamFault(format!(
                    "streams stalled: played {}/{} frames, captured {}/{} frames",
                    flags.played_frames(),
                    self.play_frames,
                    flags.captured_frames(),
                    self.record_frames
                )));
            }

            match self.fault_rx.recv_timeout(poll) {
                Ok(fault) => return Outcome::Failed(self.log_fault(fault)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(poll),
            }
        }
    }

    fn progress(&self) -> (u64, u64) {
        (self.control.flags.played_frames(), self.control.flags.captured_frames())
    }

    fn is_done(&self) -> bool {
        let flags = &self.control.flags;
        match self.request.mode {
            SessionMode::PlayOnly => flags.playback_complete(),
            SessionMode::RecordOnly => flags.capture_complete(),
            SessionMode::PlayAndRecord => flags.playback_complete() && flags.capture_complete(),
        }
    }

    fn take_fault(&mut self) -> Option<SessionError> {
        if let Ok(fault) = self.fault_rx.try_recv() {
            return Some(self.log_fault(fault));
        }
        self.control
            .flags
            .has_fault()
            .then(|| SessionError::StreamFault("driver reported an unspecified error".to_string()))
    }

    fn log_fault(&self, fault: StreamFault) -> SessionError {
        tracing::error!(direction = %fault.direction, message = %fault.message, "Stream fault");
        fault.into()
    }

    fn drain(&mut self) {
        let before = self.captured.len();
        if self.consumer.drain_into(&mut self.captured) > 0 {
            if before == 0 {
                tracing::info!("First captured samples received");
            }
            self.control.live.offer(&self.captured[before..]);
        }
    }

    fn finish(
        &mut self,
        outcome: Outcome,
        start_timestamp: chrono::DateTime<Utc>,
    ) -> SessionResult {
        let mode = self.request.mode;
        let dropped = self.consumer.dropped_blocks();
        let played = self.control.flags.played_frames();
        let overrun = (dropped > 0).then_some(SessionError::BufferOverrun { dropped });

        let (status, error) = match outcome {
            Outcome::Failed(e) => (SessionStatus::Failure, Some(e)),
            Outcome::Cancelled => {
                let nothing = if mode.records() {
                    self.captured.is_empty()
                } else {
                    played == 0
                };
                if nothing {
                    let what = if mode.records() { "captured" } else { "played" };
                    (
                        SessionStatus::PartialFailure,
                        Some(SessionError::Stopped(format!(
                            "stop requested before any audio was {}",
                            what
                        ))),
                    )
                } else if let Some(e) = overrun {
                    (SessionStatus::PartialFailure, Some(e))
                } else {
                    (SessionStatus::Ok, None)
                }
            }
            Outcome::Finished => match overrun {
                Some(e) => (SessionStatus::PartialFailure, Some(e)),
                None => (SessionStatus::Ok, None),
            },
        };

        let final_state = if status == SessionStatus::Failure {
            SessionState::Failed
        } else {
            SessionState::Completed
        };
        self.control.transition(final_state);

        let captured_samples = std::mem::take(&mut self.captured);
        let elapsed = self.started.elapsed();
        let event = SessionEvent {
            start_timestamp,
            end_timestamp: Utc::now(),
            spec: self.request.spec,
            mode,
            status,
            dropped_block_count: dropped,
            played_frames: played,
            captured_samples: captured_samples.len() as u64,
            error: error.as_ref().map(|e| e.to_string()),
        };

        tracing::info!(
            mode = %mode,
            status = ?status,
            played_frames = played,
            captured_samples = captured_samples.len(),
            dropped_blocks = dropped,
            elapsed_ms = elapsed.as_millis() as u64,
            error = event.error.as_deref().unwrap_or(""),
            "Session finished"
        );

        SessionResult {
            status,
            captured_samples,
            played_frame_count: played,
            elapsed,
            dropped_block_count: dropped,
            barrier_release: self
                .barrier
                .as_ref()
                .and_then(|b| b.released_at())
                .map(|at| at.saturating_duration_since(self.started)),
            error,
            event,
        }
    }
}
