//! Stream engine: the only layer that touches audio drivers
//!
//! Provides:
//! - The [`AudioBackend`] seam implemented by the cpal and simulated backends
//! - [`StreamEngine`], which owns at most one output and one input stream
//! - [`FaultReporter`], the path from driver error callbacks to the session
//!
//! Streams are opened and started from the owning thread. Teardown always
//! happens there too, never inside a callback: a driver error only raises a
//! flag and queues a [`StreamFault`] on a bounded lock-free channel.

use super::callback::{CaptureCallback, PlaybackCallback, StreamFlags};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the fault report channel
const FAULT_CHANNEL_CAPACITY: usize = 16;

/// Errors that can occur while opening or starting streams
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("No {0} device available")]
    NoDevice(Direction),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open {direction} stream: {reason}")]
    OpenFailed { direction: Direction, reason: String },

    #[error("Failed to start {direction} stream: {reason}")]
    StartFailed { direction: Direction, reason: String },

    #[error("{0} stream already open")]
    AlreadyOpen(Direction),
}

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Playback
    Output,
    /// Capture
    Input,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Output => f.write_str("output"),
            Direction::Input => f.write_str("input"),
        }
    }
}

/// Stream engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No streams running
    Stopped,
    /// Streams opened and started
    Running,
    /// A start attempt failed; streams were closed
    Error,
}

/// Parameters shared by both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Requested frames per callback, `None` for the driver default
    pub block_frames: Option<u32>,
}

impl StreamSettings {
    /// Settings at `sample_rate` with the driver's default block size
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            block_frames: None,
        }
    }
}

/// A driver-side error observed during streaming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    /// Stream that reported the error
    pub direction: Direction,
    /// Driver message
    pub message: String,
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stream fault: {}", self.direction, self.message)
    }
}

/// Handed to backends so driver error callbacks can report faults
#[derive(Clone)]
pub struct FaultReporter {
    flags: Arc<StreamFlags>,
    tx: crossbeam_channel::Sender<StreamFault>,
}

impl FaultReporter {
    /// Create a reporter and the receiver the session polls
    pub fn new(flags: Arc<StreamFlags>) -> (Self, crossbeam_channel::Receiver<StreamFault>) {
        let (tx, rx) = crossbeam_channel::bounded(FAULT_CHANNEL_CAPACITY);
        (Self { flags, tx }, rx)
    }

    /// Record a fault; never blocks
    ///
    /// The message is queued before the flag is raised, so a session that
    /// sees the flag also finds the message unless the queue was full.
    pub fn report(&self, direction: Direction, message: impl Into<String>) {
        let _ = self.tx.try_send(StreamFault {
            direction,
            message: message.into(),
        });
        self.flags.raise_fault();
    }
}

/// One open hardware direction
///
/// `close` stops the stream and releases it; calling it again is a no-op.
pub trait StreamHandle {
    /// Which direction this stream serves
    fn direction(&self) -> Direction;
    /// Begin invoking the callback
    fn start(&mut self) -> Result<(), EngineError>;
    /// Stop and release the stream
    fn close(&mut self);
}

/// Platform audio backend
///
/// Opening must fail synchronously, before any callback runs, when the
/// device is busy or missing. Backends move to the thread that runs the
/// session, so they must be `Send`; the streams they open need not be.
pub trait AudioBackend: Send {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Open an output stream driving `callback`
    fn open_output(
        &self,
        settings: &StreamSettings,
        callback: PlaybackCallback,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError>;

    /// Open an input stream feeding `callback`
    fn open_input(
        &self,
        settings: &StreamSettings,
        callback: CaptureCallback,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError>;
}

/// Owns the playback and capture streams of one session
pub struct StreamEngine {
    backend: Box<dyn AudioBackend>,
    state: EngineState,
    output: Option<Box<dyn StreamHandle>>,
    input: Option<Box<dyn StreamHandle>>,
}

impl StreamEngine {
    /// Create an engine on top of `backend`
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            state: EngineState::Stopped,
            output: None,
            input: None,
        }
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Name of the underlying backend
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Number of currently open streams
    pub fn open_streams(&self) -> usize {
        self.output.is_some() as usize + self.input.is_some() as usize
    }

    /// Open the output stream
    pub fn open_output(
        &mut self,
        settings: &StreamSettings,
        callback: PlaybackCallback,
        faults: FaultReporter,
    ) -> Result<(), EngineError> {
        if self.output.is_some() {
            return Err(EngineError::AlreadyOpen(Direction::Output));
        }
        let handle = self.backend.open_output(settings, callback, faults)?;
        tracing::info!(
            backend = self.backend.name(),
            sample_rate = settings.sample_rate,
            "Output stream opened"
        );
        self.output = Some(handle);
        Ok(())
    }

    /// Open the input stream
    pub fn open_input(
        &mut self,
        settings: &StreamSettings,
        callback: CaptureCallback,
        faults: FaultReporter,
    ) -> Result<(), EngineError> {
        if self.input.is_some() {
            return Err(EngineError::AlreadyOpen(Direction::Input));
        }
        let handle = self.backend.open_input(settings, callback, faults)?;
        tracing::info!(
            backend = self.backend.name(),
            sample_rate = settings.sample_rate,
            "Input stream opened"
        );
        self.input = Some(handle);
        Ok(())
    }

    /// Start every open stream
    ///
    /// Capture starts before playback so no tone is emitted while the input
    /// is still being brought up. On failure all streams are closed.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let result = self
            .input
            .as_mut()
            .map_or(Ok(()), |s| s.start())
            .and_then(|_| self.output.as_mut().map_or(Ok(()), |s| s.start()));

        match result {
            Ok(()) => {
                self.state = EngineState::Running;
                tracing::info!(streams = self.open_streams(), "Streams started");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start streams");
                self.close();
                self.state = EngineState::Error;
                Err(e)
            }
        }
    }

    /// Stop and release every stream; idempotent
    pub fn close(&mut self) {
        let had_streams = self.open_streams() > 0;
        if let Some(mut s) = self.output.take() {
            s.close();
        }
        if let Some(mut s) = self.input.take() {
            s.close();
        }
        if had_streams {
            tracing::info!(backend = self.backend.name(), "Streams closed");
        }
        self.state = EngineState::Stopped;
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.close();
    }
}
