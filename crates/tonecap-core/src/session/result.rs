//! Session outcome and the records handed to collaborators

use super::error::SessionError;
use super::SessionMode;
use crate::audio::waveform::WaveformSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bit depth of exported captures
pub const EXPORT_BIT_DEPTH: u16 = 16;

/// Overall outcome of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Everything requested was played and captured
    Ok,
    /// Finished, but with dropped blocks or an early stop that left nothing
    PartialFailure,
    /// Ended by an error
    Failure,
}

/// One structured record per session for the logging collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// When `run` began
    pub start_timestamp: DateTime<Utc>,
    /// When the result was produced
    pub end_timestamp: DateTime<Utc>,
    /// Tone parameters
    pub spec: WaveformSpec,
    /// Operating mode
    pub mode: SessionMode,
    /// Final status
    pub status: SessionStatus,
    /// Capture blocks lost to overrun
    pub dropped_block_count: u64,
    /// Frames of tone emitted
    pub played_frames: u64,
    /// Samples returned to the caller
    pub captured_samples: u64,
    /// Human-readable error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Captured audio plus the format the file-writer collaborator needs
#[derive(Debug, Clone, Copy)]
pub struct CaptureExport<'a> {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: &'a [f32],
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Always 1
    pub channels: u16,
    /// Always [`EXPORT_BIT_DEPTH`]
    pub bit_depth: u16,
}

/// Final result of [`RecordingSession::run`](super::RecordingSession::run)
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// Overall outcome
    pub status: SessionStatus,
    /// Every sample that reached the session, in capture order
    pub captured_samples: Vec<f32>,
    /// Frames of tone emitted
    pub played_frame_count: u64,
    /// Wall time spent in `run`
    pub elapsed: Duration,
    /// Capture blocks lost to overrun
    pub dropped_block_count: u64,
    /// Combined mode: time from the start of `run` to the start barrier release.
    /// `None` when the barrier never released.
    pub barrier_release: Option<Duration>,
    /// Error behind a non-`Ok` status
    pub error: Option<SessionError>,
    /// Summary record for logging
    pub event: SessionEvent,
}

impl SessionResult {
    /// Whether the session finished with [`SessionStatus::Ok`]
    pub fn is_ok(&self) -> bool {
        self.status == SessionStatus::Ok
    }

    /// Human-readable error description
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Captured audio for the file-writer collaborator
    ///
    /// `None` when nothing was captured.
    pub fn export(&self) -> Option<CaptureExport<'_>> {
        if self.captured_samples.is_empty() {
            return None;
        }
        Some(CaptureExport {
            samples: &self.captured_samples,
            sample_rate: self.event.spec.sample_rate,
            channels: 1,
            bit_depth: EXPORT_BIT_DEPTH,
        })
    }
}
