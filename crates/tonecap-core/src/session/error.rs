//! Session error taxonomy

use crate::audio::barrier::BarrierError;
use crate::audio::engine::{EngineError, StreamFault};
use std::time::Duration;
use thiserror::Error;

/// Errors a session can end with
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Rejected before any hardware access; retry needs new parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A stream could not be opened or started; a new session may succeed
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The driver failed mid-run
    #[error("Stream fault: {0}")]
    StreamFault(String),

    /// Captured blocks were dropped; the session still completed
    #[error("Capture buffer overrun: {dropped} block(s) dropped")]
    BufferOverrun { dropped: u64 },

    /// Combined mode never got both streams to the start barrier
    #[error("Streams did not reach the start barrier within {0:?}")]
    BarrierTimeout(Duration),

    /// A stop request ended the session before it produced anything
    #[error("Stopped early: {0}")]
    Stopped(String),
}

impl SessionError {
    /// Whether this error ended the session
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SessionError::BufferOverrun { .. } | SessionError::Stopped(_)
        )
    }

    /// Whether a new session with the same parameters may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SessionError::InvalidParameter(_))
    }
}

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        SessionError::DeviceUnavailable(e.to_string())
    }
}

impl From<StreamFault> for SessionError {
    fn from(fault: StreamFault) -> Self {
        SessionError::StreamFault(fault.to_string())
    }
}

impl From<BarrierError> for SessionError {
    fn from(e: BarrierError) -> Self {
        match e {
            BarrierError::Timeout(t) => SessionError::BarrierTimeout(t),
            other => SessionError::StreamFault(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::Direction;

    #[test]
    fn test_engine_error_maps_to_device_unavailable() {
        let err: SessionError = EngineError::NoDevice(Direction::Input).into();
        assert_eq!(
            err,
            SessionError::DeviceUnavailable("No input device available".to_string())
        );
        assert!(err.is_fatal());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_overrun_is_not_fatal() {
        let err = SessionError::BufferOverrun { dropped: 3 };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Capture buffer overrun: 3 block(s) dropped");
    }

    #[test]
    fn test_invalid_parameter_not_retryable() {
        assert!(!SessionError::InvalidParameter("frequency".into()).is_retryable());
    }

    #[test]
    fn test_barrier_timeout_mapping() {
        let err: SessionError = BarrierError::Timeout(Duration::from_millis(100)).into();
        assert_eq!(err, SessionError::BarrierTimeout(Duration::from_millis(100)));
    }
}
