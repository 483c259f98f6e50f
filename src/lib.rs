//! Tonecap - tone playback and capture
//!
//! This library re-exports the core engine from `tonecap-core` and adds the
//! persistent application configuration and argument parsing used by the
//! `tonecap` binary.

pub mod cli;
pub mod config;

pub use tonecap_core::{audio, export, session};

pub use config::AppConfig;
pub use tonecap_core::{
    AudioBackend, CpalBackend, EngineConfig, RecordingSession, SessionControl, SessionError,
    SessionJournal, SessionMode, SessionRequest, SessionResult, SessionState, SessionStatus,
    SimulatedBackend, StreamEngine, WavExporter, WaveformKind, WaveformSpec,
};
pub use tonecap_core::{BUILD_DATE, DEFAULT_AMPLITUDE, DEFAULT_SAMPLE_RATE, VERSION};
