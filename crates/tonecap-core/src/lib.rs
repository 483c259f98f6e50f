//! Tonecap Core - Tone synthesis, stream engine, and recording sessions
//!
//! This library plays a synthesized tone, captures the input device, or does
//! both at once with playback and capture aligned to a common start. Audio
//! callbacks never allocate, lock, or log; captured blocks cross to the
//! session thread through a lock-free ring.

pub mod audio;
pub mod config;
pub mod export;
pub mod session;

pub use audio::{
    cpal_backend::CpalBackend,
    engine::{AudioBackend, StreamEngine},
    simulated::SimulatedBackend,
    waveform::{WaveformKind, WaveformSpec},
};
pub use config::EngineConfig;
pub use export::{journal::SessionJournal, wav::WavExporter};
pub use session::{
    RecordingSession, SessionControl, SessionError, SessionMode, SessionRequest, SessionResult,
    SessionState, SessionStatus,
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default tone amplitude
pub const DEFAULT_AMPLITUDE: f32 = 0.5;
