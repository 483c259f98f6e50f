//! Outbound collaborators for finished sessions
//!
//! Provides:
//! - 16-bit PCM WAV export of captured audio ([`wav`])
//! - Append-only JSON-lines journal of session events ([`journal`])

pub mod journal;
pub mod wav;
