//! Audio processing module
//!
//! This module contains everything between a tone description and the device:
//! - Waveform synthesis ([`waveform`])
//! - Lock-free capture ring of fixed-size blocks ([`ring`])
//! - Start barrier aligning playback and capture ([`barrier`])
//! - Real-time playback and capture callbacks ([`callback`])
//! - Stream lifecycle over a pluggable backend ([`engine`])
//! - Hardware backend on cpal ([`cpal_backend`]) and a virtual one ([`simulated`])

pub mod barrier;
pub mod callback;
pub mod cpal_backend;
pub mod engine;
pub mod ring;
pub mod simulated;
pub mod waveform;
