//! Session tuning parameters
//!
//! Every field has a serde default so partial JSON (or none at all) yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_ring_capacity_blocks() -> usize {
    256
}

fn default_barrier_timeout_ms() -> u64 {
    2000
}

fn default_live_snapshot_len() -> usize {
    4096
}

fn default_record_tail_secs() -> f64 {
    1.0
}

fn default_stall_grace_ms() -> u64 {
    5000
}

/// Tuning for a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Session thread polling interval; bounds how late a stop is observed
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capture ring capacity in blocks, rounded up to a power of two
    #[serde(default = "default_ring_capacity_blocks")]
    pub ring_capacity_blocks: usize,
    /// How long combined mode waits for both streams to reach the start barrier
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
    /// Samples kept for the live display snapshot
    #[serde(default = "default_live_snapshot_len")]
    pub live_snapshot_len: usize,
    /// Extra capture after playback in combined mode without an explicit record duration
    #[serde(default = "default_record_tail_secs")]
    pub record_tail_secs: f64,
    /// How long the streams may make no progress before the session fails
    #[serde(default = "default_stall_grace_ms")]
    pub stall_grace_ms: u64,
    /// Requested frames per callback, `None` for the driver default
    #[serde(default)]
    pub block_frames: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            ring_capacity_blocks: default_ring_capacity_blocks(),
            barrier_timeout_ms: default_barrier_timeout_ms(),
            live_snapshot_len: default_live_snapshot_len(),
            record_tail_secs: default_record_tail_secs(),
            stall_grace_ms: default_stall_grace_ms(),
            block_frames: None,
        }
    }
}

impl EngineConfig {
    /// Polling interval, never below one millisecond
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Start barrier timeout
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    /// No-progress watchdog timeout
    pub fn stall_grace(&self) -> Duration {
        Duration::from_millis(self.stall_grace_ms)
    }
}
