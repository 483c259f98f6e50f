//! Bounded snapshot of the most recent captured samples for live display
//!
//! The session thread offers samples as it drains the capture ring; display
//! collaborators read snapshots at their own cadence. Writers use
//! `try_lock` and skip an update rather than wait, so a slow reader never
//! stalls the session.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Fixed-size circular history of recent samples
#[derive(Debug)]
pub struct LiveSnapshot {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
}

impl LiveSnapshot {
    /// Keep at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Maximum number of samples kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `samples`, evicting the oldest beyond capacity
    ///
    /// Returns `false` if a reader held the lock and the update was skipped.
    pub fn offer(&self, samples: &[f32]) -> bool {
        if self.capacity == 0 || samples.is_empty() {
            return true;
        }
        let Ok(mut history) = self.samples.try_lock() else {
            return false;
        };

        let incoming = &samples[samples.len().saturating_sub(self.capacity)..];
        let overflow = (history.len() + incoming.len()).saturating_sub(self.capacity);
        history.drain(..overflow);
        history.extend(incoming.iter().copied());
        true
    }

    /// Copy of the latest `n` samples, oldest first
    pub fn latest(&self, n: usize) -> Vec<f32> {
        let history = match self.samples.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).copied().collect()
    }

    /// Copy of everything currently held, oldest first
    pub fn snapshot(&self) -> Vec<f32> {
        self.latest(self.capacity)
    }

    /// Drop all held samples
    pub fn clear(&self) {
        if let Ok(mut history) = self.samples.lock() {
            history.clear();
        }
    }
}
