//! Two-party start rendezvous for combined playback and capture
//!
//! Playback and capture callbacks run on independently scheduled driver
//! threads. A [`StartBarrier`] holds both back until each has arrived, so the
//! first emitted sample and the first recorded sample fall on the same
//! release instant.
//!
//! Lifecycle: `Idle → Armed → Released`. A barrier releases exactly once and
//! cannot be re-armed; every combined session builds a fresh one.
//!
//! Callbacks use the non-blocking [`StartBarrier::try_arrive`] once per
//! period until it reports release. Threads that are allowed to block use
//! [`StartBarrier::arrive_and_wait`], which waits in short timed slices and
//! gives up with [`BarrierError::Timeout`] instead of deadlocking.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest single condvar wait; bounds the cost of a missed notification
const WAIT_SLICE: Duration = Duration::from_millis(5);

const PLAYBACK_BIT: u8 = 0b01;
const CAPTURE_BIT: u8 = 0b10;
const BOTH: u8 = PLAYBACK_BIT | CAPTURE_BIT;

/// Errors reported by the start barrier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    #[error("Start barrier is not armed")]
    NotArmed,

    #[error("Start barrier was already armed")]
    AlreadyArmed,

    #[error("Start barrier not released within {0:?}")]
    Timeout(Duration),
}

/// The two parties of the rendezvous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierRole {
    /// Output stream callback
    Playback,
    /// Input stream callback
    Capture,
}

impl BarrierRole {
    fn bit(self) -> u8 {
        match self {
            BarrierRole::Playback => PLAYBACK_BIT,
            BarrierRole::Capture => CAPTURE_BIT,
        }
    }
}

/// Observable barrier lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// Created, not yet accepting arrivals
    Idle,
    /// Accepting arrivals
    Armed,
    /// Both parties arrived (terminal)
    Released,
}

/// Outcome of a non-blocking arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Barrier not armed; the arrival was not recorded
    NotArmed,
    /// Arrival recorded, still waiting for the other party
    Waiting,
    /// Both parties have arrived
    Released {
        /// True for the single arrival that completed the rendezvous
        releaser: bool,
    },
}

impl Arrival {
    /// Whether the caller may proceed
    pub fn is_released(&self) -> bool {
        matches!(self, Arrival::Released { .. })
    }
}

/// Single-use two-party start barrier
#[derive(Debug)]
pub struct StartBarrier {
    armed: AtomicBool,
    /// Bitmask of parties that have arrived; release is `ready == BOTH`
    ready: AtomicU8,
    /// Nanoseconds from creation to release, `u64::MAX` until released
    released_at_ns: AtomicU64,
    created: Instant,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl StartBarrier {
    /// Create an idle barrier
    pub fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            ready: AtomicU8::new(0),
            released_at_ns: AtomicU64::new(u64::MAX),
            created: Instant::now(),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    /// Start accepting arrivals
    ///
    /// Fails with [`BarrierError::AlreadyArmed`] on a second call; barriers
    /// are never re-armed.
    pub fn arm(&self) -> Result<(), BarrierError> {
        self.armed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| BarrierError::AlreadyArmed)
    }

    /// Current lifecycle state
    pub fn state(&self) -> BarrierState {
        if !self.armed.load(Ordering::Acquire) {
            BarrierState::Idle
        } else if self.ready.load(Ordering::Acquire) == BOTH {
            BarrierState::Released
        } else {
            BarrierState::Armed
        }
    }

    /// Whether both parties have arrived
    pub fn is_released(&self) -> bool {
        self.ready.load(Ordering::Acquire) == BOTH
    }

    /// Record arrival of `role` without blocking
    ///
    /// Real-time safe: one atomic read-modify-write plus, for the releasing
    /// arrival, a condvar notification. Repeated calls by the same role are
    /// harmless.
    pub fn try_arrive(&self, role: BarrierRole) -> Arrival {
        if !self.armed.load(Ordering::Acquire) {
            return Arrival::NotArmed;
        }

        let bit = role.bit();
        let prev = self.ready.fetch_or(bit, Ordering::AcqRel);

        if prev | bit != BOTH {
            return Arrival::Waiting;
        }
        if prev == BOTH {
            return Arrival::Released { releaser: false };
        }

        // This arrival completed the set: exactly one caller gets here
        let elapsed = self.created.elapsed().as_nanos().min(u64::MAX as u128 - 1) as u64;
        self.released_at_ns.store(elapsed, Ordering::Release);
        self.cvar.notify_all();
        Arrival::Released { releaser: true }
    }

    /// Record arrival of `role` and wait for the other party
    ///
    /// Returns once both parties have arrived, or fails with
    /// [`BarrierError::Timeout`] after `timeout`.
    pub fn arrive_and_wait(
        &self,
        role: BarrierRole,
        timeout: Duration,
    ) -> Result<(), BarrierError> {
        match self.try_arrive(role) {
            Arrival::NotArmed => Err(BarrierError::NotArmed),
            Arrival::Released { .. } => Ok(()),
            Arrival::Waiting => {
                if self.wait_released(timeout) {
                    Ok(())
                } else {
                    Err(BarrierError::Timeout(timeout))
                }
            }
        }
    }

    /// Wait up to `timeout` for release without arriving
    ///
    /// Used by the session thread to observe the rendezvous. Returns whether
    /// the barrier is released.
    pub fn wait_released(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = match self.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        while !self.is_released() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(WAIT_SLICE);
            guard = match self.cvar.wait_timeout(guard, slice) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Time from barrier creation to release, once released
    ///
    /// May briefly read `None` right after release while the releasing
    /// arrival publishes the timestamp.
    pub fn released_after(&self) -> Option<Duration> {
        match self.released_at_ns.load(Ordering::Acquire) {
            u64::MAX => None,
            ns => Some(Duration::from_nanos(ns)),
        }
    }

    /// Instant of release, once released
    pub fn released_at(&self) -> Option<Instant> {
        self.released_after().map(|after| self.created + after)
    }
}

impl Default for StartBarrier {
    fn default() -> Self {
        Self::new()
    }
}
