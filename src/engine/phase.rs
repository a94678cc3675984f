//! Phase state machine
//!
//! ```text
//!   empty store                        recovered store
//!  ┌───────────┐   first read         ┌──────────┐   first write
//!  │ WriteOnly │ ──────────────┐  ┌── │ ReadOnly │
//!  └───────────┘               ▼  ▼   └──────────┘
//!                           ┌────────┐
//!                           │ Hybrid │  (terminal)
//!                           └────────┘
//! ```
//!
//! Exactly one thread performs a transition: it wins a CAS on the
//! `transitioning` flag, re-checks the phase, sleeps the fence interval and
//! runs the rebuild. Everyone else backs off until the phase is Hybrid.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::utils::Backoff;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Reads and writes both allowed; sharded index maintained on append
    Hybrid = 0,
    /// No read yet; appends skip indexing
    WriteOnly = 1,
    /// Recovered store, no write yet; consolidated index
    ReadOnly = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::WriteOnly,
            2 => Phase::ReadOnly,
            _ => Phase::Hybrid,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Hybrid => "hybrid",
            Phase::WriteOnly => "write-only",
            Phase::ReadOnly => "read-only",
        };
        f.write_str(name)
    }
}

/// Current phase plus the one-winner transition flag
pub struct PhaseState {
    phase: AtomicU8,
    transitioning: AtomicBool,
}

impl PhaseState {
    pub fn new(initial: Phase) -> Self {
        Self {
            phase: AtomicU8::new(initial as u8),
            transitioning: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Publish the Hybrid phase; called by the rebuild while it still holds
    /// the index write lock
    pub fn publish_hybrid(&self) {
        self.phase.store(Phase::Hybrid as u8, Ordering::Release);
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning.load(Ordering::Acquire)
    }

    /// Move to Hybrid, running `rebuild(from)` on exactly one thread
    ///
    /// `rebuild` must call `publish_hybrid` on success. If it fails the flag
    /// is cleared and the next caller retries.
    pub fn enter_hybrid(&self, fence: Duration, rebuild: impl Fn(Phase) -> Result<()>) -> Result<()> {
        let backoff = Backoff::new();
        loop {
            if self.load() == Phase::Hybrid {
                return Ok(());
            }

            if self
                .transitioning
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Another winner may have finished between our load and the CAS
                let from = self.load();
                let result = if from == Phase::Hybrid {
                    Ok(())
                } else {
                    if !fence.is_zero() {
                        thread::sleep(fence);
                    }
                    rebuild(from)
                };
                self.transitioning.store(false, Ordering::Release);
                return result;
            }

            if backoff.is_completed() {
                thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }
}
