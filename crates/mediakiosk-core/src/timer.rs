//! Cooperative timers for the UI context.
//!
//! A [`TimerSlot`] holds at most one armed timer. Arming replaces whatever was
//! armed before, and a due timer is consumed when taken, so a superseded timer
//! can never fire. Nothing here spawns threads; the owner polls
//! [`TimerSlot::take_due`] from its own loop.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Start at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What an armed timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Move to the next item.
    Advance,
    /// Ask the engine again for the item duration.
    ProbeDuration,
    /// Check that an external process is still running.
    LivenessCheck,
}

impl fmt::Display for TimerPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance => write!(f, "advance"),
            Self::ProbeDuration => write!(f, "probe-duration"),
            Self::LivenessCheck => write!(f, "liveness-check"),
        }
    }
}

/// A timer waiting in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    /// What firing means.
    pub purpose: TimerPurpose,
    /// When it was armed.
    pub armed_at: Instant,
    /// When it becomes due.
    pub deadline: Instant,
}

/// Single-timer slot.
#[derive(Debug, Default)]
pub struct TimerSlot {
    armed: Option<ArmedTimer>,
}

impl TimerSlot {
    /// Empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { armed: None }
    }

    /// Arm a timer due `delay` after `now`, replacing any armed timer.
    pub fn arm(&mut self, purpose: TimerPurpose, now: Instant, delay: Duration) {
        self.armed = Some(ArmedTimer {
            purpose,
            armed_at: now,
            deadline: now + delay,
        });
    }

    /// Disarm the slot, returning the time that was left on the timer.
    pub fn cancel(&mut self, now: Instant) -> Option<Duration> {
        self.armed
            .take()
            .map(|timer| timer.deadline.saturating_duration_since(now))
    }

    /// Consume the timer if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<TimerPurpose> {
        match self.armed {
            Some(timer) if timer.deadline <= now => {
                self.armed = None;
                Some(timer.purpose)
            }
            _ => None,
        }
    }

    /// The armed timer, if any.
    #[must_use]
    pub const fn armed(&self) -> Option<&ArmedTimer> {
        self.armed.as_ref()
    }

    /// Whether a timer is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}
