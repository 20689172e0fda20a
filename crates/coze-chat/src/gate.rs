//! Debounced persistence gate.
//!
//! A gate holds at most one pending action. Scheduling again before the quiet
//! period ends replaces the action and restarts the timer, so a burst of
//! requests fires once, with the last value, `delay` after the last request.
//! The gate never sleeps on its own: the owner asks for [`DebounceGate::deadline`]
//! and calls [`DebounceGate::take_due`] when it wakes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::clock::Clock;

pub struct DebounceGate<T> {
    delay: Duration,
    clock: Arc<dyn Clock>,
    pending: Option<Pending<T>>,
}

struct Pending<T> {
    action: T,
    deadline: Instant,
}

impl<T> DebounceGate<T> {
    pub fn new(delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            delay,
            clock,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace the pending action and restart the quiet period.
    ///
    /// If the previous action was already due but never taken, it is handed
    /// back so the caller can run it first instead of losing it.
    #[must_use = "an overdue action returned here has not run yet"]
    pub fn schedule(&mut self, action: T) -> Option<T> {
        let now = self.clock.now();
        let overdue = match self.pending.take() {
            Some(previous) if previous.deadline <= now => Some(previous.action),
            _ => None,
        };
        self.pending = Some(Pending {
            action,
            deadline: now + self.delay,
        });
        overdue
    }

    /// Drop the pending action without running it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.action)
    }

    /// Take the pending action now, regardless of its deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.action)
    }

    /// Take the pending action if its deadline has passed.
    pub fn take_due(&mut self) -> Option<T> {
        let now = self.clock.now();
        match &self.pending {
            Some(p) if p.deadline <= now => self.pending.take().map(|p| p.action),
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> std::fmt::Debug for DebounceGate<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceGate")
            .field("delay", &self.delay)
            .field("deadline", &self.deadline())
            .finish()
    }
}
