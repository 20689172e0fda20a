//! Time sources for debouncing and session ids.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Monotonic time for deadlines plus wall-clock milliseconds for ids.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> i64;
}

/// Production clock. Follows tokio's clock, so paused-time tests see it move
/// with `tokio::time::advance`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    origin: Instant,
    origin_millis: i64,
    offset: Duration,
}

impl ManualClock {
    /// Start at `epoch_millis` on the wall clock.
    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                origin: Instant::now(),
                origin_millis: epoch_millis,
                offset: Duration::ZERO,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.offset += by;
    }

    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.origin + state.offset
    }

    fn epoch_millis(&self) -> i64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.origin_millis + state.offset.as_millis() as i64
    }
}
