//! Monotonic clock abstraction for the stream scheduler.
//!
//! Times are offsets from the clock's own origin. [`TokioClock`] is backed by
//! the runtime timer; [`ManualClock`] is a virtual clock that jumps forward
//! whenever something sleeps on it, so paced streams complete instantly in
//! tests while still observing exact offsets.

use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A monotonic clock the scheduler can read and wait on
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Resolve once `now() >= at`
    fn sleep_until(&self, at: Duration) -> BoxFuture<'static, ()>;
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time from the tokio timer
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, at: Duration) -> BoxFuture<'static, ()> {
        match self.origin.checked_add(at) {
            Some(deadline) => Box::pin(tokio::time::sleep_until(deadline)),
            None => Box::pin(futures::future::pending()),
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: usize,
}

/// Virtual clock for deterministic tests.
///
/// Sleeping advances the clock to the wake-up time (plus the configured
/// lag, which models a scheduler that always wakes late) and resolves
/// immediately.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
    lag: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every wake-up overshoots its target by `lag`
    pub fn with_lag(lag: Duration) -> Self {
        Self {
            state: Arc::default(),
            lag,
        }
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }

    /// Move the clock forward without sleeping
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
    }

    /// Number of sleeps requested so far
    pub fn sleeps(&self) -> usize {
        self.lock().sleeps
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A poisoned clock only means a test thread panicked mid-update.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep_until(&self, at: Duration) -> BoxFuture<'static, ()> {
        let mut state = self.lock();
        state.sleeps += 1;
        if at > state.now {
            state.now = at.saturating_add(self.lag);
        }
        Box::pin(futures::future::ready(()))
    }
}
