//! Virtual-clock environment.
//!
//! `SimEnv` replaces the system clock with a shared counter that only moves
//! when a test advances it or the runtime sleeps. Reconnect backoff and
//! typing timeouts can then be exercised in microseconds, and every run with
//! the same inputs sees the same instants.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    ops::Sub,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rendezvous_core::env::Environment;

/// Wall-clock time at virtual time zero: 2023-11-14T22:13:20Z.
pub const DEFAULT_EPOCH_MILLIS: u64 = 1_700_000_000_000;

/// Point on the virtual timeline, measured from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the start of the run.
    #[must_use]
    pub const fn elapsed(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Environment backed by a virtual clock.
///
/// Clones share the clock, so the runtime and the test observe the same time.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    epoch_millis: u64,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Clock at zero, wall clock at [`DEFAULT_EPOCH_MILLIS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_epoch_millis(DEFAULT_EPOCH_MILLIS)
    }

    /// Clock at zero, wall clock at `epoch_millis`.
    #[must_use]
    pub fn with_epoch_millis(epoch_millis: u64) -> Self {
        Self { clock: Arc::new(Mutex::new(Duration::ZERO)), epoch_millis }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock += duration;
    }

    /// Time since the start of the run.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    /// Advances the clock and returns immediately.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn wall_clock_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_millis.saturating_add(elapsed)
    }
}
