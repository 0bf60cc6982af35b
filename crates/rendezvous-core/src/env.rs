//! Environment abstraction for deterministic testing.
//!
//! Connection and session logic never read the system clock. Drivers pass the
//! current instant in, and the harness substitutes a virtual clock so reconnect
//! backoff can be exercised without sleeping.

use std::{ops::Sub, time::Duration};

/// Time source and async sleep for drivers.
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; the simulation harness uses a
    /// virtual instant it advances by hand.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; state machines take `now` as a parameter.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Used for client-side temporary message ids and optimistic timestamps,
    /// never for scheduling.
    fn wall_clock_millis(&self) -> u64;
}
