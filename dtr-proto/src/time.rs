//! Clock abstraction shared by the protocol crates.

use std::fmt::Debug;
use std::time::Instant;

/// Source of time for the protocol engine and its timers.
///
/// Production code uses [`SystemTimeProvider`]; deterministic tests use a
/// manually advanced implementation.
pub trait TimeProvider: Send + Sync + Debug {
    /// Monotonic clock, used for every deadline computation.
    fn now_instant(&self) -> Instant;

    /// Wall-clock milliseconds since the UNIX epoch, used for logging only.
    fn now_system_ms(&self) -> i64;
}

/// The real clock.
#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_system_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
