//! Time sources, including a manual provider for deterministic tests.

use parking_lot::RwLock;
use std::time::{Duration, Instant};

pub use dtr_proto::time::{SystemTimeProvider, TimeProvider};

/// A manual time provider for deterministic simulations.
#[derive(Debug)]
pub struct ManualTimeProvider {
    instant: RwLock<Instant>,
    system_ms: RwLock<i64>,
}

impl ManualTimeProvider {
    pub fn new(instant: Instant, system_ms: i64) -> Self {
        Self {
            instant: RwLock::new(instant),
            system_ms: RwLock::new(system_ms),
        }
    }

    pub fn set_time(&self, instant: Instant, system_ms: i64) {
        *self.instant.write() = instant;
        *self.system_ms.write() = system_ms;
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write() += duration;
        *self.system_ms.write() += duration.as_millis() as i64;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_instant(&self) -> Instant {
        *self.instant.read()
    }

    fn now_system_ms(&self) -> i64 {
        *self.system_ms.read()
    }
}
