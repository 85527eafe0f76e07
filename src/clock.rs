use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for the request lifecycle. Expiration and the renewal
/// window are computed from it, so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    time: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: RwLock::new(time),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner) = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        *time += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
