//! Controllable time source

use crate::ports::outbound::TimeSource;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// Time source that only moves when told to.
pub struct MockTimeSource {
    now: RwLock<DateTime<Utc>>,
}

impl MockTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write() += by;
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
