use parking_lot::Mutex;
use std::fmt::Debug;
use time::{Duration, UtcDateTime};

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock()
    }
}
