use std::sync::{Arc, RwLock};

use crate::domain::clock::clock::Clock;

/// Manually driven clock, shared between the code under test and the test itself.
#[derive(Debug, Clone)]
pub struct MockClock {
    pub time: Arc<RwLock<i64>>,
}

impl MockClock {
    pub fn new(time: i64) -> MockClock {
        MockClock { time: Arc::new(RwLock::new(time)) }
    }

    pub fn set(&self, time: i64) {
        *self.time.write().expect("RwLock poisoned") = time;
    }

    pub fn advance(&self, secs: i64) {
        *self.time.write().expect("RwLock poisoned") += secs;
    }
}

impl Clock for MockClock {
    fn now_s(&self) -> i64 {
        *self.time.read().expect("RwLock poisoned")
    }

    fn now_us(&self) -> i64 {
        self.now_s() * 1_000_000
    }
}
