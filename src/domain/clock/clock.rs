use std::sync::Arc;

use chrono::Utc;

/// Wall clock used for generation counters, store timestamps and PRNG seeding.
pub trait Clock: std::fmt::Debug + Send + Sync {
    fn now_s(&self) -> i64;
    fn now_us(&self) -> i64;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_s(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn now_us(&self) -> i64 {
        Utc::now().timestamp_micros()
    }
}
