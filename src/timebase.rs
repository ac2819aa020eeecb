use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Source of monotonic nanosecond timestamps. Wall-clock time must never be
/// used here: adjustments would produce negative or jumping durations.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Process-wide monotonic clock, counting from the first time any
/// `MonotonicClock` is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn now() -> u64 {
        static ANCHOR: OnceLock<Instant> = OnceLock::new();
        let anchor = ANCHOR.get_or_init(Instant::now);
        anchor.elapsed().as_nanos().min(u64::MAX as u128) as u64
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        Self::now()
    }
}

/// Profile start time plus the clock every sample is measured against.
#[derive(Clone)]
pub struct TimeBase {
    start_ns: u64,
    clock: Arc<dyn Clock>,
}

impl TimeBase {
    pub fn new(start_ns: u64, clock: Arc<dyn Clock>) -> Self {
        Self { start_ns, clock }
    }

    /// Nanoseconds between the profile start and `now`. Saturates at zero.
    pub fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_ns)
    }

    pub fn elapsed_now(&self) -> u64 {
        self.elapsed(self.clock.now_ns())
    }
}
