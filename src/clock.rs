use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic timestamps used for feature aging.
pub trait Clock: Debug + Send {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall-clock backed monotonic time.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

/// Readings start here so that a timestamp of zero always means "never".
const ORIGIN_OFFSET: Duration = Duration::from_millis(1);

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed() + ORIGIN_OFFSET
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        let clock = ManualClock::default();
        clock.set(start);
        clock
    }

    pub fn set(&self, t: Duration) {
        self.millis.store(t.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, dt: Duration) {
        self.millis.fetch_add(dt.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
