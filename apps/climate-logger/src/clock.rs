use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never steps backwards within the process.
///
/// If the system clock is adjusted backwards (NTP, manual change) the previous
/// high-water mark is returned instead.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water_ms: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let prev = self.high_water_ms.fetch_max(wall, Ordering::AcqRel);
        let ms = wall.max(prev);
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
