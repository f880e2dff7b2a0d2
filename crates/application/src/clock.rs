use std::sync::Mutex;

use chrono::{Duration, FixedOffset, Local, Offset, Utc};
use domain::Timestamp;

/// 时间来源。每日领取按 `offset()` 所在时区的日历日期判断。
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    fn offset(&self) -> FixedOffset;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        *Local::now().offset()
    }
}

/// 可手动拨动的时钟，测试用
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    pub fn with_offset(now: Timestamp, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timestamp> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.lock()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
