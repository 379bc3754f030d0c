//! 时间区间与可预约时段。

use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{CounsellorId, Timestamp};

/// 半开区间 `[start, end)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::invalid_argument("time_range", "start must precede end"));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// 某位顾问的一个可预约时段。不单独持久化，由外部日历与现有预约推导得出。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub counsellor_id: CounsellorId,
    pub start: Timestamp,
    pub duration_minutes: u32,
}

impl Slot {
    /// 时段开始时间必须精确到分钟。
    pub fn new(
        counsellor_id: CounsellorId,
        start: Timestamp,
        duration_minutes: u32,
    ) -> Result<Self, DomainError> {
        if start.second() != 0 || start.nanosecond() != 0 {
            return Err(DomainError::invalid_argument(
                "slot_start",
                "must have minute granularity",
            ));
        }
        if duration_minutes == 0 {
            return Err(DomainError::invalid_argument(
                "duration_minutes",
                "must be positive",
            ));
        }
        Ok(Self {
            counsellor_id,
            start,
            duration_minutes,
        })
    }

    pub fn end(&self) -> Timestamp {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end(),
        }
    }
}
