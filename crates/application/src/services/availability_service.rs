use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveTime};
use config::BookingPolicy;
use domain::{CounsellorId, DomainError, Slot, TimeRange, Timestamp};

use crate::{
    clock::Clock,
    collaborators::{call_with_timeout, Calendar},
    error::{ApplicationError, ApplicationResult},
    services::{booking_service::BookingLedger, directory_service::DirectoryService},
};

pub struct AvailabilityServiceDependencies {
    pub directory: Arc<DirectoryService>,
    pub ledger: Arc<BookingLedger>,
    pub calendar: Arc<dyn Calendar>,
    pub clock: Arc<dyn Clock>,
    pub policy: BookingPolicy,
    pub collaborator_timeout: Duration,
}

/// 计算顾问在时间窗口内的空闲时段：外部日历的空闲时间减去本系统中仍占用的预约。
pub struct AvailabilityService {
    deps: AvailabilityServiceDependencies,
}

impl AvailabilityService {
    pub fn new(deps: AvailabilityServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn get_available_slots(
        &self,
        counsellor_id: &CounsellorId,
        window: TimeRange,
    ) -> ApplicationResult<Vec<Slot>> {
        let counsellor = self.deps.directory.require_active(counsellor_id).await?;
        let max_window = ChronoDuration::days(i64::from(self.deps.policy.max_window_days));
        if window.duration() > max_window {
            return Err(DomainError::invalid_argument(
                "window",
                format!("cannot exceed {} days", self.deps.policy.max_window_days),
            )
            .into());
        }

        let held = self.deps.ledger.active_ranges(counsellor_id).await?;
        let busy = call_with_timeout(
            "calendar",
            self.deps.collaborator_timeout,
            self.deps.calendar.busy_ranges(
                counsellor_id,
                &counsellor.external_scheduling_ref,
                window,
            ),
        )
        .await
        .map_err(|err| {
            tracing::warn!(counsellor_id = %counsellor_id, error = %err, "calendar lookup failed");
            ApplicationError::CalendarUnavailable(err.to_string())
        })?;

        let session = ChronoDuration::minutes(i64::from(self.deps.policy.session_minutes));
        let mut slots = Vec::new();
        for start in candidate_starts(
            &window,
            self.deps.clock.now(),
            self.deps.policy.slot_interval_minutes,
            self.deps.policy.session_minutes,
        ) {
            let range = TimeRange {
                start,
                end: start + session,
            };
            if busy.iter().chain(held.iter()).any(|r| r.overlaps(&range)) {
                continue;
            }
            slots.push(Slot::new(
                counsellor_id.clone(),
                start,
                self.deps.policy.session_minutes,
            )?);
        }
        Ok(slots)
    }
}

/// 候选开始时间：每天从 UTC 零点起每隔 `interval_minutes` 一个，
/// 完整落在窗口内且晚于当前时间。结果升序且不重复。
pub fn candidate_starts(
    window: &TimeRange,
    now: Timestamp,
    interval_minutes: u32,
    session_minutes: u32,
) -> Vec<Timestamp> {
    let interval = ChronoDuration::minutes(i64::from(interval_minutes.max(1)));
    let session = ChronoDuration::minutes(i64::from(session_minutes));
    let last_day = window.end.date_naive();
    let mut day = window.start.date_naive();
    let mut starts = Vec::new();

    loop {
        let midnight = day.and_time(NaiveTime::MIN).and_utc();
        let next_midnight = midnight + ChronoDuration::days(1);
        let mut start = midnight;
        while start < next_midnight {
            if start >= window.start && start + session <= window.end && start > now {
                starts.push(start);
            }
            start += interval;
        }
        match day.succ_opt() {
            Some(next) if next <= last_day => day = next,
            _ => break,
        }
    }
    starts.dedup();
    starts
}
