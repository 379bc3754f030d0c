use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::{error::ApplicationResult, services::booking_service::BookingLedger};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub completed: usize,
    pub meetings_attached: usize,
    /// 本轮失败的步骤数，失败的步骤不影响其余步骤
    pub failed_steps: usize,
}

/// 后台维护任务：过期未支付预约、完成已结束会话、补建缺失的会议链接。
/// 所有操作都是幂等的，与请求路径上的惰性处理可以安全并存。
pub struct MaintenanceSweeper {
    ledger: Arc<BookingLedger>,
    interval: Duration,
}

impl MaintenanceSweeper {
    pub fn new(ledger: Arc<BookingLedger>, interval: Duration) -> Self {
        Self { ledger, interval }
    }

    pub async fn sweep_once(&self) -> SweepReport {
        let mut failed_steps = 0;
        let mut step = |name: &'static str, result: ApplicationResult<usize>| {
            result.unwrap_or_else(|err| {
                tracing::error!(step = name, error = %err, "maintenance step failed");
                failed_steps += 1;
                0
            })
        };
        let expired = step("expire overdue", self.ledger.expire_overdue().await);
        let completed = step("complete due", self.ledger.complete_due().await);
        let meetings_attached = step(
            "retry missing meetings",
            self.ledger.retry_missing_meetings().await,
        );
        SweepReport {
            expired,
            completed,
            meetings_attached,
            failed_steps,
        }
    }

    /// 周期执行直到 `shutdown` 变为 true。单次失败只记录日志，不中断循环。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "maintenance sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep_once().await;
                    if report != SweepReport::default() {
                        tracing::info!(
                            expired = report.expired,
                            completed = report.completed,
                            meetings_attached = report.meetings_attached,
                            failed_steps = report.failed_steps,
                            "maintenance sweep finished"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("maintenance sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{MockCalendar, MockMeetingProvider};
    use crate::notifications::BookingNotifier;
    use crate::repository::{MockBookingRepository, MockCounsellorRepository};
    use crate::services::booking_service::BookingLedgerDependencies;
    use crate::services::directory_service::{DirectoryService, DirectoryServiceDependencies};
    use chrono::{TimeZone, Utc};
    use domain::{Booking, BookingState, RepositoryError};

    struct NoopNotifier;

    impl BookingNotifier for NoopNotifier {
        fn notify_confirmed(&self, _booking: &Booking) {}
        fn notify_meeting_ready(&self, _booking: &Booking) {}
    }

    fn sweeper(bookings: MockBookingRepository) -> MaintenanceSweeper {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 8, 31, 9, 0, 0).unwrap(),
        ));
        let directory = Arc::new(DirectoryService::new(DirectoryServiceDependencies {
            counsellor_repository: Arc::new(MockCounsellorRepository::new()),
            clock: clock.clone(),
        }));
        let ledger = BookingLedger::new(BookingLedgerDependencies {
            booking_repository: Arc::new(bookings),
            directory,
            calendar: Arc::new(MockCalendar::new()),
            meetings: Arc::new(MockMeetingProvider::new()),
            notifier: Arc::new(NoopNotifier),
            clock,
            policy: config::AppConfig::default().booking,
            collaborator_timeout: Duration::from_millis(100),
        });
        MaintenanceSweeper::new(Arc::new(ledger), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn failing_step_does_not_skip_the_others() {
        let mut bookings = MockBookingRepository::new();
        bookings
            .expect_list_in_state()
            .withf(|state| *state == BookingState::PendingPayment)
            .returning(|_| Err(RepositoryError::storage("disk unavailable")));
        bookings
            .expect_list_in_state()
            .withf(|state| *state == BookingState::Confirmed)
            .times(2)
            .returning(|_| Ok(vec![]));

        let report = sweeper(bookings).sweep_once().await;
        assert_eq!(
            report,
            SweepReport {
                failed_steps: 1,
                ..SweepReport::default()
            }
        );
    }
}
