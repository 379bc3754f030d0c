use std::sync::Arc;

use application::{
    AvailabilityService, AvailabilityServiceDependencies, BookingLedger,
    BookingLedgerDependencies, Clock, DirectoryService, DirectoryServiceDependencies,
    DispatcherConfig, FeedbackService, FeedbackServiceDependencies, NotificationDispatcher,
    PaymentCoordinator, PaymentCoordinatorDependencies, PayoutService,
    PayoutServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<DirectoryService>,
    pub availability: Arc<AvailabilityService>,
    pub ledger: Arc<BookingLedger>,
    pub payments: Arc<PaymentCoordinator>,
    pub feedback: Arc<FeedbackService>,
    pub payouts: Arc<PayoutService>,
    pub notifications: Arc<NotificationDispatcher>,
    pub currency: String,
}

impl AppState {
    /// 组装所有用例服务，同时启动通知分发任务
    pub fn assemble(
        config: &AppConfig,
        infrastructure: &Infrastructure,
        clock: Arc<dyn Clock>,
    ) -> (Self, JoinHandle<()>) {
        let timeout = config.collaborators.timeout();
        let storage = infrastructure.storage.clone();

        let (dispatcher, notification_worker) = NotificationDispatcher::start(
            infrastructure.messenger_trait(),
            DispatcherConfig::new(&config.notifications, timeout),
        );
        let notifications = Arc::new(dispatcher);

        let directory = Arc::new(DirectoryService::new(DirectoryServiceDependencies {
            counsellor_repository: storage.clone(),
            clock: clock.clone(),
        }));
        let ledger = Arc::new(BookingLedger::new(BookingLedgerDependencies {
            booking_repository: storage.clone(),
            directory: directory.clone(),
            calendar: infrastructure.calendar_trait(),
            meetings: infrastructure.meetings_trait(),
            notifier: notifications.clone(),
            clock: clock.clone(),
            policy: config.booking.clone(),
            collaborator_timeout: timeout,
        }));
        let availability = Arc::new(AvailabilityService::new(AvailabilityServiceDependencies {
            directory: directory.clone(),
            ledger: ledger.clone(),
            calendar: infrastructure.calendar_trait(),
            clock: clock.clone(),
            policy: config.booking.clone(),
            collaborator_timeout: timeout,
        }));
        let payments = Arc::new(PaymentCoordinator::new(PaymentCoordinatorDependencies {
            ledger: ledger.clone(),
            payment_repository: storage.clone(),
            gateway: infrastructure.payment_gateway_trait(),
            clock: clock.clone(),
            settings: config.payments.clone(),
            collaborator_timeout: timeout,
        }));
        let feedback = Arc::new(FeedbackService::new(FeedbackServiceDependencies {
            booking_repository: storage.clone(),
            feedback_repository: storage.clone(),
            clock: clock.clone(),
        }));
        let payouts = Arc::new(PayoutService::new(PayoutServiceDependencies {
            ledger: ledger.clone(),
            directory: directory.clone(),
            booking_repository: storage.clone(),
            payout_repository: storage,
            clock,
            settings: config.payments.clone(),
        }));

        (
            Self {
                directory,
                availability,
                ledger,
                payments,
                feedback,
                payouts,
                notifications,
                currency: config.payments.currency.clone(),
            },
            notification_worker,
        )
    }
}
