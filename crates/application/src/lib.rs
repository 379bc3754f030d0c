//! 应用层实现。
//!
//! 这里提供围绕预约领域模型的用例服务：顾问目录、空闲时段、预约账本、支付协调、
//! 反馈与结算，以及对外部协作方（日历、支付网关、会议、消息通道）的抽象。

pub mod clock;
pub mod collaborators;
pub mod error;
pub mod locks;
pub mod notifications;
pub mod repository;
pub mod retry;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    Calendar, CollaboratorError, MeetingProvider, MessageTemplate, Messenger, PaymentGateway,
    Recipient,
};
pub use error::{ApplicationError, ApplicationResult};
pub use notifications::{
    BookingNotifier, DispatcherConfig, FailedNotification, NotificationDispatcher,
};
pub use repository::{
    BookingRepository, CounsellorRepository, FeedbackRepository, PaymentRepository,
    PayoutRepository,
};
pub use services::{
    AvailabilityService, AvailabilityServiceDependencies, BookingLedger,
    BookingLedgerDependencies, CreateBookingRequest, DirectoryService,
    DirectoryServiceDependencies, FeedbackService, FeedbackServiceDependencies,
    MaintenanceSweeper, PaymentCoordinator, PaymentCoordinatorDependencies, PaymentResolution,
    PayoutOverviewEntry, PayoutService, PayoutServiceDependencies, SweepReport,
};
