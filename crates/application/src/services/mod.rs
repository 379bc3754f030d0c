mod availability_service;
mod booking_service;
mod directory_service;
mod feedback_service;
mod maintenance;
mod payment_service;
mod payout_service;

pub use availability_service::{
    candidate_starts, AvailabilityService, AvailabilityServiceDependencies,
};
pub use booking_service::{BookingLedger, BookingLedgerDependencies, CreateBookingRequest};
pub use directory_service::{DirectoryService, DirectoryServiceDependencies};
pub use feedback_service::{FeedbackService, FeedbackServiceDependencies};
pub use maintenance::{MaintenanceSweeper, SweepReport};
pub use payment_service::{
    PaymentCoordinator, PaymentCoordinatorDependencies, PaymentResolution,
};
pub use payout_service::{PayoutOverviewEntry, PayoutService, PayoutServiceDependencies};
