//! 仓储接口
//!
//! 预约账本的存储是核心中唯一共享的可变状态。实现必须保证单条记录的读写原子，
//! 跨记录的“检查后写入”由服务层的按顾问互斥保证。

use async_trait::async_trait;
use domain::{
    Booking, BookingFilter, BookingId, BookingState, Counsellor, CounsellorId, Feedback,
    PaymentAttempt, PaymentHandle, PayoutRecord, RepositoryError,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounsellorRepository: Send + Sync {
    /// 重复的 id 返回 `RepositoryError::Conflict`
    async fn create(&self, counsellor: Counsellor) -> Result<Counsellor, RepositoryError>;
    async fn update(&self, counsellor: Counsellor) -> Result<Counsellor, RepositoryError>;
    async fn find_by_id(&self, id: &CounsellorId) -> Result<Option<Counsellor>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Counsellor>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError>;
    async fn update(&self, booking: Booking) -> Result<Booking, RepositoryError>;
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError>;
    async fn list_for_counsellor(
        &self,
        counsellor_id: &CounsellorId,
    ) -> Result<Vec<Booking>, RepositoryError>;
    /// 按开始时间升序返回
    async fn list(&self, filter: BookingFilter) -> Result<Vec<Booking>, RepositoryError>;
    async fn list_in_state(&self, state: BookingState) -> Result<Vec<Booking>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, attempt: PaymentAttempt) -> Result<PaymentAttempt, RepositoryError>;
    async fn find_by_handle(
        &self,
        handle: &PaymentHandle,
    ) -> Result<Option<PaymentAttempt>, RepositoryError>;
    async fn update(&self, attempt: PaymentAttempt) -> Result<PaymentAttempt, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// 同一预约的第二条反馈必须原子地返回 `RepositoryError::Conflict`
    async fn insert(&self, feedback: Feedback) -> Result<Feedback, RepositoryError>;
    async fn find_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Feedback>, RepositoryError>;
    async fn list(
        &self,
        counsellor_id: Option<CounsellorId>,
    ) -> Result<Vec<Feedback>, RepositoryError>;
}

/// 结算记录只追加，不修改
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayoutRepository: Send + Sync {
    async fn append(&self, record: PayoutRecord) -> Result<PayoutRecord, RepositoryError>;
    async fn list_for_counsellor(
        &self,
        counsellor_id: &CounsellorId,
    ) -> Result<Vec<PayoutRecord>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<PayoutRecord>, RepositoryError>;
}
