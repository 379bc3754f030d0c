//! 内存存储
//!
//! 账本没有持久化要求，所有仓储共用一个 `MemoryStorage`。每个方法只持有一次写锁，
//! 单条记录的读写因此是原子的。

use std::collections::HashMap;

use application::{
    BookingRepository, CounsellorRepository, FeedbackRepository, PaymentRepository,
    PayoutRepository,
};
use async_trait::async_trait;
use domain::{
    Booking, BookingFilter, BookingId, BookingState, Counsellor, CounsellorId, Feedback,
    PaymentAttempt, PaymentHandle, PayoutRecord, RepositoryError,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStorage {
    counsellors: RwLock<HashMap<CounsellorId, Counsellor>>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
    payments: RwLock<HashMap<PaymentHandle, PaymentAttempt>>,
    feedback: RwLock<HashMap<BookingId, Feedback>>,
    payouts: RwLock<Vec<PayoutRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_start(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by_key(|b| (b.slot.start, b.created_at, b.id));
    bookings
}

#[async_trait]
impl CounsellorRepository for MemoryStorage {
    async fn create(&self, counsellor: Counsellor) -> Result<Counsellor, RepositoryError> {
        let mut counsellors = self.counsellors.write().await;
        if counsellors.contains_key(&counsellor.id) {
            return Err(RepositoryError::Conflict);
        }
        counsellors.insert(counsellor.id.clone(), counsellor.clone());
        Ok(counsellor)
    }

    async fn update(&self, counsellor: Counsellor) -> Result<Counsellor, RepositoryError> {
        let mut counsellors = self.counsellors.write().await;
        match counsellors.get_mut(&counsellor.id) {
            Some(existing) => {
                *existing = counsellor.clone();
                Ok(counsellor)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(&self, id: &CounsellorId) -> Result<Option<Counsellor>, RepositoryError> {
        Ok(self.counsellors.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Counsellor>, RepositoryError> {
        Ok(self.counsellors.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl BookingRepository for MemoryStorage {
    async fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(RepositoryError::Conflict);
        }
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn update(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&booking.id) {
            Some(existing) => {
                *existing = booking.clone();
                Ok(booking)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_for_counsellor(
        &self,
        counsellor_id: &CounsellorId,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(by_start(
            bookings
                .values()
                .filter(|b| &b.counsellor_id == counsellor_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list(&self, filter: BookingFilter) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(by_start(
            bookings
                .values()
                .filter(|b| filter.matches(b))
                .cloned()
                .collect(),
        ))
    }

    async fn list_in_state(&self, state: BookingState) -> Result<Vec<Booking>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(by_start(
            bookings
                .values()
                .filter(|b| b.state == state)
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl PaymentRepository for MemoryStorage {
    async fn insert(&self, attempt: PaymentAttempt) -> Result<PaymentAttempt, RepositoryError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&attempt.handle) {
            return Err(RepositoryError::Conflict);
        }
        payments.insert(attempt.handle.clone(), attempt.clone());
        Ok(attempt)
    }

    async fn find_by_handle(
        &self,
        handle: &PaymentHandle,
    ) -> Result<Option<PaymentAttempt>, RepositoryError> {
        Ok(self.payments.read().await.get(handle).cloned())
    }

    async fn update(&self, attempt: PaymentAttempt) -> Result<PaymentAttempt, RepositoryError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&attempt.handle) {
            Some(existing) => {
                *existing = attempt.clone();
                Ok(attempt)
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[async_trait]
impl FeedbackRepository for MemoryStorage {
    async fn insert(&self, feedback: Feedback) -> Result<Feedback, RepositoryError> {
        let mut entries = self.feedback.write().await;
        if entries.contains_key(&feedback.booking_id) {
            return Err(RepositoryError::Conflict);
        }
        entries.insert(feedback.booking_id, feedback.clone());
        Ok(feedback)
    }

    async fn find_by_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Feedback>, RepositoryError> {
        Ok(self.feedback.read().await.get(&booking_id).cloned())
    }

    async fn list(
        &self,
        counsellor_id: Option<CounsellorId>,
    ) -> Result<Vec<Feedback>, RepositoryError> {
        let entries = self.feedback.read().await;
        let mut list: Vec<Feedback> = entries
            .values()
            .filter(|f| counsellor_id.as_ref().map_or(true, |id| &f.counsellor_id == id))
            .cloned()
            .collect();
        list.sort_by_key(|f| (f.created_at, f.booking_id));
        Ok(list)
    }
}

#[async_trait]
impl PayoutRepository for MemoryStorage {
    async fn append(&self, record: PayoutRecord) -> Result<PayoutRecord, RepositoryError> {
        self.payouts.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_for_counsellor(
        &self,
        counsellor_id: &CounsellorId,
    ) -> Result<Vec<PayoutRecord>, RepositoryError> {
        Ok(self
            .payouts
            .read()
            .await
            .iter()
            .filter(|p| &p.counsellor_id == counsellor_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<PayoutRecord>, RepositoryError> {
        Ok(self.payouts.read().await.clone())
    }
}
