use std::sync::Arc;

use domain::{BookingId, CounsellorId, DomainError, Feedback, Rating, RepositoryError};

use crate::{
    clock::Clock,
    error::{ApplicationError, ApplicationResult},
    repository::{BookingRepository, FeedbackRepository},
};

pub struct FeedbackServiceDependencies {
    pub booking_repository: Arc<dyn BookingRepository>,
    pub feedback_repository: Arc<dyn FeedbackRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct FeedbackService {
    deps: FeedbackServiceDependencies,
}

impl FeedbackService {
    pub fn new(deps: FeedbackServiceDependencies) -> Self {
        Self { deps }
    }

    /// 每个预约只能提交一次反馈，重复提交由反馈存储原子地拒绝。
    pub async fn submit_feedback(
        &self,
        booking_id: BookingId,
        rating: i64,
        comment: Option<String>,
    ) -> ApplicationResult<Feedback> {
        let booking = self
            .deps
            .booking_repository
            .find_by_id(booking_id)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::BookingNotFound))?;
        let rating = Rating::new(rating)?;
        let feedback = Feedback::for_booking(&booking, rating, comment, self.deps.clock.now())?;

        let stored = self
            .deps
            .feedback_repository
            .insert(feedback)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => ApplicationError::Domain(DomainError::DuplicateFeedback),
                other => other.into(),
            })?;
        tracing::info!(booking_id = %booking_id, rating = stored.rating.value(), "feedback submitted");
        Ok(stored)
    }

    pub async fn list_feedback(
        &self,
        counsellor_id: Option<CounsellorId>,
    ) -> ApplicationResult<Vec<Feedback>> {
        Ok(self.deps.feedback_repository.list(counsellor_id).await?)
    }
}
