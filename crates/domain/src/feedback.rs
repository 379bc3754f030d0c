use serde::{Deserialize, Serialize};

use crate::booking::Booking;
use crate::errors::DomainError;
use crate::value_objects::{BookingId, CounsellorId, Rating, Timestamp};

/// 会后反馈，创建后不可修改，每个预约最多一条。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub booking_id: BookingId,
    pub counsellor_id: CounsellorId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

impl Feedback {
    pub fn for_booking(
        booking: &Booking,
        rating: Rating,
        comment: Option<String>,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if !booking.accepts_feedback() {
            return Err(DomainError::invalid_state(booking.state, "review"));
        }
        let comment = comment
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        if comment.as_ref().is_some_and(|c| c.len() > 2000) {
            return Err(DomainError::invalid_argument("comment", "too long"));
        }
        Ok(Self {
            booking_id: booking.id,
            counsellor_id: booking.counsellor_id.clone(),
            rating,
            comment,
            created_at: now,
        })
    }
}
