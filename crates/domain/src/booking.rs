//! 预约记录与状态机
//!
//! 状态只能向前流转：
//!
//! ```text
//! pending_payment ──> confirmed ──> completed
//!        │                │
//!        ├──> expired     │
//!        └──> cancelled <─┘
//! ```
//!
//! 已取消或已过期的预约不会复活，需要重新创建。

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::schedule::{Slot, TimeRange};
use crate::value_objects::{
    BookingId, ContactEmail, CounsellorId, PaymentHandle, StudentId, Timestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    PendingPayment,
    Confirmed,
    Completed,
    Expired,
    Cancelled,
}

impl BookingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingState::PendingPayment => "pending_payment",
            BookingState::Confirmed => "confirmed",
            BookingState::Completed => "completed",
            BookingState::Expired => "expired",
            BookingState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 取消发起方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelActor {
    Student,
    Counsellor,
    /// 系统发起（例如支付失败），不受取消窗口限制
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub actor: CancelActor,
    pub reason: Option<String>,
    pub cancelled_at: Timestamp,
}

/// 学生的联系方式，用于发送确认通知。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentContact {
    pub name: Option<String>,
    pub email: Option<ContactEmail>,
    pub whatsapp: Option<String>,
}

/// 状态迁移结果：真正发生了变化，还是幂等的空操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub counsellor_id: CounsellorId,
    pub student_id: StudentId,
    pub contact: StudentContact,
    /// 创建时的时段快照，外部日历之后的变动不影响它
    pub slot: Slot,
    pub state: BookingState,
    pub created_at: Timestamp,
    /// 支付窗口截止时间
    pub expires_at: Timestamp,
    pub payment_ref: Option<PaymentHandle>,
    pub meeting_ref: Option<String>,
    pub cancellation: Option<Cancellation>,
    pub updated_at: Timestamp,
}

impl Booking {
    pub fn new_pending(
        id: BookingId,
        student_id: StudentId,
        contact: StudentContact,
        slot: Slot,
        now: Timestamp,
        payment_window: Duration,
    ) -> Result<Self, DomainError> {
        if slot.start <= now {
            return Err(DomainError::invalid_argument(
                "slot_start",
                "must be in the future",
            ));
        }
        if payment_window <= Duration::zero() {
            return Err(DomainError::invalid_argument(
                "payment_window",
                "must be positive",
            ));
        }
        Ok(Self {
            id,
            counsellor_id: slot.counsellor_id.clone(),
            student_id,
            contact,
            slot,
            state: BookingState::PendingPayment,
            created_at: now,
            expires_at: now + payment_window,
            payment_ref: None,
            meeting_ref: None,
            cancellation: None,
            updated_at: now,
        })
    }

    pub fn range(&self) -> TimeRange {
        self.slot.range()
    }

    /// 待支付且已超过支付窗口
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.state == BookingState::PendingPayment && now >= self.expires_at
    }

    /// 是否仍占用该时段。已过期但尚未被清理的待支付预约不再占用。
    pub fn holds_slot(&self, now: Timestamp) -> bool {
        match self.state {
            BookingState::Confirmed => true,
            BookingState::PendingPayment => now < self.expires_at,
            BookingState::Completed | BookingState::Expired | BookingState::Cancelled => false,
        }
    }

    pub fn conflicts_with(&self, range: &TimeRange, now: Timestamp) -> bool {
        self.holds_slot(now) && self.range().overlaps(range)
    }

    pub fn attach_payment(
        &mut self,
        handle: PaymentHandle,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if self.state != BookingState::PendingPayment {
            return Err(DomainError::invalid_state(self.state, "pay for"));
        }
        if self.is_overdue(now) {
            return Err(DomainError::Expired);
        }
        self.payment_ref = Some(handle);
        self.updated_at = now;
        Ok(())
    }

    /// 同一支付凭证的重复确认是空操作。过期检查由调用方先行处理。
    pub fn confirm(
        &mut self,
        payment_ref: &PaymentHandle,
        now: Timestamp,
    ) -> Result<Transition, DomainError> {
        match self.state {
            BookingState::Confirmed | BookingState::Completed
                if self.payment_ref.as_ref() == Some(payment_ref) =>
            {
                Ok(Transition::Unchanged)
            }
            BookingState::PendingPayment => {
                if self.is_overdue(now) {
                    return Err(DomainError::Expired);
                }
                self.state = BookingState::Confirmed;
                self.payment_ref = Some(payment_ref.clone());
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            state => Err(DomainError::invalid_state(state, "confirm")),
        }
    }

    /// 幂等：只有超过支付窗口的待支付预约会被标记为过期。
    pub fn expire(&mut self, now: Timestamp) -> Transition {
        if self.is_overdue(now) {
            self.state = BookingState::Expired;
            self.updated_at = now;
            Transition::Applied
        } else {
            Transition::Unchanged
        }
    }

    pub fn cancel(
        &mut self,
        actor: CancelActor,
        reason: Option<String>,
        now: Timestamp,
        cancellation_window: Duration,
    ) -> Result<(), DomainError> {
        match self.state {
            BookingState::PendingPayment => {}
            BookingState::Confirmed => {
                if actor != CancelActor::System && now >= self.slot.start - cancellation_window {
                    return Err(DomainError::CancellationWindowClosed);
                }
            }
            state => return Err(DomainError::invalid_state(state, "cancel")),
        }
        self.state = BookingState::Cancelled;
        self.cancellation = Some(Cancellation {
            actor,
            reason: reason
                .map(|r| r.trim().to_owned())
                .filter(|r| !r.is_empty()),
            cancelled_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// 会话结束后才能完成；重复完成是空操作。
    pub fn complete(&mut self, now: Timestamp) -> Result<Transition, DomainError> {
        match self.state {
            BookingState::Completed => Ok(Transition::Unchanged),
            BookingState::Confirmed if now >= self.slot.end() => {
                self.state = BookingState::Completed;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            state => Err(DomainError::invalid_state(state, "complete")),
        }
    }

    pub fn needs_meeting(&self) -> bool {
        self.state == BookingState::Confirmed && self.meeting_ref.is_none()
    }

    /// 会议链接只写入一次。
    pub fn attach_meeting(&mut self, meeting_ref: String, now: Timestamp) -> Transition {
        let eligible = matches!(
            self.state,
            BookingState::Confirmed | BookingState::Completed
        );
        if !eligible || self.meeting_ref.is_some() {
            return Transition::Unchanged;
        }
        self.meeting_ref = Some(meeting_ref);
        self.updated_at = now;
        Transition::Applied
    }

    pub fn accepts_feedback(&self) -> bool {
        matches!(
            self.state,
            BookingState::Confirmed | BookingState::Completed
        )
    }
}

/// 预约列表查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    pub counsellor_id: Option<CounsellorId>,
    pub student_id: Option<StudentId>,
    pub state: Option<BookingState>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.counsellor_id
            .as_ref()
            .map_or(true, |id| &booking.counsellor_id == id)
            && self
                .student_id
                .as_ref()
                .map_or(true, |id| &booking.student_id == id)
            && self.state.map_or(true, |state| booking.state == state)
    }
}
