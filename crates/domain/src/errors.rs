//! 领域模型错误定义
//!
//! 定义了预约核心中所有可能的业务错误，调用方可以据此给出明确的用户提示。

use thiserror::Error;

use crate::booking::BookingState;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("counsellor not found")]
    CounsellorNotFound,

    /// 顾问已停用，不再接受新预约
    #[error("counsellor is inactive")]
    CounsellorInactive,

    #[error("booking not found")]
    BookingNotFound,

    #[error("payment not found")]
    PaymentNotFound,

    /// 时段已被其他预约占用
    #[error("slot is already taken")]
    SlotConflict,

    /// 当前状态不允许该操作
    #[error("cannot {action} a booking in state {state}")]
    InvalidState { state: BookingState, action: String },

    /// 支付窗口已过期
    #[error("payment window has expired")]
    Expired,

    #[error("booking can no longer be cancelled this close to its start")]
    CancellationWindowClosed,

    #[error("feedback already submitted for this booking")]
    DuplicateFeedback,

    /// 学生待支付预约数量达到上限
    #[error("too many bookings awaiting payment")]
    PendingLimitReached,

    #[error("payout amount exceeds the amount due")]
    PayoutExceedsDue,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(state: BookingState, action: impl Into<String>) -> Self {
        Self::InvalidState {
            state,
            action: action.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
