//! 外部协作方接口
//!
//! 日历、支付网关、视频会议、消息通道都在核心之外，核心只依赖这里的窄接口。
//! 生产环境替换为真实客户端，测试中替换为 mock，核心逻辑不需要改动。
//! 所有调用都必须经过 [`call_with_timeout`]，结果一律视为可能失败。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use domain::{BookingId, ContactEmail, CounsellorId, Money, PaymentHandle, PaymentMethod, TimeRange};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },
    #[error("{collaborator} timed out after {timeout:?}")]
    Timeout {
        collaborator: &'static str,
        timeout: Duration,
    },
    /// 对方明确拒绝，重试没有意义
    #[error("{collaborator} rejected the request: {message}")]
    Rejected {
        collaborator: &'static str,
        message: String,
    },
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.into(),
        }
    }

    pub fn rejected(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Rejected {
            collaborator,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, CollaboratorError::Rejected { .. })
    }
}

/// 在给定超时内等待协作方返回
pub async fn call_with_timeout<T, F>(
    collaborator: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            collaborator,
            timeout,
        }),
    }
}

/// 外部日历（例如 Calendly）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn busy_ranges(
        &self,
        counsellor_id: &CounsellorId,
        scheduling_ref: &str,
        window: TimeRange,
    ) -> Result<Vec<TimeRange>, CollaboratorError>;
}

/// 外部支付网关。结果通过回调异步送达。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        booking_id: BookingId,
        amount: &Money,
        method: &PaymentMethod,
    ) -> Result<PaymentHandle, CollaboratorError>;
}

/// 外部视频会议（例如 Zoom）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    async fn create_meeting(&self, booking_id: BookingId) -> Result<String, CollaboratorError>;
}

/// 消息接收方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Email(ContactEmail),
    WhatsApp(String),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Email(email) => write!(f, "email:{email}"),
            Recipient::WhatsApp(number) => write!(f, "whatsapp:{number}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTemplate {
    BookingConfirmed,
    MeetingLinkReady,
}

impl MessageTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTemplate::BookingConfirmed => "booking_confirmed",
            MessageTemplate::MeetingLinkReady => "meeting_link_ready",
        }
    }
}

/// 外部消息通道（邮件 / WhatsApp）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(
        &self,
        recipient: &Recipient,
        template: MessageTemplate,
        data: &serde_json::Value,
    ) -> Result<(), CollaboratorError>;
}
