use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::{BookingId, Money, PaymentHandle, Timestamp};

/// 学生选择的支付方式，由支付网关解释。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Upi,
    Paypal,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Paypal => "paypal",
        };
        f.write_str(text)
    }
}

/// 网关回调结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// 一次支付尝试，把网关句柄映射回预约。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub handle: PaymentHandle,
    pub booking_id: BookingId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl PaymentAttempt {
    pub fn pending(
        handle: PaymentHandle,
        booking_id: BookingId,
        amount: Money,
        method: PaymentMethod,
        now: Timestamp,
    ) -> Self {
        Self {
            handle,
            booking_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            created_at: now,
            resolved_at: None,
        }
    }

    /// 记录网关结果。首次结果生效，之后的重复回调不改变记录。
    pub fn resolve(&mut self, outcome: PaymentOutcome, now: Timestamp) -> bool {
        if self.status != PaymentStatus::Pending {
            return false;
        }
        self.status = match outcome {
            PaymentOutcome::Succeeded => PaymentStatus::Succeeded,
            PaymentOutcome::Failed => PaymentStatus::Failed,
        };
        self.resolved_at = Some(now);
        true
    }
}
