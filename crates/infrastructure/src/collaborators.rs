//! 本地运行用的协作方适配器
//!
//! 真实的日历、支付、会议、消息服务不在本仓库范围内。这里的实现足以在本地
//! 跑通完整流程，也供集成测试观察调用次数与失败场景。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use application::{
    Calendar, CollaboratorError, MeetingProvider, MessageTemplate, Messenger, PaymentGateway,
    Recipient,
};
use async_trait::async_trait;
use domain::{BookingId, CounsellorId, Money, PaymentHandle, PaymentMethod, TimeRange};
use uuid::Uuid;

/// 可预置忙碌时段的日历，按顾问的外部日程引用存放。
#[derive(Default)]
pub struct InMemoryCalendar {
    busy: Mutex<HashMap<String, Vec<TimeRange>>>,
    unavailable: AtomicBool,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_busy(&self, scheduling_ref: impl Into<String>, range: TimeRange) {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(scheduling_ref.into())
            .or_default()
            .push(range);
    }

    /// 模拟日历服务不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Calendar for InMemoryCalendar {
    async fn busy_ranges(
        &self,
        _counsellor_id: &CounsellorId,
        scheduling_ref: &str,
        window: TimeRange,
    ) -> Result<Vec<TimeRange>, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("calendar", "calendar offline"));
        }
        let busy = self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(busy
            .get(scheduling_ref)
            .map(|ranges| {
                ranges
                    .iter()
                    .filter(|r| r.overlaps(&window))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// 只签发支付句柄的网关，支付结果通过回调接口手动送达。
#[derive(Default)]
pub struct ManualPaymentGateway {
    charges: Mutex<Vec<(PaymentHandle, BookingId, Money)>>,
    declining: AtomicBool,
}

impl ManualPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的扣款请求都被拒绝
    pub fn set_declining(&self, declining: bool) {
        self.declining.store(declining, Ordering::SeqCst);
    }

    pub fn charges(&self) -> Vec<(PaymentHandle, BookingId, Money)> {
        self.charges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for ManualPaymentGateway {
    async fn charge(
        &self,
        booking_id: BookingId,
        amount: &Money,
        method: &PaymentMethod,
    ) -> Result<PaymentHandle, CollaboratorError> {
        if self.declining.load(Ordering::SeqCst) {
            return Err(CollaboratorError::rejected("payment gateway", "charge declined"));
        }
        let handle = PaymentHandle::parse(format!("pay_{}", Uuid::new_v4().simple()))
            .map_err(|err| CollaboratorError::unavailable("payment gateway", err.to_string()))?;
        tracing::info!(booking_id = %booking_id, payment_ref = %handle, amount = %amount, method = %method, "charge issued");
        self.charges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((handle.clone(), booking_id, amount.clone()));
        Ok(handle)
    }
}

/// 由固定前缀加预约 id 生成会议链接
pub struct LinkMeetingProvider {
    base_url: String,
    created: AtomicUsize,
    failing: AtomicBool,
}

impl LinkMeetingProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            created: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 模拟会议服务故障
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MeetingProvider for LinkMeetingProvider {
    async fn create_meeting(&self, booking_id: BookingId) -> Result<String, CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("meeting provider", "meeting service offline"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}/{}", self.base_url, booking_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: Recipient,
    pub template: MessageTemplate,
    pub data: serde_json::Value,
}

/// 把消息写入日志而不真正发送
#[derive(Default)]
pub struct TracingMessenger {
    sent: Mutex<Vec<SentMessage>>,
}

impl TracingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Messenger for TracingMessenger {
    async fn send(
        &self,
        recipient: &Recipient,
        template: MessageTemplate,
        data: &serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(recipient = %recipient, template = template.as_str(), %data, "message sent");
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentMessage {
                recipient: recipient.clone(),
                template,
                data: data.clone(),
            });
        Ok(())
    }
}
