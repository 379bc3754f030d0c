//! 预约通知分发
//!
//! 通知接口只负责入队，不阻塞也不向调用方返回错误。后台任务按联系渠道
//! 逐条发送，失败按指数退避重试；重试耗尽后记录告警并放入有上限的死信列表，等待人工跟进。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use config::NotificationSettings;
use domain::{Booking, BookingId};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collaborators::{
    call_with_timeout, CollaboratorError, MessageTemplate, Messenger, Recipient,
};
use crate::retry::{retry_async, Backoff, RetryConfig};

/// 预约生命周期中需要告知学生的事件出口
pub trait BookingNotifier: Send + Sync {
    /// 预约已确认；会议链接可能尚未生成
    fn notify_confirmed(&self, booking: &Booking);
    /// 确认之后补建的会议链接
    fn notify_meeting_ready(&self, booking: &Booking);
}

/// 重试耗尽的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedNotification {
    pub booking_id: BookingId,
    pub template: &'static str,
    pub recipient: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryConfig,
    pub timeout: Duration,
    pub queue_capacity: usize,
    pub dead_letter_capacity: usize,
}

impl DispatcherConfig {
    pub fn new(settings: &NotificationSettings, timeout: Duration) -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: settings.max_attempts,
                backoff: Backoff::exponential(settings.backoff_base()),
            },
            timeout,
            queue_capacity: settings.queue_capacity,
            dead_letter_capacity: settings.dead_letter_capacity,
        }
    }
}

#[derive(Debug)]
struct Notice {
    template: MessageTemplate,
    booking: Booking,
}

/// 有上限的死信列表，满了丢弃最旧的一条
struct DeadLetters {
    entries: Mutex<VecDeque<FailedNotification>>,
    capacity: usize,
}

impl DeadLetters {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<FailedNotification>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, failed: FailedNotification) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                tracing::warn!(
                    booking_id = %evicted.booking_id,
                    recipient = %evicted.recipient,
                    "dead letter list full, discarding oldest entry"
                );
            }
        }
        entries.push_back(failed);
    }
}

pub struct NotificationDispatcher {
    sender: Mutex<Option<mpsc::Sender<Notice>>>,
    dead_letters: Arc<DeadLetters>,
}

impl NotificationDispatcher {
    /// 创建分发器并启动后台发送任务。任务在 [`close`](Self::close) 之后处理完队列中剩余消息再退出。
    pub fn start(messenger: Arc<dyn Messenger>, config: DispatcherConfig) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let dead_letters = Arc::new(DeadLetters::new(config.dead_letter_capacity));
        let worker = Worker {
            messenger,
            config,
            dead_letters: Arc::clone(&dead_letters),
        };
        let handle = tokio::spawn(worker.run(receiver));
        tracing::info!("notification dispatcher started");
        (
            Self {
                sender: Mutex::new(Some(sender)),
                dead_letters,
            },
            handle,
        )
    }

    /// 停止接收新的通知
    pub fn close(&self) {
        let mut sender = self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sender.take();
    }

    pub fn dead_letters(&self) -> Vec<FailedNotification> {
        self.dead_letters.lock().iter().cloned().collect()
    }

    /// 取出并清空死信，交给人工跟进
    pub fn take_dead_letters(&self) -> Vec<FailedNotification> {
        self.dead_letters.lock().drain(..).collect()
    }

    fn enqueue(&self, template: MessageTemplate, booking: &Booking) {
        let sender = self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(sender) = sender.as_ref() else {
            tracing::warn!(booking_id = %booking.id, template = template.as_str(), "notification dispatcher closed, dropping notification");
            return;
        };
        let notice = Notice {
            template,
            booking: booking.clone(),
        };
        match sender.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::error!(booking_id = %booking.id, template = template.as_str(), "notification queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(booking_id = %booking.id, template = template.as_str(), "notification worker stopped, dropping notification");
            }
        }
    }
}

impl BookingNotifier for NotificationDispatcher {
    fn notify_confirmed(&self, booking: &Booking) {
        self.enqueue(MessageTemplate::BookingConfirmed, booking);
    }

    fn notify_meeting_ready(&self, booking: &Booking) {
        self.enqueue(MessageTemplate::MeetingLinkReady, booking);
    }
}

struct Worker {
    messenger: Arc<dyn Messenger>,
    config: DispatcherConfig,
    dead_letters: Arc<DeadLetters>,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::Receiver<Notice>) {
        while let Some(Notice { template, booking }) = receiver.recv().await {
            let recipients = recipients_for(&booking);
            if recipients.is_empty() {
                tracing::warn!(booking_id = %booking.id, "booking has no contact channel, nothing to send");
                continue;
            }
            let data = booking_payload(&booking);
            for recipient in recipients {
                self.deliver(booking.id, template, recipient, &data).await;
            }
        }
        tracing::info!("notification dispatcher stopped");
    }

    async fn deliver(
        &self,
        booking_id: BookingId,
        template: MessageTemplate,
        recipient: Recipient,
        data: &serde_json::Value,
    ) {
        let messenger = self.messenger.as_ref();
        let timeout = self.config.timeout;
        let target = &recipient;
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result = retry_async(
            &self.config.retry,
            |err: &CollaboratorError| err.is_transient(),
            move |attempt| {
                counter.store(attempt, Ordering::Relaxed);
                call_with_timeout("messenger", timeout, messenger.send(target, template, data))
            },
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(booking_id = %booking_id, recipient = %recipient, template = template.as_str(), "notification sent");
            }
            Err(err) => {
                tracing::error!(
                    booking_id = %booking_id,
                    recipient = %recipient,
                    template = template.as_str(),
                    attempts = attempts.load(Ordering::Relaxed),
                    error = %err,
                    "notification dropped"
                );
                self.dead_letters.push(FailedNotification {
                    booking_id,
                    template: template.as_str(),
                    recipient: recipient.to_string(),
                    attempts: attempts.load(Ordering::Relaxed),
                    error: err.to_string(),
                });
            }
        }
    }
}

/// 每个联系渠道一条消息。未留联系方式时，若学生标识本身是邮箱则发往该邮箱。
fn recipients_for(booking: &Booking) -> Vec<Recipient> {
    let mut recipients = Vec::new();
    if let Some(email) = booking
        .contact
        .email
        .clone()
        .or_else(|| booking.student_id.as_email())
    {
        recipients.push(Recipient::Email(email));
    }
    if let Some(number) = booking
        .contact
        .whatsapp
        .as_ref()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
    {
        recipients.push(Recipient::WhatsApp(number.to_owned()));
    }
    recipients
}

fn booking_payload(booking: &Booking) -> serde_json::Value {
    json!({
        "booking_id": booking.id,
        "counsellor_id": booking.counsellor_id,
        "student_name": booking.contact.name,
        "start": booking.slot.start,
        "duration_minutes": booking.slot.duration_minutes,
        "meeting_url": booking.meeting_ref,
    })
}
