use std::sync::Arc;

use application::{ApplicationResult, CreateBookingRequest, ManualClock, PaymentResolution};
use config::AppConfig;
use domain::{Booking, BookingId, PaymentMethod, PaymentOutcome, Timestamp};
use infrastructure::Infrastructure;
use tokio::task::JoinHandle;
use web_api::AppState;

use crate::test_data_factory::{test_config, test_start};

/// 基于内存存储与本地协作方适配器的完整预约核心
pub struct TestEnvironment {
    pub config: AppConfig,
    pub clock: Arc<ManualClock>,
    pub infrastructure: Infrastructure,
    pub state: AppState,
    notification_worker: Option<JoinHandle<()>>,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let clock = Arc::new(ManualClock::new(test_start()));
        let infrastructure = Infrastructure::build(&config, test_start())
            .await
            .expect("seed directory");
        let (state, worker) = AppState::assemble(&config, &infrastructure, clock.clone());
        Self {
            config,
            clock,
            infrastructure,
            state,
            notification_worker: Some(worker),
        }
    }

    pub fn request(counsellor: &str, student: &str, start: Timestamp) -> CreateBookingRequest {
        CreateBookingRequest {
            counsellor_id: counsellor.into(),
            student_id: student.into(),
            student_name: None,
            student_email: None,
            student_whatsapp: None,
            slot_start: start,
        }
    }

    pub async fn create(
        &self,
        counsellor: &str,
        student: &str,
        start: Timestamp,
    ) -> ApplicationResult<Booking> {
        self.state
            .ledger
            .create(Self::request(counsellor, student, start))
            .await
    }

    /// 发起支付并送达网关回调
    pub async fn pay(
        &self,
        booking_id: BookingId,
        outcome: PaymentOutcome,
    ) -> ApplicationResult<PaymentResolution> {
        let attempt = self
            .state
            .payments
            .initiate_payment(booking_id, PaymentMethod::Card)
            .await?;
        self.state
            .payments
            .on_payment_result(attempt.handle.as_str(), outcome)
            .await
    }

    /// 创建并支付成功的预约
    pub async fn confirmed_booking(
        &self,
        counsellor: &str,
        student: &str,
        start: Timestamp,
    ) -> Booking {
        let booking = self.create(counsellor, student, start).await.unwrap();
        self.pay(booking.id, PaymentOutcome::Succeeded)
            .await
            .unwrap()
            .booking()
            .clone()
    }

    pub fn set_now(&self, now: Timestamp) {
        self.clock.set(now);
    }

    /// 关闭通知队列并等待后台任务处理完毕
    pub async fn drain_notifications(&mut self) {
        self.state.notifications.close();
        if let Some(worker) = self.notification_worker.take() {
            worker.await.unwrap();
        }
    }
}
