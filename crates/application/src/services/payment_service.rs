use std::sync::Arc;
use std::time::Duration;

use config::PaymentSettings;
use domain::{
    Booking, BookingId, DomainError, Money, PaymentAttempt, PaymentHandle, PaymentMethod,
    PaymentOutcome, PaymentStatus, Transition,
};
use serde::Serialize;

use crate::{
    clock::Clock,
    collaborators::{call_with_timeout, PaymentGateway},
    error::{ApplicationError, ApplicationResult},
    locks::KeyedLocks,
    repository::PaymentRepository,
    services::booking_service::BookingLedger,
};

/// 支付回调的处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", content = "booking", rename_all = "snake_case")]
pub enum PaymentResolution {
    Confirmed(Booking),
    /// 重复的成功回调，未产生任何副作用
    AlreadyConfirmed(Booking),
    /// 支付失败，待支付预约已被系统取消
    Cancelled(Booking),
    /// 回调不再影响预约：失败回调来自非当前支付尝试或预约已不在等待支付，
    /// 或成功回调到达时预约已由其他支付确认或已取消（需要退款）
    Ignored(Booking),
}

impl PaymentResolution {
    pub fn booking(&self) -> &Booking {
        match self {
            PaymentResolution::Confirmed(b)
            | PaymentResolution::AlreadyConfirmed(b)
            | PaymentResolution::Cancelled(b)
            | PaymentResolution::Ignored(b) => b,
        }
    }
}

pub struct PaymentCoordinatorDependencies {
    pub ledger: Arc<BookingLedger>,
    pub payment_repository: Arc<dyn PaymentRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
    pub settings: PaymentSettings,
    pub collaborator_timeout: Duration,
}

/// 驱动预约从待支付走向确认
pub struct PaymentCoordinator {
    deps: PaymentCoordinatorDependencies,
    /// 同一预约的发起支付串行执行，避免重复扣款
    initiations: KeyedLocks<BookingId>,
}

impl PaymentCoordinator {
    pub fn new(deps: PaymentCoordinatorDependencies) -> Self {
        Self {
            deps,
            initiations: KeyedLocks::new(),
        }
    }

    pub fn session_price(&self) -> ApplicationResult<Money> {
        Ok(Money::new(
            self.deps.settings.session_price_minor,
            self.deps.settings.currency.as_str(),
        )?)
    }

    /// 发起支付。预约已有未决的支付尝试时直接返回该尝试，不会再次扣款。
    pub async fn initiate_payment(
        &self,
        booking_id: BookingId,
        method: PaymentMethod,
    ) -> ApplicationResult<PaymentAttempt> {
        let _initiation = self.initiations.acquire(&booking_id).await;
        let booking = self.deps.ledger.ensure_payable(booking_id).await?;
        if let Some(current) = self.pending_attempt(&booking).await? {
            tracing::info!(booking_id = %booking_id, payment_ref = %current.handle, "payment already in flight");
            return Ok(current);
        }
        let amount = self.session_price()?;

        let handle = call_with_timeout(
            "payment gateway",
            self.deps.collaborator_timeout,
            self.deps.gateway.charge(booking_id, &amount, &method),
        )
        .await
        .map_err(|err| {
            tracing::warn!(booking_id = %booking_id, error = %err, "payment gateway call failed");
            ApplicationError::PaymentFailure(err.to_string())
        })?;

        let attempt = PaymentAttempt::pending(
            handle.clone(),
            booking_id,
            amount,
            method,
            self.deps.clock.now(),
        );
        let attempt = self.deps.payment_repository.insert(attempt).await?;
        self.deps.ledger.attach_payment(booking_id, handle).await?;
        tracing::info!(
            booking_id = %booking_id,
            payment_ref = %attempt.handle,
            amount = %attempt.amount,
            method = %attempt.method,
            "payment initiated"
        );
        Ok(attempt)
    }

    async fn pending_attempt(&self, booking: &Booking) -> ApplicationResult<Option<PaymentAttempt>> {
        let Some(handle) = booking.payment_ref.as_ref() else {
            return Ok(None);
        };
        Ok(self
            .deps
            .payment_repository
            .find_by_handle(handle)
            .await?
            .filter(|attempt| attempt.status == PaymentStatus::Pending))
    }

    /// 处理网关回调。重复回调安全：成功回调只确认一次，失败回调不会影响已确认的预约。
    pub async fn on_payment_result(
        &self,
        handle: &str,
        outcome: PaymentOutcome,
    ) -> ApplicationResult<PaymentResolution> {
        let handle = PaymentHandle::parse(handle)?;
        let mut attempt = self
            .deps
            .payment_repository
            .find_by_handle(&handle)
            .await?
            .ok_or(ApplicationError::Domain(DomainError::PaymentNotFound))?;

        if attempt.resolve(outcome, self.deps.clock.now()) {
            attempt = self.deps.payment_repository.update(attempt).await?;
        }
        tracing::info!(payment_ref = %handle, booking_id = %attempt.booking_id, outcome = ?outcome, "payment result received");

        match outcome {
            PaymentOutcome::Succeeded => {
                match self.deps.ledger.confirm(attempt.booking_id, &handle).await {
                    Ok((booking, Transition::Applied)) => Ok(PaymentResolution::Confirmed(booking)),
                    Ok((booking, Transition::Unchanged)) => {
                        Ok(PaymentResolution::AlreadyConfirmed(booking))
                    }
                    Err(err) => match err.domain() {
                        Some(DomainError::Expired) => {
                            tracing::warn!(booking_id = %attempt.booking_id, payment_ref = %handle, "payment succeeded after booking expired, refund required");
                            Err(err)
                        }
                        // 预约已由另一笔支付确认或已取消，这笔扣款不能再确认任何预约
                        Some(DomainError::InvalidState { state, .. }) => {
                            tracing::warn!(booking_id = %attempt.booking_id, payment_ref = %handle, state = state.as_str(), "payment succeeded for a booking it cannot confirm, refund required");
                            let booking = self.deps.ledger.get_booking(attempt.booking_id).await?;
                            Ok(PaymentResolution::Ignored(booking))
                        }
                        _ => Err(err),
                    },
                }
            }
            PaymentOutcome::Failed => {
                let (booking, transition) = self
                    .deps
                    .ledger
                    .cancel_unpaid(attempt.booking_id, &handle, "payment failed")
                    .await?;
                Ok(match transition {
                    Transition::Applied => PaymentResolution::Cancelled(booking),
                    Transition::Unchanged => PaymentResolution::Ignored(booking),
                })
            }
        }
    }
}
