use std::sync::Arc;

use config::PaymentSettings;
use domain::{
    CounsellorFilter, CounsellorId, Money, PayoutId, PayoutRecord, PayoutSummary,
};
use serde::Serialize;

use crate::{
    clock::Clock,
    error::ApplicationResult,
    locks::KeyedLocks,
    repository::{BookingRepository, PayoutRepository},
    services::{booking_service::BookingLedger, directory_service::DirectoryService},
};

/// 管理后台的结算总览条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutOverviewEntry {
    pub counsellor_id: CounsellorId,
    pub display_name: String,
    pub institution: String,
    pub active: bool,
    pub summary: PayoutSummary,
}

pub struct PayoutServiceDependencies {
    pub ledger: Arc<BookingLedger>,
    pub directory: Arc<DirectoryService>,
    pub booking_repository: Arc<dyn BookingRepository>,
    pub payout_repository: Arc<dyn PayoutRepository>,
    pub clock: Arc<dyn Clock>,
    pub settings: PaymentSettings,
}

/// 顾问结算：按完成场次计酬，结算记录只追加。
pub struct PayoutService {
    deps: PayoutServiceDependencies,
    locks: KeyedLocks<CounsellorId>,
}

impl PayoutService {
    pub fn new(deps: PayoutServiceDependencies) -> Self {
        Self {
            deps,
            locks: KeyedLocks::new(),
        }
    }

    fn rate_per_session(&self) -> ApplicationResult<Money> {
        Ok(Money::new(
            self.deps.settings.payout_rate_minor,
            self.deps.settings.currency.as_str(),
        )?)
    }

    pub async fn compute_payout_summary(
        &self,
        counsellor_id: &CounsellorId,
    ) -> ApplicationResult<PayoutSummary> {
        self.deps.directory.get_counsellor(counsellor_id).await?;
        self.deps.ledger.complete_due_for(counsellor_id).await?;

        let bookings = self
            .deps
            .booking_repository
            .list_for_counsellor(counsellor_id)
            .await?;
        let payouts = self
            .deps
            .payout_repository
            .list_for_counsellor(counsellor_id)
            .await?;
        Ok(PayoutSummary::compute(
            counsellor_id.clone(),
            &bookings,
            &payouts,
            &self.rate_per_session()?,
        )?)
    }

    /// 所有顾问（包括已停用的）的结算情况
    pub async fn payout_overview(&self) -> ApplicationResult<Vec<PayoutOverviewEntry>> {
        let filter = CounsellorFilter {
            include_inactive: true,
            ..Default::default()
        };
        let mut entries = Vec::new();
        for counsellor in self.deps.directory.list_counsellors(&filter).await? {
            let summary = self.compute_payout_summary(&counsellor.id).await?;
            entries.push(PayoutOverviewEntry {
                counsellor_id: counsellor.id,
                display_name: counsellor.display_name,
                institution: counsellor.institution,
                active: counsellor.active,
                summary,
            });
        }
        Ok(entries)
    }

    /// 同一顾问的结算串行执行，保证金额不超过应付且预约不会被重复覆盖。
    pub async fn record_payout(
        &self,
        counsellor_id: &CounsellorId,
        amount: Money,
    ) -> ApplicationResult<PayoutRecord> {
        let _guard = self.locks.acquire(counsellor_id).await;
        let summary = self.compute_payout_summary(counsellor_id).await?;
        let covered_booking_ids = summary.plan_payout(&amount)?;

        let record = PayoutRecord {
            id: PayoutId::generate(),
            counsellor_id: counsellor_id.clone(),
            amount,
            covered_booking_ids,
            issued_at: self.deps.clock.now(),
        };
        let stored = self.deps.payout_repository.append(record).await?;
        tracing::info!(
            counsellor_id = %counsellor_id,
            payout_id = %stored.id,
            amount = %stored.amount,
            covered = stored.covered_booking_ids.len(),
            "payout recorded"
        );
        Ok(stored)
    }
}
