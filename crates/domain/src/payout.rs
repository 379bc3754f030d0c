//! 顾问结算
//!
//! 应付总额 = 已完成场次 × 单场费率 − 已发放结算之和。
//! 每条结算记录登记它付清的预约，同一预约不会被重复结算。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::booking::{Booking, BookingState};
use crate::errors::DomainError;
use crate::value_objects::{BookingId, CounsellorId, Money, PayoutId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub id: PayoutId,
    pub counsellor_id: CounsellorId,
    pub amount: Money,
    pub covered_booking_ids: BTreeSet<BookingId>,
    pub issued_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSummary {
    pub counsellor_id: CounsellorId,
    pub completed_sessions: u32,
    pub rate_per_session: Money,
    pub total_earned: Money,
    pub total_paid: Money,
    pub total_due: Money,
    /// 已完成但尚未被任何结算覆盖的预约，按开始时间排序
    pub uncovered_booking_ids: Vec<BookingId>,
}

impl PayoutSummary {
    pub fn compute(
        counsellor_id: CounsellorId,
        bookings: &[Booking],
        payouts: &[PayoutRecord],
        rate_per_session: &Money,
    ) -> Result<Self, DomainError> {
        let mut completed: Vec<&Booking> = bookings
            .iter()
            .filter(|b| b.counsellor_id == counsellor_id && b.state == BookingState::Completed)
            .collect();
        completed.sort_by_key(|b| (b.slot.start, b.id));

        let mut covered = BTreeSet::new();
        let mut paid_minor = 0i64;
        for payout in payouts.iter().filter(|p| p.counsellor_id == counsellor_id) {
            rate_per_session.ensure_same_currency(&payout.amount)?;
            paid_minor += payout.amount.amount_minor;
            covered.extend(payout.covered_booking_ids.iter().copied());
        }

        let completed_sessions = completed.len() as u32;
        let earned_minor = i64::from(completed_sessions) * rate_per_session.amount_minor;
        let currency = rate_per_session.currency.as_str();

        Ok(Self {
            counsellor_id,
            completed_sessions,
            rate_per_session: rate_per_session.clone(),
            total_earned: Money {
                amount_minor: earned_minor,
                currency: currency.to_owned(),
            },
            total_paid: Money {
                amount_minor: paid_minor,
                currency: currency.to_owned(),
            },
            total_due: Money {
                amount_minor: earned_minor - paid_minor,
                currency: currency.to_owned(),
            },
            uncovered_booking_ids: completed
                .iter()
                .map(|b| b.id)
                .filter(|id| !covered.contains(id))
                .collect(),
        })
    }

    /// 计算一笔新结算会付清哪些预约。
    ///
    /// 累计已付金额按整场折算，超出已覆盖场次的部分依次覆盖尚未结算的预约；
    /// 不足一整场的余额留到下一次结算。
    pub fn plan_payout(&self, amount: &Money) -> Result<BTreeSet<BookingId>, DomainError> {
        self.rate_per_session.ensure_same_currency(amount)?;
        if !amount.is_positive() {
            return Err(DomainError::invalid_argument("amount", "must be positive"));
        }
        if amount.amount_minor > self.total_due.amount_minor {
            return Err(DomainError::PayoutExceedsDue);
        }

        let rate = self.rate_per_session.amount_minor;
        if rate <= 0 {
            return Ok(BTreeSet::new());
        }
        let already_covered =
            (self.completed_sessions as usize).saturating_sub(self.uncovered_booking_ids.len());
        let fully_paid = ((self.total_paid.amount_minor + amount.amount_minor) / rate) as usize;
        let newly_paid = fully_paid.saturating_sub(already_covered);

        Ok(self
            .uncovered_booking_ids
            .iter()
            .take(newly_paid)
            .copied()
            .collect())
    }
}
