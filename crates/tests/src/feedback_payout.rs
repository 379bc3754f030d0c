//! 反馈约束、顾问结算与后台维护

use std::time::Duration as StdDuration;

use application::MaintenanceSweeper;
use chrono::Duration;
use domain::{BookingState, DomainError, Money};
use tests::{at, counsellor, TestEnvironment};

#[tokio::test]
async fn feedback_requires_confirmed_booking() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();

    let err = env
        .state
        .feedback
        .submit_feedback(booking.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidState { state: BookingState::PendingPayment, .. })
    ));

    let booking = env
        .confirmed_booking("mira", "ben@example.com", at(1, 12, 0))
        .await;
    let err = env
        .state
        .feedback
        .submit_feedback(booking.id, 6, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::InvalidArgument { field, .. }) if field == "rating"
    ));
}

#[tokio::test]
async fn payouts_never_cover_a_booking_twice() {
    let env = TestEnvironment::new().await;
    for day in 1..=3 {
        env.confirmed_booking("mira", &format!("s{day}@example.com"), at(day, 10, 0))
            .await;
    }
    env.set_now(at(4, 9, 0));

    let mira = counsellor("mira");
    let summary = env.state.payouts.compute_payout_summary(&mira).await.unwrap();
    assert_eq!(summary.completed_sessions, 3);
    assert_eq!(summary.total_due.amount_minor, 6000);

    let first = env
        .state
        .payouts
        .record_payout(&mira, Money::new(3000, "USD").unwrap())
        .await
        .unwrap();
    assert_eq!(first.covered_booking_ids.len(), 1);

    let summary = env.state.payouts.compute_payout_summary(&mira).await.unwrap();
    assert_eq!(summary.total_paid.amount_minor, 3000);
    assert_eq!(summary.total_due.amount_minor, 3000);
    assert_eq!(summary.uncovered_booking_ids.len(), 2);

    let second = env
        .state
        .payouts
        .record_payout(&mira, Money::new(3000, "USD").unwrap())
        .await
        .unwrap();
    assert_eq!(second.covered_booking_ids.len(), 2);
    assert!(first
        .covered_booking_ids
        .is_disjoint(&second.covered_booking_ids));

    let err = env
        .state
        .payouts
        .record_payout(&mira, Money::new(1, "USD").unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.domain(), Some(&DomainError::PayoutExceedsDue));

    let overview = env.state.payouts.payout_overview().await.unwrap();
    let entry = overview
        .iter()
        .find(|e| e.counsellor_id == mira)
        .unwrap();
    assert_eq!(entry.summary.total_due.amount_minor, 0);
    assert!(entry.summary.uncovered_booking_ids.is_empty());
}

#[tokio::test]
async fn payout_in_other_currency_is_rejected() {
    let env = TestEnvironment::new().await;
    env.confirmed_booking("liam", "ana@example.com", at(1, 10, 0))
        .await;
    env.set_now(at(2, 0, 0));

    let err = env
        .state
        .payouts
        .record_payout(&counsellor("liam"), Money::new(2000, "EUR").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::InvalidArgument { .. })));
}

#[tokio::test]
async fn sweeper_expires_and_completes() {
    let env = TestEnvironment::new().await;
    let unpaid = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    let paid = env
        .confirmed_booking("liam", "ben@example.com", at(1, 10, 0))
        .await;

    let sweeper = MaintenanceSweeper::new(env.state.ledger.clone(), StdDuration::from_secs(30));
    env.clock.advance(Duration::minutes(30));
    let report = sweeper.sweep_once().await;
    assert_eq!(report.expired, 1);
    assert_eq!(report.completed, 0);

    env.set_now(at(1, 11, 0));
    let report = sweeper.sweep_once().await;
    assert_eq!(report.expired, 0);
    assert_eq!(report.completed, 1);

    let unpaid = env.state.ledger.get_booking(unpaid.id).await.unwrap();
    assert_eq!(unpaid.state, BookingState::Expired);
    let paid = env.state.ledger.get_booking(paid.id).await.unwrap();
    assert_eq!(paid.state, BookingState::Completed);

    // 已完成的会话仍可评价
    env.state
        .feedback
        .submit_feedback(paid.id, 4, Some("helpful".into()))
        .await
        .unwrap();
}
