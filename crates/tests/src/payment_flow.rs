//! 支付回调、会议创建与确认通知

use std::time::Duration as StdDuration;

use application::{MaintenanceSweeper, MessageTemplate, PaymentRepository, PaymentResolution};
use chrono::Duration;
use domain::{
    Booking, BookingState, DomainError, Money, PaymentAttempt, PaymentHandle, PaymentMethod,
    PaymentOutcome, PaymentStatus,
};
use tests::{at, TestEnvironment};

/// 登记一笔预约已不再引用的支付尝试
async fn stale_attempt(env: &TestEnvironment, booking: &Booking, handle: &str) {
    let attempt = PaymentAttempt::pending(
        PaymentHandle::parse(handle).unwrap(),
        booking.id,
        Money::new(2900, "USD").unwrap(),
        PaymentMethod::Card,
        booking.created_at,
    );
    PaymentRepository::insert(env.infrastructure.storage.as_ref(), attempt)
        .await
        .unwrap();
}

#[tokio::test]
async fn repeated_success_callback_does_not_notify_twice() {
    let mut env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    let attempt = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap();
    assert_eq!(attempt.amount.amount_minor, 2900);
    assert_eq!(attempt.status, PaymentStatus::Pending);

    let first = env
        .state
        .payments
        .on_payment_result(attempt.handle.as_str(), PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert!(matches!(first, PaymentResolution::Confirmed(_)));
    let second = env
        .state
        .payments
        .on_payment_result(attempt.handle.as_str(), PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert!(matches!(second, PaymentResolution::AlreadyConfirmed(_)));
    assert_eq!(first.booking().meeting_ref, second.booking().meeting_ref);

    env.drain_notifications().await;
    assert_eq!(env.infrastructure.meetings.created_count(), 1);
    let sent = env.infrastructure.messenger.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient.to_string(), "email:ana@example.com");
    assert!(env.state.notifications.dead_letters().is_empty());
}

#[tokio::test]
async fn failed_payment_releases_slot() {
    let env = TestEnvironment::new().await;
    let start = at(1, 10, 0);
    let booking = env.create("mira", "ana@example.com", start).await.unwrap();

    let resolution = env.pay(booking.id, PaymentOutcome::Failed).await.unwrap();
    let PaymentResolution::Cancelled(cancelled) = resolution else {
        panic!("expected cancellation, got {resolution:?}");
    };
    assert_eq!(cancelled.state, BookingState::Cancelled);

    env.create("mira", "ben@example.com", start).await.unwrap();
}

#[tokio::test]
async fn late_failure_callback_leaves_confirmed_booking() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    let attempt = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Paypal)
        .await
        .unwrap();
    let handle = attempt.handle.as_str();

    env.state
        .payments
        .on_payment_result(handle, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    let resolution = env
        .state
        .payments
        .on_payment_result(handle, PaymentOutcome::Failed)
        .await
        .unwrap();
    assert!(matches!(resolution, PaymentResolution::Ignored(_)));
    assert_eq!(resolution.booking().state, BookingState::Confirmed);
}

#[tokio::test]
async fn success_after_expiry_is_rejected() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("liam", "ana@example.com", at(2, 9, 0))
        .await
        .unwrap();
    let attempt = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap();

    env.clock.advance(Duration::minutes(20));
    let err = env
        .state
        .payments
        .on_payment_result(attempt.handle.as_str(), PaymentOutcome::Succeeded)
        .await
        .unwrap_err();
    assert_eq!(err.domain(), Some(&DomainError::Expired));

    let stored = env.state.ledger.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.state, BookingState::Expired);
    assert_eq!(env.infrastructure.meetings.created_count(), 0);
}

#[tokio::test]
async fn declined_charge_keeps_booking_pending() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();

    env.infrastructure.payment_gateway.set_declining(true);
    let err = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap_err();
    assert!(matches!(err, application::ApplicationError::PaymentFailure(_)));

    let stored = env.state.ledger.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.state, BookingState::PendingPayment);
    assert!(stored.payment_ref.is_none());
}

#[tokio::test]
async fn unknown_payment_handle_is_reported() {
    let env = TestEnvironment::new().await;
    let err = env
        .state
        .payments
        .on_payment_result("pay_missing", PaymentOutcome::Succeeded)
        .await
        .unwrap_err();
    assert_eq!(err.domain(), Some(&DomainError::PaymentNotFound));
}

#[tokio::test]
async fn meeting_failure_is_retried_by_sweeper() {
    let mut env = TestEnvironment::new().await;
    env.infrastructure.meetings.set_failing(true);

    let booking = env
        .confirmed_booking("mira", "ana@example.com", at(1, 10, 0))
        .await;
    assert_eq!(booking.state, BookingState::Confirmed);
    assert!(booking.meeting_ref.is_none());

    env.infrastructure.meetings.set_failing(false);
    let sweeper = MaintenanceSweeper::new(env.state.ledger.clone(), StdDuration::from_secs(30));
    let report = sweeper.sweep_once().await;
    assert_eq!(report.meetings_attached, 1);
    assert_eq!(report.failed_steps, 0);

    let url = format!("https://meet.example.com/peer/{}", booking.id);
    let stored = env.state.ledger.get_booking(booking.id).await.unwrap();
    assert_eq!(stored.meeting_ref.as_deref(), Some(url.as_str()));

    env.drain_notifications().await;
    let sent = env.infrastructure.messenger.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].template, MessageTemplate::BookingConfirmed);
    assert!(sent[0].data["meeting_url"].is_null());
    assert_eq!(sent[1].template, MessageTemplate::MeetingLinkReady);
    assert_eq!(sent[1].data["meeting_url"], url.as_str());
}

#[tokio::test]
async fn second_initiation_reuses_pending_attempt() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();

    let first = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap();
    let second = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Upi)
        .await
        .unwrap();
    assert_eq!(first.handle, second.handle);
    assert_eq!(env.infrastructure.payment_gateway.charges().len(), 1);
}

#[tokio::test]
async fn failure_of_superseded_attempt_does_not_cancel() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    stale_attempt(&env, &booking, "pay_superseded").await;
    let live = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap();

    let resolution = env
        .state
        .payments
        .on_payment_result("pay_superseded", PaymentOutcome::Failed)
        .await
        .unwrap();
    assert!(matches!(resolution, PaymentResolution::Ignored(_)));
    assert_eq!(resolution.booking().state, BookingState::PendingPayment);

    let resolution = env
        .state
        .payments
        .on_payment_result(live.handle.as_str(), PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert!(matches!(resolution, PaymentResolution::Confirmed(_)));
    assert_eq!(resolution.booking().payment_ref.as_ref(), Some(&live.handle));
}

#[tokio::test]
async fn success_of_second_attempt_is_ignored_once_confirmed() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    stale_attempt(&env, &booking, "pay_duplicate").await;
    let live = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap();

    env.state
        .payments
        .on_payment_result(live.handle.as_str(), PaymentOutcome::Succeeded)
        .await
        .unwrap();
    let resolution = env
        .state
        .payments
        .on_payment_result("pay_duplicate", PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert!(matches!(resolution, PaymentResolution::Ignored(_)));
    assert_eq!(resolution.booking().state, BookingState::Confirmed);
    assert_eq!(resolution.booking().payment_ref.as_ref(), Some(&live.handle));
    assert_eq!(env.infrastructure.meetings.created_count(), 1);
}

#[tokio::test]
async fn success_after_failure_on_same_attempt_is_ignored() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("liam", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    let attempt = env
        .state
        .payments
        .initiate_payment(booking.id, PaymentMethod::Card)
        .await
        .unwrap();
    let handle = attempt.handle.as_str();

    let failed = env
        .state
        .payments
        .on_payment_result(handle, PaymentOutcome::Failed)
        .await
        .unwrap();
    assert!(matches!(failed, PaymentResolution::Cancelled(_)));

    let late = env
        .state
        .payments
        .on_payment_result(handle, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert!(matches!(late, PaymentResolution::Ignored(_)));
    assert_eq!(late.booking().state, BookingState::Cancelled);
}
