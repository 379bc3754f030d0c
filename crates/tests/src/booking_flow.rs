//! 预约全流程：创建、冲突、确认、反馈、惰性过期

use chrono::Duration;
use domain::{BookingState, CancelActor, DomainError, PaymentOutcome, TimeRange};
use tests::{at, counsellor, test_config, TestEnvironment};

fn domain_error(err: &application::ApplicationError) -> Option<&DomainError> {
    err.domain()
}

#[tokio::test]
async fn booking_conflict_confirmation_and_single_feedback() {
    let env = TestEnvironment::new().await;
    let start = at(1, 10, 0);

    let b1 = env.create("mira", "ana@example.com", start).await.unwrap();
    assert_eq!(b1.state, BookingState::PendingPayment);
    assert_eq!(b1.slot.end(), at(1, 10, 45));

    let err = env.create("mira", "ben@example.com", start).await.unwrap_err();
    assert!(err.is_slot_conflict());

    let confirmed = env
        .pay(b1.id, PaymentOutcome::Succeeded)
        .await
        .unwrap()
        .booking()
        .clone();
    assert_eq!(confirmed.state, BookingState::Confirmed);
    assert!(confirmed.meeting_ref.is_some());

    env.set_now(at(1, 11, 0));
    let feedback = env
        .state
        .feedback
        .submit_feedback(b1.id, 5, Some("great".into()))
        .await
        .unwrap();
    assert_eq!(feedback.rating.value(), 5);
    assert_eq!(feedback.counsellor_id, counsellor("mira"));

    let err = env
        .state
        .feedback
        .submit_feedback(b1.id, 4, None)
        .await
        .unwrap_err();
    assert_eq!(domain_error(&err), Some(&DomainError::DuplicateFeedback));

    let listed = env
        .state
        .feedback
        .list_feedback(Some(counsellor("mira")))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].comment.as_deref(), Some("great"));
}

#[tokio::test]
async fn unpaid_booking_expires_lazily_and_slot_reappears() {
    let env = TestEnvironment::new().await;
    env.confirmed_booking("mira", "ana@example.com", at(1, 10, 0))
        .await;
    let b2 = env
        .create("mira", "ben@example.com", at(1, 11, 0))
        .await
        .unwrap();

    let window = TimeRange::new(at(1, 9, 0), at(1, 12, 0)).unwrap();
    let starts = |slots: Vec<domain::Slot>| slots.into_iter().map(|s| s.start).collect::<Vec<_>>();

    let before = env
        .state
        .availability
        .get_available_slots(&counsellor("mira"), window)
        .await
        .unwrap();
    assert_eq!(starts(before), vec![at(1, 9, 0)]);

    env.clock.advance(Duration::minutes(16));
    let after = env
        .state
        .availability
        .get_available_slots(&counsellor("mira"), window)
        .await
        .unwrap();
    assert_eq!(starts(after), vec![at(1, 9, 0), at(1, 11, 0)]);

    let expired = env.state.ledger.get_booking(b2.id).await.unwrap();
    assert_eq!(expired.state, BookingState::Expired);
}

#[tokio::test]
async fn expired_booking_frees_slot_for_another_student() {
    let env = TestEnvironment::new().await;
    let start = at(2, 14, 0);
    let first = env.create("liam", "ana@example.com", start).await.unwrap();

    env.clock.advance(Duration::minutes(15));
    let second = env.create("liam", "ben@example.com", start).await.unwrap();
    assert_ne!(first.id, second.id);

    let first = env.state.ledger.get_booking(first.id).await.unwrap();
    assert_eq!(first.state, BookingState::Expired);

    let err = env
        .pay(first.id, PaymentOutcome::Succeeded)
        .await
        .unwrap_err();
    assert_eq!(domain_error(&err), Some(&DomainError::Expired));
}

#[tokio::test]
async fn overlapping_start_times_conflict() {
    let env = TestEnvironment::new().await;
    env.create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();

    let err = env
        .create("mira", "ben@example.com", at(1, 10, 30))
        .await
        .unwrap_err();
    assert!(err.is_slot_conflict());

    // 首尾相接不算冲突
    env.create("mira", "ben@example.com", at(1, 10, 45))
        .await
        .unwrap();
    // 其他顾问不受影响
    env.create("liam", "ben@example.com", at(1, 10, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn confirmed_booking_cannot_be_cancelled_inside_window() {
    let env = TestEnvironment::new().await;
    let booking = env
        .confirmed_booking("mira", "ana@example.com", at(1, 10, 0))
        .await;

    env.set_now(at(1, 8, 30));
    let err = env
        .state
        .ledger
        .cancel(booking.id, CancelActor::Student, None)
        .await
        .unwrap_err();
    assert_eq!(domain_error(&err), Some(&DomainError::CancellationWindowClosed));

    env.set_now(at(1, 7, 0));
    let cancelled = env
        .state
        .ledger
        .cancel(booking.id, CancelActor::Counsellor, Some(" sick ".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.state, BookingState::Cancelled);
    let cancellation = cancelled.cancellation.unwrap();
    assert_eq!(cancellation.actor, CancelActor::Counsellor);
    assert_eq!(cancellation.reason.as_deref(), Some("sick"));

    env.create("mira", "ben@example.com", at(1, 10, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn completion_waits_for_session_end() {
    let env = TestEnvironment::new().await;
    let booking = env
        .confirmed_booking("liam", "ana@example.com", at(3, 16, 0))
        .await;

    env.set_now(at(3, 16, 30));
    let err = env.state.ledger.complete(booking.id).await.unwrap_err();
    assert!(matches!(
        domain_error(&err),
        Some(DomainError::InvalidState { state: BookingState::Confirmed, .. })
    ));

    env.set_now(at(3, 16, 45));
    let completed = env.state.ledger.complete(booking.id).await.unwrap();
    assert_eq!(completed.state, BookingState::Completed);
    let again = env.state.ledger.complete(booking.id).await.unwrap();
    assert_eq!(again.updated_at, completed.updated_at);
}

#[tokio::test]
async fn deactivated_counsellor_keeps_existing_bookings() {
    let env = TestEnvironment::new().await;
    let booking = env
        .confirmed_booking("mira", "ana@example.com", at(1, 10, 0))
        .await;

    env.state
        .directory
        .deactivate(&counsellor("mira"))
        .await
        .unwrap();

    let err = env
        .create("mira", "ben@example.com", at(1, 12, 0))
        .await
        .unwrap_err();
    assert_eq!(domain_error(&err), Some(&DomainError::CounsellorInactive));

    let kept = env.state.ledger.get_booking(booking.id).await.unwrap();
    assert_eq!(kept.state, BookingState::Confirmed);
}

#[tokio::test]
async fn pending_cap_applies_across_counsellors() {
    let mut config = test_config();
    config.booking.max_pending_per_student = Some(1);
    let env = TestEnvironment::with_config(config).await;

    env.create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    let err = env
        .create("liam", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap_err();
    assert_eq!(domain_error(&err), Some(&DomainError::PendingLimitReached));

    env.create("liam", "ben@example.com", at(1, 10, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn past_slots_are_rejected() {
    let env = TestEnvironment::new().await;
    let err = env
        .create("mira", "ana@example.com", at(1, 10, 0) - Duration::days(2))
        .await
        .unwrap_err();
    assert!(matches!(
        domain_error(&err),
        Some(DomainError::InvalidArgument { field, .. }) if field == "slot_start"
    ));
}
