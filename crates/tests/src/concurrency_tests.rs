//! 并发预约同一时段时只有一个成功

use domain::{BookingFilter, BookingState, PaymentOutcome};
use futures::future::join_all;
use tests::{at, counsellor, TestEnvironment};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_for_same_slot_yield_one_booking() {
    let env = TestEnvironment::new().await;
    let start = at(1, 10, 0);

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let ledger = env.state.ledger.clone();
            let request =
                TestEnvironment::request("mira", &format!("student{i}@example.com"), start);
            tokio::spawn(async move { ledger.create(request).await })
        })
        .collect();

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| r.as_ref().is_err_and(|err| err.is_slot_conflict()))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, 15);

    let held = env
        .state
        .ledger
        .list_bookings(BookingFilter {
            counsellor_id: Some(counsellor("mira")),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(held.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_slots_yield_one_booking() {
    let env = TestEnvironment::new().await;
    let starts = [at(1, 10, 0), at(1, 10, 15), at(1, 10, 30), at(1, 9, 30)];

    let tasks: Vec<_> = starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let ledger = env.state.ledger.clone();
            let request =
                TestEnvironment::request("liam", &format!("student{i}@example.com"), *start);
            tokio::spawn(async move { ledger.create(request).await })
        })
        .collect();

    let succeeded = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| joined.as_ref().is_ok_and(|r| r.is_ok()))
        .count();
    assert_eq!(succeeded, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_success_callbacks_confirm_once() {
    let env = TestEnvironment::new().await;
    let booking = env
        .create("mira", "ana@example.com", at(1, 10, 0))
        .await
        .unwrap();
    let attempt = env
        .state
        .payments
        .initiate_payment(booking.id, domain::PaymentMethod::Upi)
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let payments = env.state.payments.clone();
            let handle = attempt.handle.as_str().to_owned();
            tokio::spawn(async move {
                payments
                    .on_payment_result(&handle, PaymentOutcome::Succeeded)
                    .await
            })
        })
        .collect();

    let resolutions: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    let confirmed = resolutions
        .iter()
        .filter(|r| matches!(r, application::PaymentResolution::Confirmed(_)))
        .count();
    assert_eq!(confirmed, 1);
    assert!(resolutions
        .iter()
        .all(|r| r.booking().state == BookingState::Confirmed));
    assert_eq!(env.infrastructure.meetings.created_count(), 1);
}
