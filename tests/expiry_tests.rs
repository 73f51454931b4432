mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use storefront::application::workflow::AdminOutcome;
use storefront::domain::account::{Balance, Customer};
use storefront::domain::payment::{PaymentMethod, PaymentState, PendingPayment};
use storefront::domain::ports::{Snapshot, SnapshotStore};
use storefront::infrastructure::in_memory::InMemorySnapshotStore;

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_deposit_expires() {
    let h = harness().await;
    let payment = h
        .workflow
        .start_deposit(&Customer::new(ALICE), dec!(1000), "sbp", &h.pressed(ALICE))
        .await
        .unwrap();

    tokio::time::sleep(9 * MINUTE).await;
    assert_eq!(
        h.workflow.registry().state_of(&payment.id).await,
        Some(PaymentState::AwaitingScreenshot)
    );

    tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
    assert_eq!(
        h.workflow.registry().state_of(&payment.id).await,
        Some(PaymentState::Expired)
    );
    assert!(h.workflow.registry().active_for(ALICE).await.is_none());
    assert!(!h.workflow.scheduler().is_armed(&payment.id));
    assert_eq!(h.workflow.ledger().balance(ALICE).await, Balance::ZERO);
    assert!(h.workflow.ledger().history(ALICE, 10).await.is_empty());

    assert!(
        h.notifier
            .texts_for(ALICE)
            .last()
            .unwrap()
            .contains("expired")
    );
    assert_eq!(h.notifier.admin_texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_screenshot_at_minute_nine_beats_the_timer() {
    let h = harness().await;
    let alice = Customer::new(ALICE);
    let payment = h
        .workflow
        .start_deposit(&alice, dec!(1000), "sbp", &h.pressed(ALICE))
        .await
        .unwrap();

    tokio::time::sleep(9 * MINUTE).await;
    h.workflow
        .submit_screenshot(&alice, "photo".to_string(), None, &h.sent(ALICE))
        .await
        .unwrap();

    tokio::time::sleep(5 * MINUTE).await;
    assert_eq!(
        h.workflow.registry().state_of(&payment.id).await,
        Some(PaymentState::UserSubmitted)
    );
    assert!(h.notifier.admin_texts().is_empty());

    let outcome = h.workflow.approve(ADMIN, &payment.id).await.unwrap();
    assert!(matches!(outcome, AdminOutcome::Approved(_)));
    assert_eq!(h.workflow.ledger().balance(ALICE).await, Balance::new(dec!(1000)));
    let history = h.workflow.ledger().history(ALICE, 10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, dec!(1000));
    assert!(h.workflow.registry().get(&payment.id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expire_is_idempotent() {
    let h = harness().await;
    let payment = h
        .workflow
        .start_deposit(&Customer::new(ALICE), dec!(500), "sbp", &h.pressed(ALICE))
        .await
        .unwrap();

    assert!(h.workflow.expire(&payment.id).await);
    assert!(!h.workflow.expire(&payment.id).await);
    assert!(!h.workflow.expire("DEP_404_0").await);

    // The armed timer finds nothing left to expire.
    tokio::time::sleep(11 * MINUTE).await;
    assert_eq!(h.notifier.admin_texts().len(), 1);
    assert_eq!(
        h.workflow.registry().state_of(&payment.id).await,
        Some(PaymentState::Expired)
    );
}

#[tokio::test(start_paused = true)]
async fn test_decision_after_expiry_is_already_handled() {
    let h = harness().await;
    let payment = h
        .workflow
        .start_deposit(&Customer::new(ALICE), dec!(500), "sbp", &h.pressed(ALICE))
        .await
        .unwrap();
    tokio::time::sleep(11 * MINUTE).await;

    let outcome = h.workflow.approve(ADMIN, &payment.id).await.unwrap();
    assert_eq!(
        outcome,
        AdminOutcome::AlreadyHandled {
            payment_id: payment.id.clone(),
            state: Some(PaymentState::Expired),
        }
    );
    assert_eq!(h.workflow.ledger().balance(ALICE).await, Balance::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_balance_orders_never_expire() {
    let h = harness().await;
    h.top_up(ALICE, dec!(1000)).await;
    h.fill_cart(ALICE, &[1]).await;
    let order = h
        .workflow
        .checkout_balance(&Customer::new(ALICE), &h.pressed(ALICE))
        .await
        .unwrap();

    tokio::time::sleep(60 * MINUTE).await;
    assert_eq!(
        h.workflow.registry().state_of(&order.id).await,
        Some(PaymentState::UserSubmitted)
    );
}

#[tokio::test(start_paused = true)]
async fn test_restored_payment_keeps_its_remaining_window() {
    let created_at = Utc::now() - ChronoDuration::minutes(8);
    let waiting = PendingPayment::deposit(
        format!("DEP_{ALICE}_{}", created_at.timestamp_millis()),
        ALICE,
        dec!(1000),
        PaymentMethod::External {
            key: "sbp".to_string(),
            name: "SBP".to_string(),
        },
        created_at,
    );
    let mut submitted = PendingPayment::deposit(
        format!("DEP_{BOB}_{}", created_at.timestamp_millis()),
        BOB,
        dec!(300),
        PaymentMethod::External {
            key: "sbp".to_string(),
            name: "SBP".to_string(),
        },
        created_at,
    );
    submitted
        .attach_screenshot("photo".to_string(), None, created_at)
        .unwrap();

    let store = InMemorySnapshotStore::from_snapshot(Snapshot {
        pending_payments: vec![waiting.clone(), submitted.clone()],
        ..Snapshot::default()
    });
    let h = harness_with(settings(), Arc::new(store)).await;
    assert!(h.workflow.scheduler().is_armed(&waiting.id));
    assert!(!h.workflow.scheduler().is_armed(&submitted.id));

    tokio::time::sleep(MINUTE).await;
    assert_eq!(
        h.workflow.registry().state_of(&waiting.id).await,
        Some(PaymentState::AwaitingScreenshot)
    );

    tokio::time::sleep(MINUTE + Duration::from_secs(5)).await;
    assert_eq!(
        h.workflow.registry().state_of(&waiting.id).await,
        Some(PaymentState::Expired)
    );
    assert_eq!(
        h.workflow.registry().state_of(&submitted.id).await,
        Some(PaymentState::UserSubmitted)
    );
}

#[tokio::test(start_paused = true)]
async fn test_overdue_restored_payment_expires_at_once() {
    let created_at = Utc::now() - ChronoDuration::hours(1);
    let overdue = PendingPayment::deposit(
        "DEP_1_1".to_string(),
        ALICE,
        dec!(1000),
        PaymentMethod::External {
            key: "sbp".to_string(),
            name: "SBP".to_string(),
        },
        created_at,
    );
    let store = InMemorySnapshotStore::from_snapshot(Snapshot {
        pending_payments: vec![overdue],
        ..Snapshot::default()
    });
    let h = harness_with(settings(), Arc::new(store.clone())).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        h.workflow.registry().state_of("DEP_1_1").await,
        Some(PaymentState::Expired)
    );
    assert!(store.load().await.unwrap().pending_payments.is_empty());
}
