//! Stale hold sweeping against provider session state

mod common;

use common::Harness;
use fulfillment_server::provider::{SessionPaymentStatus, SessionStatus};
use fulfillment_server::services::checkout::Buyer;
use fulfillment_server::store::{InventoryStore, OrderStore};
use shared::cart::{CartLine, CheckoutRequest};
use shared::error::ErrorCode;
use shared::inventory::HoldStatus;
use std::time::Duration;

fn request(qty: i64) -> CheckoutRequest {
    CheckoutRequest {
        country: "ES".into(),
        discount_code: None,
        items: vec![CartLine::new("v1", qty)],
    }
}

fn buyer(user_id: &str) -> Buyer {
    Buyer {
        user_id: Some(user_id.into()),
        email: Some(format!("{user_id}@example.com")),
    }
}

async fn sweep(h: &Harness) -> fulfillment_server::services::SweepReport {
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.state.sweeper.sweep_stale(Duration::ZERO, 10).await.unwrap()
}

#[tokio::test]
async fn test_completed_session_is_materialized_not_released() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);

    let paid = h
        .state
        .checkout
        .initiate(&request(3), &buyer("u1"))
        .await
        .unwrap();
    h.provider.complete(&paid.session_id);

    let report = sweep(&h).await;
    assert_eq!(report.materialized, 1);
    assert_eq!(report.released, 0);

    let order = h
        .store
        .find_order_by_session(&paid.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.items[0].quantity, 3);
    let inv = h.store.inventory("v1").await.unwrap().unwrap();
    assert_eq!(inv.quantity_on_hand, 2);
    assert_eq!(inv.reserved, 0);

    // the sold units are gone, so a cart for all five original units fails
    let err = h
        .state
        .checkout
        .initiate(&request(5), &buyer("u2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientInventory));

    // a late confirmation finds the order and moves no stock
    let confirmed = h
        .state
        .materializer
        .materialize(&paid.session_id, Some("u1"))
        .await
        .unwrap();
    assert!(!confirmed.is_created());
    let inv = h.store.inventory("v1").await.unwrap().unwrap();
    assert_eq!(inv.quantity_on_hand, 2);
    assert_eq!(inv.reserved, 0);
    assert!(inv.available() >= 0);
}

#[tokio::test]
async fn test_open_session_keeps_hold_until_expired() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);

    let resp = h
        .state
        .checkout
        .initiate(&request(3), &buyer("u1"))
        .await
        .unwrap();

    let report = sweep(&h).await;
    assert_eq!(report.released, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.store.inventory("v1").await.unwrap().unwrap().reserved, 3);

    h.provider.set_status(
        &resp.session_id,
        SessionStatus::Expired,
        SessionPaymentStatus::Unpaid,
    );
    let report = sweep(&h).await;
    assert_eq!(report.released, 1);

    let inv = h.store.inventory("v1").await.unwrap().unwrap();
    assert_eq!(inv.reserved, 0);
    assert_eq!(inv.available(), 5);
    let hold = h
        .store
        .find_hold_by_session(&resp.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hold.status, HoldStatus::Released);
    assert!(h.store.find_order_by_session(&resp.session_id).await.unwrap().is_none());
}
