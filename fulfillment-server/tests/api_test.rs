//! Router-level behaviour: auth guards, webhook signatures, response shapes

mod common;

use axum::Router;
use axum::body::Body;
use common::{CRON_SECRET, Harness, JWT_SECRET, WEBHOOK_SECRET};
use fulfillment_server::api::create_router;
use fulfillment_server::auth::customer_auth::create_token;
use fulfillment_server::provider::signature::sign_payload;
use fulfillment_server::store::{InventoryStore, OrderStore};
use http::{Request, StatusCode, header};
use serde_json::{Value, json};
use shared::order::PaymentStatus;
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    create_router(h.state.clone())
}

fn bearer(customer_id: &str) -> String {
    let token = create_token(
        customer_id,
        &format!("{customer_id}@example.com"),
        JWT_SECRET,
        chrono::Duration::hours(1),
    )
    .unwrap();
    format!("Bearer {token}")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: &Value, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed_webhook(event: &Value) -> Request<Body> {
    let payload = event.to_string();
    let signature =
        sign_payload(payload.as_bytes(), WEBHOOK_SECRET, shared::util::now_secs()).unwrap();
    Request::post("/stripe/webhook")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
        .unwrap()
}

async fn checkout(h: &Harness, customer_id: &str, qty: i64) -> String {
    let body = json!({
        "country": "ES",
        "items": [{ "variantId": "v1", "quantity": qty }]
    });
    let (status, resp) = send(
        router(h),
        post_json("/api/checkout", &body, Some(&bearer(customer_id))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{resp}");
    resp["sessionId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let (status, body) = send(
        router(&h),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "fulfillment-server");
}

#[tokio::test]
async fn test_availability_exposes_only_available() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    checkout(&h, "u1", 2).await;

    let (status, body) = send(
        router(&h),
        Request::get("/api/variants/v1/availability")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], 3);
    assert!(body.get("reserved").is_none());

    let (status, _) = send(
        router(&h),
        Request::get("/api/variants/nope/availability")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_guest_checkout_and_bad_token() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    let body = json!({ "country": "ES", "items": [{ "variantId": "v1", "quantity": 2 }] });

    let (status, resp) = send(router(&h), post_json("/api/checkout", &body, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(resp["url"].as_str().unwrap().starts_with("https://"));

    let (status, _) = send(
        router(&h),
        post_json("/api/checkout", &body, Some("Bearer not-a-token")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_checkout_error_statuses() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);

    let empty = json!({ "country": "ES", "items": [] });
    let (status, _) = send(router(&h), post_json("/api/checkout", &empty, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_many = json!({ "country": "ES", "items": [{ "variantId": "v1", "quantity": 9 }] });
    let (status, _) = send(router(&h), post_json("/api/checkout", &too_many, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_confirm_requires_owner() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    let session_id = checkout(&h, "u1", 2).await;
    h.provider.complete(&session_id);
    let body = json!({ "sessionId": session_id });

    let (status, _) = send(router(&h), post_json("/api/checkout/confirm", &body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        router(&h),
        post_json("/api/checkout/confirm", &body, Some(&bearer("u2"))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, order) = send(
        router(&h),
        post_json("/api/checkout/confirm", &body, Some(&bearer("u1"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["sessionId"], session_id.as_str());
    assert_eq!(order["paymentStatus"], "paid");
}

#[tokio::test]
async fn test_webhook_signature_is_enforced() {
    let h = Harness::new();
    let event = json!({ "id": "evt_1", "type": "invoice.paid", "data": { "object": {} } });

    let (status, _) = send(router(&h), signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);

    let unsigned = Request::post("/stripe/webhook")
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, _) = send(router(&h), unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let forged = Request::post("/stripe/webhook")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from(event.to_string()))
        .unwrap();
    let (status, _) = send(router(&h), forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_without_secret_is_server_error() {
    let mut config = common::test_config();
    config.stripe_webhook_secret = String::new();
    let h = Harness::with_config(config);

    let event = json!({ "id": "evt_1", "type": "invoice.paid" });
    let (status, _) = send(router(&h), signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_redelivered_completed_event_creates_one_order() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    let session_id = checkout(&h, "u1", 2).await;
    h.provider.complete(&session_id);

    let event = json!({
        "id": "evt_completed",
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    });
    for _ in 0..3 {
        let (status, _) = send(router(&h), signed_webhook(&event)).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert!(h.store.find_order_by_session(&session_id).await.unwrap().is_some());
    assert_eq!(h.mailer.confirmation_count(), 1);
    let inv = h.store.inventory("v1").await.unwrap().unwrap();
    assert_eq!(inv.quantity_on_hand, 3);
}

#[tokio::test]
async fn test_failed_handler_returns_500_and_can_retry() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    let session_id = checkout(&h, "u1", 2).await;

    // session still open: materialization fails and the event stays retryable
    let event = json!({
        "id": "evt_early",
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    });
    let (status, _) = send(router(&h), signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    h.provider.complete(&session_id);
    let (status, _) = send(router(&h), signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.store.find_order_by_session(&session_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_refund_events_update_payment_status() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    let session_id = checkout(&h, "u1", 2).await;
    h.provider.complete(&session_id);
    let order = h
        .state
        .materializer
        .materialize(&session_id, None)
        .await
        .unwrap()
        .into_order();
    let intent = order.payment_intent_id.clone().unwrap();
    let total = order.amounts.total;

    let partial = json!({
        "id": "evt_refund_1",
        "type": "charge.refunded",
        "data": { "object": {
            "payment_intent": intent,
            "amount_captured": total,
            "amount_refunded": 500
        } }
    });
    let (status, _) = send(router(&h), signed_webhook(&partial)).await;
    assert_eq!(status, StatusCode::OK);
    let stored = h.store.find_order_by_session(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::PartiallyRefunded);
    assert_eq!(stored.amounts.refunded, 500);

    let full = json!({
        "id": "evt_refund_2",
        "type": "payment_intent.refunded",
        "data": { "object": {
            "id": intent,
            "amount_received": total,
            "amount_refunded": total
        } }
    });
    let (status, _) = send(router(&h), signed_webhook(&full)).await;
    assert_eq!(status, StatusCode::OK);
    let stored = h.store.find_order_by_session(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Refunded);
    assert_eq!(stored.amounts.refunded, total);
}

#[tokio::test]
async fn test_expired_session_releases_hold() {
    let h = Harness::new();
    h.variant("v1", 1000, 5);
    let session_id = checkout(&h, "u1", 3).await;
    assert_eq!(h.store.inventory("v1").await.unwrap().unwrap().reserved, 3);

    let event = json!({
        "id": "evt_expired",
        "type": "checkout.session.expired",
        "data": { "object": { "id": session_id } }
    });
    let (status, _) = send(router(&h), signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);

    let inv = h.store.inventory("v1").await.unwrap().unwrap();
    assert_eq!(inv.reserved, 0);
    assert_eq!(inv.quantity_on_hand, 5);
}

#[tokio::test]
async fn test_cron_requires_secret() {
    let h = Harness::new();

    let (status, _) = send(
        router(&h),
        Request::get("/api/cron/checkout-recovery")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, report) = send(
        router(&h),
        Request::get("/api/cron/checkout-recovery?limit=10")
            .header(header::AUTHORIZATION, format!("Bearer {CRON_SECRET}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["scanned"], 0);
}

#[tokio::test]
async fn test_cron_accepts_huge_delay() {
    let h = Harness::new();
    h.customer("u1", "u1@example.com", true);
    h.provider.insert_session(common::abandoned_session(
        "cs_a",
        Some("u1"),
        Some("u1@example.com"),
    ));

    let (status, report) = send(
        router(&h),
        Request::get(format!(
            "/api/cron/checkout-recovery?delay_minutes={}",
            u64::MAX
        ))
        .header(header::AUTHORIZATION, format!("Bearer {CRON_SECRET}"))
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // nothing is older than the saturated delay
    assert_eq!(report["scanned"], 0);
    assert_eq!(h.mailer.reminder_count(), 0);
}
