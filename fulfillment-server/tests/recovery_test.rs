//! Abandoned checkout reminders

mod common;

use common::{Harness, abandoned_session};
use fulfillment_server::services::ledger::recovery_event_key;
use fulfillment_server::store::{EventLedgerStore, OrderStore};
use shared::event::EventStatus;
use shared::order::{Order, OrderAmounts, OrderStatus, PaymentStatus};
use std::time::Duration;

const DELAY: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_reminder_sent_once_per_session() {
    let h = Harness::new();
    h.customer("u1", "u1@example.com", true);
    h.provider
        .insert_session(abandoned_session("cs_a", Some("u1"), Some("u1@example.com")));

    let first = h.state.recovery.run(DELAY, 50).await.unwrap();
    assert_eq!(first.scanned, 1);
    assert_eq!(first.sent, 1);

    let second = h.state.recovery.run(DELAY, 50).await.unwrap();
    assert_eq!(second.sent, 0);
    assert_eq!(second.skipped, 1);

    assert_eq!(h.mailer.reminder_count(), 1);
    let (to, url) = h.mailer.reminders.lock().unwrap()[0].clone();
    assert_eq!(to, "u1@example.com");
    assert_eq!(url, "https://pay.example.com/recover/cs_a");

    let event = h
        .store
        .find_event(&recovery_event_key("cs_a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, EventStatus::Processed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_passes_send_one_reminder() {
    let h = Harness::new();
    h.customer("u1", "u1@example.com", true);
    h.provider
        .insert_session(abandoned_session("cs_a", Some("u1"), Some("u1@example.com")));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let recovery = h.state.recovery.clone();
            tokio::spawn(async move { recovery.run(DELAY, 50).await })
        })
        .collect();

    let mut sent = 0;
    for handle in handles {
        sent += handle.await.unwrap().unwrap().sent;
    }
    assert_eq!(sent, 1);
    assert_eq!(h.mailer.reminder_count(), 1);
}

#[tokio::test]
async fn test_skip_rules() {
    let h = Harness::new();
    h.customer("opted_in", "in@example.com", true);
    h.customer("opted_out", "out@example.com", false);

    // guest
    h.provider
        .insert_session(abandoned_session("cs_guest", None, Some("g@example.com")));
    // no email
    h.provider
        .insert_session(abandoned_session("cs_no_email", Some("opted_in"), None));
    // not opted in
    h.provider.insert_session(abandoned_session(
        "cs_opted_out",
        Some("opted_out"),
        Some("out@example.com"),
    ));
    // too recent
    let mut recent = abandoned_session("cs_recent", Some("opted_in"), Some("in@example.com"));
    recent.created = shared::util::now_secs();
    h.provider.insert_session(recent);
    // order already exists
    h.provider.insert_session(abandoned_session(
        "cs_ordered",
        Some("opted_in"),
        Some("in@example.com"),
    ));
    h.store
        .insert_order(&Order {
            id: "o1".into(),
            session_id: "cs_ordered".into(),
            customer_id: Some("opted_in".into()),
            customer_email: Some("in@example.com".into()),
            payment_intent_id: None,
            currency: "eur".into(),
            amounts: OrderAmounts::default(),
            status: OrderStatus::Complete,
            payment_status: PaymentStatus::Paid,
            shipping_address: None,
            discount_code: None,
            items: vec![],
            created_at: 0,
            updated_at: 0,
        })
        .await
        .unwrap();

    let report = h.state.recovery.run(DELAY, 50).await.unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.skipped, 4);
    assert_eq!(report.sent, 0);
    assert_eq!(h.mailer.reminder_count(), 0);
}

#[tokio::test]
async fn test_fallback_resume_url() {
    let h = Harness::new();
    h.customer("u1", "u1@example.com", true);
    let mut session = abandoned_session("cs_a", Some("u1"), Some("u1@example.com"));
    session.recovery_url = None;
    h.provider.insert_session(session);

    let report = h.state.recovery.run(DELAY, 50).await.unwrap();
    assert_eq!(report.sent, 1);
    let (_, url) = h.mailer.reminders.lock().unwrap()[0].clone();
    assert_eq!(url, "https://shop.example.com/cart");
}

#[tokio::test]
async fn test_failed_reminder_is_retried_on_next_pass() {
    let h = Harness::new();
    h.customer("u1", "u1@example.com", true);
    h.provider
        .insert_session(abandoned_session("cs_a", Some("u1"), Some("u1@example.com")));
    h.mailer.fail_reminders(true);

    let first = h.state.recovery.run(DELAY, 50).await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.sent, 0);
    let event = h
        .store
        .find_event(&recovery_event_key("cs_a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    assert!(event.last_error.is_some());

    h.mailer.fail_reminders(false);
    let second = h.state.recovery.run(DELAY, 50).await.unwrap();
    assert_eq!(second.sent, 1);
    assert_eq!(h.mailer.reminder_count(), 1);
    let event = h
        .store
        .find_event(&recovery_event_key("cs_a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.status, EventStatus::Processed);
}
