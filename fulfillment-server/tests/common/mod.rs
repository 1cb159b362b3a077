//! Shared test harness: in-memory store, scripted provider, recording mailer

#![allow(dead_code)]

use async_trait::async_trait;
use fulfillment_server::config::{CheckoutPolicy, Config, RecoveryDefaults, StoreBackend};
use fulfillment_server::email::Mailer;
use fulfillment_server::provider::{
    CheckoutSessionRequest, PaymentProvider, ProviderError, ProviderLineItem, ProviderSession,
    Promotion, SessionDetail, SessionPaymentStatus, SessionStatus,
};
use fulfillment_server::state::AppState;
use fulfillment_server::store::EmbeddedStore;
use shared::catalog::{Customer, Variant};
use shared::order::{Order, OrderAmounts};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const CRON_SECRET: &str = "cron-test-secret";

pub fn test_config() -> Config {
    Config {
        environment: "test".into(),
        http_port: 0,
        store: StoreBackend::Embedded {
            path: "unused".into(),
        },
        ses_from_email: "shop@example.com".into(),
        stripe_secret_key: String::new(),
        stripe_webhook_secret: WEBHOOK_SECRET.into(),
        webhook_tolerance_secs: 300,
        cron_secret: CRON_SECRET.into(),
        jwt_secret: JWT_SECRET.into(),
        checkout_success_url: "https://shop.example.com/success".into(),
        checkout_cancel_url: "https://shop.example.com/cart".into(),
        storefront_cart_url: "https://shop.example.com/cart".into(),
        checkout: CheckoutPolicy::default(),
        recovery: RecoveryDefaults {
            delay_minutes: 60,
            batch_size: 50,
        },
        hold_sweep_interval_secs: 300,
        event_processing_lease_secs: 600,
    }
}

/// Provider double that keeps sessions in memory
#[derive(Default)]
pub struct FakeProvider {
    sessions: Mutex<HashMap<String, SessionDetail>>,
    line_items: Mutex<HashMap<String, Vec<ProviderLineItem>>>,
    promotions: Mutex<HashMap<String, Promotion>>,
    fail_create: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeProvider {
    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn add_promotion(&self, code: &str) {
        self.promotions.lock().unwrap().insert(
            code.to_string(),
            Promotion {
                id: format!("promo_{code}"),
                code: code.to_string(),
            },
        );
    }

    pub fn session(&self, session_id: &str) -> Option<SessionDetail> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Mark a session as paid and complete
    pub fn complete(&self, session_id: &str) {
        self.set_status(session_id, SessionStatus::Complete, SessionPaymentStatus::Paid);
    }

    pub fn set_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        payment_status: SessionPaymentStatus,
    ) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).expect("unknown session");
        session.status = status;
        session.payment_status = payment_status;
        if status == SessionStatus::Complete {
            session.payment_intent_id = Some(format!("pi_{session_id}"));
        }
    }

    /// Insert a session directly (recovery scenarios)
    pub fn insert_session(&self, session: SessionDetail) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }
}

/// An abandoned open session created long ago
pub fn abandoned_session(id: &str, user_id: Option<&str>, email: Option<&str>) -> SessionDetail {
    SessionDetail {
        id: id.to_string(),
        status: SessionStatus::Open,
        payment_status: SessionPaymentStatus::Unpaid,
        customer_email: email.map(String::from),
        user_id: user_id.map(String::from),
        hold_id: None,
        currency: "eur".into(),
        amounts: OrderAmounts::default(),
        payment_intent_id: None,
        shipping_address: None,
        discount_code: None,
        recovery_url: Some(format!("https://pay.example.com/recover/{id}")),
        created: shared::util::now_secs() - 3 * 3600,
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProviderSession, ProviderError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                message: "provider unavailable".into(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{n}");

        let subtotal: i64 = request
            .lines
            .iter()
            .map(|l| l.unit_amount * l.quantity)
            .sum();
        let items = request
            .lines
            .iter()
            .map(|l| ProviderLineItem {
                name: l.name.clone(),
                quantity: l.quantity,
                unit_amount: l.unit_amount,
                amount_total: l.unit_amount * l.quantity,
                product_id: Some(l.product_id.clone()),
                variant_id: Some(l.variant_id.clone()),
                options: l.options.clone(),
            })
            .collect();

        let detail = SessionDetail {
            id: id.clone(),
            status: SessionStatus::Open,
            payment_status: SessionPaymentStatus::Unpaid,
            customer_email: request.customer_email.clone(),
            user_id: request.user_id.clone(),
            hold_id: Some(request.hold_id.clone()),
            currency: request.currency.clone(),
            amounts: OrderAmounts {
                subtotal,
                tax: 0,
                shipping: request.shipping_amount,
                discount: 0,
                total: subtotal + request.shipping_amount,
                refunded: 0,
            },
            payment_intent_id: None,
            shipping_address: None,
            discount_code: request.discount_code.clone(),
            recovery_url: None,
            created: shared::util::now_secs(),
        };
        self.sessions.lock().unwrap().insert(id.clone(), detail);
        self.line_items.lock().unwrap().insert(id.clone(), items);

        Ok(ProviderSession {
            url: format!("https://pay.example.com/{id}"),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionDetail>, ProviderError> {
        Ok(self.session(session_id))
    }

    async fn list_line_items(
        &self,
        session_id: &str,
    ) -> Result<Vec<ProviderLineItem>, ProviderError> {
        Ok(self
            .line_items
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_sessions(
        &self,
        created_before: i64,
        limit: usize,
    ) -> Result<Vec<SessionDetail>, ProviderError> {
        let mut sessions: Vec<SessionDetail> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.created < created_before)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn find_promotion_code(&self, code: &str) -> Result<Option<Promotion>, ProviderError> {
        Ok(self.promotions.lock().unwrap().get(code).cloned())
    }
}

/// Mailer double recording every delivered message
#[derive(Default)]
pub struct RecordingMailer {
    pub confirmations: Mutex<Vec<(String, String)>>,
    pub reminders: Mutex<Vec<(String, String)>>,
    fail_confirmations: AtomicBool,
    fail_reminders: AtomicBool,
}

impl RecordingMailer {
    pub fn fail_confirmations(&self, fail: bool) {
        self.fail_confirmations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reminders(&self, fail: bool) {
        self.fail_reminders.store(fail, Ordering::SeqCst);
    }

    pub fn reminder_count(&self) -> usize {
        self.reminders.lock().unwrap().len()
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_order_confirmation(&self, to: &str, order: &Order) -> Result<(), BoxError> {
        if self.fail_confirmations.load(Ordering::SeqCst) {
            return Err("smtp unavailable".into());
        }
        self.confirmations
            .lock()
            .unwrap()
            .push((to.to_string(), order.id.clone()));
        Ok(())
    }

    async fn send_recovery_reminder(&self, to: &str, resume_url: &str) -> Result<(), BoxError> {
        // widen the race window for concurrent recovery passes
        tokio::task::yield_now().await;
        if self.fail_reminders.load(Ordering::SeqCst) {
            return Err("smtp unavailable".into());
        }
        self.reminders
            .lock()
            .unwrap()
            .push((to.to_string(), resume_url.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: EmbeddedStore,
    pub provider: Arc<FakeProvider>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = EmbeddedStore::open_in_memory().expect("in-memory store");
        let provider = Arc::new(FakeProvider::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::from_parts(
            &config,
            Arc::new(store.clone()),
            provider.clone(),
            mailer.clone(),
        );
        Self {
            state,
            store,
            provider,
            mailer,
        }
    }

    /// Active variant priced at `unit_amount` with `on_hand` units
    pub fn variant(&self, id: &str, unit_amount: i64, on_hand: i64) {
        let variant = Variant {
            id: id.to_string(),
            product_id: format!("prod_{id}"),
            name: format!("Variant {id}"),
            unit_amount,
            active: true,
        };
        self.store.put_variant(&variant, on_hand).expect("seed variant");
    }

    pub fn customer(&self, id: &str, email: &str, reminder_opt_in: bool) {
        let customer = Customer {
            id: id.to_string(),
            email: email.to_string(),
            reminder_opt_in,
        };
        self.store.put_customer(&customer).expect("seed customer");
    }
}
