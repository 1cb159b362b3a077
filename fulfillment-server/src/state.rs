//! Application state

use aws_sdk_sesv2::Client as SesClient;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, RecoveryDefaults, StoreBackend};
use crate::email::{Mailer, SesMailer};
use crate::provider::{PaymentProvider, StripeClient};
use crate::services::{
    CheckoutInitiator, EventLedger, HoldSweeper, OrderMaterializer, RecoveryScheduler,
    ReservationManager, WebhookProcessor,
};
use crate::store::{EmbeddedStore, PgStore, Store};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub reservations: ReservationManager,
    pub checkout: CheckoutInitiator,
    pub materializer: OrderMaterializer,
    pub webhooks: WebhookProcessor,
    pub recovery: RecoveryScheduler,
    pub sweeper: HoldSweeper,
    /// Stripe webhook signing secret (empty = not configured)
    pub stripe_webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    /// Shared secret for cron endpoints (empty = not configured)
    pub cron_secret: String,
    /// JWT secret for customer authentication
    pub jwt_secret: String,
    pub recovery_defaults: RecoveryDefaults,
}

impl AppState {
    /// Connect the configured store, Stripe and SES
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let store: Arc<dyn Store> = match &config.store {
            StoreBackend::Postgres { database_url } => {
                Arc::new(PgStore::connect(database_url).await?)
            }
            StoreBackend::Embedded { path } => {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!(path = %path, "Using embedded store");
                Arc::new(EmbeddedStore::open(path)?)
            }
        };

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
            let ses_config = aws_config
                .to_builder()
                .region(aws_config::Region::new(ses_region))
                .build();
            SesClient::new(&ses_config)
        } else {
            SesClient::new(&aws_config)
        };

        let provider = Arc::new(StripeClient::new(&config.stripe_secret_key));
        let mailer = Arc::new(SesMailer::new(ses, &config.ses_from_email));

        Ok(Self::from_parts(config, store, provider, mailer))
    }

    /// Wire services over explicit collaborators
    pub fn from_parts(
        config: &Config,
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let reservations = ReservationManager::new(store.clone());
        let ledger = EventLedger::new(
            store.clone(),
            Duration::from_secs(config.event_processing_lease_secs.max(0) as u64),
        );
        let checkout = CheckoutInitiator::new(
            store.clone(),
            provider.clone(),
            reservations.clone(),
            config.checkout.clone(),
            &config.checkout_success_url,
            &config.checkout_cancel_url,
        );
        let materializer = OrderMaterializer::new(
            store.clone(),
            provider.clone(),
            mailer.clone(),
            reservations.clone(),
        );
        let webhooks = WebhookProcessor::new(
            store.clone(),
            ledger.clone(),
            materializer.clone(),
            reservations.clone(),
        );
        let sweeper = HoldSweeper::new(
            reservations.clone(),
            provider.clone(),
            materializer.clone(),
        );
        let recovery = RecoveryScheduler::new(
            store.clone(),
            provider,
            mailer,
            ledger,
            &config.storefront_cart_url,
        );

        Self {
            store,
            reservations,
            checkout,
            materializer,
            webhooks,
            recovery,
            sweeper,
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
            webhook_tolerance_secs: config.webhook_tolerance_secs,
            cron_secret: config.cron_secret.clone(),
            jwt_secret: config.jwt_secret.clone(),
            recovery_defaults: config.recovery.clone(),
        }
    }
}
