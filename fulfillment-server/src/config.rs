//! Fulfillment server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which storage backend the server runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL (production)
    Postgres { database_url: String },
    /// Embedded redb file (local development)
    Embedded { path: String },
}

/// Checkout pricing policy, all amounts in minor currency units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPolicy {
    /// ISO 4217 currency code (lowercase, as the provider expects)
    pub currency: String,
    /// Subtotal below this is rejected
    pub min_order_value: i64,
    /// Subtotal at or above this ships free
    pub free_shipping_threshold: i64,
    /// Shipping charged below the free shipping threshold
    pub shipping_flat_rate: i64,
    /// How long stock stays held for an unfinished session
    pub hold_ttl_minutes: i64,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            currency: "eur".into(),
            min_order_value: 1_500,
            free_shipping_threshold: 5_000,
            shipping_flat_rate: 495,
            hold_ttl_minutes: 60,
        }
    }
}

/// Defaults for the checkout recovery cron pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryDefaults {
    /// Only sessions older than this are considered abandoned
    pub delay_minutes: i64,
    /// Maximum sessions scanned per pass
    pub batch_size: usize,
}

/// Fulfillment server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP port
    pub http_port: u16,
    pub store: StoreBackend,
    /// SES sender email address
    pub ses_from_email: String,
    /// Stripe secret key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret (empty = webhook endpoint answers 500)
    pub stripe_webhook_secret: String,
    /// Accepted webhook timestamp skew in seconds
    pub webhook_tolerance_secs: i64,
    /// Shared secret for the cron endpoint (empty = endpoint answers 500)
    pub cron_secret: String,
    /// JWT secret for customer authentication
    pub jwt_secret: String,
    /// Redirect after a completed checkout (`{CHECKOUT_SESSION_ID}` is substituted by Stripe)
    pub checkout_success_url: String,
    /// Redirect after an abandoned checkout
    pub checkout_cancel_url: String,
    /// Fallback resume link for recovery reminders
    pub storefront_cart_url: String,
    pub checkout: CheckoutPolicy,
    pub recovery: RecoveryDefaults,
    /// How often the hold sweeper runs
    pub hold_sweep_interval_secs: u64,
    /// A `processing` ledger row older than this can be reclaimed
    pub event_processing_lease_secs: i64,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let store = match std::env::var("STORE_BACKEND").as_deref() {
            Ok("embedded") => StoreBackend::Embedded {
                path: std::env::var("EMBEDDED_DB_PATH")
                    .unwrap_or_else(|_| "data/fulfillment.redb".into()),
            },
            Ok("postgres") | Err(_) => StoreBackend::Postgres {
                database_url: std::env::var("DATABASE_URL")
                    .map_err(|_| "DATABASE_URL must be set")?,
            },
            Ok(other) => return Err(format!("Unknown STORE_BACKEND: {other}").into()),
        };

        let policy_defaults = CheckoutPolicy::default();
        let checkout = CheckoutPolicy {
            currency: std::env::var("CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or(policy_defaults.currency),
            min_order_value: Self::parse_or("MIN_ORDER_VALUE", policy_defaults.min_order_value),
            free_shipping_threshold: Self::parse_or(
                "FREE_SHIPPING_THRESHOLD",
                policy_defaults.free_shipping_threshold,
            ),
            shipping_flat_rate: Self::parse_or(
                "SHIPPING_FLAT_RATE",
                policy_defaults.shipping_flat_rate,
            ),
            hold_ttl_minutes: Self::parse_or("HOLD_TTL_MINUTES", policy_defaults.hold_ttl_minutes),
        };

        Ok(Self {
            http_port: Self::parse_or("HTTP_PORT", 8080),
            store,
            ses_from_email: std::env::var("SES_FROM_EMAIL")
                .unwrap_or_else(|_| "orders@shop.example".into()),
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            webhook_tolerance_secs: Self::parse_or("WEBHOOK_TOLERANCE_SECS", 300),
            cron_secret: std::env::var("CRON_SECRET").unwrap_or_default(),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            checkout_success_url: std::env::var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
                "https://shop.example/checkout/success?session_id={CHECKOUT_SESSION_ID}".into()
            }),
            checkout_cancel_url: std::env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| "https://shop.example/cart".into()),
            storefront_cart_url: std::env::var("STOREFRONT_CART_URL")
                .unwrap_or_else(|_| "https://shop.example/cart".into()),
            checkout,
            recovery: RecoveryDefaults {
                delay_minutes: Self::parse_or("RECOVERY_DELAY_MINUTES", 60),
                batch_size: Self::parse_or("RECOVERY_BATCH_SIZE", 50),
            },
            hold_sweep_interval_secs: Self::parse_or("HOLD_SWEEP_INTERVAL_SECS", 300),
            event_processing_lease_secs: Self::parse_or("EVENT_PROCESSING_LEASE_SECS", 600),
            environment,
        })
    }
}
