//! fulfillment-server binary

use std::time::Duration;

use fulfillment_server::api;
use fulfillment_server::config::Config;
use fulfillment_server::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Extra time past the provider session expiry before a hold is swept
const HOLD_SWEEP_GRACE_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fulfillment_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting fulfillment-server (env: {})", config.environment);

    let state = AppState::new(&config).await?;

    // Holds outlive their session only if the expiry webhook never arrives
    let max_age = Duration::from_secs(
        config.checkout.hold_ttl_minutes.max(0) as u64 * 60 + HOLD_SWEEP_GRACE_SECS,
    );
    let sweeper = state.sweeper.clone().spawn(
        Duration::from_secs(config.hold_sweep_interval_secs.max(1)),
        max_age,
    );

    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("fulfillment-server HTTP listening on {http_addr}");

    let result = axum::serve(listener, app).await;
    sweeper.abort();
    result?;
    Ok(())
}
