use deltabot::application::events::EventPublisher;
use deltabot::application::orchestrator::BotOrchestrator;
use deltabot::config::AppConfig;
use deltabot::domain::repositories::credential_store::{ApiCredentials, StaticCredentialStore};
use deltabot::infrastructure::binance_candles::BinanceCandles;
use deltabot::infrastructure::delta_client::DeltaClientFactory;
use deltabot::persistence::init_database;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deltabot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    info!("starting trading bot core");

    let pool = init_database(&config.database_url).await?;

    // Single-operator deployment: one key pair from the environment serves
    // every bot. A multi-tenant deployment swaps in a real credential store.
    let credentials = match (
        std::env::var("DELTA_API_KEY"),
        std::env::var("DELTA_API_SECRET"),
    ) {
        (Ok(key), Ok(secret)) if !key.is_empty() && !secret.is_empty() => {
            StaticCredentialStore::with_fallback(ApiCredentials {
                api_key: key,
                api_secret: secret,
            })
        }
        _ => {
            warn!("DELTA_API_KEY / DELTA_API_SECRET not set, bots will fail to start");
            StaticCredentialStore::new()
        }
    };

    let orchestrator = Arc::new(BotOrchestrator::new(
        pool,
        Arc::new(DeltaClientFactory::new()),
        Arc::new(credentials),
        Arc::new(BinanceCandles::new()),
        Arc::new(EventPublisher::new()),
        config,
    ));

    match orchestrator.resume_all().await {
        Ok(resumed) => info!(resumed, "resume-on-restart complete"),
        Err(err) => error!(error = %err, "startup resume failed"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // Statuses are left as-is so running bots come back on the next start.
    orchestrator.shutdown().await;
    info!("all strategy loops stopped, exiting");
    Ok(())
}
