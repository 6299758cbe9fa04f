//! Persistence Layer
//!
//! SQLite-backed storage for bot records and the trade ledger, async via
//! sqlx. The bot table is the source of truth for resume-on-restart; the
//! trade_logs table is the append-only audit trail of every order attempt.

pub mod models;
pub mod repository;

use crate::domain::errors::BotError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("query error: {0}")]
    QueryError(String),
}

impl From<DatabaseError> for BotError {
    fn from(e: DatabaseError) -> Self {
        BotError::Store(e.to_string())
    }
}

/// Initialize the connection pool and run migrations.
///
/// Accepts urls like `sqlite://data/deltabot.db` or `sqlite::memory:`.
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("initializing database: {}", database_url);

    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("database ready");
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bots (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            exchange TEXT NOT NULL,
            symbol TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            period INTEGER,
            oversold REAL,
            overbought REAL,
            quantity INTEGER,
            poll_interval_ms INTEGER,
            cooldown_ms INTEGER,
            status TEXT NOT NULL DEFAULT 'stopped',
            in_position INTEGER NOT NULL DEFAULT 0,
            entry_price REAL,
            last_action_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::QueryError(format!("failed to create bots table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trade_logs (
            id TEXT PRIMARY KEY,
            bot_id TEXT,
            user_id TEXT NOT NULL,
            exchange TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            order_type TEXT NOT NULL,
            quantity REAL NOT NULL,
            price REAL,
            exchange_order_id TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            realized_pnl REAL,
            raw_response TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::QueryError(format!("failed to create trade_logs table: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bots_status ON bots(status)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_logs_bot ON trade_logs(bot_id, created_at)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("failed to create index: {}", e)))?;

    Ok(())
}
