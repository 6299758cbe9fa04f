//! Database Repository
//!
//! Data access layer for bot records and trade logs.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::bot::{BotRuntime, BotStatus};
use chrono::Utc;
use tracing::{debug, error};

/// Bot repository
pub struct BotRepository {
    pool: DbPool,
}

impl BotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new bot. New bots start stopped and flat.
    pub async fn create(&self, bot: CreateBot) -> Result<BotRecord, DatabaseError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, BotRecord>(
            r#"
            INSERT INTO bots (
                id, user_id, name, exchange, symbol, timeframe,
                period, oversold, overbought, quantity, poll_interval_ms, cooldown_ms,
                status, in_position, entry_price, last_action_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                    'stopped', 0, NULL, NULL, ?13, ?13)
            RETURNING *
            "#,
        )
        .bind(&bot.id)
        .bind(&bot.user_id)
        .bind(&bot.name)
        .bind(&bot.exchange)
        .bind(&bot.symbol)
        .bind(&bot.timeframe)
        .bind(bot.period)
        .bind(bot.oversold)
        .bind(bot.overbought)
        .bind(bot.quantity)
        .bind(bot.poll_interval_ms)
        .bind(bot.cooldown_ms)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create bot: {}", e);
            DatabaseError::QueryError(format!("Failed to create bot: {}", e))
        })?;

        debug!("Created bot: {} ({})", record.id, record.name);
        Ok(record)
    }

    /// Get bot by ID
    pub async fn get(&self, id: &str) -> Result<Option<BotRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, BotRecord>("SELECT * FROM bots WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get bot {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to get bot: {}", e))
            })?;

        Ok(record)
    }

    /// Find a user's bot by display name.
    pub async fn find_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<BotRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, BotRecord>(
            "SELECT * FROM bots WHERE user_id = ?1 AND name = ?2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find bot {} for {}: {}", name, user_id, e);
            DatabaseError::QueryError(format!("Failed to find bot: {}", e))
        })?;

        Ok(record)
    }

    /// All bots for a user
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<BotRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, BotRecord>(
            "SELECT * FROM bots WHERE user_id = ?1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list bots for {}: {}", user_id, e);
            DatabaseError::QueryError(format!("Failed to list bots: {}", e))
        })?;

        Ok(records)
    }

    /// All bots currently marked with the given status, across users.
    /// Used at startup to resume whatever was running before the restart.
    pub async fn find_by_status(&self, status: BotStatus) -> Result<Vec<BotRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, BotRecord>(
            "SELECT * FROM bots WHERE status = ?1 ORDER BY created_at",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find {} bots: {}", status, e);
            DatabaseError::QueryError(format!("Failed to find bots by status: {}", e))
        })?;

        Ok(records)
    }

    /// Persist a status transition.
    pub async fn set_status(&self, id: &str, status: BotStatus) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            "UPDATE bots SET status = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to set status for bot {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to set bot status: {}", e))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!("Bot not found: {}", id)));
        }

        debug!("Bot {} -> {}", id, status);
        Ok(())
    }

    /// Persist runtime state after a confirmed transition.
    pub async fn update_runtime(
        &self,
        id: &str,
        runtime: &BotRuntime,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"
            UPDATE bots
            SET in_position = ?1, entry_price = ?2, last_action_at = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(runtime.in_position)
        .bind(runtime.entry_price)
        .bind(runtime.last_action_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update runtime for bot {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to update bot runtime: {}", e))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!("Bot not found: {}", id)));
        }

        Ok(())
    }

    /// Delete a bot. The trade ledger keeps its rows; bot_id dangles on
    /// purpose so history survives deletion.
    pub async fn delete(&self, id: &str) -> Result<(), DatabaseError> {
        let rows_affected = sqlx::query("DELETE FROM bots WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete bot {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to delete bot: {}", e))
            })?
            .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!("Bot not found: {}", id)));
        }

        debug!("Deleted bot: {}", id);
        Ok(())
    }
}

/// Trade ledger repository
pub struct TradeLogRepository {
    pool: DbPool,
}

impl TradeLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record an attempt before the order goes to the wire. The row stays
    /// PENDING until [`finalize`](Self::finalize) settles it.
    pub async fn record_attempt(
        &self,
        log: CreateTradeLog,
    ) -> Result<TradeLogRecord, DatabaseError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, TradeLogRecord>(
            r#"
            INSERT INTO trade_logs (
                id, bot_id, user_id, exchange, symbol, side, order_type,
                quantity, price, exchange_order_id, status, realized_pnl,
                raw_response, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, 'PENDING', NULL, NULL, ?10, ?10)
            RETURNING *
            "#,
        )
        .bind(&log.id)
        .bind(&log.bot_id)
        .bind(&log.user_id)
        .bind(&log.exchange)
        .bind(&log.symbol)
        .bind(&log.side)
        .bind(&log.order_type)
        .bind(log.quantity)
        .bind(log.price)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record trade attempt: {}", e);
            DatabaseError::QueryError(format!("Failed to record trade attempt: {}", e))
        })?;

        debug!("Recorded trade attempt: {} {} {}", record.id, record.side, record.symbol);
        Ok(record)
    }

    /// Settle a PENDING row with its final outcome.
    pub async fn finalize(
        &self,
        id: &str,
        outcome: TradeLogOutcome,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now();
        let raw = match &outcome.raw_response {
            Some(v) => Some(serde_json::to_string(v).map_err(|e| {
                DatabaseError::QueryError(format!("Failed to serialize raw response: {}", e))
            })?),
            None => None,
        };

        let rows_affected = sqlx::query(
            r#"
            UPDATE trade_logs
            SET status = ?1, price = COALESCE(?2, price), exchange_order_id = ?3,
                realized_pnl = ?4, raw_response = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(&outcome.status)
        .bind(outcome.price)
        .bind(&outcome.exchange_order_id)
        .bind(outcome.realized_pnl)
        .bind(raw)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to finalize trade log {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to finalize trade log: {}", e))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!(
                "Trade log not found: {}",
                id
            )));
        }

        debug!("Finalized trade log {} as {}", id, outcome.status);
        Ok(())
    }

    /// Most recent ledger rows for a bot, newest first.
    pub async fn recent_for_bot(
        &self,
        bot_id: &str,
        limit: i64,
    ) -> Result<Vec<TradeLogRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeLogRecord>(
            r#"
            SELECT * FROM trade_logs
            WHERE bot_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(bot_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch trade logs for {}: {}", bot_id, e);
            DatabaseError::QueryError(format!("Failed to fetch trade logs: {}", e))
        })?;

        Ok(records)
    }

    /// Most recent ledger rows for a user across bots, newest first.
    pub async fn recent_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<TradeLogRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeLogRecord>(
            r#"
            SELECT * FROM trade_logs
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch trade logs for user {}: {}", user_id, e);
            DatabaseError::QueryError(format!("Failed to fetch trade logs: {}", e))
        })?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    async fn test_pool() -> DbPool {
        init_database("sqlite::memory:").await.unwrap()
    }

    fn sample_bot(id: &str, name: &str) -> CreateBot {
        CreateBot {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            name: name.to_string(),
            exchange: "delta".to_string(),
            symbol: "BTCUSD".to_string(),
            timeframe: "5m".to_string(),
            period: Some(14),
            oversold: Some(30.0),
            overbought: Some(70.0),
            quantity: Some(1),
            poll_interval_ms: Some(15_000),
            cooldown_ms: Some(60_000),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_bot() {
        let pool = test_pool().await;
        let repo = BotRepository::new(pool);

        let record = repo.create(sample_bot("bot-1", "btc-rsi")).await.unwrap();
        assert_eq!(record.status, "stopped");
        assert!(!record.in_position);

        let fetched = repo.get("bot-1").await.unwrap().unwrap();
        assert_eq!(fetched.name, "btc-rsi");
        assert_eq!(fetched.symbol, "BTCUSD");

        assert!(repo.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_to_bot_normalizes_params() {
        let pool = test_pool().await;
        let repo = BotRepository::new(pool);

        let mut input = sample_bot("bot-2", "defaults");
        input.period = None;
        input.oversold = None;
        input.overbought = None;
        let record = repo.create(input).await.unwrap();

        let bot = record.to_bot().unwrap();
        assert_eq!(bot.params.period, 14);
        assert_eq!(bot.params.oversold, 30.0);
        assert_eq!(bot.params.overbought, 70.0);
        assert!(!bot.runtime.in_position);
    }

    #[tokio::test]
    async fn test_status_transitions_and_resume_query() {
        let pool = test_pool().await;
        let repo = BotRepository::new(pool);

        repo.create(sample_bot("bot-a", "a")).await.unwrap();
        repo.create(sample_bot("bot-b", "b")).await.unwrap();
        repo.set_status("bot-a", BotStatus::Running).await.unwrap();

        let running = repo.find_by_status(BotStatus::Running).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, "bot-a");

        let stopped = repo.find_by_status(BotStatus::Stopped).await.unwrap();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].id, "bot-b");

        assert!(repo.set_status("ghost", BotStatus::Running).await.is_err());
    }

    #[tokio::test]
    async fn test_update_runtime_persists_position() {
        let pool = test_pool().await;
        let repo = BotRepository::new(pool);

        repo.create(sample_bot("bot-r", "runtime")).await.unwrap();

        let runtime = BotRuntime {
            in_position: true,
            entry_price: Some(50_000.0),
            last_action_at: Some(Utc::now()),
            cooldown_ms: 60_000,
        };
        repo.update_runtime("bot-r", &runtime).await.unwrap();

        let record = repo.get("bot-r").await.unwrap().unwrap();
        assert!(record.in_position);
        assert_eq!(record.entry_price, Some(50_000.0));
        assert!(record.last_action_at.is_some());
    }

    #[tokio::test]
    async fn test_find_by_name_scoped_to_user() {
        let pool = test_pool().await;
        let repo = BotRepository::new(pool);

        repo.create(sample_bot("bot-n", "shared-name")).await.unwrap();

        let found = repo.find_by_name("user-1", "shared-name").await.unwrap();
        assert!(found.is_some());

        let other = repo.find_by_name("user-2", "shared-name").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_delete_bot_keeps_trade_logs() {
        let pool = test_pool().await;
        let bots = BotRepository::new(pool.clone());
        let logs = TradeLogRepository::new(pool);

        bots.create(sample_bot("bot-d", "doomed")).await.unwrap();
        logs.record_attempt(CreateTradeLog {
            id: "log-1".to_string(),
            bot_id: Some("bot-d".to_string()),
            user_id: "user-1".to_string(),
            exchange: "delta".to_string(),
            symbol: "BTCUSD".to_string(),
            side: "buy".to_string(),
            order_type: "market_order".to_string(),
            quantity: 1.0,
            price: None,
        })
        .await
        .unwrap();

        bots.delete("bot-d").await.unwrap();
        assert!(bots.get("bot-d").await.unwrap().is_none());

        let remaining = logs.recent_for_bot("bot-d", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_trade_log_pending_then_finalized() {
        let pool = test_pool().await;
        let logs = TradeLogRepository::new(pool);

        let record = logs
            .record_attempt(CreateTradeLog {
                id: "log-2".to_string(),
                bot_id: Some("bot-x".to_string()),
                user_id: "user-1".to_string(),
                exchange: "delta".to_string(),
                symbol: "ETHUSD".to_string(),
                side: "sell".to_string(),
                order_type: "market_order".to_string(),
                quantity: 2.0,
                price: None,
            })
            .await
            .unwrap();
        assert_eq!(record.status, "PENDING");

        logs.finalize(
            "log-2",
            TradeLogOutcome::success(
                Some(2_500.0),
                Some("ex-123".to_string()),
                Some(12.5),
                Some(serde_json::json!({"state": "closed"})),
            ),
        )
        .await
        .unwrap();

        let rows = logs.recent_for_bot("bot-x", 10).await.unwrap();
        assert_eq!(rows[0].status, "SUCCESS");
        assert_eq!(rows[0].price, Some(2_500.0));
        assert_eq!(rows[0].exchange_order_id, Some("ex-123".to_string()));
        assert_eq!(rows[0].realized_pnl, Some(12.5));
    }

    #[tokio::test]
    async fn test_finalize_failed_keeps_original_price() {
        let pool = test_pool().await;
        let logs = TradeLogRepository::new(pool);

        logs.record_attempt(CreateTradeLog {
            id: "log-3".to_string(),
            bot_id: None,
            user_id: "user-1".to_string(),
            exchange: "delta".to_string(),
            symbol: "BTCUSD".to_string(),
            side: "buy".to_string(),
            order_type: "limit_order".to_string(),
            quantity: 1.0,
            price: Some(48_000.0),
        })
        .await
        .unwrap();

        logs.finalize("log-3", TradeLogOutcome::failed(None))
            .await
            .unwrap();

        let rows = logs.recent_for_user("user-1", 10).await.unwrap();
        assert_eq!(rows[0].status, "FAILED");
        assert_eq!(rows[0].price, Some(48_000.0));
    }
}
