//! Bot Orchestrator
//!
//! Owns the registry of running strategy loops and drives the bot lifecycle:
//! create, start, stop, delete, resume-on-restart, and process shutdown.
//! All setup that can fail (parameter normalization, credential lookup,
//! client construction) happens before a task is spawned, so `start_bot`
//! surfaces those failures to the caller instead of a newly started loop
//! dying silently.

use crate::application::events::{BotEvent, BotEventKind, EventPublisher};
use crate::application::strategy_loop::StrategyLoop;
use crate::config::AppConfig;
use crate::domain::entities::bot::BotStatus;
use crate::domain::errors::BotError;
use crate::domain::repositories::candle_source::CandleSource;
use crate::domain::repositories::credential_store::CredentialStore;
use crate::domain::repositories::exchange_client::ExchangeClientFactory;
use crate::domain::services::execution::ExecutionConfig;
use crate::persistence::models::{BotRecord, CreateBot};
use crate::persistence::repository::{BotRepository, TradeLogRepository};
use crate::persistence::DbPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct BotOrchestrator {
    pool: DbPool,
    clients: Arc<dyn ExchangeClientFactory>,
    credentials: Arc<dyn CredentialStore>,
    candles: Arc<dyn CandleSource>,
    events: Arc<EventPublisher>,
    config: AppConfig,
    running: Mutex<HashMap<String, RunningLoop>>,
}

impl BotOrchestrator {
    pub fn new(
        pool: DbPool,
        clients: Arc<dyn ExchangeClientFactory>,
        credentials: Arc<dyn CredentialStore>,
        candles: Arc<dyn CandleSource>,
        events: Arc<EventPublisher>,
        config: AppConfig,
    ) -> Self {
        BotOrchestrator {
            pool,
            clients,
            credentials,
            candles,
            events,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn events(&self) -> Arc<EventPublisher> {
        self.events.clone()
    }

    fn bots(&self) -> BotRepository {
        BotRepository::new(self.pool.clone())
    }

    fn trade_logs(&self) -> TradeLogRepository {
        TradeLogRepository::new(self.pool.clone())
    }

    /// Create a bot. Parameters are normalized up front so a record that
    /// cannot run is rejected at creation time, not at start time. Names are
    /// unique per user.
    pub async fn create_bot(&self, mut input: CreateBot) -> Result<BotRecord, BotError> {
        if input.id.is_empty() {
            input.id = Uuid::new_v4().to_string();
        }
        if input.name.is_empty() || input.symbol.is_empty() {
            return Err(BotError::InvalidConfig(
                "bot name and symbol are required".to_string(),
            ));
        }

        let raw = crate::config::RawStrategyParams {
            period: input.period,
            oversold: input.oversold,
            overbought: input.overbought,
            rsi_buy: None,
            rsi_sell: None,
            quantity: input.quantity,
            poll_interval_ms: input.poll_interval_ms,
            cooldown_ms: input.cooldown_ms,
        };
        crate::config::StrategyParams::normalize(&raw)
            .map_err(|e| BotError::InvalidConfig(e.to_string()))?;

        let bots = self.bots();
        if bots
            .find_by_name(&input.user_id, &input.name)
            .await
            .map_err(BotError::from)?
            .is_some()
        {
            return Err(BotError::InvalidConfig(format!(
                "bot name already in use: {}",
                input.name
            )));
        }

        let record = bots.create(input).await.map_err(BotError::from)?;
        info!(bot_id = %record.id, name = %record.name, "bot created");
        Ok(record)
    }

    /// Start a bot's strategy loop. No-op if it is already running.
    pub async fn start_bot(&self, id: &str) -> Result<(), BotError> {
        let mut running = self.running.lock().await;
        if let Some(existing) = running.get(id) {
            if !existing.handle.is_finished() {
                info!(bot_id = %id, "bot already running");
                return Ok(());
            }
            running.remove(id);
        }

        let record = self
            .bots()
            .get(id)
            .await
            .map_err(BotError::from)?
            .ok_or_else(|| BotError::InvalidConfig(format!("bot not found: {}", id)))?;

        // Persist the status before registering a handle so the handle set
        // stays a subset of bots whose stored status is running.
        self.bots()
            .set_status(id, BotStatus::Running)
            .await
            .map_err(BotError::from)?;

        match self.spawn_loop(&record).await {
            Ok(handle) => {
                running.insert(id.to_string(), handle);
            }
            Err(err) => {
                drop(running);
                if let Err(revert) = self.bots().set_status(id, BotStatus::Stopped).await {
                    error!(bot_id = %id, error = %revert, "failed to revert status after setup failure");
                }
                return Err(err);
            }
        }
        drop(running);

        self.publish_status(id, BotStatus::Running);
        info!(bot_id = %id, "bot started");
        Ok(())
    }

    /// Ids of bots whose loops are registered in this process.
    pub async fn active_bot_ids(&self) -> Vec<String> {
        self.running.lock().await.keys().cloned().collect()
    }

    /// Stop a bot: signal its loop, wait up to the grace period, then abort.
    /// The stopped status is persisted so the bot stays down across restarts.
    pub async fn stop_bot(&self, id: &str) -> Result<(), BotError> {
        let entry = self.running.lock().await.remove(id);
        match entry {
            Some(mut running) => {
                let _ = running.stop_tx.send(true);
                if timeout(self.config.stop_grace, &mut running.handle)
                    .await
                    .is_err()
                {
                    warn!(bot_id = %id, "loop did not stop within grace period, aborting");
                    running.handle.abort();
                }
            }
            None => info!(bot_id = %id, "stop requested for a bot that was not running"),
        }

        self.bots()
            .set_status(id, BotStatus::Stopped)
            .await
            .map_err(BotError::from)?;
        self.publish_status(id, BotStatus::Stopped);
        info!(bot_id = %id, "bot stopped");
        Ok(())
    }

    /// Delete a bot, stopping it first if needed. Ledger rows survive.
    pub async fn delete_bot(&self, id: &str) -> Result<(), BotError> {
        let was_running = self.running.lock().await.contains_key(id);
        if was_running {
            self.stop_bot(id).await?;
        }
        self.bots().delete(id).await.map_err(BotError::from)?;
        info!(bot_id = %id, "bot deleted");
        Ok(())
    }

    pub async fn get_bot(&self, id: &str) -> Result<Option<BotRecord>, BotError> {
        self.bots().get(id).await.map_err(BotError::from)
    }

    pub async fn list_bots(&self, user_id: &str) -> Result<Vec<BotRecord>, BotError> {
        self.bots().list_for_user(user_id).await.map_err(BotError::from)
    }

    /// Whether a bot's loop is live right now, regardless of stored status.
    pub async fn is_running(&self, id: &str) -> bool {
        self.running
            .lock()
            .await
            .get(id)
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Restart every bot the database says was running. Called once at
    /// startup. A bot that fails setup (bad credentials, dead catalog) is
    /// logged and skipped so one broken bot cannot block the rest.
    pub async fn resume_all(&self) -> Result<usize, BotError> {
        let records = self
            .bots()
            .find_by_status(BotStatus::Running)
            .await
            .map_err(BotError::from)?;

        let mut resumed = 0;
        for record in records {
            match self.start_bot(&record.id).await {
                Ok(()) => {
                    resumed += 1;
                    info!(bot_id = %record.id, name = %record.name, "bot resumed");
                }
                Err(err) => {
                    error!(bot_id = %record.id, error = %err, "failed to resume bot");
                }
            }
        }

        info!(resumed, "startup resume complete");
        Ok(resumed)
    }

    /// Process shutdown: signal every loop and wait out the grace period.
    /// Statuses are left untouched so running bots resume on the next start.
    pub async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        let entries: Vec<(String, RunningLoop)> = running.drain().collect();
        drop(running);

        info!(count = entries.len(), "shutting down strategy loops");
        for (id, mut entry) in entries {
            let _ = entry.stop_tx.send(true);
            if timeout(self.config.stop_grace, &mut entry.handle)
                .await
                .is_err()
            {
                warn!(bot_id = %id, "loop did not stop within grace period during shutdown, aborting");
                entry.handle.abort();
            }
        }
    }

    async fn spawn_loop(&self, record: &BotRecord) -> Result<RunningLoop, BotError> {
        let bot = record
            .to_bot()
            .map_err(|e| BotError::InvalidConfig(e.to_string()))?;

        let credentials = self
            .credentials
            .credentials(&bot.user_id, &bot.exchange)
            .await?;
        let client = self.clients.client(&bot.exchange, &credentials)?;

        let execution = ExecutionConfig {
            poll_interval: self.config.fill_poll_interval,
            fill_timeout: self.config.fill_timeout,
            ..ExecutionConfig::default()
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let strategy_loop = StrategyLoop::new(
            bot,
            client,
            self.candles.clone(),
            self.events.clone(),
            self.bots(),
            self.trade_logs(),
            execution,
            stop_rx,
        );
        let handle = tokio::spawn(strategy_loop.run());

        Ok(RunningLoop { stop_tx, handle })
    }

    fn publish_status(&self, id: &str, status: BotStatus) {
        self.events.publish(BotEvent {
            bot_id: id.to_string(),
            kind: BotEventKind::Runtime,
            payload: serde_json::json!({ "status": status.as_str() }),
        });
    }
}
