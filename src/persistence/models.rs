//! Database Models
//!
//! Persistent data structures for bot records and the trade ledger.

use crate::config::{ConfigError, RawStrategyParams, StrategyParams};
use crate::domain::entities::bot::{Bot, BotRuntime, BotStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Bot record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BotRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub exchange: String,
    pub symbol: String,
    pub timeframe: String,
    pub period: Option<i64>,
    pub oversold: Option<f64>,
    pub overbought: Option<f64>,
    pub quantity: Option<i64>,
    pub poll_interval_ms: Option<i64>,
    pub cooldown_ms: Option<i64>,
    pub status: String, // "stopped", "running", or "paused"
    pub in_position: bool,
    pub entry_price: Option<f64>,
    pub last_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BotRecord {
    /// Build the runnable entity. Strategy parameters are normalized here,
    /// once, so every reader downstream sees validated values.
    pub fn to_bot(&self) -> Result<Bot, ConfigError> {
        let raw = RawStrategyParams {
            period: self.period,
            oversold: self.oversold,
            overbought: self.overbought,
            rsi_buy: None,
            rsi_sell: None,
            quantity: self.quantity,
            poll_interval_ms: self.poll_interval_ms,
            cooldown_ms: self.cooldown_ms,
        };
        let params = StrategyParams::normalize(&raw)?;
        let status = BotStatus::parse(&self.status).unwrap_or(BotStatus::Stopped);
        let runtime = BotRuntime {
            in_position: self.in_position,
            entry_price: self.entry_price,
            last_action_at: self.last_action_at,
            cooldown_ms: params.cooldown_ms,
        };
        Ok(Bot {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            params,
            status,
            runtime,
        })
    }
}

/// Trade ledger record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeLogRecord {
    pub id: String,
    pub bot_id: Option<String>,
    pub user_id: String,
    pub exchange: String,
    pub symbol: String,
    pub side: String, // "buy" or "sell"
    pub order_type: String,
    pub quantity: f64,
    pub price: Option<f64>,
    pub exchange_order_id: Option<String>,
    pub status: String, // "PENDING", "SUCCESS", or "FAILED"
    pub realized_pnl: Option<f64>,
    pub raw_response: Option<String>, // JSON string
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create bot input
#[derive(Debug, Clone)]
pub struct CreateBot {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub exchange: String,
    pub symbol: String,
    pub timeframe: String,
    pub period: Option<i64>,
    pub oversold: Option<f64>,
    pub overbought: Option<f64>,
    pub quantity: Option<i64>,
    pub poll_interval_ms: Option<i64>,
    pub cooldown_ms: Option<i64>,
}

/// Create trade-log input, recorded before the order goes to the wire.
#[derive(Debug, Clone)]
pub struct CreateTradeLog {
    pub id: String,
    pub bot_id: Option<String>,
    pub user_id: String,
    pub exchange: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub quantity: f64,
    pub price: Option<f64>,
}

/// Final outcome applied to a PENDING ledger row.
#[derive(Debug, Clone)]
pub struct TradeLogOutcome {
    pub status: String,
    pub price: Option<f64>,
    pub exchange_order_id: Option<String>,
    pub realized_pnl: Option<f64>,
    pub raw_response: Option<serde_json::Value>,
}

impl TradeLogOutcome {
    pub fn success(
        price: Option<f64>,
        exchange_order_id: Option<String>,
        realized_pnl: Option<f64>,
        raw_response: Option<serde_json::Value>,
    ) -> Self {
        TradeLogOutcome {
            status: "SUCCESS".to_string(),
            price,
            exchange_order_id,
            realized_pnl,
            raw_response,
        }
    }

    pub fn failed(raw_response: Option<serde_json::Value>) -> Self {
        TradeLogOutcome {
            status: "FAILED".to_string(),
            price: None,
            exchange_order_id: None,
            realized_pnl: None,
            raw_response,
        }
    }
}
