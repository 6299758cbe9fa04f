//! Bot entity: persisted configuration plus the mutable runtime the strategy
//! loop carries across restarts.

use crate::config::StrategyParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted lifecycle status, source of truth for resume-on-restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Stopped,
    Running,
    Paused,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Stopped => "stopped",
            BotStatus::Running => "running",
            BotStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stopped" => Some(BotStatus::Stopped),
            "running" => Some(BotStatus::Running),
            "paused" => Some(BotStatus::Paused),
            _ => None,
        }
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime state that survives restarts.
///
/// Single-writer invariant: only the bot's own strategy loop mutates this,
/// and it is persisted only after a confirmed, successful transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRuntime {
    pub in_position: bool,
    pub entry_price: Option<f64>,
    pub last_action_at: Option<DateTime<Utc>>,
    pub cooldown_ms: u64,
}

impl BotRuntime {
    pub fn flat(cooldown_ms: u64) -> Self {
        BotRuntime {
            in_position: false,
            entry_price: None,
            last_action_at: None,
            cooldown_ms,
        }
    }

    /// Cooldown gate: true once `cooldown_ms` has elapsed since the last
    /// action (or when no action has been taken yet).
    pub fn cooled_down(&self, now: DateTime<Utc>) -> bool {
        match self.last_action_at {
            None => true,
            Some(t) => {
                now.signed_duration_since(t) > chrono::Duration::milliseconds(self.cooldown_ms as i64)
            }
        }
    }
}

/// A bot ready to run: normalized strategy parameters plus runtime state.
#[derive(Debug, Clone)]
pub struct Bot {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub exchange: String,
    pub symbol: String,
    pub timeframe: String,
    pub params: StrategyParams,
    pub status: BotStatus,
    pub runtime: BotRuntime,
}
