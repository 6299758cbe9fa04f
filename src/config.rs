//! Process configuration and strategy-parameter normalization.
//!
//! Bot records arrive with a mix of optional legacy and typed fields; they
//! are normalized exactly once, at load time, into [`StrategyParams`].
//! Reads after that never fall back.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid strategy parameters: {0}")]
    InvalidStrategyParams(String),
}

/// Raw, possibly partial strategy fields as stored or submitted.
///
/// `oversold`/`overbought` are the canonical names; `rsi_buy`/`rsi_sell` are
/// the legacy aliases older records carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStrategyParams {
    pub period: Option<i64>,
    pub oversold: Option<f64>,
    pub overbought: Option<f64>,
    pub rsi_buy: Option<f64>,
    pub rsi_sell: Option<f64>,
    pub quantity: Option<i64>,
    pub poll_interval_ms: Option<i64>,
    pub cooldown_ms: Option<i64>,
}

/// Validated, fully-populated strategy parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    /// Indicator lookback; the loop needs `period + 1` closes per tick.
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
    /// Order size in venue-native integer contracts.
    pub quantity: i64,
    /// Delay between strategy ticks.
    pub poll_interval: Duration,
    /// Minimum quiet time after an action before the bot may act again.
    pub cooldown_ms: u64,
}

pub const DEFAULT_PERIOD: i64 = 14;
pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;
pub const DEFAULT_POLL_INTERVAL_MS: i64 = 15_000;
pub const DEFAULT_COOLDOWN_MS: i64 = 60_000;

impl StrategyParams {
    /// Single normalization step: apply legacy aliases, fill defaults,
    /// validate ranges.
    pub fn normalize(raw: &RawStrategyParams) -> Result<Self, ConfigError> {
        let period = raw.period.unwrap_or(DEFAULT_PERIOD);
        if !(2..=500).contains(&period) {
            return Err(ConfigError::InvalidStrategyParams(format!(
                "period must be in [2, 500], got {}",
                period
            )));
        }

        let oversold = raw.oversold.or(raw.rsi_buy).unwrap_or(DEFAULT_OVERSOLD);
        let overbought = raw
            .overbought
            .or(raw.rsi_sell)
            .unwrap_or(DEFAULT_OVERBOUGHT);
        if !(0.0 < oversold && oversold < overbought && overbought < 100.0) {
            return Err(ConfigError::InvalidStrategyParams(format!(
                "thresholds must satisfy 0 < oversold < overbought < 100, got {} / {}",
                oversold, overbought
            )));
        }

        let quantity = raw.quantity.unwrap_or(1);
        if quantity <= 0 {
            return Err(ConfigError::InvalidStrategyParams(format!(
                "quantity must be a positive contract count, got {}",
                quantity
            )));
        }

        let poll_interval_ms = raw.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if !(100..=3_600_000).contains(&poll_interval_ms) {
            return Err(ConfigError::InvalidStrategyParams(format!(
                "poll interval must be in [100ms, 1h], got {}ms",
                poll_interval_ms
            )));
        }

        let cooldown_ms = raw.cooldown_ms.unwrap_or(DEFAULT_COOLDOWN_MS);
        if cooldown_ms < 0 {
            return Err(ConfigError::InvalidStrategyParams(format!(
                "cooldown must be non-negative, got {}ms",
                cooldown_ms
            )));
        }

        Ok(StrategyParams {
            period: period as usize,
            oversold,
            overbought,
            quantity,
            poll_interval: Duration::from_millis(poll_interval_ms as u64),
            cooldown_ms: cooldown_ms as u64,
        })
    }

    /// Candles requested per tick: enough history for the indicator, padded
    /// the way the upstream data sources expect.
    pub fn candle_limit(&self) -> usize {
        (self.period + 1).max(200)
    }
}

/// Process-level configuration from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub fill_poll_interval: Duration,
    pub fill_timeout: Duration,
    /// How long `stop_bot` waits for a loop to wind down.
    pub stop_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_url: "sqlite://data/deltabot.db".into(),
            fill_poll_interval: Duration::from_secs(2),
            fill_timeout: Duration::from_secs(120),
            stop_grace: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.database_url = url;
            }
        }

        if let Some(ms) = read_env_ms("FILL_POLL_INTERVAL_MS", 100, 60_000) {
            config.fill_poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env_ms("FILL_TIMEOUT_MS", 1_000, 600_000) {
            config.fill_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env_ms("STOP_GRACE_MS", 100, 300_000) {
            config.stop_grace = Duration::from_millis(ms);
        }

        config
    }
}

fn read_env_ms(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(value) if (min..=max).contains(&value) => Some(value),
        Ok(value) => {
            warn!(
                "{} value {} outside [{}, {}], using default",
                name, value, min, max
            );
            None
        }
        Err(e) => {
            warn!("failed to parse {} '{}': {}, using default", name, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        let params = StrategyParams::normalize(&RawStrategyParams::default()).unwrap();
        assert_eq!(params.period, 14);
        assert_eq!(params.oversold, 30.0);
        assert_eq!(params.overbought, 70.0);
        assert_eq!(params.quantity, 1);
        assert_eq!(params.poll_interval, Duration::from_millis(15_000));
        assert_eq!(params.cooldown_ms, 60_000);
    }

    #[test]
    fn test_normalize_prefers_canonical_over_legacy_fields() {
        let raw = RawStrategyParams {
            oversold: Some(25.0),
            rsi_buy: Some(35.0),
            rsi_sell: Some(65.0),
            ..Default::default()
        };
        let params = StrategyParams::normalize(&raw).unwrap();
        assert_eq!(params.oversold, 25.0);
        assert_eq!(params.overbought, 65.0);
    }

    #[test]
    fn test_normalize_rejects_inverted_thresholds() {
        let raw = RawStrategyParams {
            oversold: Some(70.0),
            overbought: Some(30.0),
            ..Default::default()
        };
        assert!(StrategyParams::normalize(&raw).is_err());
    }

    #[test]
    fn test_normalize_rejects_bad_quantity_and_period() {
        let raw = RawStrategyParams {
            quantity: Some(0),
            ..Default::default()
        };
        assert!(StrategyParams::normalize(&raw).is_err());

        let raw = RawStrategyParams {
            period: Some(1),
            ..Default::default()
        };
        assert!(StrategyParams::normalize(&raw).is_err());
    }

    #[test]
    fn test_candle_limit_covers_period() {
        let raw = RawStrategyParams {
            period: Some(300),
            ..Default::default()
        };
        let params = StrategyParams::normalize(&raw).unwrap();
        assert_eq!(params.candle_limit(), 301);

        let params = StrategyParams::normalize(&RawStrategyParams::default()).unwrap();
        assert_eq!(params.candle_limit(), 200);
    }
}
