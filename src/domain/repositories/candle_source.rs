//! Candle source abstraction: where strategy loops get price history.

use crate::domain::errors::BotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One OHLCV candle. `time` is epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `limit` most recent candles, ascending by time.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, BotError>;
}
