//! Candle source backed by Binance's public klines endpoint.
//!
//! Price history comes from a public market-data API rather than the trading
//! venue, so strategy loops can tick without burning signed-request quota.

use crate::domain::errors::BotError;
use crate::domain::repositories::candle_source::{Candle, CandleSource};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const BINANCE_API_BASE: &str = "https://api.binance.com";

pub struct BinanceCandles {
    http: Client,
    base_url: String,
}

impl BinanceCandles {
    pub fn new() -> Self {
        let base_url =
            std::env::var("BINANCE_BASE_URL").unwrap_or_else(|_| BINANCE_API_BASE.to_string());
        BinanceCandles {
            http: Client::new(),
            base_url,
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        BinanceCandles {
            http: Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

impl Default for BinanceCandles {
    fn default() -> Self {
        Self::new()
    }
}

/// Derivative symbols are quoted in USD; Binance spot pairs use USDT.
fn spot_symbol(symbol: &str) -> String {
    let upper = symbol.to_uppercase();
    if upper.ends_with("USDT") {
        upper
    } else if let Some(base) = upper.strip_suffix("USD") {
        format!("{}USDT", base)
    } else {
        upper
    }
}

#[async_trait]
impl CandleSource for BinanceCandles {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, BotError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            spot_symbol(symbol),
            timeframe,
            limit
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BotError::MarketData(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::MarketData(format!(
                "klines endpoint returned {}: {}",
                status, body
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BotError::MarketData(e.to_string()))?;
        let rows = payload.as_array().ok_or_else(|| {
            BotError::MarketData("klines response was not an array".to_string())
        })?;

        let candles = rows
            .iter()
            .filter_map(parse_kline)
            .collect::<Vec<Candle>>();

        debug!(symbol, timeframe, count = candles.len(), "fetched candles");
        Ok(candles)
    }
}

/// Klines arrive as positional arrays with millisecond open times and
/// decimal-string prices. Malformed rows are dropped rather than failing the
/// whole fetch.
fn parse_kline(row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    Some(Candle {
        time: fields.first()?.as_i64()? / 1000,
        open: fields.get(1)?.as_str()?.parse().ok()?,
        high: fields.get(2)?.as_str()?.parse().ok()?,
        low: fields.get(3)?.as_str()?.parse().ok()?,
        close: fields.get(4)?.as_str()?.parse().ok()?,
        volume: fields.get(5)?.as_str()?.parse().ok()?,
    })
}
