//! Infrastructure Layer
//!
//! Concrete exchange and market-data clients behind the domain traits.

pub mod binance_candles;
pub mod delta_client;
