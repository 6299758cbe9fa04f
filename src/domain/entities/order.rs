//! Order request and exchange order representations.

use crate::domain::errors::ExchangeError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Wire value expected by the venue.
    pub fn as_wire(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_wire(&self) -> &'static str {
        match self {
            OrderType::Market => "market_order",
            OrderType::Limit => "limit_order",
        }
    }
}

/// Requested trade size: either venue-native integer contracts, or a quote
/// spend amount to be converted at a reference price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderSize {
    Contracts(i64),
    Spend {
        amount: f64,
        reference_price: Option<f64>,
    },
}

/// An order the caller wants placed. Validation happens at construction so
/// sizing mistakes never reach the wire.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: OrderSize,
    pub limit_price: Option<f64>,
}

impl OrderRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        size: OrderSize,
        limit_price: Option<f64>,
    ) -> Result<Self, ExchangeError> {
        if order_type == OrderType::Limit && limit_price.is_none() {
            return Err(ExchangeError::InvalidOrderSize(
                "limit order requires a limit price".into(),
            ));
        }
        if let OrderSize::Contracts(n) = size {
            if n <= 0 {
                return Err(ExchangeError::InvalidOrderSize(format!(
                    "contract count must be positive, got {}",
                    n
                )));
            }
        }
        Ok(OrderRequest {
            symbol: symbol.into(),
            side,
            order_type,
            size,
            limit_price,
        })
    }

    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        size: OrderSize,
    ) -> Result<Self, ExchangeError> {
        Self::new(symbol, side, OrderType::Market, size, None)
    }
}

/// An order as reported by the venue. Parsed leniently; the full response is
/// kept in `raw` for the audit trail.
#[derive(Debug, Clone)]
pub struct ExchangeOrder {
    pub id: String,
    pub product_id: u64,
    pub side: String,
    pub size: i64,
    pub unfilled_size: Option<i64>,
    pub state: Option<String>,
    pub average_fill_price: Option<f64>,
    pub raw: Value,
}

impl ExchangeOrder {
    pub fn filled_size(&self) -> i64 {
        self.size - self.unfilled_size.unwrap_or(0)
    }
}

/// Terminal (or best-known) disposition of a placed order.
///
/// `Vanished` means the order was absent from both the open and closed lists:
/// the venue offers no direct order lookup, so absence is the strongest
/// cancellation signal available. `Unconfirmed` means the poll window elapsed
/// with no terminal determination; callers must treat it as unknown, not
/// failed.
#[derive(Debug, Clone)]
pub enum FillOutcome {
    Filled(ExchangeOrder),
    Vanished(ExchangeOrder),
    Unconfirmed(ExchangeOrder),
}

impl FillOutcome {
    pub fn order(&self) -> &ExchangeOrder {
        match self {
            FillOutcome::Filled(o) | FillOutcome::Vanished(o) | FillOutcome::Unconfirmed(o) => o,
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, FillOutcome::Filled(_))
    }
}
