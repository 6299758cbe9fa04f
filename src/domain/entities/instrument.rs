//! Instrument catalog entries and contract-size arithmetic.
//!
//! The venue trades integer contracts. A product's contract metadata maps
//! between contract counts and underlying asset quantity: linear contracts
//! are worth `contract_value` of the base asset each, inverse contracts are
//! denominated in quote currency so their asset size depends on price.

use crate::domain::errors::ExchangeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Linear,
    Inverse,
}

/// Catalog entry: human symbol to numeric product id plus sizing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub symbol: String,
    pub contract_type: ContractType,
    pub contract_value: f64,
}

impl Product {
    /// Asset quantity represented by one contract at the given price.
    pub fn contract_size(&self, price: f64) -> f64 {
        match self.contract_type {
            ContractType::Linear => self.contract_value,
            ContractType::Inverse => self.contract_value / price,
        }
    }

    /// Contracts per unit of underlying asset at the given price: the
    /// multiplier used when deriving a contract count from a spend amount.
    pub fn contract_multiplier(&self, price: f64) -> f64 {
        1.0 / self.contract_size(price)
    }
}

/// Parse the venue's `contract_value` field, which arrives as a string and
/// may carry a `" USD"` suffix on inverse products.
pub fn parse_contract_value(raw: &str) -> Result<f64, ExchangeError> {
    let trimmed = raw.trim().trim_end_matches(" USD").trim();
    trimmed.parse::<f64>().map_err(|_| {
        ExchangeError::CatalogUnavailable(format!("unparseable contract_value: {:?}", raw))
    })
}

/// Convert a quote-currency spend amount into an integer contract count.
///
/// `round((spend / price) * multiplier)`, rejected when the result is not a
/// positive count.
pub fn derive_contract_size(
    spend: f64,
    reference_price: f64,
    multiplier: f64,
) -> Result<i64, ExchangeError> {
    if !(spend.is_finite() && reference_price.is_finite() && multiplier.is_finite())
        || reference_price <= 0.0
    {
        return Err(ExchangeError::InvalidOrderSize(format!(
            "cannot derive size from spend={} price={} multiplier={}",
            spend, reference_price, multiplier
        )));
    }
    let contracts = ((spend / reference_price) * multiplier).round() as i64;
    if contracts <= 0 {
        return Err(ExchangeError::InvalidOrderSize(format!(
            "spend {} at price {} yields {} contracts",
            spend, reference_price, contracts
        )));
    }
    Ok(contracts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(contract_value: f64) -> Product {
        Product {
            id: 27,
            symbol: "BTCUSD".into(),
            contract_type: ContractType::Linear,
            contract_value,
        }
    }

    #[test]
    fn test_linear_contract_size_ignores_price() {
        let p = linear(0.001);
        assert_eq!(p.contract_size(50_000.0), 0.001);
        assert_eq!(p.contract_size(10.0), 0.001);
    }

    #[test]
    fn test_inverse_contract_size_scales_with_price() {
        let p = Product {
            id: 139,
            symbol: "ETHUSD".into(),
            contract_type: ContractType::Inverse,
            contract_value: 1.0,
        };
        assert!((p.contract_size(2_000.0) - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_parse_contract_value_strips_usd_suffix() {
        assert_eq!(parse_contract_value("1 USD").unwrap(), 1.0);
        assert_eq!(parse_contract_value("0.001").unwrap(), 0.001);
        assert!(parse_contract_value("n/a").is_err());
    }

    #[test]
    fn test_derive_contract_size_reference_scenario() {
        // spend 100 quote at 50,000 with multiplier 1000 -> 2 contracts
        assert_eq!(derive_contract_size(100.0, 50_000.0, 1_000.0).unwrap(), 2);
    }

    #[test]
    fn test_derive_contract_size_rejects_zero() {
        let result = derive_contract_size(0.01, 50_000.0, 1.0);
        assert!(matches!(result, Err(ExchangeError::InvalidOrderSize(_))));
    }

    #[test]
    fn test_derive_matches_multiplier_round_trip() {
        let p = linear(0.001);
        // 1 / 0.001 = 1000 contracts per BTC
        let contracts =
            derive_contract_size(100.0, 50_000.0, p.contract_multiplier(50_000.0)).unwrap();
        assert_eq!(contracts, 2);
    }
}
