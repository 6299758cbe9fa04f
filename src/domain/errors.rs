//! Error taxonomy for the trading core.
//!
//! Exchange-facing failures are classified so the execution engine can decide
//! what is safe to retry: transient network trouble and venue rate limiting
//! are retryable, structured business rejections are not.

use thiserror::Error;

/// Common result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Errors surfaced by exchange protocol clients.
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    /// Network-level failure before a structured response was received
    /// (connect error, timeout, reset). Safe to retry with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// The venue answered with a non-success status. The body is kept
    /// verbatim for the audit trail.
    #[error("exchange rejected request (status {status}): {body}")]
    RequestFailed { status: u16, body: String },

    /// Order sizing produced a non-positive contract count, or the inputs
    /// required for the conversion were missing. Never retried.
    #[error("invalid order size: {0}")]
    InvalidOrderSize(String),

    /// The instrument catalog could not be fetched or the symbol is not
    /// listed. Blocks contract-size conversion for the affected attempt.
    #[error("product catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

impl ExchangeError {
    /// Whether a bounded-backoff retry is appropriate.
    ///
    /// HTTP 429 and 5xx are venue-side hiccups; anything else structured is a
    /// business rejection and must surface to the caller unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::TransientNetwork(_) => true,
            ExchangeError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            ExchangeError::InvalidOrderSize(_) | ExchangeError::CatalogUnavailable(_) => false,
        }
    }
}

/// Errors crossing the strategy-loop and orchestrator boundary.
///
/// These are caught and logged at the top of each tick; a failed tick never
/// terminates a bot's loop.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid bot configuration: {0}")]
    InvalidConfig(String),

    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExchangeError::TransientNetwork("reset".into()).is_transient());
        assert!(ExchangeError::RequestFailed {
            status: 429,
            body: "rate limit".into()
        }
        .is_transient());
        assert!(ExchangeError::RequestFailed {
            status: 503,
            body: "maintenance".into()
        }
        .is_transient());
    }

    #[test]
    fn test_business_rejections_not_transient() {
        assert!(!ExchangeError::RequestFailed {
            status: 400,
            body: "insufficient margin".into()
        }
        .is_transient());
        assert!(!ExchangeError::InvalidOrderSize("0 contracts".into()).is_transient());
        assert!(!ExchangeError::CatalogUnavailable("down".into()).is_transient());
    }

    #[test]
    fn test_request_failed_keeps_body_verbatim() {
        let err = ExchangeError::RequestFailed {
            status: 400,
            body: r#"{"error":{"code":"insufficient_margin"}}"#.into(),
        };
        assert!(err.to_string().contains("insufficient_margin"));
    }
}
