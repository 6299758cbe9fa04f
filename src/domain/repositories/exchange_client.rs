//! Exchange Client Trait
//!
//! Common interface over venue protocol clients so the execution engine and
//! strategy loops stay independent of any concrete exchange. The venue this
//! system targets has no "get order by id" endpoint; order tracking works
//! through the open and closed order lists, which is why both appear here.

use crate::domain::entities::instrument::Product;
use crate::domain::entities::order::{ExchangeOrder, OrderRequest};
use crate::domain::errors::{ExchangeResult, BotError};
use crate::domain::repositories::credential_store::ApiCredentials;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Name of the venue this client talks to.
    fn name(&self) -> &str;

    /// Submit one order. Exactly one HTTP call; retries are the caller's
    /// responsibility.
    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<ExchangeOrder>;

    /// Orders currently resting on the book for the instrument.
    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<ExchangeOrder>>;

    /// Recently closed (filled or cancelled) orders for the instrument.
    async fn closed_orders(&self, symbol: &str) -> ExchangeResult<Vec<ExchangeOrder>>;

    /// Catalog lookup for an instrument's product id and contract sizing.
    async fn product(&self, symbol: &str) -> ExchangeResult<Product>;
}

/// Builds a client for a (exchange, credentials) pair. Lets the orchestrator
/// construct per-bot clients without knowing concrete client types, and lets
/// tests substitute mocks.
pub trait ExchangeClientFactory: Send + Sync {
    fn client(
        &self,
        exchange: &str,
        credentials: &ApiCredentials,
    ) -> Result<Arc<dyn ExchangeClient>, BotError>;
}
