//! Delta Exchange REST client.
//!
//! Signed requests carry `{api-key, timestamp, signature}` headers where the
//! signature is hex HMAC-SHA256 over `method + timestamp + path + query +
//! body` and the timestamp is whole epoch seconds. Each trait method issues
//! exactly one HTTP call; retry policy lives with the caller.
//!
//! The product catalog is public and cached with a short TTL. Concurrent
//! refreshes are tolerated because refresh is idempotent.

use crate::domain::entities::instrument::{
    derive_contract_size, parse_contract_value, ContractType, Product,
};
use crate::domain::entities::order::{ExchangeOrder, OrderRequest, OrderSize, OrderType};
use crate::domain::errors::{BotError, ExchangeError, ExchangeResult};
use crate::domain::repositories::credential_store::ApiCredentials;
use crate::domain::repositories::exchange_client::{ExchangeClient, ExchangeClientFactory};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const DELTA_TESTNET_BASE: &str = "https://cdn-ind.testnet.deltaex.org";
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("deltabot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct DeltaConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl DeltaConfig {
    pub fn testnet(api_key: &str, api_secret: &str) -> Self {
        DeltaConfig {
            base_url: DELTA_TESTNET_BASE.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        }
    }
}

struct CatalogCache {
    products: HashMap<String, Product>,
    fetched_at: Instant,
}

pub struct DeltaClient {
    http: Client,
    config: DeltaConfig,
    catalog: Mutex<Option<CatalogCache>>,
}

impl DeltaClient {
    pub fn new(config: DeltaConfig) -> Self {
        DeltaClient {
            http: Client::new(),
            config,
            catalog: Mutex::new(None),
        }
    }

    /// Hex HMAC-SHA256 over `method + timestamp + path + query + body`.
    fn sign(&self, method: &str, timestamp: u64, path: &str, query: &str, body: &str) -> ExchangeResult<String> {
        let message = format!("{}{}{}{}{}", method, timestamp, path, query, body);
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ExchangeError::TransientNetwork(format!("hmac init failed: {}", e)))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// One signed HTTP call. `query` must include its leading `?` when
    /// non-empty, matching what goes on the wire.
    async fn signed_request(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> ExchangeResult<Value> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ExchangeError::TransientNetwork(format!("clock error: {}", e)))?
            .as_secs();

        let body_str = match body {
            Some(v) => serde_json::to_string(v)
                .map_err(|e| ExchangeError::TransientNetwork(format!("body encode: {}", e)))?,
            None => String::new(),
        };
        let signature = self.sign(method, timestamp, path, query, &body_str)?;

        let url = format!("{}{}{}", self.config.base_url, path, query);
        let mut request = match method {
            "POST" => self.http.post(&url),
            _ => self.http.get(&url),
        };
        request = request
            .header("api-key", &self.config.api_key)
            .header("timestamp", timestamp.to_string())
            .header("signature", signature)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json");
        if body.is_some() {
            request = request.body(body_str);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::TransientNetwork(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ExchangeError::TransientNetwork(e.to_string()))?;

        if !status.is_success() {
            // Body kept verbatim for the audit trail.
            return Err(ExchangeError::RequestFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ExchangeError::RequestFailed {
            status: status.as_u16(),
            body: format!("unparseable response ({}): {}", e, text),
        })
    }

    /// Resolve the wire contract count for a request, consulting the catalog
    /// when the caller specified a spend amount.
    async fn resolve_size(&self, request: &OrderRequest) -> ExchangeResult<i64> {
        match request.size {
            OrderSize::Contracts(n) => Ok(n),
            OrderSize::Spend {
                amount,
                reference_price,
            } => {
                let price = reference_price.ok_or_else(|| {
                    ExchangeError::InvalidOrderSize(
                        "spend-amount order requires a reference price".to_string(),
                    )
                })?;
                let product = self.product(&request.symbol).await?;
                derive_contract_size(amount, price, product.contract_multiplier(price))
            }
        }
    }

    async fn fetch_catalog(&self) -> ExchangeResult<HashMap<String, Product>> {
        let url = format!("{}/v2/products", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ExchangeError::CatalogUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExchangeError::CatalogUnavailable(format!(
                "products endpoint returned {}",
                status
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ExchangeError::CatalogUnavailable(e.to_string()))?;
        let entries = payload["result"].as_array().ok_or_else(|| {
            ExchangeError::CatalogUnavailable("products response missing result array".to_string())
        })?;

        let mut products = HashMap::new();
        for entry in entries {
            match parse_product(entry) {
                Ok(product) => {
                    products.insert(product.symbol.to_uppercase(), product);
                }
                Err(err) => {
                    debug!(error = %err, "skipping unparseable catalog entry");
                }
            }
        }

        info!(count = products.len(), "instrument catalog refreshed");
        Ok(products)
    }

    fn cached_product(&self, symbol: &str) -> Option<Product> {
        let cache = self
            .catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.as_ref().and_then(|c| {
            if c.fetched_at.elapsed() < PRODUCT_CACHE_TTL {
                c.products.get(&symbol.to_uppercase()).cloned()
            } else {
                None
            }
        })
    }

    fn store_catalog(&self, products: HashMap<String, Product>) {
        let mut cache = self
            .catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache = Some(CatalogCache {
            products,
            fetched_at: Instant::now(),
        });
    }
}

#[async_trait]
impl ExchangeClient for DeltaClient {
    fn name(&self) -> &str {
        "delta"
    }

    async fn place_order(&self, request: &OrderRequest) -> ExchangeResult<ExchangeOrder> {
        let product = self.product(&request.symbol).await?;
        let size = self.resolve_size(request).await?;
        if size <= 0 {
            return Err(ExchangeError::InvalidOrderSize(format!(
                "contract count must be positive, got {}",
                size
            )));
        }

        let mut body = serde_json::json!({
            "product_id": product.id,
            "side": request.side.as_wire(),
            "size": size,
            "order_type": request.order_type.as_wire(),
        });
        if request.order_type == OrderType::Limit {
            if let Some(price) = request.limit_price {
                body["limit_price"] = serde_json::json!(price.to_string());
            }
        }

        debug!(symbol = %request.symbol, side = %request.side, size, "placing order");
        let response = self.signed_request("POST", "/v2/orders", "", Some(&body)).await?;
        parse_order(&response["result"])
    }

    async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<ExchangeOrder>> {
        let product = self.product(symbol).await?;
        let query = format!("?product_ids={}&states=open", product.id);
        let response = self.signed_request("GET", "/v2/orders", &query, None).await?;
        parse_order_list(&response)
    }

    async fn closed_orders(&self, symbol: &str) -> ExchangeResult<Vec<ExchangeOrder>> {
        let product = self.product(symbol).await?;
        let query = format!("?product_ids={}", product.id);
        let response = self
            .signed_request("GET", "/v2/orders/history", &query, None)
            .await?;
        parse_order_list(&response)
    }

    async fn product(&self, symbol: &str) -> ExchangeResult<Product> {
        if let Some(product) = self.cached_product(symbol) {
            return Ok(product);
        }

        let products = self.fetch_catalog().await?;
        let found = products.get(&symbol.to_uppercase()).cloned();
        self.store_catalog(products);

        found.ok_or_else(|| {
            warn!(symbol, "symbol not listed in instrument catalog");
            ExchangeError::CatalogUnavailable(format!("product not found: {}", symbol))
        })
    }
}

/// Parse one catalog entry. `contract_value` arrives as a string, sometimes
/// with a `" USD"` suffix on inverse products.
fn parse_product(entry: &Value) -> ExchangeResult<Product> {
    let id = entry["id"].as_u64().ok_or_else(|| {
        ExchangeError::CatalogUnavailable("catalog entry missing id".to_string())
    })?;
    let symbol = entry["symbol"].as_str().ok_or_else(|| {
        ExchangeError::CatalogUnavailable("catalog entry missing symbol".to_string())
    })?;
    let contract_type = match entry["contract_type"].as_str() {
        Some("inverse") | Some("inverse_perpetual_futures") => ContractType::Inverse,
        _ => ContractType::Linear,
    };
    let contract_value = match &entry["contract_value"] {
        Value::String(s) => parse_contract_value(s)?,
        Value::Number(n) => n.as_f64().unwrap_or(1.0),
        _ => 1.0,
    };

    Ok(Product {
        id,
        symbol: symbol.to_string(),
        contract_type,
        contract_value,
    })
}

/// Lenient order parsing: ids arrive as numbers or strings depending on the
/// endpoint, and price fields arrive as decimal strings. The raw value is
/// kept whole for the ledger.
fn parse_order(value: &Value) -> ExchangeResult<ExchangeOrder> {
    let id = match &value["id"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => {
            return Err(ExchangeError::RequestFailed {
                status: 200,
                body: format!("order response missing id: {}", value),
            })
        }
    };

    Ok(ExchangeOrder {
        id,
        product_id: value["product_id"].as_u64().unwrap_or(0),
        side: value["side"].as_str().unwrap_or("").to_string(),
        size: value["size"].as_i64().unwrap_or(0),
        unfilled_size: value["unfilled_size"].as_i64(),
        state: value["state"].as_str().map(|s| s.to_string()),
        average_fill_price: parse_decimal(&value["average_fill_price"]),
        raw: value.clone(),
    })
}

fn parse_order_list(response: &Value) -> ExchangeResult<Vec<ExchangeOrder>> {
    let entries = response["result"].as_array().ok_or_else(|| {
        ExchangeError::RequestFailed {
            status: 200,
            body: format!("order list response missing result array: {}", response),
        }
    })?;
    entries.iter().map(parse_order).collect()
}

fn parse_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Builds per-user Delta clients against the testnet base (or an override
/// from `DELTA_BASE_URL`).
pub struct DeltaClientFactory {
    base_url: String,
}

impl DeltaClientFactory {
    pub fn new() -> Self {
        let base_url =
            std::env::var("DELTA_BASE_URL").unwrap_or_else(|_| DELTA_TESTNET_BASE.to_string());
        DeltaClientFactory { base_url }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        DeltaClientFactory {
            base_url: base_url.to_string(),
        }
    }
}

impl Default for DeltaClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeClientFactory for DeltaClientFactory {
    fn client(
        &self,
        exchange: &str,
        credentials: &ApiCredentials,
    ) -> Result<Arc<dyn ExchangeClient>, BotError> {
        match exchange {
            "delta" => Ok(Arc::new(DeltaClient::new(DeltaConfig {
                base_url: self.base_url.clone(),
                api_key: credentials.api_key.clone(),
                api_secret: credentials.api_secret.clone(),
            }))),
            other => Err(BotError::InvalidConfig(format!(
                "unsupported exchange: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DeltaClient {
        DeltaClient::new(DeltaConfig::testnet("test-key", "test-secret"))
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let c = client();
        let a = c.sign("POST", 1_700_000_000, "/v2/orders", "", r#"{"size":1}"#).unwrap();
        let b = c.sign("POST", 1_700_000_000, "/v2/orders", "", r#"{"size":1}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_covers_every_component() {
        let c = client();
        let base = c.sign("GET", 1_700_000_000, "/v2/orders", "?states=open", "").unwrap();
        assert_ne!(c.sign("POST", 1_700_000_000, "/v2/orders", "?states=open", "").unwrap(), base);
        assert_ne!(c.sign("GET", 1_700_000_001, "/v2/orders", "?states=open", "").unwrap(), base);
        assert_ne!(c.sign("GET", 1_700_000_000, "/v2/products", "?states=open", "").unwrap(), base);
        assert_ne!(c.sign("GET", 1_700_000_000, "/v2/orders", "", "").unwrap(), base);
    }

    #[test]
    fn test_parse_order_with_numeric_id_and_string_price() {
        let value = serde_json::json!({
            "id": 12345,
            "product_id": 27,
            "side": "buy",
            "size": 2,
            "unfilled_size": 0,
            "state": "closed",
            "average_fill_price": "50012.5"
        });
        let order = parse_order(&value).unwrap();
        assert_eq!(order.id, "12345");
        assert_eq!(order.product_id, 27);
        assert_eq!(order.filled_size(), 2);
        assert_eq!(order.average_fill_price, Some(50012.5));
        assert_eq!(order.raw["state"], "closed");
    }

    #[test]
    fn test_parse_order_missing_id_is_an_error() {
        let value = serde_json::json!({"side": "buy"});
        assert!(parse_order(&value).is_err());
    }

    #[test]
    fn test_parse_product_variants() {
        let inverse = serde_json::json!({
            "id": 139,
            "symbol": "BTCUSD",
            "contract_type": "inverse",
            "contract_value": "1 USD"
        });
        let p = parse_product(&inverse).unwrap();
        assert_eq!(p.contract_type, ContractType::Inverse);
        assert_eq!(p.contract_value, 1.0);

        let linear = serde_json::json!({
            "id": 27,
            "symbol": "ETHUSD",
            "contract_type": "perpetual_futures",
            "contract_value": "0.01"
        });
        let p = parse_product(&linear).unwrap();
        assert_eq!(p.contract_type, ContractType::Linear);
        assert_eq!(p.contract_value, 0.01);
    }

    #[test]
    fn test_factory_rejects_unknown_exchange() {
        let factory = DeltaClientFactory::with_base_url("http://localhost:9");
        let credentials = ApiCredentials {
            api_key: "k".into(),
            api_secret: "s".into(),
        };
        assert!(factory.client("delta", &credentials).is_ok());
        assert!(matches!(
            factory.client("binance", &credentials),
            Err(BotError::InvalidConfig(_))
        ));
    }
}
