//! Order execution engine: submit, then confirm the fill by polling.
//!
//! The venue's test environment has no "get order by id" endpoint, so after
//! submission the engine watches the closed and open order lists until the
//! order shows up closed, disappears from both lists (treated as cancelled),
//! or the confirmation window runs out.

use crate::domain::entities::order::{ExchangeOrder, FillOutcome, OrderRequest};
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::repositories::exchange_client::ExchangeClient;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Knobs for order submission and fill confirmation.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Delay between open/closed list polls.
    pub poll_interval: Duration,
    /// Overall bound on the confirmation loop.
    pub fill_timeout: Duration,
    /// Submission retry attempts for transient errors only.
    pub max_retries: u32,
    /// Base delay for the exponential submission backoff.
    pub retry_base_delay: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            poll_interval: Duration::from_secs(2),
            fill_timeout: Duration::from_secs(120),
            max_retries: 5,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Retry an operation with bounded exponential backoff and jitter.
///
/// Only transient classifications are retried; business rejections surface on
/// the first attempt.
pub async fn retry_transient<T, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ExchangeResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if !err.is_transient() || attempt >= max_attempts.max(1) {
                    return Err(err);
                }
                let jitter = rand::thread_rng().gen_range(0..200);
                let delay = base_delay * 2u32.saturating_pow(attempt - 1)
                    + Duration::from_millis(jitter);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// What one poll iteration observed for a given order id.
enum PollObservation {
    Closed(ExchangeOrder),
    Open(ExchangeOrder),
    Gone,
}

async fn poll_once(
    client: &dyn ExchangeClient,
    symbol: &str,
    order_id: &str,
) -> ExchangeResult<PollObservation> {
    let closed = client.closed_orders(symbol).await?;
    if let Some(order) = closed.into_iter().find(|o| o.id == order_id) {
        return Ok(PollObservation::Closed(order));
    }
    let open = client.open_orders(symbol).await?;
    if let Some(order) = open.into_iter().find(|o| o.id == order_id) {
        return Ok(PollObservation::Open(order));
    }
    Ok(PollObservation::Gone)
}

/// Place an order and poll until a terminal disposition or timeout.
///
/// Individual polling errors are logged and skipped; only the overall
/// timeout ends the loop. The caller owns the trade-ledger bookkeeping.
pub async fn place_and_await_fill(
    client: &dyn ExchangeClient,
    request: &OrderRequest,
    config: &ExecutionConfig,
) -> ExchangeResult<FillOutcome> {
    let submitted = retry_transient(
        || client.place_order(request),
        config.max_retries,
        config.retry_base_delay,
    )
    .await?;

    info!(
        order_id = %submitted.id,
        symbol = %request.symbol,
        side = %request.side,
        "order submitted, awaiting fill"
    );

    let deadline = Instant::now() + config.fill_timeout;
    let mut last_seen = submitted.clone();

    while Instant::now() < deadline {
        match poll_once(client, &request.symbol, &submitted.id).await {
            Ok(PollObservation::Closed(order)) => {
                info!(order_id = %order.id, filled = order.filled_size(), "order closed");
                return Ok(FillOutcome::Filled(order));
            }
            Ok(PollObservation::Open(order)) => {
                debug!(
                    order_id = %order.id,
                    filled = order.filled_size(),
                    size = order.size,
                    "order still open"
                );
                last_seen = order;
            }
            Ok(PollObservation::Gone) => {
                // Not open and not closed: the venue gives no stronger signal,
                // so this is treated as terminal-cancelled.
                warn!(order_id = %submitted.id, "order vanished from open and closed lists");
                return Ok(FillOutcome::Vanished(last_seen));
            }
            Err(err) => {
                warn!(order_id = %submitted.id, error = %err, "poll iteration failed");
            }
        }
        tokio::time::sleep(config.poll_interval).await;
    }

    warn!(
        order_id = %submitted.id,
        timeout_ms = config.fill_timeout.as_millis() as u64,
        "fill confirmation timed out"
    );
    Ok(FillOutcome::Unconfirmed(submitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::instrument::{ContractType, Product};
    use crate::domain::entities::order::{OrderSide, OrderSize};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn order(id: &str, size: i64, unfilled: i64) -> ExchangeOrder {
        ExchangeOrder {
            id: id.into(),
            product_id: 27,
            side: "buy".into(),
            size,
            unfilled_size: Some(unfilled),
            state: None,
            average_fill_price: None,
            raw: serde_json::Value::Null,
        }
    }

    /// Scripted exchange: each poll pops the next (closed, open) list pair.
    struct ScriptedExchange {
        polls: Mutex<Vec<(Vec<ExchangeOrder>, Vec<ExchangeOrder>)>>,
        poll_count: AtomicU32,
        place_failures: Mutex<Vec<ExchangeError>>,
    }

    impl ScriptedExchange {
        fn new(polls: Vec<(Vec<ExchangeOrder>, Vec<ExchangeOrder>)>) -> Self {
            ScriptedExchange {
                polls: Mutex::new(polls),
                poll_count: AtomicU32::new(0),
                place_failures: Mutex::new(Vec::new()),
            }
        }

        fn failing_first(mut failures: Vec<ExchangeError>) -> Self {
            failures.reverse();
            ScriptedExchange {
                polls: Mutex::new(vec![(vec![order("1", 1, 0)], vec![])]),
                poll_count: AtomicU32::new(0),
                place_failures: Mutex::new(failures),
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn place_order(&self, _request: &OrderRequest) -> ExchangeResult<ExchangeOrder> {
            if let Some(err) = self.place_failures.lock().unwrap().pop() {
                return Err(err);
            }
            Ok(order("1", 1, 1))
        }

        async fn open_orders(&self, _symbol: &str) -> ExchangeResult<Vec<ExchangeOrder>> {
            let polls = self.polls.lock().unwrap();
            let idx = (self.poll_count.load(Ordering::SeqCst) as usize).min(polls.len() - 1);
            let open = polls[idx].1.clone();
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            Ok(open)
        }

        async fn closed_orders(&self, _symbol: &str) -> ExchangeResult<Vec<ExchangeOrder>> {
            let polls = self.polls.lock().unwrap();
            let idx = (self.poll_count.load(Ordering::SeqCst) as usize).min(polls.len() - 1);
            Ok(polls[idx].0.clone())
        }

        async fn product(&self, symbol: &str) -> ExchangeResult<Product> {
            Ok(Product {
                id: 27,
                symbol: symbol.into(),
                contract_type: ContractType::Linear,
                contract_value: 0.001,
            })
        }
    }

    fn fast_config() -> ExecutionConfig {
        ExecutionConfig {
            poll_interval: Duration::from_millis(10),
            fill_timeout: Duration::from_millis(200),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn buy_request() -> OrderRequest {
        OrderRequest::market("BTCUSD", OrderSide::Buy, OrderSize::Contracts(1)).unwrap()
    }

    #[tokio::test]
    async fn test_filled_on_second_poll_within_bound() {
        // Open on the first poll, closed on the second.
        let exchange = ScriptedExchange::new(vec![
            (vec![], vec![order("1", 1, 1)]),
            (vec![order("1", 1, 0)], vec![]),
        ]);
        let start = Instant::now();
        let outcome = place_and_await_fill(&exchange, &buy_request(), &fast_config())
            .await
            .unwrap();
        assert!(outcome.is_filled());
        assert_eq!(outcome.order().filled_size(), 1);
        // second poll happens one interval after the first
        assert!(start.elapsed() < Duration::from_millis(2 * 10 + 50));
    }

    #[tokio::test]
    async fn test_vanished_returns_immediately() {
        // Known approximation: absent from both lists is read as cancelled,
        // the venue offers no stronger signal.
        let exchange = ScriptedExchange::new(vec![(vec![], vec![])]);
        let start = Instant::now();
        let outcome = place_and_await_fill(&exchange, &buy_request(), &fast_config())
            .await
            .unwrap();
        assert!(matches!(outcome, FillOutcome::Vanished(_)));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_timeout_yields_unconfirmed() {
        // Perpetually open: the loop must end at the timeout with the
        // submission response, not an error.
        let exchange = ScriptedExchange::new(vec![(vec![], vec![order("1", 1, 1)])]);
        let outcome = place_and_await_fill(&exchange, &buy_request(), &fast_config())
            .await
            .unwrap();
        assert!(matches!(outcome, FillOutcome::Unconfirmed(_)));
        assert_eq!(outcome.order().id, "1");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_submit_errors() {
        let exchange = ScriptedExchange::failing_first(vec![
            ExchangeError::TransientNetwork("reset".into()),
            ExchangeError::RequestFailed {
                status: 429,
                body: "slow down".into(),
            },
        ]);
        let outcome = place_and_await_fill(&exchange, &buy_request(), &fast_config())
            .await
            .unwrap();
        assert!(outcome.is_filled());
    }

    #[tokio::test]
    async fn test_business_rejection_not_retried() {
        let exchange = ScriptedExchange::failing_first(vec![
            ExchangeError::RequestFailed {
                status: 400,
                body: "insufficient margin".into(),
            },
            // would succeed if retried; it must not be
        ]);
        let result = place_and_await_fill(&exchange, &buy_request(), &fast_config()).await;
        assert!(matches!(
            result,
            Err(ExchangeError::RequestFailed { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_transient_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ExchangeResult<()> = retry_transient(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExchangeError::TransientNetwork("down".into())) }
            },
            3,
            Duration::from_millis(1),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
