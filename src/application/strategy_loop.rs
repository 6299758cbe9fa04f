//! Strategy Loop
//!
//! One loop per running bot, spawned as its own tokio task. Each tick it
//! fetches candles, computes the indicator, and applies the entry/exit rules;
//! confirmed fills are the only thing that mutates and persists runtime
//! state. Stop requests arrive over a watch channel so a sleeping loop wakes
//! immediately instead of noticing on its next tick.

use crate::domain::entities::bot::Bot;
use crate::domain::entities::order::{FillOutcome, OrderRequest, OrderSide, OrderSize, OrderType};
use crate::domain::errors::BotError;
use crate::domain::repositories::candle_source::CandleSource;
use crate::domain::repositories::exchange_client::ExchangeClient;
use crate::domain::services::execution::{place_and_await_fill, ExecutionConfig};
use crate::domain::services::indicators::rsi;
use crate::domain::services::strategy::{evaluate, realized_pnl, TickAction};
use crate::application::events::{BotEvent, BotEventKind, EventPublisher};
use crate::persistence::models::{CreateTradeLog, TradeLogOutcome};
use crate::persistence::repository::{BotRepository, TradeLogRepository};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct StrategyLoop {
    bot: Bot,
    client: Arc<dyn ExchangeClient>,
    candles: Arc<dyn CandleSource>,
    events: Arc<EventPublisher>,
    bots: BotRepository,
    trade_logs: TradeLogRepository,
    execution: ExecutionConfig,
    stop: watch::Receiver<bool>,
}

impl StrategyLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bot: Bot,
        client: Arc<dyn ExchangeClient>,
        candles: Arc<dyn CandleSource>,
        events: Arc<EventPublisher>,
        bots: BotRepository,
        trade_logs: TradeLogRepository,
        execution: ExecutionConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        StrategyLoop {
            bot,
            client,
            candles,
            events,
            bots,
            trade_logs,
            execution,
            stop,
        }
    }

    /// Drive ticks until a stop is signalled. Tick failures are logged and
    /// the loop keeps going; only the stop signal (or the orchestrator
    /// dropping its sender) ends it.
    pub async fn run(mut self) {
        info!(
            bot_id = %self.bot.id,
            name = %self.bot.name,
            symbol = %self.bot.symbol,
            "strategy loop started"
        );

        loop {
            tokio::select! {
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.bot.params.poll_interval) => {
                    if let Err(err) = self.tick().await {
                        warn!(bot_id = %self.bot.id, error = %err, "tick failed");
                    }
                }
            }
        }

        info!(bot_id = %self.bot.id, "strategy loop stopped");
    }

    /// One evaluation: candles in, at most one order out.
    async fn tick(&mut self) -> Result<(), BotError> {
        let candles = self
            .candles
            .fetch_candles(
                &self.bot.symbol,
                &self.bot.timeframe,
                self.bot.params.candle_limit(),
            )
            .await?;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let Some(rsi_value) = rsi(&closes, self.bot.params.period) else {
            debug!(
                bot_id = %self.bot.id,
                candles = closes.len(),
                "not enough history for indicator, holding"
            );
            return Ok(());
        };
        let last_close = closes.last().copied().ok_or_else(|| {
            BotError::MarketData("candle source returned no closes".to_string())
        })?;

        let action = evaluate(&self.bot.runtime, rsi_value, &self.bot.params, Utc::now());
        debug!(
            bot_id = %self.bot.id,
            rsi = rsi_value,
            in_position = self.bot.runtime.in_position,
            action = ?action,
            "tick evaluated"
        );

        match action {
            TickAction::Enter => self.execute(OrderSide::Buy, rsi_value, last_close).await,
            TickAction::Exit => self.execute(OrderSide::Sell, rsi_value, last_close).await,
            TickAction::Hold => Ok(()),
        }
    }

    /// Place a market order, confirm the fill, and settle the ledger row.
    /// Runtime state changes only on a confirmed fill.
    async fn execute(
        &mut self,
        side: OrderSide,
        rsi_value: f64,
        last_close: f64,
    ) -> Result<(), BotError> {
        let quantity = self.bot.params.quantity;
        let request =
            OrderRequest::market(self.bot.symbol.clone(), side, OrderSize::Contracts(quantity))?;

        let log = self
            .trade_logs
            .record_attempt(CreateTradeLog {
                id: Uuid::new_v4().to_string(),
                bot_id: Some(self.bot.id.clone()),
                user_id: self.bot.user_id.clone(),
                exchange: self.bot.exchange.clone(),
                symbol: self.bot.symbol.clone(),
                side: side.as_wire().to_string(),
                order_type: OrderType::Market.as_wire().to_string(),
                quantity: quantity as f64,
                price: None,
            })
            .await?;

        info!(
            bot_id = %self.bot.id,
            side = %side,
            quantity,
            rsi = rsi_value,
            "signal triggered, placing order"
        );

        let outcome = match place_and_await_fill(&*self.client, &request, &self.execution).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(bot_id = %self.bot.id, error = %err, "order submission failed");
                self.trade_logs
                    .finalize(
                        &log.id,
                        TradeLogOutcome::failed(Some(serde_json::json!({
                            "error": err.to_string()
                        }))),
                    )
                    .await?;
                return Err(err.into());
            }
        };

        match outcome {
            FillOutcome::Filled(order) => {
                // The closed list also carries venue-cancelled orders; only
                // a non-zero filled quantity is a real fill.
                if order.filled_size() <= 0 {
                    warn!(
                        bot_id = %self.bot.id,
                        order_id = %order.id,
                        "order closed with zero fill, position unchanged"
                    );
                    self.trade_logs
                        .finalize(&log.id, TradeLogOutcome::failed(Some(order.raw.clone())))
                        .await?;
                    return Ok(());
                }

                let fill_price = order.average_fill_price.unwrap_or(last_close);
                // PnL is reporting, not execution: a catalog hiccup here must
                // not leave a confirmed fill unsettled.
                let pnl = if side == OrderSide::Sell {
                    match self.client.product(&self.bot.symbol).await {
                        Ok(product) => self.bot.runtime.entry_price.map(|entry| {
                            realized_pnl(
                                entry,
                                fill_price,
                                quantity as f64,
                                product.contract_size(fill_price),
                            )
                        }),
                        Err(err) => {
                            warn!(
                                bot_id = %self.bot.id,
                                error = %err,
                                "catalog lookup failed, recording fill without pnl"
                            );
                            None
                        }
                    }
                } else {
                    None
                };

                match side {
                    OrderSide::Buy => {
                        self.bot.runtime.in_position = true;
                        self.bot.runtime.entry_price = Some(fill_price);
                    }
                    OrderSide::Sell => {
                        self.bot.runtime.in_position = false;
                        self.bot.runtime.entry_price = None;
                    }
                }
                self.bot.runtime.last_action_at = Some(Utc::now());
                self.bots
                    .update_runtime(&self.bot.id, &self.bot.runtime)
                    .await?;

                self.trade_logs
                    .finalize(
                        &log.id,
                        TradeLogOutcome::success(
                            Some(fill_price),
                            Some(order.id.clone()),
                            pnl,
                            Some(order.raw.clone()),
                        ),
                    )
                    .await?;

                info!(
                    bot_id = %self.bot.id,
                    order_id = %order.id,
                    side = %side,
                    price = fill_price,
                    pnl = ?pnl,
                    "fill confirmed"
                );

                self.events.publish(BotEvent {
                    bot_id: self.bot.id.clone(),
                    kind: BotEventKind::Trade,
                    payload: serde_json::json!({
                        "side": side.as_wire(),
                        "quantity": quantity,
                        "price": fill_price,
                        "realized_pnl": pnl,
                        "exchange_order_id": order.id,
                    }),
                });
                self.publish_runtime();
                Ok(())
            }
            FillOutcome::Vanished(order) => {
                warn!(
                    bot_id = %self.bot.id,
                    order_id = %order.id,
                    "order cancelled by venue, position unchanged"
                );
                self.trade_logs
                    .finalize(&log.id, TradeLogOutcome::failed(Some(order.raw.clone())))
                    .await?;
                Ok(())
            }
            FillOutcome::Unconfirmed(order) => {
                warn!(
                    bot_id = %self.bot.id,
                    order_id = %order.id,
                    "fill unconfirmed within window, position unchanged"
                );
                self.trade_logs
                    .finalize(&log.id, TradeLogOutcome::failed(Some(order.raw.clone())))
                    .await?;
                Ok(())
            }
        }
    }

    fn publish_runtime(&self) {
        self.events.publish(BotEvent {
            bot_id: self.bot.id.clone(),
            kind: BotEventKind::Runtime,
            payload: serde_json::json!({
                "in_position": self.bot.runtime.in_position,
                "entry_price": self.bot.runtime.entry_price,
                "last_action_at": self.bot.runtime.last_action_at,
            }),
        });
    }
}
