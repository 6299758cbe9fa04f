//! Entry/exit decision rules and realized-PnL arithmetic.
//!
//! Kept free of I/O so the gating logic is testable without an exchange: the
//! strategy loop feeds in the current indicator value and runtime state and
//! acts on the returned decision.

use crate::config::StrategyParams;
use crate::domain::entities::bot::BotRuntime;
use chrono::{DateTime, Utc};

/// What the loop should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Oversold while flat and cooled down: open a long.
    Enter,
    /// Overbought while in position and cooled down: close the long.
    Exit,
    Hold,
}

/// Apply the cooldown-gated entry/exit rules.
pub fn evaluate(
    runtime: &BotRuntime,
    rsi: f64,
    params: &StrategyParams,
    now: DateTime<Utc>,
) -> TickAction {
    if !runtime.in_position {
        if rsi <= params.oversold && runtime.cooled_down(now) {
            TickAction::Enter
        } else {
            TickAction::Hold
        }
    } else if rsi >= params.overbought && runtime.cooled_down(now) {
        TickAction::Exit
    } else {
        TickAction::Hold
    }
}

/// Realized profit on a position-closing trade:
/// `(exit - entry) * quantity * contract_size`, where `contract_size` is the
/// asset quantity one contract represents at the exit price.
pub fn realized_pnl(entry_price: f64, exit_price: f64, quantity: f64, contract_size: f64) -> f64 {
    (exit_price - entry_price) * quantity * contract_size
}
