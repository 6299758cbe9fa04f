//! Application Layer
//!
//! Orchestration of strategy loops, the bot lifecycle, and event fan-out.

pub mod events;
pub mod orchestrator;
pub mod strategy_loop;
