//! Per-user derivatives trading bot core: a signed exchange protocol client,
//! a poll-based order execution engine, RSI strategy loops, and the
//! orchestrator that runs one loop per active bot with resume-on-restart.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
