pub mod execution;
pub mod indicators;
pub mod strategy;
