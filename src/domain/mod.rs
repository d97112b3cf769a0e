//! Core domain types and decision logic.

pub mod backtest;
pub mod config_validation;
pub mod decision;
pub mod error;
pub mod indicator;
pub mod instrument_data;
pub mod instrument_state;
pub mod live;
pub mod metrics;
pub mod ml;
pub mod ohlcv;
pub mod orchestrator;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod sizing;
pub mod strategy;
pub mod universe;
