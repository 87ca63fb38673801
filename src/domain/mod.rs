//! Core domain types and logic.

pub mod ohlcv;
pub mod bar_table;
pub mod indicator;
pub mod condition;
pub mod condition_parser;
pub mod condition_eval;
pub mod signal;
pub mod position;
pub mod risk;
pub mod execution;
pub mod strategy;
pub mod backtest;
pub mod portfolio;
pub mod metrics;
pub mod config_validation;
pub mod universe;
pub mod error;
