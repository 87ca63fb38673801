//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_trade_log_adapter;
pub mod file_config_adapter;
pub mod json_report_adapter;
pub mod json_strategy_adapter;
