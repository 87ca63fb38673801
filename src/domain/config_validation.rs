//! INI-level configuration validation.
//!
//! Checks presence and format of every key before a `StrategyConfig` is
//! built. Structural strategy rules (indicators, lags, allocations) are
//! checked afterwards by `StrategyConfig::validate`.

use crate::domain::condition::Combinator;
use crate::domain::error::SignalTraderError;
use crate::domain::execution::TradeMode;
use crate::domain::risk::StopKind;
use crate::domain::universe::{parse_allocation, parse_tickers};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    validate_tickers(config)?;
    validate_dates(config)?;
    validate_risk_free_rate(config)?;
    validate_min_bars(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    validate_mode(config)?;
    validate_conditions(config)?;
    validate_capital(config)?;
    validate_risk(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SignalTraderError {
    SignalTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> SignalTraderError {
    SignalTraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Non-blank string value, trimmed.
pub fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Strictly parsed float. Absent keys yield `Ok(None)`.
pub fn get_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, SignalTraderError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("'{s}' is not a number"))),
    }
}

/// Optional `YYYY-MM-DD` date.
pub fn get_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, SignalTraderError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map(Some)
            .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}

/// `[backtest] tickers`, falling back to the single-ticker `ticker` key.
pub fn ticker_list(config: &dyn ConfigPort) -> Option<String> {
    non_empty(config, "backtest", "tickers").or_else(|| non_empty(config, "backtest", "ticker"))
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    let list = ticker_list(config).ok_or_else(|| missing("backtest", "tickers"))?;
    parse_tickers(&list).map_err(|e| invalid("backtest", "tickers", e.to_string()))?;
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    let start = get_date(config, "backtest", "start_date")?;
    let end = get_date(config, "backtest", "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid("backtest", "start_date", "start_date must not be after end_date"));
        }
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    if let Some(value) = get_f64(config, "backtest", "risk_free_rate")? {
        if !(0.0..1.0).contains(&value) {
            return Err(invalid("backtest", "risk_free_rate", "risk_free_rate must be between 0 and 1"));
        }
    }
    Ok(())
}

fn validate_min_bars(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    if let Some(value) = get_f64(config, "backtest", "min_bars")? {
        if value < 1.0 || value.fract() != 0.0 {
            return Err(invalid("backtest", "min_bars", "min_bars must be a positive integer"));
        }
    }
    Ok(())
}

fn validate_mode(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    if let Some(mode) = non_empty(config, "strategy", "mode") {
        TradeMode::from_str(&mode).map_err(|e| invalid("strategy", "mode", e.to_string()))?;
    }
    Ok(())
}

fn validate_conditions(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    if non_empty(config, "strategy", "entry").is_none() {
        return Err(missing("strategy", "entry"));
    }
    for key in ["entry_combinator", "exit_combinator"] {
        if let Some(value) = non_empty(config, "strategy", key) {
            Combinator::from_str(&value).map_err(|e| invalid("strategy", key, e.to_string()))?;
        }
    }
    Ok(())
}

fn validate_capital(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    let total = get_f64(config, "capital", "total_capital")?.ok_or_else(|| missing("capital", "total_capital"))?;
    if !total.is_finite() || total <= 0.0 {
        return Err(invalid("capital", "total_capital", "total_capital must be positive"));
    }

    let per_trade = non_empty(config, "capital", "per_trade")
        .unwrap_or_else(|| "all_cash".to_string())
        .to_ascii_lowercase();
    match per_trade.as_str() {
        "all_cash" | "all" => {}
        "percentage" | "fixed" => {
            let value = get_f64(config, "capital", "per_trade_value")?
                .ok_or_else(|| missing("capital", "per_trade_value"))?;
            if value <= 0.0 || (per_trade == "percentage" && value > 1.0) {
                return Err(invalid(
                    "capital",
                    "per_trade_value",
                    format!("{value} is out of range for {per_trade} sizing"),
                ));
            }
        }
        other => {
            return Err(invalid(
                "capital",
                "per_trade",
                format!("unknown sizing '{other}', expected all_cash, percentage or fixed"),
            ));
        }
    }

    if let Some(allocation) = non_empty(config, "capital", "allocation") {
        parse_allocation(&allocation).map_err(|e| invalid("capital", "allocation", e.to_string()))?;
    }
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), SignalTraderError> {
    for key in ["stop_loss", "take_profit", "trailing_stop"] {
        if let Some(value) = get_f64(config, "risk", key)? {
            if value <= 0.0 {
                return Err(invalid("risk", key, format!("{key} must be positive")));
            }
        }
        let kind_key = format!("{key}_type");
        if let Some(kind) = non_empty(config, "risk", &kind_key) {
            StopKind::from_str(&kind).map_err(|e| invalid("risk", &kind_key, e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const VALID: &str = r#"
[backtest]
tickers = AAPL, MSFT
start_date = 2020-01-01
end_date = 2024-12-31
risk_free_rate = 0.05

[strategy]
name = SMA Crossover
mode = reversal
entry = CROSSED_UP(SMA(5), SMA(20))
exit = CROSSED_DOWN(SMA(5), SMA(20))

[capital]
total_capital = 10000
per_trade = percentage
per_trade_value = 0.5
allocation = AAPL:0.5, MSFT:0.5

[risk]
enabled = true
stop_loss = 0.05
take_profit = 0.1
"#;

    fn key_of(err: SignalTraderError) -> String {
        match err {
            SignalTraderError::ConfigInvalid { key, .. } | SignalTraderError::ConfigMissing { key, .. } => key,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(VALID);
        assert!(validate_backtest_config(&config).is_ok());
        assert!(validate_strategy_config(&config).is_ok());
    }

    #[test]
    fn single_ticker_key_accepted() {
        let config = make_config("[backtest]\nticker = SPY\n");
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn tickers_required() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, SignalTraderError::ConfigMissing { ref key, .. } if key == "tickers"));
    }

    #[test]
    fn duplicate_tickers_rejected() {
        let config = make_config("[backtest]\ntickers = AAPL,aapl\n");
        assert_eq!(key_of(validate_backtest_config(&config).unwrap_err()), "tickers");
    }

    #[test]
    fn bad_dates_rejected() {
        let config = make_config("[backtest]\ntickers = SPY\nstart_date = 2020/01/01\n");
        assert_eq!(key_of(validate_backtest_config(&config).unwrap_err()), "start_date");

        let config = make_config("[backtest]\ntickers = SPY\nstart_date = 2024-01-01\nend_date = 2023-01-01\n");
        assert_eq!(key_of(validate_backtest_config(&config).unwrap_err()), "start_date");
    }

    #[test]
    fn risk_free_rate_range() {
        let config = make_config("[backtest]\ntickers = SPY\nrisk_free_rate = 1.5\n");
        assert_eq!(key_of(validate_backtest_config(&config).unwrap_err()), "risk_free_rate");
    }

    #[test]
    fn min_bars_must_be_positive_integer() {
        let config = make_config("[backtest]\ntickers = SPY\nmin_bars = 0\n");
        assert_eq!(key_of(validate_backtest_config(&config).unwrap_err()), "min_bars");
    }

    #[test]
    fn unknown_mode_rejected() {
        let config = make_config(&VALID.replace("mode = reversal", "mode = sideways"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "mode");
    }

    #[test]
    fn entry_required() {
        let config = make_config(&VALID.replace("entry = CROSSED_UP(SMA(5), SMA(20))", ""));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "entry");
    }

    #[test]
    fn capital_checks() {
        let config = make_config(&VALID.replace("total_capital = 10000", "total_capital = -5"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "total_capital");

        let config = make_config(&VALID.replace("per_trade_value = 0.5", "per_trade_value = 1.5"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "per_trade_value");

        let config = make_config(&VALID.replace("per_trade = percentage", "per_trade = martingale"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "per_trade");

        let config = make_config(&VALID.replace("AAPL:0.5, MSFT:0.5", "AAPL=0.5"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "allocation");
    }

    #[test]
    fn risk_checks() {
        let config = make_config(&VALID.replace("stop_loss = 0.05", "stop_loss = -0.05"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "stop_loss");

        let config = make_config(&VALID.replace("stop_loss = 0.05", "stop_loss = 0"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "stop_loss");

        let config = make_config(&format!("{VALID}stop_loss_type = lunar\n"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "stop_loss_type");

        let config = make_config(&VALID.replace("take_profit = 0.1", "take_profit = ten"));
        assert_eq!(key_of(validate_strategy_config(&config).unwrap_err()), "take_profit");
    }
}
