//! Strategy configuration.
//!
//! A `StrategyConfig` is built once (from INI or JSON) and handed to the
//! engine read-only. `validate` checks every structural rule up front so the
//! run itself only fails on invariant violations.

use crate::domain::condition::ConditionGroup;
use crate::domain::error::ConfigurationError;
use crate::domain::execution::TradeMode;
use crate::domain::indicator::IndicatorRegistry;
use crate::domain::risk::RiskPolicy;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ALLOCATION_TOLERANCE: f64 = 1e-9;

/// How much of an instrument's capital a single position commits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PositionSizing {
    /// All available cash, compounding after each exit.
    #[default]
    AllCash,
    /// Fraction of the instrument's starting capital.
    Percentage(f64),
    /// Fixed dollar amount.
    FixedAmount(f64),
}

impl PositionSizing {
    /// Per-trade amount for an instrument starting with `capital`. `None`
    /// means invest all available cash.
    pub fn per_trade_amount(&self, capital: f64) -> Option<f64> {
        match self {
            PositionSizing::AllCash => None,
            PositionSizing::Percentage(fraction) => Some(capital * fraction),
            PositionSizing::FixedAmount(amount) => Some(*amount),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            PositionSizing::AllCash => Ok(()),
            PositionSizing::Percentage(f) if f.is_finite() && *f > 0.0 && *f <= 1.0 => Ok(()),
            PositionSizing::Percentage(f) => Err(ConfigurationError::InvalidCapital(format!(
                "per-trade percentage must be in (0, 1], got {f}"
            ))),
            PositionSizing::FixedAmount(a) if a.is_finite() && *a > 0.0 => Ok(()),
            PositionSizing::FixedAmount(a) => Err(ConfigurationError::InvalidCapital(format!(
                "per-trade amount must be positive, got {a}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalConfig {
    pub total_capital: f64,
    #[serde(default)]
    pub per_trade: PositionSizing,
    /// Ticker -> fraction of total capital. Empty means an equal split.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocation: BTreeMap<String, f64>,
}

impl CapitalConfig {
    pub fn new(total_capital: f64) -> Self {
        Self {
            total_capital,
            per_trade: PositionSizing::AllCash,
            allocation: BTreeMap::new(),
        }
    }

    /// Resolved fraction per ticker.
    pub fn allocations(&self, tickers: &[String]) -> Result<BTreeMap<String, f64>, ConfigurationError> {
        if tickers.is_empty() {
            return Err(ConfigurationError::NoTickers);
        }
        for (i, ticker) in tickers.iter().enumerate() {
            if tickers[..i].contains(ticker) {
                return Err(ConfigurationError::DuplicateTicker(ticker.clone()));
            }
        }
        if self.allocation.is_empty() {
            let share = 1.0 / tickers.len() as f64;
            return Ok(tickers.iter().map(|t| (t.clone(), share)).collect());
        }

        for key in self.allocation.keys() {
            if !tickers.contains(key) {
                return Err(ConfigurationError::InvalidAllocation(format!(
                    "allocation given for unknown ticker {key}"
                )));
            }
        }
        let mut resolved = BTreeMap::new();
        for ticker in tickers {
            let fraction = *self.allocation.get(ticker).ok_or_else(|| {
                ConfigurationError::InvalidAllocation(format!("no allocation for {ticker}"))
            })?;
            if !fraction.is_finite() || fraction <= 0.0 {
                return Err(ConfigurationError::InvalidAllocation(format!(
                    "allocation for {ticker} must be positive, got {fraction}"
                )));
            }
            resolved.insert(ticker.clone(), fraction);
        }
        let total: f64 = resolved.values().sum();
        if total > 1.0 + ALLOCATION_TOLERANCE {
            return Err(ConfigurationError::InvalidAllocation(format!(
                "allocations sum to {total:.4}, above 1.0"
            )));
        }
        Ok(resolved)
    }

    pub fn validate(&self, tickers: &[String]) -> Result<(), ConfigurationError> {
        if !self.total_capital.is_finite() || self.total_capital <= 0.0 {
            return Err(ConfigurationError::InvalidCapital(format!(
                "total capital must be positive, got {}",
                self.total_capital
            )));
        }
        self.per_trade.validate()?;
        self.allocations(tickers).map(|_| ())
    }
}

fn default_interval() -> String {
    "1d".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub tickers: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default)]
    pub entry: ConditionGroup,
    #[serde(default)]
    pub exit: ConditionGroup,
    #[serde(default)]
    pub mode: TradeMode,
    pub capital: CapitalConfig,
    #[serde(default)]
    pub risk: RiskPolicy,
}

impl StrategyConfig {
    pub fn new(name: &str, tickers: &[&str], capital: CapitalConfig) -> Self {
        Self {
            name: name.to_string(),
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            start_date: None,
            end_date: None,
            interval: default_interval(),
            entry: ConditionGroup::default(),
            exit: ConditionGroup::default(),
            mode: TradeMode::Long,
            capital,
            risk: RiskPolicy::disabled(),
        }
    }

    pub fn validate(&self, registry: &IndicatorRegistry) -> Result<(), ConfigurationError> {
        if self.tickers.is_empty() {
            return Err(ConfigurationError::NoTickers);
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ConfigurationError::InvalidDateRange { start, end });
            }
        }
        self.entry.validate(registry)?;
        self.exit.validate(registry)?;
        self.capital.validate(&self.tickers)?;
        self.risk.validate()?;
        for warning in self.risk.sanity_warnings() {
            tracing::warn!(strategy = %self.name, "{warning}");
        }
        Ok(())
    }

    /// Starting capital for one ticker under the configured allocation.
    pub fn capital_for(&self, ticker: &str) -> Result<f64, ConfigurationError> {
        let allocations = self.capital.allocations(&self.tickers)?;
        allocations
            .get(ticker)
            .map(|fraction| self.capital.total_capital * fraction)
            .ok_or_else(|| ConfigurationError::InvalidAllocation(format!("{ticker} is not configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::{Condition, Operand, Operator};
    use crate::domain::risk::StopRule;
    use approx::assert_relative_eq;

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample_config() -> StrategyConfig {
        let mut config = StrategyConfig::new("SMA Crossover", &["AAPL", "MSFT"], CapitalConfig::new(10_000.0));
        config.entry = ConditionGroup::all(vec![Condition::new(
            Operand::indicator("SMA", &[5.0]),
            Operator::CrossedUp,
            Operand::indicator("SMA", &[20.0]),
        )]);
        config.exit = ConditionGroup::all(vec![Condition::new(
            Operand::indicator("SMA", &[5.0]),
            Operator::CrossedDown,
            Operand::indicator("SMA", &[20.0]),
        )]);
        config
    }

    #[test]
    fn equal_split_by_default() {
        let capital = CapitalConfig::new(9_000.0);
        let alloc = capital.allocations(&tickers(&["A", "B", "C"])).unwrap();
        for fraction in alloc.values() {
            assert_relative_eq!(*fraction, 1.0 / 3.0);
        }
    }

    #[test]
    fn explicit_allocation_checks() {
        let mut capital = CapitalConfig::new(10_000.0);
        capital.allocation.insert("A".into(), 0.6);
        capital.allocation.insert("B".into(), 0.4);
        assert!(capital.allocations(&tickers(&["A", "B"])).is_ok());

        capital.allocation.insert("B".into(), 0.5);
        assert!(matches!(
            capital.allocations(&tickers(&["A", "B"])),
            Err(ConfigurationError::InvalidAllocation(_))
        ));

        capital.allocation.insert("B".into(), -0.1);
        assert!(capital.allocations(&tickers(&["A", "B"])).is_err());

        capital.allocation.remove("B");
        assert!(capital.allocations(&tickers(&["A", "B"])).is_err());
    }

    #[test]
    fn allocation_sum_tolerance() {
        let mut capital = CapitalConfig::new(10_000.0);
        capital.allocation.insert("A".into(), 0.1 + 0.2);
        capital.allocation.insert("B".into(), 0.7);
        assert!(capital.allocations(&tickers(&["A", "B"])).is_ok());
    }

    #[test]
    fn per_trade_amounts() {
        assert_eq!(PositionSizing::AllCash.per_trade_amount(1_000.0), None);
        assert_relative_eq!(
            PositionSizing::Percentage(0.25).per_trade_amount(1_000.0).unwrap(),
            250.0
        );
        assert_relative_eq!(
            PositionSizing::FixedAmount(300.0).per_trade_amount(1_000.0).unwrap(),
            300.0
        );
        assert!(PositionSizing::Percentage(1.5).validate().is_err());
        assert!(PositionSizing::FixedAmount(0.0).validate().is_err());
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_config().validate(&IndicatorRegistry::builtin()).is_ok());
    }

    #[test]
    fn validate_rejects_structure_errors() {
        let registry = IndicatorRegistry::builtin();

        let mut no_tickers = sample_config();
        no_tickers.tickers.clear();
        assert_eq!(no_tickers.validate(&registry), Err(ConfigurationError::NoTickers));

        let mut bad_dates = sample_config();
        bad_dates.start_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        bad_dates.end_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(matches!(
            bad_dates.validate(&registry),
            Err(ConfigurationError::InvalidDateRange { .. })
        ));

        let mut bad_capital = sample_config();
        bad_capital.capital.total_capital = 0.0;
        assert!(bad_capital.validate(&registry).is_err());

        let mut bad_risk = sample_config();
        bad_risk.risk = RiskPolicy::new(Some(StopRule::percentage(-0.1)), None);
        assert!(bad_risk.validate(&registry).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_tickers() {
        let json = r#"{
            "name": "dup",
            "tickers": ["AAA", "AAA"],
            "capital": { "total_capital": 2000.0 }
        }"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.validate(&IndicatorRegistry::builtin()),
            Err(ConfigurationError::DuplicateTicker("AAA".into()))
        );
        assert!(config.capital_for("AAA").is_err());
    }

    #[test]
    fn capital_for_ticker() {
        let config = sample_config();
        assert_relative_eq!(config.capital_for("AAPL").unwrap(), 5_000.0);
        assert!(config.capital_for("GOOG").is_err());
    }

    #[test]
    fn json_round_trip_with_defaults() {
        let json = r#"{
            "name": "minimal",
            "tickers": ["SPY"],
            "capital": { "total_capital": 5000.0, "per_trade": { "kind": "percentage", "value": 0.5 } }
        }"#;
        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.interval, "1d");
        assert_eq!(config.mode, TradeMode::Long);
        assert!(config.entry.is_empty());
        assert!(!config.risk.enabled);
        assert_eq!(config.capital.per_trade, PositionSizing::Percentage(0.5));

        let text = serde_json::to_string(&sample_config()).unwrap();
        let back: StrategyConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, sample_config());
    }
}
