//! Technical indicator registry.
//!
//! Indicators are looked up by name in an [`IndicatorRegistry`] that is built
//! once and passed by reference to whatever evaluates conditions; there is no
//! global table. Each entry declares its parameter signature so that operand
//! arity can be checked when a strategy is built rather than mid-run.
//!
//! Every indicator returns a [`Series`] with one value per table row.
//! Warm-up rows are NaN.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod wma;

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Compute function: the table plus parameters bound in declaration order.
pub type IndicatorFn = fn(&BarTable, &[f64]) -> Series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: Option<f64>,
}

const fn required(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: None,
    }
}

const fn optional(name: &'static str, default: f64) -> ParamSpec {
    ParamSpec {
        name,
        default: Some(default),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndicatorSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub compute: IndicatorFn,
}

/// Positional and keyword arguments as written in a condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default)]
    pub positional: Vec<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keyword: BTreeMap<String, f64>,
}

impl IndicatorParams {
    pub fn positional(values: &[f64]) -> Self {
        Self {
            positional: values.to_vec(),
            keyword: BTreeMap::new(),
        }
    }

    pub fn with_keyword(mut self, name: &str, value: f64) -> Self {
        self.keyword.insert(name.to_string(), value);
        self
    }
}

impl fmt::Display for IndicatorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.positional.iter().map(|v| v.to_string()).collect();
        parts.extend(self.keyword.iter().map(|(k, v)| format!("{k}={v}")));
        write!(f, "{}", parts.join(", "))
    }
}

impl IndicatorSpec {
    /// Bind call-site arguments to the declared signature.
    ///
    /// Positional arguments fill slots left to right, keywords fill by name,
    /// remaining slots take their defaults.
    pub fn bind(&self, params: &IndicatorParams) -> Result<Vec<f64>, ConfigurationError> {
        let mismatch = |reason: String| ConfigurationError::ArityMismatch {
            indicator: self.name.to_string(),
            reason,
        };

        if params.positional.len() > self.params.len() {
            return Err(mismatch(format!(
                "expected at most {} argument(s), got {}",
                self.params.len(),
                params.positional.len()
            )));
        }

        let mut bound: Vec<Option<f64>> = vec![None; self.params.len()];
        for (slot, value) in params.positional.iter().enumerate() {
            bound[slot] = Some(*value);
        }

        for (key, value) in &params.keyword {
            let slot = self
                .params
                .iter()
                .position(|p| p.name.eq_ignore_ascii_case(key))
                .ok_or_else(|| mismatch(format!("unknown parameter '{key}'")))?;
            if bound[slot].is_some() {
                return Err(mismatch(format!("parameter '{key}' given twice")));
            }
            bound[slot] = Some(*value);
        }

        bound
            .into_iter()
            .zip(self.params)
            .map(|(value, spec)| {
                value
                    .or(spec.default)
                    .ok_or_else(|| mismatch(format!("missing parameter '{}'", spec.name)))
            })
            .collect()
    }

    /// Human-readable signature, e.g. `RSI(period=14)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| match p.default {
                Some(d) => format!("{}={}", p.name, d),
                None => p.name.to_string(),
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Immutable name -> indicator mapping.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRegistry {
    specs: BTreeMap<String, IndicatorSpec>,
}

impl IndicatorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, spec: IndicatorSpec) -> Self {
        self.specs.insert(spec.name.to_ascii_uppercase(), spec);
        self
    }

    /// The indicators shipped with signaltrader.
    pub fn builtin() -> Self {
        const PERIOD: &[ParamSpec] = &[required("period")];
        const RSI: &[ParamSpec] = &[optional("period", 14.0)];
        const ATR: &[ParamSpec] = &[optional("period", 14.0)];
        const MACD: &[ParamSpec] = &[
            optional("fast", 12.0),
            optional("slow", 26.0),
            optional("signal", 9.0),
        ];
        const BB: &[ParamSpec] = &[optional("period", 20.0), optional("k", 2.0)];

        Self::empty()
            .with(IndicatorSpec {
                name: "SMA",
                description: "simple moving average of Close",
                params: PERIOD,
                compute: sma::compute,
            })
            .with(IndicatorSpec {
                name: "EMA",
                description: "exponential moving average of Close, SMA-seeded",
                params: PERIOD,
                compute: ema::compute,
            })
            .with(IndicatorSpec {
                name: "WMA",
                description: "linearly weighted moving average of Close",
                params: PERIOD,
                compute: wma::compute,
            })
            .with(IndicatorSpec {
                name: "RSI",
                description: "relative strength index, Wilder smoothing",
                params: RSI,
                compute: rsi::compute,
            })
            .with(IndicatorSpec {
                name: "ROC",
                description: "rate of change of Close in percent",
                params: PERIOD,
                compute: roc::compute,
            })
            .with(IndicatorSpec {
                name: "STDDEV",
                description: "population standard deviation of Close",
                params: PERIOD,
                compute: stddev::compute,
            })
            .with(IndicatorSpec {
                name: "ATR",
                description: "average true range, Wilder smoothing",
                params: ATR,
                compute: atr::compute,
            })
            .with(IndicatorSpec {
                name: "OBV",
                description: "on-balance volume",
                params: &[],
                compute: obv::compute,
            })
            .with(IndicatorSpec {
                name: "MACD",
                description: "MACD line: EMA(fast) - EMA(slow)",
                params: MACD,
                compute: macd::compute_line,
            })
            .with(IndicatorSpec {
                name: "MACD_SIGNAL",
                description: "EMA(signal) of the MACD line",
                params: MACD,
                compute: macd::compute_signal,
            })
            .with(IndicatorSpec {
                name: "MACD_HIST",
                description: "MACD line minus signal line",
                params: MACD,
                compute: macd::compute_histogram,
            })
            .with(IndicatorSpec {
                name: "BB_UPPER",
                description: "upper Bollinger band",
                params: BB,
                compute: bollinger::compute_upper,
            })
            .with(IndicatorSpec {
                name: "BB_MIDDLE",
                description: "middle Bollinger band (SMA)",
                params: BB,
                compute: bollinger::compute_middle,
            })
            .with(IndicatorSpec {
                name: "BB_LOWER",
                description: "lower Bollinger band",
                params: BB,
                compute: bollinger::compute_lower,
            })
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorSpec> {
        self.specs.get(&name.to_ascii_uppercase())
    }

    pub fn specs(&self) -> impl Iterator<Item = &IndicatorSpec> {
        self.specs.values()
    }

    /// Check that `name` exists and `params` fit its signature.
    pub fn validate(&self, name: &str, params: &IndicatorParams) -> Result<(), ConfigurationError> {
        let spec = self
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownIndicator(name.to_string()))?;
        spec.bind(params).map(|_| ())
    }

    pub fn compute(
        &self,
        name: &str,
        params: &IndicatorParams,
        table: &BarTable,
    ) -> Result<Series, ConfigurationError> {
        let spec = self
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownIndicator(name.to_string()))?;
        let bound = spec.bind(params)?;
        Ok((spec.compute)(table, &bound))
    }
}

/// Interpret a bound parameter as a window length. Zero, negative,
/// fractional and non-finite values are rejected.
pub(crate) fn period_arg(value: f64) -> Option<usize> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 {
        Some(value as usize)
    } else {
        None
    }
}

pub(crate) fn nan_series(len: usize) -> Series {
    vec![f64::NAN; len]
}

/// Close column of `table`, or an all-NaN series if it is missing.
pub(crate) fn close_of(table: &BarTable) -> Series {
    table
        .close()
        .map(<[f64]>::to_vec)
        .unwrap_or_else(|| nan_series(table.len()))
}


#[cfg(test)]
mod tests {
    use super::test_support::table_from_closes;
    use super::*;

    #[test]
    fn builtin_lookup_is_case_insensitive() {
        let registry = IndicatorRegistry::builtin();
        assert!(registry.get("sma").is_some());
        assert!(registry.get("Macd_Signal").is_some());
        assert!(registry.get("KAMA").is_none());
    }

    #[test]
    fn bind_positional_and_defaults() {
        let registry = IndicatorRegistry::builtin();
        let macd = registry.get("MACD").unwrap();
        let bound = macd.bind(&IndicatorParams::positional(&[5.0])).unwrap();
        assert_eq!(bound, vec![5.0, 26.0, 9.0]);
    }

    #[test]
    fn bind_keyword() {
        let registry = IndicatorRegistry::builtin();
        let bb = registry.get("BB_UPPER").unwrap();
        let params = IndicatorParams::positional(&[10.0]).with_keyword("k", 1.5);
        assert_eq!(bb.bind(&params).unwrap(), vec![10.0, 1.5]);
    }

    #[test]
    fn bind_rejects_missing_required() {
        let registry = IndicatorRegistry::builtin();
        let err = registry
            .validate("SMA", &IndicatorParams::default())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ArityMismatch { .. }));
    }

    #[test]
    fn bind_rejects_too_many_positional() {
        let registry = IndicatorRegistry::builtin();
        let err = registry
            .validate("SMA", &IndicatorParams::positional(&[5.0, 10.0]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ArityMismatch { .. }));
    }

    #[test]
    fn bind_rejects_unknown_and_duplicate_keyword() {
        let registry = IndicatorRegistry::builtin();
        let unknown = IndicatorParams::default().with_keyword("length", 5.0);
        assert!(registry.validate("SMA", &unknown).is_err());

        let dup = IndicatorParams::positional(&[5.0]).with_keyword("period", 6.0);
        assert!(registry.validate("SMA", &dup).is_err());
    }

    #[test]
    fn unknown_indicator_is_configuration_error() {
        let registry = IndicatorRegistry::builtin();
        let table = table_from_closes(&[1.0, 2.0]);
        let err = registry
            .compute("NOPE", &IndicatorParams::default(), &table)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownIndicator("NOPE".into()));
    }

    #[test]
    fn compute_returns_table_length() {
        let registry = IndicatorRegistry::builtin();
        let table = table_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        for spec in registry.specs() {
            let defaults: Vec<f64> = spec.params.iter().map(|p| p.default.unwrap_or(2.0)).collect();
            let series = (spec.compute)(&table, &defaults);
            assert_eq!(series.len(), table.len(), "{}", spec.name);
        }
    }

    #[test]
    fn signature_shows_defaults() {
        let registry = IndicatorRegistry::builtin();
        assert_eq!(registry.get("RSI").unwrap().signature(), "RSI(period=14)");
        assert_eq!(registry.get("SMA").unwrap().signature(), "SMA(period)");
        assert_eq!(registry.get("OBV").unwrap().signature(), "OBV()");
    }

    #[test]
    fn custom_registry() {
        fn ones(table: &BarTable, _: &[f64]) -> Series {
            vec![1.0; table.len()]
        }
        let registry = IndicatorRegistry::empty().with(IndicatorSpec {
            name: "ONES",
            description: "constant one",
            params: &[],
            compute: ones,
        });
        let table = table_from_closes(&[5.0, 6.0]);
        assert_eq!(
            registry
                .compute("ones", &IndicatorParams::default(), &table)
                .unwrap(),
            vec![1.0, 1.0]
        );
        assert!(registry.get("SMA").is_none());
    }

    #[test]
    fn period_arg_rejects_bad_values() {
        assert_eq!(period_arg(5.0), Some(5));
        assert_eq!(period_arg(0.0), None);
        assert_eq!(period_arg(-3.0), None);
        assert_eq!(period_arg(2.5), None);
        assert_eq!(period_arg(f64::NAN), None);
    }
}
