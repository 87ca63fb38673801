//! Condition evaluation over a bar table.
//!
//! # Evaluation Semantics
//!
//! - Operands resolve to a full series: indicators through the registry,
//!   prices by column name, constants broadcast to the table length.
//! - A lag of n shifts the series forward so bar i sees bar i - n; the first
//!   n bars become undefined (NaN).
//! - Operators are applied bar by bar. Any comparison that touches NaN is
//!   `false`, so warm-up and lag gaps never fire a signal.
//! - `CROSSED_*`, `INCREASED` and `DECREASED` read bar i - 1 and are `false`
//!   at bar 0.
//! - `EQUAL` uses an absolute tolerance of 1e-9.
//!
//! Resolved operands are memoized per evaluator (one evaluator per run and
//! instrument). The table itself is never modified.

use crate::domain::bar_table::{BarTable, Series};
use crate::domain::condition::{Condition, Operand, Operator};
use crate::domain::error::ConfigurationError;
use crate::domain::indicator::IndicatorRegistry;
use std::collections::HashMap;

const EPSILON: f64 = 1e-9;

pub struct ConditionEvaluator<'a> {
    registry: &'a IndicatorRegistry,
    table: &'a BarTable,
    cache: HashMap<String, Series>,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(registry: &'a IndicatorRegistry, table: &'a BarTable) -> Self {
        Self {
            registry,
            table,
            cache: HashMap::new(),
        }
    }

    pub fn table(&self) -> &BarTable {
        self.table
    }

    /// Number of distinct operands resolved so far.
    pub fn cached_operands(&self) -> usize {
        self.cache.len()
    }

    /// Resolve a scalar operand to a series of the table's length.
    pub fn resolve(&mut self, operand: &Operand) -> Result<Series, ConfigurationError> {
        let key = operand.to_string();
        if let Some(series) = self.cache.get(&key) {
            return Ok(series.clone());
        }

        let series = match operand {
            Operand::Indicator { name, params, lag } => {
                let base = self.registry.compute(name, params, self.table)?;
                shift(&base, *lag)
            }
            Operand::Price { column, lag } => {
                let base = self
                    .table
                    .column(column)
                    .ok_or_else(|| ConfigurationError::UnknownColumn(column.clone()))?;
                shift(base, *lag)
            }
            Operand::Constant { value } => vec![*value; self.table.len()],
            Operand::Range { .. } => {
                return Err(ConfigurationError::MalformedOperand(format!(
                    "range {operand} used as a single value"
                )));
            }
        };

        self.cache.insert(key, series.clone());
        Ok(series)
    }

    /// Evaluate one condition into a per-bar boolean series.
    pub fn evaluate(&mut self, condition: &Condition) -> Result<Vec<bool>, ConfigurationError> {
        condition.validate(self.registry)?;
        let a = self.resolve(&condition.left)?;

        let signal = match condition.operator {
            Operator::Increased => increased(&a),
            Operator::Decreased => decreased(&a),
            Operator::WithinRange => self.within_range(&a, &condition.right)?,
            op => {
                let b = self.resolve(&condition.right)?;
                compare(op, &a, &b)
            }
        };
        Ok(signal)
    }

    fn within_range(&mut self, a: &[f64], right: &Operand) -> Result<Vec<bool>, ConfigurationError> {
        let bounds: Vec<Operand> = match right {
            Operand::Range { bounds } => bounds.clone(),
            single => vec![single.clone()],
        };
        match bounds.as_slice() {
            [only] => {
                let b = self.resolve(only)?;
                Ok(compare(Operator::Equal, a, &b))
            }
            [low, high] => {
                let low = self.resolve(low)?;
                let high = self.resolve(high)?;
                Ok((0..a.len())
                    .map(|i| low[i] <= a[i] && a[i] <= high[i])
                    .collect())
            }
            _ => Err(ConfigurationError::MalformedOperand(format!(
                "range needs one or two bounds, got {}",
                bounds.len()
            ))),
        }
    }
}

/// Shift a series forward by `lag` bars, filling the gap with NaN.
pub fn shift(series: &[f64], lag: usize) -> Series {
    if lag == 0 {
        return series.to_vec();
    }
    let n = series.len();
    let mut out = vec![f64::NAN; n];
    if lag < n {
        out[lag..].copy_from_slice(&series[..n - lag]);
    }
    out
}

/// Apply a two-operand operator bar by bar.
pub fn compare(operator: Operator, a: &[f64], b: &[f64]) -> Vec<bool> {
    let n = a.len().min(b.len());
    (0..n)
        .map(|i| match operator {
            Operator::GreaterThan => a[i] > b[i],
            Operator::LessThan => a[i] < b[i],
            Operator::GreaterOrEqual => a[i] >= b[i],
            Operator::LessOrEqual => a[i] <= b[i],
            Operator::Equal | Operator::WithinRange => (a[i] - b[i]).abs() < EPSILON,
            Operator::CrossedUp => crossed_up_at(a, b, i),
            Operator::CrossedDown => crossed_down_at(a, b, i),
            Operator::Crossed => crossed_up_at(a, b, i) || crossed_down_at(a, b, i),
            Operator::Increased => i > 0 && a[i] > a[i - 1],
            Operator::Decreased => i > 0 && a[i] < a[i - 1],
        })
        .collect()
}

fn crossed_up_at(a: &[f64], b: &[f64], i: usize) -> bool {
    i > 0 && a[i - 1] <= b[i - 1] && a[i] > b[i]
}

fn crossed_down_at(a: &[f64], b: &[f64], i: usize) -> bool {
    i > 0 && a[i - 1] >= b[i - 1] && a[i] < b[i]
}

pub fn increased(a: &[f64]) -> Vec<bool> {
    (0..a.len()).map(|i| i > 0 && a[i] > a[i - 1]).collect()
}

pub fn decreased(a: &[f64]) -> Vec<bool> {
    (0..a.len()).map(|i| i > 0 && a[i] < a[i - 1]).collect()
}
