//! Condition model: operands, relational operators, and condition groups.
//!
//! - `Operand`: one side of a comparison (indicator, price column, constant,
//!   or a two-bound range for `WITHIN_RANGE`)
//! - `Operator`: the relational test applied bar by bar
//! - `Condition`: `(left, operator, right)`
//! - `ConditionGroup`: conditions joined by a single AND/OR combinator
//!
//! Values are plain data. Structural checks against an [`IndicatorRegistry`]
//! happen in `validate`, before any bar is evaluated.

use crate::domain::error::ConfigurationError;
use crate::domain::indicator::{IndicatorParams, IndicatorRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest look-back an operand may request.
pub const MAX_LAG: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operand {
    Indicator {
        name: String,
        #[serde(default)]
        params: IndicatorParams,
        #[serde(default)]
        lag: usize,
    },
    Price {
        column: String,
        #[serde(default)]
        lag: usize,
    },
    Constant {
        value: f64,
    },
    /// Lower and upper bound. Only meaningful as the right side of
    /// `WITHIN_RANGE`; a single bound degrades to equality.
    Range {
        bounds: Vec<Operand>,
    },
}

impl Operand {
    pub fn indicator(name: &str, params: &[f64]) -> Self {
        Operand::Indicator {
            name: name.to_ascii_uppercase(),
            params: IndicatorParams::positional(params),
            lag: 0,
        }
    }

    pub fn price(column: &str) -> Self {
        Operand::Price {
            column: column.to_string(),
            lag: 0,
        }
    }

    pub fn constant(value: f64) -> Self {
        Operand::Constant { value }
    }

    pub fn range(low: Operand, high: Operand) -> Self {
        Operand::Range {
            bounds: vec![low, high],
        }
    }

    /// Same operand looking `lag` bars back. Constants and ranges ignore it.
    pub fn lagged(self, lag: usize) -> Self {
        match self {
            Operand::Indicator { name, params, .. } => Operand::Indicator { name, params, lag },
            Operand::Price { column, .. } => Operand::Price { column, lag },
            other => other,
        }
    }

    pub fn lag(&self) -> usize {
        match self {
            Operand::Indicator { lag, .. } | Operand::Price { lag, .. } => *lag,
            Operand::Constant { .. } | Operand::Range { .. } => 0,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Operand::Range { .. })
    }

    /// Check lag bounds, indicator existence/arity, and range shape.
    pub fn validate(&self, registry: &IndicatorRegistry) -> Result<(), ConfigurationError> {
        if self.lag() > MAX_LAG {
            return Err(ConfigurationError::LagOutOfRange {
                lag: self.lag(),
                max: MAX_LAG,
            });
        }
        match self {
            Operand::Indicator { name, params, .. } => registry.validate(name, params),
            Operand::Price { column, .. } => {
                if column.trim().is_empty() {
                    Err(ConfigurationError::MalformedOperand(
                        "empty price column name".into(),
                    ))
                } else {
                    Ok(())
                }
            }
            Operand::Constant { value } => {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err(ConfigurationError::MalformedOperand(format!(
                        "constant {value} is not finite"
                    )))
                }
            }
            Operand::Range { bounds } => {
                if bounds.is_empty() || bounds.len() > 2 {
                    return Err(ConfigurationError::MalformedOperand(format!(
                        "range needs one or two bounds, got {}",
                        bounds.len()
                    )));
                }
                for bound in bounds {
                    if bound.is_range() {
                        return Err(ConfigurationError::MalformedOperand(
                            "nested range".into(),
                        ));
                    }
                    bound.validate(registry)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Indicator { name, params, lag } => {
                write!(f, "{name}({params})")?;
                write_lag(f, *lag)
            }
            Operand::Price { column, lag } => {
                write!(f, "{column}")?;
                write_lag(f, *lag)
            }
            Operand::Constant { value } => write!(f, "{value}"),
            Operand::Range { bounds } => {
                let parts: Vec<String> = bounds.iter().map(|b| b.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

fn write_lag(f: &mut fmt::Formatter<'_>, lag: usize) -> fmt::Result {
    if lag > 0 { write!(f, "[{lag}]") } else { Ok(()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    CrossedUp,
    CrossedDown,
    Crossed,
    GreaterThan,
    LessThan,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
    WithinRange,
    Increased,
    Decreased,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Operator::CrossedUp,
        Operator::CrossedDown,
        Operator::Crossed,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Equal,
        Operator::GreaterOrEqual,
        Operator::LessOrEqual,
        Operator::WithinRange,
        Operator::Increased,
        Operator::Decreased,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::CrossedUp => "CROSSED_UP",
            Operator::CrossedDown => "CROSSED_DOWN",
            Operator::Crossed => "CROSSED",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::Equal => "EQUAL",
            Operator::GreaterOrEqual => "GREATER_OR_EQUAL",
            Operator::LessOrEqual => "LESS_OR_EQUAL",
            Operator::WithinRange => "WITHIN_RANGE",
            Operator::Increased => "INCREASED",
            Operator::Decreased => "DECREASED",
        }
    }

    /// INCREASED/DECREASED only look at the left operand.
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Increased | Operator::Decreased)
    }

    /// Whether evaluation at bar i reads bar i-1.
    pub fn needs_previous_bar(self) -> bool {
        matches!(
            self,
            Operator::CrossedUp
                | Operator::CrossedDown
                | Operator::Crossed
                | Operator::Increased
                | Operator::Decreased
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ConfigurationError;

    /// Accepts any casing, with words separated by `_`, `-` or spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join("_")
            .to_ascii_uppercase();
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| ConfigurationError::UnknownOperator(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Operand,
    pub operator: Operator,
    pub right: Operand,
}

impl Condition {
    pub fn new(left: Operand, operator: Operator, right: Operand) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }

    /// INCREASED/DECREASED with the non-interacting placeholder on the right.
    pub fn unary(left: Operand, operator: Operator) -> Self {
        Self::new(left, operator, placeholder())
    }

    pub fn validate(&self, registry: &IndicatorRegistry) -> Result<(), ConfigurationError> {
        if self.left.is_range() {
            return Err(ConfigurationError::MalformedOperand(format!(
                "range cannot be the left operand of {}",
                self.operator
            )));
        }
        if self.right.is_range() && self.operator != Operator::WithinRange {
            return Err(ConfigurationError::MalformedOperand(format!(
                "range operand only valid with WITHIN_RANGE, not {}",
                self.operator
            )));
        }
        self.left.validate(registry)?;
        if !self.operator.is_unary() {
            self.right.validate(registry)?;
        }
        Ok(())
    }
}

pub fn placeholder() -> Operand {
    Operand::constant(0.0)
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operator.is_unary() && self.right == placeholder() {
            write!(f, "{}({})", self.operator, self.left)
        } else {
            write!(f, "{}({}, {})", self.operator, self.left, self.right)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl FromStr for Combinator {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "ALL" => Ok(Combinator::And),
            "OR" | "ANY" => Ok(Combinator::Or),
            _ => Err(ConfigurationError::UnknownOperator(s.trim().to_string())),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::And => f.write_str("AND"),
            Combinator::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionGroup {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub fn new(combinator: Combinator, conditions: Vec<Condition>) -> Self {
        Self {
            combinator,
            conditions,
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::new(Combinator::And, conditions)
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::new(Combinator::Or, conditions)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn validate(&self, registry: &IndicatorRegistry) -> Result<(), ConfigurationError> {
        self.conditions
            .iter()
            .try_for_each(|c| c.validate(registry))
    }

    /// Largest lag used by any operand in the group.
    pub fn max_lag(&self) -> usize {
        fn operand_lag(op: &Operand) -> usize {
            match op {
                Operand::Range { bounds } => bounds.iter().map(operand_lag).max().unwrap_or(0),
                other => other.lag(),
            }
        }
        self.conditions
            .iter()
            .map(|c| operand_lag(&c.left).max(operand_lag(&c.right)))
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}
