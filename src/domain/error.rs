//! Domain error types.
//!
//! Configuration problems surface when a condition or strategy is built;
//! state-machine violations are programming-invariant failures and abort the
//! run. Data gaps are not errors at all: they evaluate to `false`.

use crate::domain::position::PositionState;

/// A parse error with position information for condition parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Invalid strategy structure: bad operator, indicator, operand or capital setup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown indicator '{0}'")]
    UnknownIndicator(String),

    #[error("unknown price column '{0}'")]
    UnknownColumn(String),

    #[error("indicator {indicator}: {reason}")]
    ArityMismatch { indicator: String, reason: String },

    #[error("lag {lag} out of range (0..={max})")]
    LagOutOfRange { lag: usize, max: usize },

    #[error("malformed operand: {0}")]
    MalformedOperand(String),

    #[error("unknown trade mode '{0}'")]
    UnknownMode(String),

    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("invalid risk policy: {0}")]
    InvalidRiskPolicy(String),

    #[error("invalid capital settings: {0}")]
    InvalidCapital(String),

    #[error("no tickers configured")]
    NoTickers,

    #[error("ticker {0} is listed more than once")]
    DuplicateTicker(String),

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}

/// Position state machine misuse. Never a market condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateInvariantViolation {
    #[error("invalid state transition: {operation} while {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: PositionState,
    },

    #[error("non-positive execution price {price} for {operation}")]
    InvalidPrice { operation: &'static str, price: f64 },
}

/// Top-level error type for signaltrader.
#[derive(Debug, thiserror::Error)]
pub enum SignalTraderError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    ConditionParse(#[from] ParseError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    StateInvariant(#[from] StateInvariantViolation),

    #[error("no data for {ticker}")]
    NoData { ticker: String },

    #[error("insufficient data for {ticker}: have {bars} bars, need {minimum}")]
    InsufficientData {
        ticker: String,
        bars: usize,
        minimum: usize,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SignalTraderError> for std::process::ExitCode {
    fn from(err: &SignalTraderError) -> Self {
        let code: u8 = match err {
            SignalTraderError::Io(_) | SignalTraderError::Json(_) => 1,
            SignalTraderError::ConfigParse { .. }
            | SignalTraderError::ConfigMissing { .. }
            | SignalTraderError::ConfigInvalid { .. } => 2,
            SignalTraderError::Data { .. } => 3,
            SignalTraderError::ConditionParse(_) | SignalTraderError::Configuration(_) => 4,
            SignalTraderError::NoData { .. } | SignalTraderError::InsufficientData { .. } => 5,
            SignalTraderError::StateInvariant(_) => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_context_points_at_position() {
        let err = ParseError {
            message: "expected ')'".into(),
            position: 4,
        };
        let rendered = err.display_with_context("SMA(5");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "SMA(5");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn configuration_error_converts_to_top_level() {
        let err: SignalTraderError = ConfigurationError::UnknownOperator("NEAR".into()).into();
        assert!(matches!(err, SignalTraderError::Configuration(_)));
        assert_eq!(err.to_string(), "unknown operator 'NEAR'");
    }

    #[test]
    fn invariant_violation_message_names_state() {
        let err = StateInvariantViolation::InvalidStateTransition {
            operation: "enter_long",
            state: PositionState::Long,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: enter_long while LONG"
        );
    }

    #[test]
    fn exit_codes_by_category() {
        use std::process::ExitCode;
        let cases = [
            (
                SignalTraderError::ConfigMissing {
                    section: "backtest".into(),
                    key: "tickers".into(),
                },
                ExitCode::from(2),
            ),
            (
                SignalTraderError::Data {
                    reason: "bad csv".into(),
                },
                ExitCode::from(3),
            ),
            (
                ConfigurationError::UnknownIndicator("FOO".into()).into(),
                ExitCode::from(4),
            ),
            (
                SignalTraderError::NoData {
                    ticker: "AAPL".into(),
                },
                ExitCode::from(5),
            ),
        ];
        for (err, expected) in &cases {
            assert_eq!(format!("{:?}", ExitCode::from(err)), format!("{:?}", expected));
        }
    }
}
