//! Stop-loss, take-profit, trailing-stop and forced-liquidation checks.
//!
//! Levels are derived once a position opens. Each bar is classified with a
//! fixed priority: liquidation (shorts only, always active), then stop-loss,
//! then take-profit. The first match wins.

use crate::domain::error::ConfigurationError;
use crate::domain::position::{PositionManager, PositionState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    /// Value is a decimal fraction of the entry price (0.05 = 5%).
    Percentage,
    /// Value is an absolute dollar amount for the whole position.
    Dollar,
}

impl std::str::FromStr for StopKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" | "pct" | "%" => Ok(StopKind::Percentage),
            "dollar" | "dollars" | "$" | "fixed" => Ok(StopKind::Dollar),
            other => Err(ConfigurationError::InvalidRiskPolicy(format!(
                "unknown stop kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopRule {
    pub kind: StopKind,
    pub value: f64,
}

impl StopRule {
    pub fn percentage(value: f64) -> Self {
        Self {
            kind: StopKind::Percentage,
            value,
        }
    }

    pub fn dollar(value: f64) -> Self {
        Self {
            kind: StopKind::Dollar,
            value,
        }
    }

    /// Distance from `reference` in price units for a position of `shares`.
    fn per_share_delta(&self, reference: f64, shares: u64) -> f64 {
        match self.kind {
            StopKind::Percentage => reference * self.value,
            StopKind::Dollar if shares > 0 => self.value / shares as f64,
            StopKind::Dollar => f64::INFINITY,
        }
    }

    fn validate(&self, label: &str) -> Result<(), ConfigurationError> {
        if !self.value.is_finite() || self.value <= 0.0 {
            return Err(ConfigurationError::InvalidRiskPolicy(format!(
                "{label} must be positive, got {}",
                self.value
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingPolicy {
    pub enabled: bool,
    pub kind: StopKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub stop_loss: Option<StopRule>,
    #[serde(default)]
    pub take_profit: Option<StopRule>,
    #[serde(default)]
    pub trailing: Option<TrailingPolicy>,
}

impl RiskPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(stop_loss: Option<StopRule>, take_profit: Option<StopRule>) -> Self {
        Self {
            enabled: true,
            stop_loss,
            take_profit,
            trailing: None,
        }
    }

    pub fn with_trailing(mut self, kind: StopKind, value: f64) -> Self {
        self.trailing = Some(TrailingPolicy {
            enabled: true,
            kind,
            value,
        });
        self
    }

    fn active_trailing(&self) -> Option<&TrailingPolicy> {
        self.trailing.as_ref().filter(|t| t.enabled)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(sl) = &self.stop_loss {
            sl.validate("stop_loss")?;
            if sl.kind == StopKind::Percentage && sl.value >= 1.0 {
                return Err(ConfigurationError::InvalidRiskPolicy(format!(
                    "percentage stop_loss {} must be below 1.0",
                    sl.value
                )));
            }
        }
        if let Some(tp) = &self.take_profit {
            tp.validate("take_profit")?;
        }
        if let Some(trailing) = self.active_trailing() {
            StopRule {
                kind: trailing.kind,
                value: trailing.value,
            }
            .validate("trailing_stop")?;
        }
        Ok(())
    }

    /// Economically odd settings that are allowed but worth a warning.
    pub fn sanity_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.enabled {
            return warnings;
        }
        if let (Some(sl), Some(tp)) = (&self.stop_loss, &self.take_profit) {
            if sl.kind == tp.kind && sl.value >= tp.value {
                warnings.push(format!(
                    "stop-loss ({}) is not smaller than take-profit ({})",
                    sl.value, tp.value
                ));
            }
        }
        if self.stop_loss.is_none() && self.take_profit.is_none() && self.active_trailing().is_none() {
            warnings.push("risk management enabled but no stop levels configured".to_string());
        }
        warnings
    }
}

/// Levels for the open position. `direction` is FLAT when nothing is open.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskState {
    pub direction: PositionState,
    pub entry_price: f64,
    pub shares: u64,
    pub stop_loss_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub best_price: f64,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            direction: PositionState::Flat,
            entry_price: 0.0,
            shares: 0,
            stop_loss_price: None,
            take_profit_price: None,
            best_price: 0.0,
        }
    }
}

impl RiskState {
    pub fn is_open(&self) -> bool {
        self.direction != PositionState::Flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskAction {
    None,
    StopLoss,
    TakeProfit,
    Liquidation,
}

#[derive(Debug, Clone)]
pub struct RiskController {
    policy: RiskPolicy,
    state: RiskState,
}

impl RiskController {
    pub fn new(policy: RiskPolicy) -> Self {
        Self {
            policy,
            state: RiskState::default(),
        }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    /// Derive levels for a freshly opened position.
    pub fn on_open(&mut self, direction: PositionState, entry_price: f64, shares: u64) {
        let sign = match direction {
            PositionState::Long => 1.0,
            PositionState::Short => -1.0,
            PositionState::Flat => {
                self.on_close();
                return;
            }
        };
        let (stop_loss_price, take_profit_price) = if self.policy.enabled {
            (
                self.policy
                    .stop_loss
                    .map(|sl| entry_price - sign * sl.per_share_delta(entry_price, shares)),
                self.policy
                    .take_profit
                    .map(|tp| entry_price + sign * tp.per_share_delta(entry_price, shares)),
            )
        } else {
            (None, None)
        };
        self.state = RiskState {
            direction,
            entry_price,
            shares,
            stop_loss_price,
            take_profit_price,
            best_price: entry_price,
        };
        self.ratchet_trailing(entry_price);
    }

    pub fn on_close(&mut self) {
        self.state = RiskState::default();
    }

    /// Classify `price` against the open position. Trailing levels are
    /// updated before the stop checks.
    pub fn check(&mut self, price: f64, position: &PositionManager) -> RiskAction {
        if !self.state.is_open() {
            return RiskAction::None;
        }

        if self.state.direction == PositionState::Short {
            let proceeds = position.entry_basis();
            let cost_to_cover = position.shares_owned().unsigned_abs() as f64 * price;
            if proceeds - cost_to_cover <= -proceeds {
                return RiskAction::Liquidation;
            }
        }

        if !self.policy.enabled {
            return RiskAction::None;
        }

        self.ratchet_trailing(price);

        let long = self.state.direction == PositionState::Long;
        if let Some(sl) = self.state.stop_loss_price {
            if (long && price <= sl) || (!long && price >= sl) {
                return RiskAction::StopLoss;
            }
        }
        if let Some(tp) = self.state.take_profit_price {
            if (long && price >= tp) || (!long && price <= tp) {
                return RiskAction::TakeProfit;
            }
        }
        RiskAction::None
    }

    fn ratchet_trailing(&mut self, price: f64) {
        let Some(trailing) = self.policy.active_trailing().copied() else {
            return;
        };
        if !self.policy.enabled || !price.is_finite() {
            return;
        }
        let rule = StopRule {
            kind: trailing.kind,
            value: trailing.value,
        };
        let state = &mut self.state;
        match state.direction {
            PositionState::Long => {
                state.best_price = state.best_price.max(price);
                let candidate = state.best_price - rule.per_share_delta(state.best_price, state.shares);
                state.stop_loss_price = Some(match state.stop_loss_price {
                    Some(current) => current.max(candidate),
                    None => candidate,
                });
            }
            PositionState::Short => {
                state.best_price = state.best_price.min(price);
                let candidate = state.best_price + rule.per_share_delta(state.best_price, state.shares);
                state.stop_loss_price = Some(match state.stop_loss_price {
                    Some(current) => current.min(candidate),
                    None => candidate,
                });
            }
            PositionState::Flat => {}
        }
    }
}
