//! JSON strategy files.
//!
//! A saved `StrategyConfig` is the serde form of the in-memory value, so a
//! save/load round trip reproduces it exactly.

use crate::domain::error::SignalTraderError;
use crate::domain::strategy::StrategyConfig;
use std::fs;
use std::path::Path;

pub struct JsonStrategyAdapter;

impl JsonStrategyAdapter {
    pub fn load(path: &Path) -> Result<StrategyConfig, SignalTraderError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        tracing::debug!(file = %path.display(), strategy = %config.name, "strategy loaded");
        Ok(config)
    }

    pub fn save(config: &StrategyConfig, path: &Path) -> Result<(), SignalTraderError> {
        fs::write(path, Self::to_json(config)?)?;
        tracing::debug!(file = %path.display(), strategy = %config.name, "strategy saved");
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<StrategyConfig, SignalTraderError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(config: &StrategyConfig) -> Result<String, SignalTraderError> {
        Ok(serde_json::to_string_pretty(config)?)
    }
}
