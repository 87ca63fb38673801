//! Result output port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SignalTraderError;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::MultiInstrumentResult;
use crate::domain::strategy::StrategyConfig;
use std::path::Path;

/// Port for persisting backtest results.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError>;

    fn write_multi(
        &self,
        result: &MultiInstrumentResult,
        metrics: &Metrics,
        strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError>;
}
