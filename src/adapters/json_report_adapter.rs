//! JSON result reports: strategy, metrics and the full result in one document.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SignalTraderError;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::MultiInstrumentResult;
use crate::domain::strategy::StrategyConfig;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct Report<'a, R: Serialize> {
    strategy: &'a StrategyConfig,
    metrics: &'a Metrics,
    result: &'a R,
}

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    fn write_report<R: Serialize>(
        result: &R,
        metrics: &Metrics,
        strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError> {
        let report = Report {
            strategy,
            metrics,
            result,
        };
        fs::write(output_path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(file = %output_path.display(), "report written");
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        metrics: &Metrics,
        strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError> {
        Self::write_report(result, metrics, strategy, output_path)
    }

    fn write_multi(
        &self,
        result: &MultiInstrumentResult,
        metrics: &Metrics,
        strategy: &StrategyConfig,
        output_path: &Path,
    ) -> Result<(), SignalTraderError> {
        Self::write_report(result, metrics, strategy, output_path)
    }
}
