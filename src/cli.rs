//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_trade_log_adapter::CsvTradeLogAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::json_strategy_adapter::JsonStrategyAdapter;
use crate::domain::backtest::run_backtest;
use crate::domain::bar_table::BarTable;
use crate::domain::condition::{Combinator, ConditionGroup};
use crate::domain::condition_parser::parse_group;
use crate::domain::config_validation::{
    get_date, get_f64, non_empty, ticker_list, validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::SignalTraderError;
use crate::domain::execution::TradeMode;
use crate::domain::indicator::IndicatorRegistry;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::MultiInstrumentCoordinator;
use crate::domain::risk::{RiskPolicy, StopKind, StopRule};
use crate::domain::strategy::{CapitalConfig, PositionSizing, StrategyConfig};
use crate::domain::universe::{MIN_OHLCV_BARS, load_universe, parse_allocation, parse_tickers};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_RISK_FREE_RATE: f64 = 0.05;

#[derive(Parser, Debug)]
#[command(name = "signaltrader", about = "Signal-driven trading strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// JSON strategy file, replacing the config's strategy sections
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        /// JSON report path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Trade log CSV path
        #[arg(short, long)]
        trades: Option<PathBuf>,
        /// Run a single ticker instead of the configured list
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Validate a configuration file without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Save the strategy from a configuration file as JSON
    ExportStrategy {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List available indicators
    Indicators,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            strategy,
            output,
            trades,
            ticker,
        } => run_backtest_command(
            &config,
            strategy.as_deref(),
            output.as_deref(),
            trades.as_deref(),
            ticker.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ExportStrategy { config, output } => run_export_strategy(&config, &output),
        Command::Indicators => {
            run_indicators();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SignalTraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn parse_conditions(
    adapter: &dyn ConfigPort,
    key: &str,
    combinator_key: &str,
) -> Result<ConditionGroup, SignalTraderError> {
    let combinator = match non_empty(adapter, "strategy", combinator_key) {
        Some(text) => Combinator::from_str(&text)?,
        None => Combinator::And,
    };
    let text = adapter.get_string("strategy", key).unwrap_or_default();
    parse_group(&text, combinator).map_err(|e| {
        eprintln!("error: failed to parse {key}:\n{}", e.display_with_context(&text));
        SignalTraderError::from(e)
    })
}

fn stop_rule(adapter: &dyn ConfigPort, key: &str) -> Result<Option<StopRule>, SignalTraderError> {
    let Some(value) = get_f64(adapter, "risk", key)? else {
        return Ok(None);
    };
    let kind = match non_empty(adapter, "risk", &format!("{key}_type")) {
        Some(text) => StopKind::from_str(&text)?,
        None => StopKind::Percentage,
    };
    Ok(Some(StopRule { kind, value }))
}

fn build_risk_policy(adapter: &dyn ConfigPort) -> Result<RiskPolicy, SignalTraderError> {
    let stop_loss = stop_rule(adapter, "stop_loss")?;
    let take_profit = stop_rule(adapter, "take_profit")?;
    let trailing = stop_rule(adapter, "trailing_stop")?;

    let any_level = stop_loss.is_some() || take_profit.is_some() || trailing.is_some();
    let mut policy = RiskPolicy::new(stop_loss, take_profit);
    if let Some(rule) = trailing {
        policy = policy.with_trailing(rule.kind, rule.value);
    }
    policy.enabled = adapter.get_bool("risk", "enabled", any_level);
    Ok(policy)
}

fn build_capital_config(adapter: &dyn ConfigPort) -> Result<CapitalConfig, SignalTraderError> {
    let total = get_f64(adapter, "capital", "total_capital")?.ok_or_else(|| SignalTraderError::ConfigMissing {
        section: "capital".into(),
        key: "total_capital".into(),
    })?;
    let mut capital = CapitalConfig::new(total);

    let sizing = non_empty(adapter, "capital", "per_trade").unwrap_or_else(|| "all_cash".into());
    let value = get_f64(adapter, "capital", "per_trade_value")?.unwrap_or(0.0);
    capital.per_trade = match sizing.to_ascii_lowercase().as_str() {
        "percentage" => PositionSizing::Percentage(value),
        "fixed" => PositionSizing::FixedAmount(value),
        _ => PositionSizing::AllCash,
    };

    if let Some(text) = non_empty(adapter, "capital", "allocation") {
        capital.allocation = parse_allocation(&text).map_err(|e| SignalTraderError::ConfigInvalid {
            section: "capital".into(),
            key: "allocation".into(),
            reason: e.to_string(),
        })?;
    }
    Ok(capital)
}

/// Build a `StrategyConfig` from the `[backtest]`, `[strategy]`, `[capital]`
/// and `[risk]` sections. The caller runs the INI-level validators first.
pub fn build_strategy_config(adapter: &dyn ConfigPort) -> Result<StrategyConfig, SignalTraderError> {
    let tickers = ticker_list(adapter).ok_or_else(|| SignalTraderError::ConfigMissing {
        section: "backtest".into(),
        key: "tickers".into(),
    })?;
    let tickers = parse_tickers(&tickers).map_err(|e| SignalTraderError::ConfigInvalid {
        section: "backtest".into(),
        key: "tickers".into(),
        reason: e.to_string(),
    })?;

    let name = non_empty(adapter, "strategy", "name").unwrap_or_else(|| "Unnamed".to_string());
    let mut config = StrategyConfig::new(&name, &[], build_capital_config(adapter)?);
    config.tickers = tickers;
    config.start_date = get_date(adapter, "backtest", "start_date")?;
    config.end_date = get_date(adapter, "backtest", "end_date")?;
    if let Some(interval) = non_empty(adapter, "backtest", "interval") {
        config.interval = interval;
    }
    if let Some(mode) = non_empty(adapter, "strategy", "mode") {
        config.mode = TradeMode::from_str(&mode)?;
    }
    config.entry = parse_conditions(adapter, "entry", "entry_combinator")?;
    config.exit = parse_conditions(adapter, "exit", "exit_combinator")?;
    config.risk = build_risk_policy(adapter)?;
    Ok(config)
}

/// Strategy from `--strategy` JSON when given, otherwise from the config file.
fn resolve_strategy(
    adapter: &FileConfigAdapter,
    strategy_path: Option<&Path>,
) -> Result<StrategyConfig, SignalTraderError> {
    match strategy_path {
        Some(path) => {
            eprintln!("Loading strategy from {}", path.display());
            JsonStrategyAdapter::load(path)
        }
        None => {
            validate_strategy_config(adapter)?;
            build_strategy_config(adapter)
        }
    }
}

/// `[backtest] data_dir`, relative paths resolved against the config file.
fn data_dir(adapter: &dyn ConfigPort, config_path: &Path) -> PathBuf {
    let dir = PathBuf::from(non_empty(adapter, "backtest", "data_dir").unwrap_or_else(|| "data".into()));
    if dir.is_absolute() {
        return dir;
    }
    match config_path.parent() {
        Some(parent) => parent.join(dir),
        None => dir,
    }
}

fn apply_ticker_override(config: &mut StrategyConfig, ticker: &str) -> Result<(), SignalTraderError> {
    config.tickers = parse_tickers(ticker).map_err(|e| SignalTraderError::ConfigInvalid {
        section: "backtest".into(),
        key: "ticker".into(),
        reason: e.to_string(),
    })?;
    config.capital.allocation.clear();
    Ok(())
}

/// Drop allocations for tickers that were skipped for lack of data.
fn restrict_to_loaded(config: &mut StrategyConfig, loaded: &[String]) {
    if loaded.len() == config.tickers.len() {
        return;
    }
    config.tickers.retain(|t| loaded.contains(t));
    config.capital.allocation.retain(|t, _| loaded.contains(t));
}

fn print_metrics(metrics: &Metrics) {
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Calmar Ratio:     {:.2}", metrics.calmar_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Closed Trades:    {}", metrics.total_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
}

fn run_backtest_command(
    config_path: &Path,
    strategy_path: Option<&Path>,
    output_path: Option<&Path>,
    trades_path: Option<&Path>,
    ticker_override: Option<&str>,
) -> Result<(), SignalTraderError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;

    let mut strategy = resolve_strategy(&adapter, strategy_path)?;
    if let Some(ticker) = ticker_override {
        apply_ticker_override(&mut strategy, ticker)?;
    }
    eprintln!("Strategy: {} ({} mode)", strategy.name, strategy.mode);

    let registry = IndicatorRegistry::builtin();
    strategy.validate(&registry)?;

    let risk_free_rate = get_f64(&adapter, "backtest", "risk_free_rate")?.unwrap_or(DEFAULT_RISK_FREE_RATE);
    let min_bars = get_f64(&adapter, "backtest", "min_bars")?
        .map(|v| v as usize)
        .unwrap_or(MIN_OHLCV_BARS);

    let data_port = CsvAdapter::new(data_dir(&adapter, config_path));
    eprintln!("Loading data for {} tickers...", strategy.tickers.len());
    let universe = load_universe(
        &data_port,
        &strategy.tickers,
        strategy.start_date,
        strategy.end_date,
        min_bars,
    )?;
    for skipped in &universe.skipped {
        eprintln!("  skipped {} ({:?})", skipped.ticker, skipped.reason);
    }
    restrict_to_loaded(&mut strategy, &universe.tickers());

    if let [(ticker, bars)] = universe.instruments.as_slice() {
        let table = BarTable::from_bars(bars);
        eprintln!("Running backtest: {ticker}, {} bars", table.len());
        let result = run_backtest(&table, &strategy, &registry)?;
        let metrics = Metrics::compute(&result.equity_curve, &result.trades, result.initial_capital, risk_free_rate);

        eprintln!("\n=== Results: {ticker} ===");
        eprintln!("Final Value:      {:.2}", result.final_value);
        print_metrics(&metrics);

        if let Some(path) = output_path {
            JsonReportAdapter.write(&result, &metrics, &strategy, path)?;
            eprintln!("\nReport written to: {}", path.display());
        }
        if let Some(path) = trades_path {
            CsvTradeLogAdapter.write(&result, &metrics, &strategy, path)?;
            eprintln!("Trade log written to: {}", path.display());
        }
    } else {
        let table = BarTable::align(&universe.instruments);
        eprintln!(
            "Running backtest: {} tickers, {} aligned bars",
            universe.instruments.len(),
            table.len()
        );
        let result = MultiInstrumentCoordinator::run(&table, &strategy, &registry)?;
        let metrics = Metrics::compute(
            &result.equity_curve,
            &result.trades,
            result.totals.initial_capital,
            risk_free_rate,
        );

        eprintln!("\n=== Aggregate Results ===");
        eprintln!("Final Value:      {:.2}", result.totals.final_value);
        print_metrics(&metrics);
        eprintln!("\n=== Per-Ticker Summary ===");
        for instrument in &result.instruments {
            let sign = if instrument.profit >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {}{:.2} ({}{:.2}%)",
                instrument.ticker,
                instrument.trade_count,
                sign,
                instrument.profit,
                sign,
                instrument.return_pct,
            );
        }

        if let Some(path) = output_path {
            JsonReportAdapter.write_multi(&result, &metrics, &strategy, path)?;
            eprintln!("\nReport written to: {}", path.display());
        }
        if let Some(path) = trades_path {
            CsvTradeLogAdapter.write_multi(&result, &metrics, &strategy, path)?;
            eprintln!("Trade log written to: {}", path.display());
        }
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), SignalTraderError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    let strategy = build_strategy_config(&adapter)?;
    strategy.validate(&IndicatorRegistry::builtin())?;

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!("  mode:    {}", strategy.mode);
    eprintln!("  tickers: {}", strategy.tickers.join(", "));
    eprintln!("  entry ({}): {}", strategy.entry.combinator, strategy.entry);
    eprintln!("  exit ({}):  {}", strategy.exit.combinator, strategy.exit);
    eprintln!(
        "  warm-up lag: {} bars",
        strategy.entry.max_lag().max(strategy.exit.max_lag())
    );
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_export_strategy(config_path: &Path, output_path: &Path) -> Result<(), SignalTraderError> {
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter)?;
    validate_strategy_config(&adapter)?;
    let strategy = build_strategy_config(&adapter)?;
    strategy.validate(&IndicatorRegistry::builtin())?;
    JsonStrategyAdapter::save(&strategy, output_path)?;
    eprintln!("Strategy written to: {}", output_path.display());
    Ok(())
}

fn run_indicators() {
    for spec in IndicatorRegistry::builtin().specs() {
        println!("{:<28} {}", spec.signature(), spec.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::Operator;
    use crate::domain::error::ConfigurationError;

    const CONFIG: &str = r#"
[backtest]
tickers = aapl, msft
start_date = 2024-01-01
end_date = 2024-12-31

[strategy]
name = Crossover
mode = reversal
entry = CROSSED_UP(SMA(5), SMA(20)), GREATER_THAN(RSI(14), 50)
entry_combinator = any
exit = CROSSED_DOWN(SMA(5), SMA(20))

[capital]
total_capital = 20000
per_trade = percentage
per_trade_value = 0.5
allocation = AAPL:0.6, MSFT:0.4

[risk]
stop_loss = 0.05
take_profit = 50
take_profit_type = dollar
"#;

    fn adapter(text: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(text).unwrap()
    }

    #[test]
    fn builds_strategy_from_sections() {
        let config = build_strategy_config(&adapter(CONFIG)).unwrap();
        assert_eq!(config.name, "Crossover");
        assert_eq!(config.tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(config.mode, TradeMode::Reversal);
        assert_eq!(config.start_date, chrono::NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(config.entry.combinator, Combinator::Or);
        assert_eq!(config.entry.conditions.len(), 2);
        assert_eq!(config.exit.conditions[0].operator, Operator::CrossedDown);
        assert_eq!(config.capital.per_trade, PositionSizing::Percentage(0.5));
        assert_eq!(config.capital.allocation["AAPL"], 0.6);
        assert!(config.risk.enabled);
        assert_eq!(config.risk.stop_loss, Some(StopRule::percentage(0.05)));
        assert_eq!(config.risk.take_profit, Some(StopRule::dollar(50.0)));
        assert!(config.validate(&IndicatorRegistry::builtin()).is_ok());
    }

    #[test]
    fn risk_disabled_without_levels() {
        let text = CONFIG
            .replace("stop_loss = 0.05", "")
            .replace("take_profit = 50", "");
        let config = build_strategy_config(&adapter(&text)).unwrap();
        assert!(!config.risk.enabled);
    }

    #[test]
    fn non_positive_stop_reaches_risk_validation() {
        for level in ["0", "-0.05"] {
            let text = CONFIG.replace("stop_loss = 0.05", &format!("stop_loss = {level}"));
            let config = build_strategy_config(&adapter(&text)).unwrap();
            assert_eq!(config.risk.stop_loss, Some(StopRule::percentage(level.parse().unwrap())));
            assert!(matches!(
                config.validate(&IndicatorRegistry::builtin()),
                Err(ConfigurationError::InvalidRiskPolicy(_))
            ));
        }
    }

    #[test]
    fn parse_error_surfaces_as_condition_parse() {
        let text = CONFIG.replace("CROSSED_DOWN(SMA(5), SMA(20))", "CROSSED_DOWN(SMA(5)");
        let err = build_strategy_config(&adapter(&text)).unwrap_err();
        assert!(matches!(err, SignalTraderError::ConditionParse(_)));
        assert_eq!(format!("{:?}", ExitCode::from(&err)), format!("{:?}", ExitCode::from(4)));
    }

    #[test]
    fn ticker_override_replaces_list_and_allocation() {
        let mut config = build_strategy_config(&adapter(CONFIG)).unwrap();
        apply_ticker_override(&mut config, "spy").unwrap();
        assert_eq!(config.tickers, vec!["SPY"]);
        assert!(config.capital.allocation.is_empty());
    }

    #[test]
    fn skipped_tickers_drop_their_allocation() {
        let mut config = build_strategy_config(&adapter(CONFIG)).unwrap();
        restrict_to_loaded(&mut config, &["MSFT".to_string()]);
        assert_eq!(config.tickers, vec!["MSFT"]);
        assert_eq!(config.capital.allocation.len(), 1);
    }

    #[test]
    fn data_dir_relative_to_config() {
        let adapter = adapter("[backtest]\ndata_dir = prices\n");
        assert_eq!(
            data_dir(&adapter, Path::new("/tmp/run/config.ini")),
            PathBuf::from("/tmp/run/prices")
        );
        let adapter = FileConfigAdapter::from_string("[backtest]\ndata_dir = /srv/prices\n").unwrap();
        assert_eq!(
            data_dir(&adapter, Path::new("/tmp/run/config.ini")),
            PathBuf::from("/srv/prices")
        );
    }
}
