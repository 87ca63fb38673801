//! CSV file data adapter.
//!
//! One file per ticker at `<base_path>/<TICKER>.csv` with a header row.
//! Header names are matched case-insensitively; columns other than the
//! standard ones are kept as custom columns. Empty cells become NaN gaps.

use crate::domain::error::SignalTraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Layout {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
    extra: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord, path: &str) -> Result<Self, SignalTraderError> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let require = |name: &str| {
            find(name).ok_or_else(|| SignalTraderError::Data {
                reason: format!("{path}: missing '{name}' column"),
            })
        };

        let layout = Layout {
            date: require("date")?,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find("volume"),
            extra: Vec::new(),
        };
        let known = [
            Some(layout.date),
            Some(layout.open),
            Some(layout.high),
            Some(layout.low),
            Some(layout.close),
            layout.volume,
        ];
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !known.contains(&Some(*i)))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();
        Ok(Layout { extra, ..layout })
    }
}

fn parse_value(record: &csv::StringRecord, index: usize, column: &str, line: u64) -> Result<f64, SignalTraderError> {
    let raw = record.get(index).map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|_| SignalTraderError::Data {
        reason: format!("line {line}: invalid {column} value '{raw}'"),
    })
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, SignalTraderError> {
        let path = self.csv_path(ticker);
        let path_text = path.display().to_string();
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| SignalTraderError::Data {
                reason: format!("failed to read {path_text}: {e}"),
            })?;

        let headers = rdr
            .headers()
            .map_err(|e| SignalTraderError::Data {
                reason: format!("{path_text}: {e}"),
            })?
            .clone();
        let layout = Layout::from_headers(&headers, &path_text)?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| SignalTraderError::Data {
                reason: format!("{path_text}: CSV parse error: {e}"),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date_str = record.get(layout.date).unwrap_or("");
            let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|e| SignalTraderError::Data {
                reason: format!("{path_text} line {line}: invalid date '{date_str}': {e}"),
            })?;
            if start_date.is_some_and(|start| date < start) || end_date.is_some_and(|end| date > end) {
                continue;
            }

            let mut extra = BTreeMap::new();
            for (index, name) in &layout.extra {
                extra.insert(name.clone(), parse_value(&record, *index, name, line)?);
            }

            bars.push(OhlcvBar {
                ticker: ticker.to_string(),
                date,
                open: parse_value(&record, layout.open, "open", line)?,
                high: parse_value(&record, layout.high, "high", line)?,
                low: parse_value(&record, layout.low, "low", line)?,
                close: parse_value(&record, layout.close, "close", line)?,
                volume: match layout.volume {
                    Some(index) => parse_value(&record, index, "volume", line)?,
                    None => 0.0,
                },
                extra,
            });
        }

        bars.sort_by_key(|b| b.date);
        tracing::debug!(ticker, bars = bars.len(), file = %path_text, "csv data loaded");
        Ok(bars)
    }
}
