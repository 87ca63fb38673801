//! Bar-indexed column table and multi-ticker alignment.
//!
//! A [`BarTable`] holds one row per bar in ascending date order and one
//! numeric column per field. Single-instrument tables use the plain column
//! names (`Open`, `High`, `Low`, `Close`, `Volume`, plus any custom columns);
//! multi-instrument tables prefix every column with the ticker
//! (`AAPL_Close`). Undefined values are stored as NaN.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A numeric series aligned to a table's rows. NaN marks an undefined value.
pub type Series = Vec<f64>;

pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";

pub const STANDARD_COLUMNS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Series>,
}

impl BarTable {
    /// Build a single-instrument table. Bars are sorted by date and
    /// duplicate dates keep the first occurrence.
    pub fn from_bars(bars: &[OhlcvBar]) -> Self {
        let mut sorted: Vec<&OhlcvBar> = bars.iter().collect();
        sorted.sort_by_key(|b| b.date);
        sorted.dedup_by_key(|b| b.date);

        let extra_names: BTreeSet<&String> = sorted.iter().flat_map(|b| b.extra.keys()).collect();

        let mut columns: BTreeMap<String, Series> = BTreeMap::new();
        for name in STANDARD_COLUMNS {
            columns.insert(name.to_string(), Vec::with_capacity(sorted.len()));
        }
        for name in &extra_names {
            columns.insert((*name).clone(), Vec::with_capacity(sorted.len()));
        }

        for bar in &sorted {
            push(&mut columns, OPEN, bar.open);
            push(&mut columns, HIGH, bar.high);
            push(&mut columns, LOW, bar.low);
            push(&mut columns, CLOSE, bar.close);
            push(&mut columns, VOLUME, bar.volume);
            for name in &extra_names {
                let value = bar.extra.get(*name).copied().unwrap_or(f64::NAN);
                push(&mut columns, name, value);
            }
        }

        Self {
            dates: sorted.iter().map(|b| b.date).collect(),
            columns,
        }
    }

    /// Build a table from explicit dates and columns. Every column must have
    /// one value per date.
    pub fn from_columns(dates: Vec<NaiveDate>, columns: BTreeMap<String, Series>) -> Option<Self> {
        if columns.values().any(|c| c.len() != dates.len()) {
            return None;
        }
        Some(Self { dates, columns })
    }

    /// Join several instruments on a unified timeline with ticker-prefixed
    /// columns. Gaps are forward-filled per instrument; rows whose OHLCV
    /// fields are still incomplete afterwards (before an instrument's first
    /// bar) are dropped. Custom columns may stay NaN.
    pub fn align(instruments: &[(String, Vec<OhlcvBar>)]) -> Self {
        let timeline = build_unified_timeline(instruments.iter().map(|(_, bars)| bars.as_slice()));

        let mut columns: BTreeMap<String, Series> = BTreeMap::new();
        for (ticker, bars) in instruments {
            let single = BarTable::from_bars(bars);
            let index: HashMap<NaiveDate, usize> = single
                .dates
                .iter()
                .enumerate()
                .map(|(i, d)| (*d, i))
                .collect();

            for (name, values) in &single.columns {
                let mut filled = Vec::with_capacity(timeline.len());
                let mut last = f64::NAN;
                for date in &timeline {
                    if let Some(&i) = index.get(date) {
                        if !values[i].is_nan() {
                            last = values[i];
                        }
                    }
                    filled.push(last);
                }
                columns.insert(prefixed(ticker, name), filled);
            }
        }

        let required: Vec<&Series> = instruments
            .iter()
            .flat_map(|(ticker, _)| STANDARD_COLUMNS.iter().map(move |name| prefixed(ticker, name)))
            .filter_map(|name| columns.get(&name))
            .collect();
        let keep: Vec<bool> = (0..timeline.len())
            .map(|row| required.iter().all(|c| !c[row].is_nan()))
            .collect();

        let dates = timeline
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(d, _)| *d)
            .collect();
        for values in columns.values_mut() {
            let mut row = 0;
            values.retain(|_| {
                let k = keep[row];
                row += 1;
                k
            });
        }

        Self { dates, columns }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, bar_index: usize) -> Option<NaiveDate> {
        self.dates.get(bar_index).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Look up a column by exact name, falling back to a case-insensitive match.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        if let Some(values) = self.columns.get(name) {
            return Some(values);
        }
        self.columns
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    pub fn close(&self) -> Option<&[f64]> {
        self.column(CLOSE)
    }

    pub fn insert_column(&mut self, name: &str, values: Series) -> bool {
        if values.len() != self.dates.len() {
            return false;
        }
        self.columns.insert(name.to_string(), values);
        true
    }

    /// Tickers present in a prefixed table, recovered from `{TICKER}_Close` columns.
    pub fn tickers(&self) -> Vec<String> {
        let suffix = format!("_{CLOSE}");
        self.columns
            .keys()
            .filter_map(|k| k.strip_suffix(&suffix).map(str::to_string))
            .collect()
    }

    /// Extract one instrument's columns from a prefixed table, with the
    /// prefix stripped so conditions can address `Close` directly.
    pub fn instrument(&self, ticker: &str) -> Option<BarTable> {
        let prefix = format!("{ticker}_");
        let columns: BTreeMap<String, Series> = self
            .columns
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|name| (name.to_string(), v.clone())))
            .collect();
        if !columns.contains_key(CLOSE) {
            return None;
        }
        Some(Self {
            dates: self.dates.clone(),
            columns,
        })
    }
}

fn push(columns: &mut BTreeMap<String, Series>, name: &str, value: f64) {
    if let Some(col) = columns.get_mut(name) {
        col.push(value);
    }
}

pub fn prefixed(ticker: &str, column: &str) -> String {
    format!("{ticker}_{column}")
}

pub fn build_unified_timeline<'a>(instruments: impl Iterator<Item = &'a [OhlcvBar]>) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = instruments
        .flat_map(|bars| bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(ticker: &str, date: &str, close: f64) -> OhlcvBar {
        OhlcvBar::new(
            ticker,
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            close - 1.0,
            close + 1.0,
            close - 2.0,
            close,
            1000.0,
        )
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn from_bars_sorts_and_builds_columns() {
        let bars = vec![
            make_bar("AAPL", "2024-01-03", 102.0),
            make_bar("AAPL", "2024-01-01", 100.0),
            make_bar("AAPL", "2024-01-02", 101.0),
        ];
        let table = BarTable::from_bars(&bars);

        assert_eq!(table.len(), 3);
        assert_eq!(table.dates()[0], d("2024-01-01"));
        assert_eq!(table.close().unwrap(), &[100.0, 101.0, 102.0]);
        assert_eq!(table.column("High").unwrap(), &[101.0, 102.0, 103.0]);
    }

    #[test]
    fn from_bars_drops_duplicate_dates() {
        let bars = vec![
            make_bar("AAPL", "2024-01-01", 100.0),
            make_bar("AAPL", "2024-01-01", 999.0),
        ];
        let table = BarTable::from_bars(&bars);
        assert_eq!(table.len(), 1);
        assert_eq!(table.close().unwrap(), &[100.0]);
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let table = BarTable::from_bars(&[make_bar("AAPL", "2024-01-01", 100.0)]);
        assert_eq!(table.column("close").unwrap(), &[100.0]);
        assert_eq!(table.column("VOLUME").unwrap(), &[1000.0]);
        assert!(table.column("vwap").is_none());
    }

    #[test]
    fn extra_columns_are_kept() {
        let mut bar = make_bar("AAPL", "2024-01-01", 100.0);
        bar.extra.insert("Signal".into(), 1.5);
        let table = BarTable::from_bars(&[bar]);
        assert_eq!(table.column("Signal").unwrap(), &[1.5]);
    }

    #[test]
    fn insert_column_rejects_wrong_length() {
        let mut table = BarTable::from_bars(&[make_bar("AAPL", "2024-01-01", 100.0)]);
        assert!(!table.insert_column("X", vec![1.0, 2.0]));
        assert!(table.insert_column("X", vec![1.0]));
    }

    #[test]
    fn align_forward_fills_gaps() {
        let aapl = vec![
            make_bar("AAPL", "2024-01-01", 100.0),
            make_bar("AAPL", "2024-01-02", 101.0),
            make_bar("AAPL", "2024-01-03", 102.0),
        ];
        let msft = vec![
            make_bar("MSFT", "2024-01-01", 50.0),
            make_bar("MSFT", "2024-01-03", 52.0),
        ];
        let table = BarTable::align(&[("AAPL".into(), aapl), ("MSFT".into(), msft)]);

        assert_eq!(table.len(), 3);
        assert_eq!(table.column("MSFT_Close").unwrap(), &[50.0, 50.0, 52.0]);
        assert_eq!(table.column("AAPL_Close").unwrap(), &[100.0, 101.0, 102.0]);
    }

    #[test]
    fn align_drops_rows_missing_after_fill() {
        let aapl = vec![
            make_bar("AAPL", "2024-01-01", 100.0),
            make_bar("AAPL", "2024-01-02", 101.0),
            make_bar("AAPL", "2024-01-03", 102.0),
        ];
        let msft = vec![make_bar("MSFT", "2024-01-02", 50.0)];
        let table = BarTable::align(&[("AAPL".into(), aapl), ("MSFT".into(), msft)]);

        assert_eq!(table.dates(), &[d("2024-01-02"), d("2024-01-03")]);
        assert_eq!(table.column("AAPL_Close").unwrap(), &[101.0, 102.0]);
        assert_eq!(table.column("MSFT_Close").unwrap(), &[50.0, 50.0]);
    }

    #[test]
    fn align_ignores_blank_custom_columns() {
        let mut aapl = vec![
            make_bar("AAPL", "2024-01-01", 100.0),
            make_bar("AAPL", "2024-01-02", 101.0),
            make_bar("AAPL", "2024-01-03", 102.0),
        ];
        for bar in &mut aapl {
            bar.extra.insert("Dividends".into(), f64::NAN);
        }
        let msft = vec![
            make_bar("MSFT", "2024-01-01", 50.0),
            make_bar("MSFT", "2024-01-02", 51.0),
            make_bar("MSFT", "2024-01-03", 52.0),
        ];
        let table = BarTable::align(&[("AAPL".into(), aapl), ("MSFT".into(), msft)]);

        assert_eq!(table.len(), 3);
        assert!(table.column("AAPL_Dividends").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn instrument_view_strips_prefix() {
        let aapl = vec![make_bar("AAPL", "2024-01-01", 100.0)];
        let msft = vec![make_bar("MSFT", "2024-01-01", 50.0)];
        let table = BarTable::align(&[("AAPL".into(), aapl), ("MSFT".into(), msft)]);

        assert_eq!(table.tickers(), vec!["AAPL".to_string(), "MSFT".to_string()]);
        let view = table.instrument("MSFT").unwrap();
        assert_eq!(view.close().unwrap(), &[50.0]);
        assert!(view.column("AAPL_Close").is_none());
        assert!(table.instrument("TSLA").is_none());
    }

    #[test]
    fn unified_timeline_merges_and_sorts() {
        let a = vec![
            make_bar("A", "2024-01-02", 100.0),
            make_bar("A", "2024-01-05", 101.0),
        ];
        let b = vec![
            make_bar("B", "2024-01-01", 50.0),
            make_bar("B", "2024-01-03", 51.0),
        ];
        let timeline = build_unified_timeline([a.as_slice(), b.as_slice()].into_iter());
        assert_eq!(
            timeline,
            vec![
                d("2024-01-01"),
                d("2024-01-02"),
                d("2024-01-03"),
                d("2024-01-05")
            ]
        );
    }

    #[test]
    fn unified_timeline_empty() {
        let timeline = build_unified_timeline(std::iter::empty::<&[OhlcvBar]>());
        assert!(timeline.is_empty());
    }
}
