//! Market data access port.

use crate::domain::error::SignalTraderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `ticker` within the optional inclusive date range, oldest first.
    /// An unknown ticker may return an empty list or an error.
    fn fetch_ohlcv(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, SignalTraderError>;
}
