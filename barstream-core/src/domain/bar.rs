//! NormalizedBar — the canonical row every source is converted into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar for one instrument, after normalization.
///
/// Field order is the persisted column order: the timestamp index comes first.
/// `adj_close` always equals `close` for this asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBar {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Adj Close")]
    pub adj_close: f64,
    #[serde(rename = "Volume")]
    pub volume: u64,
    #[serde(rename = "Ticker")]
    pub ticker: String,
}

impl NormalizedBar {
    /// Column names in persisted order.
    pub const COLUMNS: [&'static str; 8] = [
        "Timestamp",
        "Open",
        "High",
        "Low",
        "Close",
        "Adj Close",
        "Volume",
        "Ticker",
    ];

    /// True when all five price fields are finite numbers.
    pub fn has_finite_prices(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.adj_close]
            .iter()
            .all(|p| p.is_finite())
    }
}
