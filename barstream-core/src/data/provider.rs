//! Market-data provider trait, raw series types and structured errors.
//!
//! A provider only knows how to fetch one instrument's bars for a date range.
//! Caching, normalization and the today-discard rule live above it in
//! [`RawSeriesStore`](super::series_store::RawSeriesStore).

use crate::domain::Granularity;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source-native timestamp of a raw bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Seconds since the Unix epoch.
    Epoch(i64),
    /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
    Text(String),
}

impl RawTimestamp {
    /// Resolve to an absolute UTC instant. Naive dates are taken as UTC midnight.
    pub fn to_utc(&self) -> Result<DateTime<Utc>, DataError> {
        match self {
            RawTimestamp::Epoch(secs) => DateTime::from_timestamp(*secs, 0).ok_or_else(|| {
                DataError::ValidationError(format!("epoch timestamp out of range: {secs}"))
            }),
            RawTimestamp::Text(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Ok(dt.with_timezone(&Utc));
                }
                if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                    return Ok(ndt.and_utc());
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|ndt| ndt.and_utc())
                    .ok_or_else(|| DataError::ValidationError(format!("unparseable timestamp '{s}'")))
            }
        }
    }
}

/// One raw OHLCV row from a provider, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: RawTimestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Traded amount (daily klines); carried but unused downstream.
    pub amount: Option<f64>,
    /// Trade count (daily klines); carried but unused downstream.
    pub count: Option<u64>,
}

/// One instrument's bars as returned by a provider, ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub instrument: String,
    pub granularity: Granularity,
    pub bars: Vec<RawBar>,
}

impl RawSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no bars available for '{instrument}'")]
    EmptySeries { instrument: String },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// The remote market-data collaborator.
///
/// Any `Err` is treated by the engine as "no data for this instrument".
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for `instrument` covering the calendar days `[start, end]`.
    fn fetch_series(
        &self,
        instrument: &str,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, DataError>;
}
