//! BarEvent — the value handed to the downstream event loop.

use super::bar::NormalizedBar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bar of one instrument, emitted once per merged row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub ticker: String,
    /// Index timestamp of the bar.
    pub time: DateTime<Utc>,
    /// Seconds spanned by the bar (86400 for daily).
    pub period: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

impl BarEvent {
    pub fn from_row(time: DateTime<Utc>, period: i64, row: NormalizedBar) -> Self {
        Self {
            ticker: row.ticker,
            time,
            period,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            adj_close: row.adj_close,
        }
    }

    /// Fixed-width little-endian encoding used for stream digests.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.ticker.len() + 1 + 8 * 8);
        buf.extend_from_slice(self.ticker.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.time.timestamp_millis().to_le_bytes());
        buf.extend_from_slice(&self.period.to_le_bytes());
        for price in [self.open, self.high, self.low, self.close, self.adj_close] {
            buf.extend_from_slice(&price.to_le_bytes());
        }
        buf.extend_from_slice(&self.volume.to_le_bytes());
        buf
    }
}
