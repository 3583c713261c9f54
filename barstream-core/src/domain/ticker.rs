//! Latest-quote state kept per subscribed instrument.

use super::bar::NormalizedBar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerState {
    pub close: f64,
    pub adj_close: f64,
    pub timestamp: DateTime<Utc>,
    /// Last adjusted-close return; only set when return tracking is on.
    pub adj_close_ret: Option<f64>,
}

impl TickerState {
    /// Seed state from the first row of an instrument's series.
    pub fn seed(row: &NormalizedBar) -> Self {
        Self {
            close: row.close,
            adj_close: row.adj_close,
            timestamp: row.timestamp,
            adj_close_ret: None,
        }
    }
}
