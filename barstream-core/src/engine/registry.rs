//! TickerRegistry — latest known quote per subscribed instrument.
//!
//! Written by exactly one owner (the stream's consumer). There is no internal
//! locking: a multi-threaded consumer must synchronize access itself.

use super::EngineError;
use crate::domain::{BarEvent, NormalizedBar, TickerState};
use std::collections::BTreeMap;
use tracing::{debug, Span};

pub struct TickerRegistry {
    tickers: BTreeMap<String, TickerState>,
    track_returns: bool,
    adj_close_returns: Vec<f64>,
    span: Span,
}

impl TickerRegistry {
    pub fn new(track_returns: bool, span: Span) -> Self {
        Self {
            tickers: BTreeMap::new(),
            track_returns,
            adj_close_returns: Vec::new(),
            span,
        }
    }

    pub fn tracks_returns(&self) -> bool {
        self.track_returns
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.tickers.contains_key(ticker)
    }

    /// Insert the seed state for `ticker` from its first row.
    ///
    /// First write wins: returns `false` and leaves state untouched if the
    /// ticker is already present.
    pub fn seed(&mut self, ticker: &str, first_row: &NormalizedBar) -> bool {
        if self.contains(ticker) {
            return false;
        }
        let state = TickerState::seed(first_row);
        debug!(parent: &self.span, ticker, close = state.close, timestamp = %state.timestamp, "seeded ticker");
        self.tickers.insert(ticker.to_string(), state);
        true
    }

    pub fn current(&self, ticker: &str) -> Option<&TickerState> {
        self.tickers.get(ticker)
    }

    /// Apply an emitted event to its ticker's state.
    ///
    /// With return tracking on, the return is computed against the *previous*
    /// adjusted close before anything is overwritten. A previous adjusted close
    /// of exactly zero is an error and leaves the state unchanged.
    pub fn update(&mut self, event: &BarEvent) -> Result<(), EngineError> {
        let state = self
            .tickers
            .get_mut(&event.ticker)
            .ok_or_else(|| EngineError::UnknownTicker {
                ticker: event.ticker.clone(),
            })?;

        if self.track_returns {
            if state.adj_close == 0.0 {
                return Err(EngineError::ZeroDivisionInReturn {
                    ticker: event.ticker.clone(),
                    time: event.time,
                });
            }
            let ret = event.adj_close / state.adj_close - 1.0;
            state.adj_close_ret = Some(ret);
            self.adj_close_returns.push(ret);
        }

        state.close = event.close;
        state.adj_close = event.adj_close;
        state.timestamp = event.time;
        Ok(())
    }

    /// Every return computed this session, in emission order.
    pub fn adj_close_returns(&self) -> &[f64] {
        &self.adj_close_returns
    }

    /// Subscribed tickers, sorted.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.tickers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Owned copy of all states, for comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, TickerState> {
        self.tickers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 2, day, 0, 0, 0).unwrap()
    }

    fn row(day: u32, adj_close: f64) -> NormalizedBar {
        NormalizedBar {
            timestamp: ts(day),
            open: adj_close,
            high: adj_close,
            low: adj_close,
            close: adj_close,
            adj_close,
            volume: 1,
            ticker: "btcusdt".into(),
        }
    }

    fn event(day: u32, adj_close: f64) -> BarEvent {
        BarEvent::from_row(ts(day), 86_400, row(day, adj_close))
    }

    #[test]
    fn seed_is_first_write_wins() {
        let mut reg = TickerRegistry::new(false, Span::none());
        assert!(reg.seed("btcusdt", &row(1, 100.0)));
        assert!(!reg.seed("btcusdt", &row(2, 999.0)));
        assert_eq!(reg.current("btcusdt").unwrap().close, 100.0);
        assert_eq!(reg.current("btcusdt").unwrap().timestamp, ts(1));
    }

    #[test]
    fn return_uses_previous_adj_close() {
        let mut reg = TickerRegistry::new(true, Span::none());
        reg.seed("btcusdt", &row(1, 100.0));
        reg.update(&event(2, 110.0)).unwrap();

        let state = reg.current("btcusdt").unwrap();
        assert!((state.adj_close_ret.unwrap() - 0.10).abs() < 1e-9);
        assert_eq!(state.adj_close, 110.0);
        assert_eq!(state.timestamp, ts(2));
        assert_eq!(reg.adj_close_returns().len(), 1);
    }

    #[test]
    fn returns_untracked_leave_field_empty() {
        let mut reg = TickerRegistry::new(false, Span::none());
        reg.seed("btcusdt", &row(1, 100.0));
        reg.update(&event(2, 110.0)).unwrap();
        assert_eq!(reg.current("btcusdt").unwrap().adj_close_ret, None);
        assert!(reg.adj_close_returns().is_empty());
    }

    #[test]
    fn zero_previous_adj_close_is_an_error() {
        let mut reg = TickerRegistry::new(true, Span::none());
        reg.seed("btcusdt", &row(1, 0.0));
        let before = reg.snapshot();

        let err = reg.update(&event(2, 5.0)).unwrap_err();
        assert!(matches!(err, EngineError::ZeroDivisionInReturn { .. }));
        assert_eq!(reg.snapshot(), before);
    }

    #[test]
    fn zero_previous_adj_close_is_fine_without_tracking() {
        let mut reg = TickerRegistry::new(false, Span::none());
        reg.seed("btcusdt", &row(1, 0.0));
        reg.update(&event(2, 5.0)).unwrap();
        assert_eq!(reg.current("btcusdt").unwrap().adj_close, 5.0);
    }

    #[test]
    fn unknown_ticker_is_rejected() {
        let mut reg = TickerRegistry::new(false, Span::none());
        let err = reg.update(&event(2, 5.0)).unwrap_err();
        assert!(matches!(err, EngineError::UnknownTicker { .. }));
    }
}
