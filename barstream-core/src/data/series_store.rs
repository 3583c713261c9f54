//! RawSeriesStore — cache first, provider on miss, persist what was fetched.
//!
//! Resolution order for one instrument:
//! 1. If the [`SeriesStore`] has an entry → load it as-is (no range check)
//! 2. Otherwise → fetch from the [`MarketDataProvider`], normalize, drop the
//!    still-open bar when the fetch ends today, persist, return
//!
//! A failed persist does not fail the load: the fetched rows are still returned.

use super::clock::{Clock, SystemClock};
use super::huobi::MAX_KLINE_SIZE;
use super::normalize::normalize;
use super::provider::{DataError, MarketDataProvider};
use super::store::SeriesStore;
use crate::domain::{Granularity, NormalizedBar};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Span};

/// Where a loaded series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesSource {
    Cache,
    Provider,
}

/// A normalized series plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub bars: Vec<NormalizedBar>,
    pub source: SeriesSource,
}

/// Concrete calendar range of a remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// The fetch ends on the current date: its last bar is still open.
    pub discard_today: bool,
}

impl FetchRange {
    /// Calendar days `end, end-1, ..., start`, without `end` when today's bar is discarded.
    pub fn expected_dates(&self) -> Vec<NaiveDate> {
        let days = (self.end - self.start).num_days() + 1;
        let skip = usize::from(self.discard_today);
        (0..days.max(0))
            .filter_map(|i| self.end.checked_sub_signed(chrono::Duration::days(i)))
            .skip(skip)
            .collect()
    }
}

pub struct RawSeriesStore {
    provider: Box<dyn MarketDataProvider>,
    store: Box<dyn SeriesStore>,
    clock: Box<dyn Clock>,
    granularity: Granularity,
    span: Span,
}

impl RawSeriesStore {
    pub fn new(
        provider: Box<dyn MarketDataProvider>,
        store: Box<dyn SeriesStore>,
        granularity: Granularity,
        span: Span,
    ) -> Self {
        Self {
            provider,
            store,
            clock: Box::new(SystemClock),
            granularity,
            span,
        }
    }

    /// Replace the wall-clock source used for the today-discard rule.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn store(&self) -> &dyn SeriesStore {
        self.store.as_ref()
    }

    /// Fill in missing bounds: `end` defaults to today, `start` to 2000 bars before `end`.
    pub fn resolve_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> FetchRange {
        let today = self.clock.today();
        let end = end.unwrap_or(today);
        let start = start.unwrap_or_else(|| {
            let lookback = self.granularity.span_of(MAX_KLINE_SIZE - 1);
            let lookback = chrono::Duration::days(lookback.num_days().max(1));
            end.checked_sub_signed(lookback).unwrap_or(NaiveDate::MIN)
        });
        FetchRange {
            start,
            end,
            discard_today: end == today,
        }
    }

    /// Load one instrument's normalized series.
    pub fn load(
        &self,
        instrument: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<LoadedSeries, DataError> {
        if self.store.exists(instrument) {
            return self.load_cached(instrument, start, end);
        }
        self.fetch_and_persist(instrument, self.resolve_range(start, end))
    }

    fn load_cached(
        &self,
        instrument: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<LoadedSeries, DataError> {
        let mut bars = self.store.get(instrument)?;
        if bars.is_empty() {
            return Err(DataError::EmptySeries {
                instrument: instrument.to_string(),
            });
        }
        for bar in &mut bars {
            bar.ticker = instrument.to_string();
        }

        let first = bars[0].timestamp.date_naive();
        let last = bars[bars.len() - 1].timestamp.date_naive();
        let short_start = start.is_some_and(|s| first > s);
        let short_end = end.is_some_and(|e| last < e);
        if short_start || short_end {
            debug!(
                parent: &self.span,
                instrument,
                %first,
                %last,
                "cached series does not span the requested range; using it as-is"
            );
        }

        info!(
            parent: &self.span,
            instrument,
            store = self.store.name(),
            rows = bars.len(),
            "using cached series"
        );
        Ok(LoadedSeries {
            bars,
            source: SeriesSource::Cache,
        })
    }

    fn fetch_and_persist(
        &self,
        instrument: &str,
        range: FetchRange,
    ) -> Result<LoadedSeries, DataError> {
        let raw = self
            .provider
            .fetch_series(instrument, self.granularity, range.start, range.end)?;

        let (mut bars, report) = normalize(&raw);
        if report.dropped() > 0 {
            warn!(
                parent: &self.span,
                instrument,
                invalid = report.invalid,
                duplicates = report.duplicates,
                "dropped rows during normalization"
            );
        }

        if range.discard_today {
            if let Some(open_bar) = bars.pop() {
                info!(
                    parent: &self.span,
                    instrument,
                    timestamp = %open_bar.timestamp,
                    "discarding today's bar: the period is still open"
                );
            }
        }

        if self.granularity == Granularity::OneDay {
            let expected = range.expected_dates().len();
            if expected != bars.len() {
                warn!(
                    parent: &self.span,
                    instrument,
                    expected,
                    actual = bars.len(),
                    "daily row count does not match the calendar range"
                );
            }
        }

        if bars.is_empty() {
            return Err(DataError::EmptySeries {
                instrument: instrument.to_string(),
            });
        }

        if let Err(e) = self.store.put(instrument, &bars) {
            warn!(parent: &self.span, instrument, error = %e, "failed to persist fetched series");
        }

        info!(
            parent: &self.span,
            instrument,
            provider = self.provider.name(),
            rows = bars.len(),
            "fetched series"
        );
        Ok(LoadedSeries {
            bars,
            source: SeriesSource::Provider,
        })
    }
}
