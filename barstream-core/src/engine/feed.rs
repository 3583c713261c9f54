//! BarFeed — the consumer-facing price handler.
//!
//! Owns the series store, the ticker registry, one normalized table per
//! subscribed instrument and the event stream built from them.
//!
//! The stream is built once, in [`BarFeed::open`], from the instruments
//! subscribed at that moment. Subscribing later still seeds the registry and
//! registers a table, but the in-flight stream never sees those rows.

use super::registry::TickerRegistry;
use super::stream::{BarEventStream, StreamItem};
use super::EngineError;
use crate::config::FeedConfig;
use crate::data::{DataError, RawSeriesStore, SeriesSource};
use crate::domain::{BarEvent, NormalizedBar, TickerState};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, info_span, trace, warn, Span};

/// What happened to one subscription request.
#[derive(Debug)]
pub enum SubscribeOutcome {
    Subscribed { source: SeriesSource, rows: usize },
    /// No-op: the first subscription's state is kept.
    AlreadySubscribed,
    /// Neither cache nor provider produced data; the instrument is skipped.
    Unavailable(DataError),
}

impl SubscribeOutcome {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, SubscribeOutcome::Subscribed { .. })
    }
}

pub struct BarFeed {
    store: RawSeriesStore,
    registry: TickerRegistry,
    tables: BTreeMap<String, Vec<NormalizedBar>>,
    stream: BarEventStream,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    span: Span,
}

impl BarFeed {
    /// Subscribe every configured ticker, then build the stream.
    ///
    /// Instruments that cannot be loaded are logged and skipped.
    pub fn open(config: &FeedConfig, store: RawSeriesStore, span: Span) -> Self {
        let mut registry = TickerRegistry::new(
            config.calc_adj_returns,
            info_span!(parent: &span, "ticker_registry"),
        );
        let mut tables = BTreeMap::new();
        for ticker in &config.tickers {
            subscribe_into(
                &store,
                &mut registry,
                &mut tables,
                ticker,
                (config.start, config.end),
                &span,
            );
        }

        let stream = BarEventStream::new(
            tables.values().map(Vec::as_slice),
            config.window(),
            store.granularity().period_secs(),
            info_span!(parent: &span, "bar_event_stream"),
        );
        info!(
            parent: &span,
            subscribed = registry.len(),
            requested = config.tickers.len(),
            rows = stream.remaining(),
            "feed opened"
        );

        Self {
            store,
            registry,
            tables,
            stream,
            start: config.start,
            end: config.end,
            span,
        }
    }

    /// Subscribe one instrument: load its series and seed the registry from the first row.
    ///
    /// Never fails the session: duplicates and unavailable sources are
    /// reported in the outcome and logged.
    pub fn subscribe(&mut self, ticker: &str) -> SubscribeOutcome {
        subscribe_into(
            &self.store,
            &mut self.registry,
            &mut self.tables,
            ticker,
            (self.start, self.end),
            &self.span,
        )
    }

    /// Latest known state for `ticker`.
    pub fn current(&self, ticker: &str) -> Option<&TickerState> {
        self.registry.current(ticker)
    }

    pub fn registry(&self) -> &TickerRegistry {
        &self.registry
    }

    pub fn stream(&self) -> &BarEventStream {
        &self.stream
    }

    /// Normalized table loaded for `ticker`.
    pub fn table(&self, ticker: &str) -> Option<&[NormalizedBar]> {
        self.tables.get(ticker).map(Vec::as_slice)
    }

    /// Pull one event from the stream, updating the registry.
    pub fn stream_next(&mut self) -> Result<StreamItem, EngineError> {
        let item = self.stream.next_event(&mut self.registry)?;
        if let StreamItem::Bar(ev) = &item {
            trace!(parent: &self.span, ticker = %ev.ticker, time = %ev.time, close = ev.close, "bar");
        }
        Ok(item)
    }

    /// False once the stream has reported its end.
    pub fn continue_backtest(&self) -> bool {
        !self.stream.is_exhausted()
    }
}

fn subscribe_into(
    store: &RawSeriesStore,
    registry: &mut TickerRegistry,
    tables: &mut BTreeMap<String, Vec<NormalizedBar>>,
    ticker: &str,
    (start, end): (Option<NaiveDate>, Option<NaiveDate>),
    span: &Span,
) -> SubscribeOutcome {
    if registry.contains(ticker) {
        warn!(parent: span, ticker, "could not subscribe: already subscribed");
        return SubscribeOutcome::AlreadySubscribed;
    }

    let loaded = match store.load(ticker, start, end) {
        Ok(loaded) => loaded,
        Err(e) => {
            warn!(parent: span, ticker, error = %e, "could not subscribe: no data");
            return SubscribeOutcome::Unavailable(e);
        }
    };

    let Some(first) = loaded.bars.first() else {
        let e = DataError::EmptySeries {
            instrument: ticker.to_string(),
        };
        warn!(parent: span, ticker, error = %e, "could not subscribe: no data");
        return SubscribeOutcome::Unavailable(e);
    };

    registry.seed(ticker, first);
    let rows = loaded.bars.len();
    tables.insert(ticker.to_string(), loaded.bars);
    SubscribeOutcome::Subscribed {
        source: loaded.source,
        rows,
    }
}

impl Iterator for BarFeed {
    type Item = Result<BarEvent, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stream_next() {
            Ok(StreamItem::Bar(ev)) => Some(Ok(ev)),
            Ok(StreamItem::EndOfStream) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
