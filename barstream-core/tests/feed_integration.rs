//! End-to-end tests for the feed: acquisition, cache, merge, stream, registry.

use barstream_core::config::FeedConfig;
use barstream_core::data::{
    CsvStore, DataError, FixedClock, MarketDataProvider, MemoryStore, RawBar, RawSeries,
    RawSeriesStore, RawTimestamp, SeriesSource, SeriesStore, SyntheticProvider,
};
use barstream_core::domain::{BarEvent, Granularity};
use barstream_core::engine::{BarFeed, StreamItem, SubscribeOutcome};
use barstream_core::fingerprint::StreamDigest;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Span;

// ── Helpers ──────────────────────────────────────────────────────────

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily closes per instrument, starting at the requested start date.
struct ScriptedProvider {
    closes: BTreeMap<String, Vec<f64>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(series: &[(&str, &[f64])]) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let closes = series
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_vec()))
            .collect();
        (
            Self {
                closes,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl MarketDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_series(
        &self,
        instrument: &str,
        granularity: Granularity,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<RawSeries, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let closes = self
            .closes
            .get(instrument)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: instrument.to_string(),
            })?;
        let base = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| RawBar {
                timestamp: RawTimestamp::Epoch(base + i as i64 * 86_400),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 100.0,
                amount: None,
                count: None,
            })
            .collect();
        Ok(RawSeries {
            instrument: instrument.to_string(),
            granularity,
            bars,
        })
    }
}

fn config(tickers: &[&str], start: NaiveDate, end: NaiveDate) -> FeedConfig {
    let mut config = FeedConfig::new(tickers.iter().copied());
    config.start = Some(start);
    config.end = Some(end);
    config
}

fn memory_store(provider: impl MarketDataProvider + 'static, today: NaiveDate) -> RawSeriesStore {
    RawSeriesStore::new(
        Box::new(provider),
        Box::new(MemoryStore::new()),
        Granularity::OneDay,
        Span::none(),
    )
    .with_clock(FixedClock(today))
}

fn drain(feed: &mut BarFeed) -> Vec<BarEvent> {
    feed.by_ref().map(|r| r.unwrap()).collect()
}

// ── Determinism ──────────────────────────────────────────────────────

#[test]
fn identical_sessions_produce_identical_streams() {
    let run = || {
        let cfg = config(&["btcusdt", "ethusdt"], date(2020, 1, 1), date(2020, 3, 1));
        let store = memory_store(SyntheticProvider::default(), date(2024, 1, 1));
        let mut feed = BarFeed::open(&cfg, store, Span::none());
        drain(&mut feed)
    };
    let a = run();
    let b = run();
    assert_eq!(a.len(), 2 * 60);
    assert_eq!(a, b);
    assert_eq!(StreamDigest::of(&a), StreamDigest::of(&b));
}

#[test]
fn equal_timestamps_break_ties_by_ticker() {
    let (provider, _) = ScriptedProvider::new(&[("b", &[1.0, 2.0, 3.0]), ("a", &[4.0, 5.0, 6.0])]);
    let cfg = config(&["b", "a"], date(2020, 1, 1), date(2020, 1, 4));
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    let events = drain(&mut feed);
    let order: Vec<&str> = events.iter().map(|e| e.ticker.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "a", "b", "a", "b"]);
    for pair in events.windows(2) {
        assert!(pair[0].time <= pair[1].time);
    }
}

// ── Windowing and the today-discard rule ─────────────────────────────

#[test]
fn window_is_half_open() {
    let cfg = config(&["btcusdt"], date(2020, 1, 5), date(2020, 1, 10));
    let store = memory_store(SyntheticProvider::default(), date(2024, 1, 1));
    let mut feed = BarFeed::open(&cfg, store, Span::none());

    // the fetch covers Jan 5..=Jan 10, the window stops before Jan 10
    assert_eq!(feed.table("btcusdt").unwrap().len(), 6);
    let events = drain(&mut feed);
    assert_eq!(events.len(), 5);
    assert_eq!(events[0].time, Utc.with_ymd_and_hms(2020, 1, 5, 0, 0, 0).unwrap());
    assert_eq!(events[4].time, Utc.with_ymd_and_hms(2020, 1, 9, 0, 0, 0).unwrap());
}

#[test]
fn fetch_ending_today_drops_the_open_bar_before_caching() {
    let dir = tempfile::tempdir().unwrap();
    let today = date(2020, 1, 10);
    let store = RawSeriesStore::new(
        Box::new(SyntheticProvider::default()),
        Box::new(CsvStore::new(dir.path())),
        Granularity::OneDay,
        Span::none(),
    )
    .with_clock(FixedClock(today));

    let loaded = store.load("btcusdt", Some(date(2020, 1, 5)), Some(today)).unwrap();
    assert_eq!(loaded.source, SeriesSource::Provider);
    assert_eq!(loaded.bars.len(), 5);
    let last = loaded.bars.last().unwrap().timestamp;
    assert_eq!(last, Utc.with_ymd_and_hms(2020, 1, 9, 0, 0, 0).unwrap());

    let cached = CsvStore::new(dir.path()).get("btcusdt").unwrap();
    assert_eq!(cached, loaded.bars);
}

// ── Subscription ─────────────────────────────────────────────────────

#[test]
fn resubscribing_leaves_state_untouched() {
    let (provider, calls) = ScriptedProvider::new(&[("a", &[10.0, 11.0, 12.0])]);
    let cfg = config(&["a"], date(2020, 1, 1), date(2020, 1, 4));
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    feed.stream_next().unwrap();
    let before = feed.registry().snapshot();
    let remaining = feed.stream().remaining();

    assert!(matches!(feed.subscribe("a"), SubscribeOutcome::AlreadySubscribed));
    assert_eq!(feed.registry().snapshot(), before);
    assert_eq!(feed.stream().remaining(), remaining);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn late_subscription_is_not_streamed() {
    let (provider, _) = ScriptedProvider::new(&[("a", &[1.0, 2.0]), ("b", &[3.0, 4.0])]);
    let cfg = config(&["a"], date(2020, 1, 1), date(2020, 1, 3));
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    let outcome = feed.subscribe("b");
    assert!(outcome.is_subscribed());
    assert_eq!(feed.current("b").unwrap().close, 3.0);

    let events = drain(&mut feed);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.ticker == "a"));
    // never updated past its seed
    assert_eq!(feed.current("b").unwrap().close, 3.0);
}

#[test]
fn unavailable_instrument_is_skipped() {
    let (provider, _) = ScriptedProvider::new(&[("a", &[1.0, 2.0])]);
    let cfg = config(&["a", "missing"], date(2020, 1, 1), date(2020, 1, 3));
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    assert_eq!(feed.registry().len(), 1);
    assert!(feed.current("missing").is_none());
    assert!(matches!(
        feed.subscribe("missing"),
        SubscribeOutcome::Unavailable(DataError::SymbolNotFound { .. })
    ));
    assert_eq!(drain(&mut feed).len(), 2);
}

// ── Stream lifecycle ─────────────────────────────────────────────────

#[test]
fn exhausted_feed_stays_exhausted() {
    let (provider, _) = ScriptedProvider::new(&[("a", &[1.0, 2.0])]);
    let mut cfg = config(&["a"], date(2020, 1, 1), date(2020, 1, 3));
    cfg.calc_adj_returns = true;
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    assert!(feed.continue_backtest());
    assert_eq!(drain(&mut feed).len(), 2);
    assert!(!feed.continue_backtest());

    let snapshot = feed.registry().snapshot();
    let returns = feed.registry().adj_close_returns().to_vec();
    for _ in 0..5 {
        assert_eq!(feed.stream_next().unwrap(), StreamItem::EndOfStream);
    }
    assert!(feed.next().is_none());
    assert_eq!(feed.registry().snapshot(), snapshot);
    assert_eq!(feed.registry().adj_close_returns(), returns.as_slice());
}

#[test]
fn adjusted_close_return_uses_previous_value() {
    let (provider, _) = ScriptedProvider::new(&[("a", &[100.0, 110.0])]);
    let mut cfg = config(&["a"], date(2020, 1, 1), date(2020, 1, 3));
    cfg.calc_adj_returns = true;
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    drain(&mut feed);
    let returns = feed.registry().adj_close_returns();
    assert_eq!(returns.len(), 2);
    // first event repeats the seed row
    assert_eq!(returns[0], 0.0);
    assert!((returns[1] - 0.10).abs() < 1e-12);
    let state = feed.current("a").unwrap();
    assert_eq!(state.adj_close, 110.0);
    assert!((state.adj_close_ret.unwrap() - 0.10).abs() < 1e-12);
}

#[test]
fn returns_are_not_tracked_when_disabled() {
    let (provider, _) = ScriptedProvider::new(&[("a", &[100.0, 110.0])]);
    let cfg = config(&["a"], date(2020, 1, 1), date(2020, 1, 3));
    let mut feed = BarFeed::open(&cfg, memory_store(provider, date(2024, 1, 1)), Span::none());

    drain(&mut feed);
    assert!(feed.registry().adj_close_returns().is_empty());
    assert_eq!(feed.current("a").unwrap().adj_close_ret, None);
}

// ── Cache ────────────────────────────────────────────────────────────

#[test]
fn second_session_reads_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, calls) = ScriptedProvider::new(&[("a", &[1.0, 2.0, 3.0])]);
    let provider = Arc::new(provider);

    struct Shared(Arc<ScriptedProvider>);
    impl MarketDataProvider for Shared {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn fetch_series(
            &self,
            instrument: &str,
            granularity: Granularity,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<RawSeries, DataError> {
            self.0.fetch_series(instrument, granularity, start, end)
        }
    }

    let session = || {
        let store = RawSeriesStore::new(
            Box::new(Shared(Arc::clone(&provider))),
            Box::new(CsvStore::new(dir.path())),
            Granularity::OneDay,
            Span::none(),
        )
        .with_clock(FixedClock(date(2024, 1, 1)));
        let cfg = config(&["a"], date(2020, 1, 1), date(2020, 1, 4));
        let mut feed = BarFeed::open(&cfg, store, Span::none());
        drain(&mut feed)
    };

    let first = session();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let second = session();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert!(dir.path().join("a.csv").exists());
}

#[test]
fn look_alike_instruments_do_not_share_cache_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, calls) =
        ScriptedProvider::new(&[("BTC/USDT", &[1.0, 1.0]), ("BTC_USDT", &[999.0, 999.0])]);
    let store = RawSeriesStore::new(
        Box::new(provider),
        Box::new(CsvStore::new(dir.path())),
        Granularity::OneDay,
        Span::none(),
    )
    .with_clock(FixedClock(date(2024, 1, 1)));
    let cfg = config(&["BTC/USDT", "BTC_USDT"], date(2020, 1, 1), date(2020, 1, 3));
    let mut feed = BarFeed::open(&cfg, store, Span::none());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(feed.current("BTC/USDT").unwrap().close, 1.0);
    assert_eq!(feed.current("BTC_USDT").unwrap().close, 999.0);

    for event in drain(&mut feed) {
        let expected = if event.ticker == "BTC/USDT" { 1.0 } else { 999.0 };
        assert_eq!(event.close, expected);
    }
}
