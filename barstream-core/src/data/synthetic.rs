//! Synthetic provider for offline runs, benches and tests.
//!
//! Produces a deterministic random walk per instrument: the RNG seed is the
//! BLAKE3 hash of the instrument name, so the same instrument and range always
//! yield the same bars.

use super::provider::{DataError, MarketDataProvider, RawBar, RawSeries, RawTimestamp};
use crate::domain::Granularity;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    start_price: f64,
}

impl SyntheticProvider {
    pub fn new(start_price: f64) -> Self {
        Self { start_price }
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_series(
        &self,
        instrument: &str,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, DataError> {
        let seed: [u8; 32] = *blake3::hash(instrument.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let first = start
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DataError::ValidationError(format!("bad start date {start}")))?
            .and_utc()
            .timestamp();
        let stop = end
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| DataError::ValidationError(format!("bad end date {end}")))?
            .and_utc()
            .timestamp();

        let step = granularity.period_secs();
        let mut bars = Vec::new();
        let mut price = self.start_price;
        let mut ts = first;

        while ts < stop {
            let ret: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(1_000.0..50_000.0_f64).round();

            bars.push(RawBar {
                timestamp: RawTimestamp::Epoch(ts),
                open,
                high,
                low,
                close,
                volume,
                amount: Some(volume * close),
                count: Some(rng.gen_range(10..500)),
            });

            price = close;
            ts += step;
        }

        Ok(RawSeries {
            instrument: instrument.to_string(),
            granularity,
            bars,
        })
    }
}
