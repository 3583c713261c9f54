//! Normalization: raw provider rows → canonical [`NormalizedBar`] rows.
//!
//! Sorts ascending by timestamp, keeps the first row of any duplicated
//! timestamp, and drops rows whose timestamp does not parse or whose prices
//! or volume are not usable numbers. Fractional volume is truncated toward
//! zero.

use super::provider::{RawBar, RawSeries};
use crate::domain::NormalizedBar;

/// Counts of rows removed during normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub invalid: usize,
    pub duplicates: usize,
}

impl NormalizeReport {
    pub fn dropped(&self) -> usize {
        self.invalid + self.duplicates
    }
}

/// Normalize a raw series into the canonical schema.
pub fn normalize(series: &RawSeries) -> (Vec<NormalizedBar>, NormalizeReport) {
    let mut report = NormalizeReport {
        input_rows: series.bars.len(),
        ..NormalizeReport::default()
    };

    let mut bars: Vec<NormalizedBar> = series
        .bars
        .iter()
        .filter_map(|raw| {
            let bar = to_normalized(&series.instrument, raw);
            if bar.is_none() {
                report.invalid += 1;
            }
            bar
        })
        .collect();

    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    report.duplicates = before - bars.len();

    (bars, report)
}

fn to_normalized(instrument: &str, raw: &RawBar) -> Option<NormalizedBar> {
    let timestamp = raw.timestamp.to_utc().ok()?;
    if !raw.volume.is_finite() || raw.volume < 0.0 {
        return None;
    }
    let bar = NormalizedBar {
        timestamp,
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        adj_close: raw.close,
        volume: raw.volume.trunc() as u64,
        ticker: instrument.to_string(),
    };
    bar.has_finite_prices().then_some(bar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::RawTimestamp;
    use crate::domain::Granularity;

    fn raw(ts: i64, close: f64, volume: f64) -> RawBar {
        RawBar {
            timestamp: RawTimestamp::Epoch(ts),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
            amount: Some(12.5),
            count: Some(3),
        }
    }

    fn series(bars: Vec<RawBar>) -> RawSeries {
        RawSeries {
            instrument: "btcusdt".into(),
            granularity: Granularity::OneDay,
            bars,
        }
    }

    #[test]
    fn sorts_ascending_and_stamps_ticker() {
        let (bars, report) = normalize(&series(vec![
            raw(172_800, 3.0, 1.0),
            raw(0, 1.0, 1.0),
            raw(86_400, 2.0, 1.0),
        ]));
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
        assert!(bars.iter().all(|b| b.ticker == "btcusdt"));
        assert!(bars.iter().all(|b| b.adj_close == b.close));
        assert_eq!(report.dropped(), 0);
    }

    #[test]
    fn duplicate_timestamps_keep_first() {
        let (bars, report) = normalize(&series(vec![raw(0, 1.0, 1.0), raw(0, 9.0, 1.0)]));
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 1.0);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn unusable_rows_are_dropped() {
        let mut bad_ts = raw(0, 1.0, 1.0);
        bad_ts.timestamp = RawTimestamp::Text("not a date".into());
        let (bars, report) = normalize(&series(vec![
            bad_ts,
            raw(86_400, f64::NAN, 1.0),
            raw(172_800, 2.0, -5.0),
            raw(259_200, 4.0, 7.6),
        ]));
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, 7);
        assert_eq!(report.invalid, 3);
    }

    #[test]
    fn fractional_volume_truncates() {
        let (bars, _) = normalize(&series(vec![
            raw(0, 1.0, 52_010.7),
            raw(86_400, 1.0, 0.99),
            raw(172_800, 1.0, 12.0),
        ]));
        let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
        assert_eq!(volumes, vec![52_010, 0, 12]);
    }
}
