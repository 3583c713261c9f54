//! MergeEngine — one globally ordered tape from many per-instrument tables.
//!
//! Rows are ordered by `(timestamp, ticker)`; the ticker is the explicit
//! tie-break so that instruments sharing a timestamp always come out in the
//! same order. The window is half-open, `[start, end)`, and is applied by
//! boundary search on the sorted rows.
//!
//! This is an idealised tape for backtesting only; a live feed may deliver
//! bars out of order.

use crate::domain::NormalizedBar;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Optional half-open bounds on the merged tape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Total order used for the merged tape.
pub fn tape_order(a: &NormalizedBar, b: &NormalizedBar) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.ticker.cmp(&b.ticker))
}

pub struct MergeEngine;

impl MergeEngine {
    /// Concatenate `tables`, sort into tape order and cut to `window`.
    pub fn build<'a, I>(tables: I, window: Window) -> MergedSequence
    where
        I: IntoIterator<Item = &'a [NormalizedBar]>,
    {
        let mut rows: Vec<NormalizedBar> = tables
            .into_iter()
            .flat_map(|t| t.iter().cloned())
            .collect();
        rows.sort_by(tape_order);

        let lo = window
            .start
            .map_or(0, |s| rows.partition_point(|r| r.timestamp < s));
        let hi = window
            .end
            .map_or(rows.len(), |e| rows.partition_point(|r| r.timestamp < e));

        if hi <= lo {
            rows.clear();
        } else {
            rows.truncate(hi);
            rows.drain(..lo);
        }

        MergedSequence {
            rows: rows.into_iter(),
        }
    }
}

/// Single-pass, forward-only sequence of `(index timestamp, row)` pairs.
///
/// Not `Clone` and without a reset: once a row is yielded it is gone.
#[derive(Debug)]
pub struct MergedSequence {
    rows: std::vec::IntoIter<NormalizedBar>,
}

impl MergedSequence {
    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for MergedSequence {
    type Item = (DateTime<Utc>, NormalizedBar);

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| (row.timestamp, row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for MergedSequence {}
