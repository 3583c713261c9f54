//! Bar granularity — the time span one bar covers.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported bar sizes.
///
/// Month and year use fixed 30-day and 365-day spans for `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Granularity {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1y")]
    OneYear,
}

impl Granularity {
    pub const ALL: [Granularity; 9] = [
        Granularity::OneMinute,
        Granularity::FiveMinutes,
        Granularity::FifteenMinutes,
        Granularity::ThirtyMinutes,
        Granularity::OneHour,
        Granularity::OneDay,
        Granularity::OneMonth,
        Granularity::OneWeek,
        Granularity::OneYear,
    ];

    /// Seconds spanned by one bar. This is the `period` of every emitted event.
    pub fn period_secs(self) -> i64 {
        match self {
            Granularity::OneMinute => 60,
            Granularity::FiveMinutes => 300,
            Granularity::FifteenMinutes => 900,
            Granularity::ThirtyMinutes => 1_800,
            Granularity::OneHour => 3_600,
            Granularity::OneDay => 86_400,
            Granularity::OneMonth => 2_592_000,
            Granularity::OneWeek => 604_800,
            Granularity::OneYear => 31_536_000,
        }
    }

    /// Duration covered by `bars` consecutive bars.
    pub fn span_of(self, bars: i64) -> Duration {
        Duration::seconds(self.period_secs() * bars)
    }

    /// Short label used in config files and on the command line.
    pub fn label(self) -> &'static str {
        match self {
            Granularity::OneMinute => "1m",
            Granularity::FiveMinutes => "5m",
            Granularity::FifteenMinutes => "15m",
            Granularity::ThirtyMinutes => "30m",
            Granularity::OneHour => "1h",
            Granularity::OneDay => "1d",
            Granularity::OneMonth => "1mo",
            Granularity::OneWeek => "1w",
            Granularity::OneYear => "1y",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.label() == s)
            .ok_or_else(|| format!("unknown granularity '{s}' (expected one of 1m, 5m, 15m, 30m, 1h, 1d, 1mo, 1w, 1y)"))
    }
}
