//! Huobi public kline provider.
//!
//! Fetches OHLCV klines from `GET /market/history/kline`. The endpoint has no
//! date parameters: it returns the most recent `size` bars (at most 2000),
//! newest first. Bars are reversed to ascending order and cut to the
//! requested calendar days. Retries with exponential backoff on transport
//! failures, HTTP 429 and 5xx.

use super::provider::{DataError, MarketDataProvider, RawBar, RawSeries, RawTimestamp};
use crate::domain::Granularity;
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn, Span};

/// Hard per-request limit of the kline endpoint.
pub const MAX_KLINE_SIZE: i64 = 2000;

pub const DEFAULT_BASE_URL: &str = "https://api.huobi.pro";

/// Upper bound accepted for `provider.max_retries`.
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Deserialize)]
struct KlineResponse {
    status: String,
    #[serde(default)]
    data: Option<Vec<Kline>>,
    #[serde(rename = "err-code", default)]
    err_code: Option<String>,
    #[serde(rename = "err-msg", default)]
    err_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Kline {
    id: i64,
    open: f64,
    close: f64,
    low: f64,
    high: f64,
    #[serde(default)]
    amount: Option<f64>,
    vol: f64,
    #[serde(default)]
    count: Option<u64>,
}

/// Wire name of a granularity on the kline endpoint.
pub fn period_param(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::OneMinute => "1min",
        Granularity::FiveMinutes => "5min",
        Granularity::FifteenMinutes => "15min",
        Granularity::ThirtyMinutes => "30min",
        Granularity::OneHour => "60min",
        Granularity::OneDay => "1day",
        Granularity::OneMonth => "1mon",
        Granularity::OneWeek => "1week",
        Granularity::OneYear => "1year",
    }
}

/// Number of bars to request so that `[start, end]` is covered, capped at the endpoint limit.
pub fn kline_size(granularity: Granularity, start: NaiveDate, end: NaiveDate) -> i64 {
    let span_secs = (end - start).num_seconds() + 86_400;
    let bars = span_secs / granularity.period_secs() + 1;
    bars.clamp(1, MAX_KLINE_SIZE)
}

pub struct HuobiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
    span: Span,
}

impl HuobiProvider {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        span: Span,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("barstream/0.1")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries,
            base_delay: Duration::from_millis(500),
            span,
        })
    }

    fn kline_url(&self, instrument: &str, granularity: Granularity, size: i64) -> String {
        format!(
            "{}/market/history/kline?symbol={}&period={}&size={size}",
            self.base_url,
            instrument.to_lowercase(),
            period_param(granularity),
        )
    }

    /// Turn a kline response into ascending raw bars inside `[start, end]`.
    fn parse_response(
        instrument: &str,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
        resp: KlineResponse,
    ) -> Result<RawSeries, DataError> {
        if resp.status != "ok" {
            let code = resp.err_code.unwrap_or_default();
            let msg = resp.err_msg.unwrap_or_default();
            return Err(if code == "invalid-parameter" && msg.contains("symbol") {
                DataError::SymbolNotFound {
                    symbol: instrument.to_string(),
                }
            } else {
                DataError::ResponseFormatChanged(format!("status '{}': {code} {msg}", resp.status))
            });
        }

        let mut klines = resp
            .data
            .ok_or_else(|| DataError::ResponseFormatChanged("ok response without data".into()))?;
        klines.sort_by_key(|k| k.id);

        let lower = day_start_secs(start);
        let upper = day_start_secs(end + ChronoDuration::days(1));

        let bars: Vec<RawBar> = klines
            .into_iter()
            .filter(|k| k.id >= lower && k.id < upper)
            .map(|k| RawBar {
                timestamp: RawTimestamp::Epoch(k.id),
                open: k.open,
                high: k.high,
                low: k.low,
                close: k.close,
                volume: k.vol,
                amount: k.amount,
                count: k.count,
            })
            .collect();

        Ok(RawSeries {
            instrument: instrument.to_string(),
            granularity,
            bars,
        })
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn day_start_secs(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|ndt| ndt.and_utc().timestamp())
        .unwrap_or_default()
}

impl MarketDataProvider for HuobiProvider {
    fn name(&self) -> &str {
        "huobi"
    }

    fn fetch_series(
        &self,
        instrument: &str,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawSeries, DataError> {
        let size = kline_size(granularity, start, end);
        let url = self.kline_url(instrument, granularity, size);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                debug!(parent: &self.span, instrument, attempt, ?delay, "retrying kline request");
                std::thread::sleep(delay);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(parent: &self.span, instrument, retry_after, "rate limited");
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status.is_server_error() {
                last_error = Some(DataError::Other(format!("HTTP {status} for {instrument}")));
                continue;
            }
            if !status.is_success() {
                return Err(DataError::Other(format!("HTTP {status} for {instrument}")));
            }

            let body: KlineResponse = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!(
                    "failed to parse response for {instrument}: {e}"
                ))
            })?;
            let series = Self::parse_response(instrument, granularity, start, end, body)?;
            debug!(parent: &self.span, instrument, size, rows = series.len(), "fetched klines");
            return Ok(series);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}
