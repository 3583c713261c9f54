//! Serializable feed configuration (TOML).
//!
//! ```toml
//! tickers = ["btcusdt", "ethusdt"]
//! start = "2019-01-01"
//! end = "2020-01-01"
//! granularity = "1d"
//! calc_adj_returns = true
//!
//! [cache]
//! dir = "data/crypto"
//! format = "csv"
//!
//! [provider]
//! kind = "huobi"
//! timeout_secs = 5
//! ```

use crate::data::{
    huobi, CsvStore, DataError, HuobiProvider, MarketDataProvider, ParquetStore, RawSeriesStore,
    SeriesStore, SyntheticProvider,
};
use crate::domain::Granularity;
use crate::engine::Window;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info_span, Span};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything needed to open a feed session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Instruments subscribed when the feed is opened.
    pub tickers: Vec<String>,

    /// First date replayed (inclusive). Also the fetch start on a cache miss.
    #[serde(default)]
    pub start: Option<NaiveDate>,

    /// Replay stops before this date. Also the fetch end on a cache miss.
    #[serde(default)]
    pub end: Option<NaiveDate>,

    #[serde(default)]
    pub granularity: Granularity,

    /// Track the running adjusted-close return per ticker.
    #[serde(default)]
    pub calc_adj_returns: bool,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub format: CacheFormat,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            format: CacheFormat::default(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data").join("crypto")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheFormat {
    #[default]
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    huobi::DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Huobi,
    Synthetic,
}

impl FeedConfig {
    /// Minimal config: the given tickers, everything else defaulted.
    pub fn new<S: Into<String>>(tickers: impl IntoIterator<Item = S>) -> Self {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            start: None,
            end: None,
            granularity: Granularity::default(),
            calc_adj_returns: false,
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tickers.is_empty() {
            return Err(ConfigError::Invalid("no tickers configured".into()));
        }
        let mut seen = BTreeSet::new();
        for t in &self.tickers {
            if t.trim().is_empty() {
                return Err(ConfigError::Invalid("empty ticker".into()));
            }
            if !seen.insert(t.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate ticker '{t}'")));
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err(ConfigError::Invalid(format!(
                    "start {start} must be before end {end}"
                )));
            }
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::Invalid("provider.timeout_secs must be > 0".into()));
        }
        if self.provider.max_retries > huobi::MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "provider.max_retries must be at most {}",
                huobi::MAX_RETRIES
            )));
        }
        Ok(())
    }

    /// Deterministic BLAKE3 identity of this config.
    pub fn config_hash(&self) -> String {
        // serializing plain data structs cannot fail
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Replay window: `[start 00:00 UTC, end 00:00 UTC)`.
    pub fn window(&self) -> Window {
        Window::new(self.start.map(midnight_utc), self.end.map(midnight_utc))
    }

    /// Provider selected by `provider.kind`.
    pub fn build_provider(&self, span: &Span) -> Result<Box<dyn MarketDataProvider>, DataError> {
        Ok(match self.provider.kind {
            ProviderKind::Huobi => Box::new(HuobiProvider::new(
                self.provider.base_url.clone(),
                Duration::from_secs(self.provider.timeout_secs),
                self.provider.max_retries,
                info_span!(parent: span, "huobi"),
            )?),
            ProviderKind::Synthetic => Box::new(SyntheticProvider::default()),
        })
    }

    /// Cache backend selected by `cache.format`.
    pub fn build_store(&self) -> Box<dyn SeriesStore> {
        match self.cache.format {
            CacheFormat::Csv => Box::new(CsvStore::new(self.cache.dir.clone())),
            CacheFormat::Parquet => Box::new(ParquetStore::new(self.cache.dir.clone())),
        }
    }

    /// Provider + cache wired into a [`RawSeriesStore`].
    pub fn build_series_store(&self, span: &Span) -> Result<RawSeriesStore, DataError> {
        Ok(RawSeriesStore::new(
            self.build_provider(span)?,
            self.build_store(),
            self.granularity,
            info_span!(parent: span, "raw_series_store"),
        ))
    }
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
