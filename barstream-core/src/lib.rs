//! Barstream Core — turns per-instrument OHLCV series into one time-ordered bar stream.
//!
//! - Series acquisition from a remote provider with an on-disk cache (CSV or Parquet)
//! - Normalization into a uniform bar schema
//! - Deterministic merge across instruments, ordered by (timestamp, ticker)
//! - Pull-based event stream that keeps a per-ticker registry current
//! - Stream fingerprinting and a rebalance position sizer on top of the registry

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod sizing;

pub use config::{ConfigError, FeedConfig};
pub use engine::{BarFeed, EngineError, StreamItem};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: values handed across threads stay Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::NormalizedBar>();
        require_sync::<domain::NormalizedBar>();
        require_send::<domain::BarEvent>();
        require_sync::<domain::BarEvent>();
        require_send::<domain::TickerState>();
        require_sync::<domain::TickerState>();
        require_send::<config::FeedConfig>();
        require_sync::<config::FeedConfig>();
        require_send::<data::RawSeries>();
        require_sync::<data::RawSeries>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        require_send::<data::CsvStore>();
        require_sync::<data::CsvStore>();
        require_send::<data::ParquetStore>();
        require_sync::<data::ParquetStore>();
        require_send::<data::MemoryStore>();
        require_sync::<data::MemoryStore>();
        require_send::<data::HuobiProvider>();
        require_sync::<data::HuobiProvider>();
        require_send::<data::SyntheticProvider>();
        require_sync::<data::SyntheticProvider>();

        require_send::<engine::BarFeed>();
        require_send::<engine::TickerRegistry>();
        require_send::<engine::BarEventStream>();
    }
}
