//! Data acquisition: providers, normalization, cache stores

pub mod clock;
pub mod huobi;
pub mod normalize;
pub mod parquet;
pub mod provider;
pub mod series_store;
pub mod store;
pub mod synthetic;

pub use clock::{Clock, FixedClock, SystemClock};
pub use huobi::HuobiProvider;
pub use normalize::{normalize, NormalizeReport};
pub use parquet::ParquetStore;
pub use provider::{DataError, MarketDataProvider, RawBar, RawSeries, RawTimestamp};
pub use series_store::{FetchRange, LoadedSeries, RawSeriesStore, SeriesSource};
pub use store::{CsvStore, MemoryStore, SeriesStore};
pub use synthetic::SyntheticProvider;
