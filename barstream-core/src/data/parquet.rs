//! Parquet-backed [`SeriesStore`]: `{dir}/{instrument}.parquet`.
//!
//! Same columns as the CSV layout. The timestamp index is stored as epoch
//! milliseconds (`Int64`) so the file reads back without timezone casts.

use super::provider::DataError;
use super::store::{cache_stem, commit_tmp, list_stems, SeriesStore};
use crate::domain::NormalizedBar;
use chrono::DateTime;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{instrument}.parquet`
    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{}.parquet", cache_stem(instrument)))
    }
}

impl SeriesStore for ParquetStore {
    fn name(&self) -> &str {
        "parquet"
    }

    fn exists(&self, instrument: &str) -> bool {
        self.path_for(instrument).is_file()
    }

    fn get(&self, instrument: &str) -> Result<Vec<NormalizedBar>, DataError> {
        let path = self.path_for(instrument);
        let file =
            fs::File::open(&path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

        for col_name in NormalizedBar::COLUMNS {
            if df.column(col_name).is_err() {
                return Err(DataError::ValidationError(format!(
                    "missing column '{col_name}' in {}",
                    path.display()
                )));
            }
        }

        dataframe_to_bars(&df)
    }

    fn put(&self, instrument: &str, bars: &[NormalizedBar]) -> Result<(), DataError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut df = bars_to_dataframe(bars)?;
        let path = self.path_for(instrument);
        let tmp_path = path.with_extension("parquet.tmp");
        {
            let file = fs::File::create(&tmp_path)
                .map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
            ParquetWriter::new(file)
                .finish(&mut df)
                .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
        }
        commit_tmp(&tmp_path, &path)
    }

    fn instruments(&self) -> Result<Vec<String>, DataError> {
        list_stems(&self.dir, "parquet")
    }
}

fn bars_to_dataframe(bars: &[NormalizedBar]) -> Result<DataFrame, DataError> {
    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let adj_closes: Vec<f64> = bars.iter().map(|b| b.adj_close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
    let tickers: Vec<String> = bars.iter().map(|b| b.ticker.clone()).collect();

    DataFrame::new(vec![
        Column::new("Timestamp".into(), timestamps),
        Column::new("Open".into(), opens),
        Column::new("High".into(), highs),
        Column::new("Low".into(), lows),
        Column::new("Close".into(), closes),
        Column::new("Adj Close".into(), adj_closes),
        Column::new("Volume".into(), volumes),
        Column::new("Ticker".into(), tickers),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<NormalizedBar>, DataError> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };
    let type_err =
        |name: &str, e: PolarsError| DataError::ParquetError(format!("{name} column type: {e}"));

    let ts_ca = column("Timestamp")?.i64().map_err(|e| type_err("Timestamp", e))?;
    let open_ca = column("Open")?.f64().map_err(|e| type_err("Open", e))?;
    let high_ca = column("High")?.f64().map_err(|e| type_err("High", e))?;
    let low_ca = column("Low")?.f64().map_err(|e| type_err("Low", e))?;
    let close_ca = column("Close")?.f64().map_err(|e| type_err("Close", e))?;
    let adj_ca = column("Adj Close")?.f64().map_err(|e| type_err("Adj Close", e))?;
    let vol_ca = column("Volume")?.u64().map_err(|e| type_err("Volume", e))?;
    let ticker_ca = column("Ticker")?.str().map_err(|e| type_err("Ticker", e))?;

    let null_at = |name: &str, i: usize| DataError::ParquetError(format!("null {name} at row {i}"));

    (0..df.height())
        .map(|i| {
            let millis = ts_ca.get(i).ok_or_else(|| null_at("Timestamp", i))?;
            let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                DataError::ValidationError(format!("timestamp out of range at row {i}"))
            })?;
            Ok(NormalizedBar {
                timestamp,
                open: open_ca.get(i).ok_or_else(|| null_at("Open", i))?,
                high: high_ca.get(i).ok_or_else(|| null_at("High", i))?,
                low: low_ca.get(i).ok_or_else(|| null_at("Low", i))?,
                close: close_ca.get(i).ok_or_else(|| null_at("Close", i))?,
                adj_close: adj_ca.get(i).ok_or_else(|| null_at("Adj Close", i))?,
                volume: vol_ca.get(i).ok_or_else(|| null_at("Volume", i))?,
                ticker: ticker_ca
                    .get(i)
                    .ok_or_else(|| null_at("Ticker", i))?
                    .to_string(),
            })
        })
        .collect()
}
