//! Cache persistence as a key-value store keyed by instrument.
//!
//! Presence of an entry is the only cache-hit signal: no staleness, range or
//! checksum validation is performed on read.
//!
//! Layout of the file-backed stores: `{dir}/{stem}.{ext}` with the stem from
//! [`cache_stem`], one table per instrument, columns exactly
//! [`NormalizedBar::COLUMNS`] with the timestamp index first. Writes are atomic (write to `.tmp`, rename into place).

use super::provider::DataError;
use crate::domain::NormalizedBar;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// exists / get / put contract over per-instrument tables.
pub trait SeriesStore: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    fn exists(&self, instrument: &str) -> bool;

    fn get(&self, instrument: &str) -> Result<Vec<NormalizedBar>, DataError>;

    fn put(&self, instrument: &str, bars: &[NormalizedBar]) -> Result<(), DataError>;

    /// Instruments currently held, sorted.
    fn instruments(&self) -> Result<Vec<String>, DataError>;
}

/// File name stem for an instrument.
///
/// `[A-Za-z0-9._-]` is kept as-is; every other byte (including `%`) is
/// percent-encoded, so distinct instruments never share a file.
pub fn cache_stem(instrument: &str) -> String {
    let mut stem = String::with_capacity(instrument.len());
    for b in instrument.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') {
            stem.push(char::from(b));
        } else {
            stem.push_str(&format!("%{b:02X}"));
        }
    }
    stem
}

/// Inverse of [`cache_stem`]; `None` if `stem` is not a valid encoding.
pub fn instrument_from_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Instruments of all `*.{ext}` files directly under `dir`, sorted.
///
/// Files whose stem is not a valid [`cache_stem`] encoding are skipped.
pub(crate) fn list_stems(dir: &Path, ext: &str) -> Result<Vec<String>, DataError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
    let mut instruments = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(instrument) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(instrument_from_stem)
        {
            instruments.push(instrument);
        }
    }
    instruments.sort();
    Ok(instruments)
}

/// Atomic rename of a finished temp file; the temp file is removed on failure.
pub(crate) fn commit_tmp(tmp_path: &Path, path: &Path) -> Result<(), DataError> {
    fs::rename(tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(tmp_path);
        DataError::CacheError(format!("atomic rename failed: {e}"))
    })
}

// ── CSV ──────────────────────────────────────────────────────────────

/// One CSV file per instrument.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{instrument}.csv`
    pub fn path_for(&self, instrument: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", cache_stem(instrument)))
    }
}

impl SeriesStore for CsvStore {
    fn name(&self) -> &str {
        "csv"
    }

    fn exists(&self, instrument: &str) -> bool {
        self.path_for(instrument).is_file()
    }

    fn get(&self, instrument: &str) -> Result<Vec<NormalizedBar>, DataError> {
        let path = self.path_for(instrument);
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| DataError::CacheError(format!("open {}: {e}", path.display())))?;
        reader
            .deserialize::<NormalizedBar>()
            .enumerate()
            .map(|(i, row)| {
                row.map_err(|e| {
                    DataError::CacheError(format!("{} row {}: {e}", path.display(), i + 1))
                })
            })
            .collect()
    }

    fn put(&self, instrument: &str, bars: &[NormalizedBar]) -> Result<(), DataError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let path = self.path_for(instrument);
        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .map_err(|e| DataError::CacheError(format!("create {}: {e}", tmp_path.display())))?;
            if bars.is_empty() {
                writer
                    .write_record(NormalizedBar::COLUMNS)
                    .map_err(|e| DataError::CacheError(format!("write header: {e}")))?;
            }
            for bar in bars {
                writer
                    .serialize(bar)
                    .map_err(|e| DataError::CacheError(format!("write row: {e}")))?;
            }
            writer
                .flush()
                .map_err(|e| DataError::CacheError(format!("flush: {e}")))?;
        }
        commit_tmp(&tmp_path, &path)
    }

    fn instruments(&self) -> Result<Vec<String>, DataError> {
        list_stems(&self.dir, "csv")
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// Process-local store; nothing survives the session.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<NormalizedBar>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<NormalizedBar>>>, DataError> {
        self.tables
            .lock()
            .map_err(|_| DataError::CacheError("memory store lock poisoned".into()))
    }
}

impl SeriesStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn exists(&self, instrument: &str) -> bool {
        self.lock()
            .map(|t| t.contains_key(instrument))
            .unwrap_or(false)
    }

    fn get(&self, instrument: &str) -> Result<Vec<NormalizedBar>, DataError> {
        self.lock()?
            .get(instrument)
            .cloned()
            .ok_or_else(|| DataError::CacheError(format!("no entry for '{instrument}'")))
    }

    fn put(&self, instrument: &str, bars: &[NormalizedBar]) -> Result<(), DataError> {
        self.lock()?.insert(instrument.to_string(), bars.to_vec());
        Ok(())
    }

    fn instruments(&self) -> Result<Vec<String>, DataError> {
        let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
