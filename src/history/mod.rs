//! Download history ledger
//!
//! A deduplicating record of completed downloads, keyed by URL and persisted as
//! one flat JSON document:
//!
//! ```json
//! {
//!   "https://youtu.be/abc": {
//!     "title": "Song",
//!     "outputPath": "downloads/Song.mp4",
//!     "category": "single",
//!     "quality": "1080p",
//!     "timestamp": "2026-03-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! The ledger is loaded once and rewritten after every change through a
//! temporary file and a rename, so a crash leaves either the old or the new
//! document on disk and never two entries for one URL. A failed write keeps the
//! change in memory and marks the ledger dirty; the next successful save writes
//! everything.
//!
//! During a batch, writes go through [`LedgerWriter`], the single task allowed
//! to call [`HistoryLedger::record`].

mod writer;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::PersistenceError;
use crate::types::{Category, HistoryRecord, QualityProfile};

pub use writer::{LedgerHandle, LedgerWriter};

/// Summary counts over the ledger
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryStats {
    /// Number of distinct URLs recorded
    pub total_records: usize,
    /// Number of distinct (UTC) days with at least one record
    pub distinct_days: usize,
    /// Records completed today (UTC)
    pub recorded_today: usize,
}

/// Deduplicating, persisted record of completed downloads
#[derive(Debug)]
pub struct HistoryLedger {
    path: Option<PathBuf>,
    records: RwLock<HashMap<String, HistoryRecord>>,
    dirty: AtomicBool,
    // Serializes snapshot+write so saves land on disk in order
    save_lock: tokio::sync::Mutex<()>,
}

impl HistoryLedger {
    /// Load the ledger stored at `path`
    ///
    /// A missing file is an empty ledger. An unparseable document is logged and
    /// treated as empty; malformed entries are dropped individually.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Read`] if the file exists but cannot be read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => decode_document(&contents, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(PersistenceError::Read { path, source }),
        };

        tracing::info!(path = %path.display(), records = records.len(), "Loaded download history");

        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
            dirty: AtomicBool::new(false),
            save_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Ledger that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `url` has a record
    pub fn is_duplicate(&self, url: &str) -> bool {
        self.read().contains_key(url)
    }

    /// Record for `url`, if any
    pub fn get(&self, url: &str) -> Option<HistoryRecord> {
        self.read().get(url).cloned()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the ledger has no records
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Every recorded URL, sorted
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.read().keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Most recent records first, at most `limit`
    pub fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        let mut records: Vec<HistoryRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.url.cmp(&b.url)));
        records.truncate(limit);
        records
    }

    /// Summary counts
    pub fn stats(&self) -> HistoryStats {
        let records = self.read();
        let today = Utc::now().date_naive();
        let days: HashSet<NaiveDate> = records.values().map(|r| r.timestamp.date_naive()).collect();

        HistoryStats {
            total_records: records.len(),
            distinct_days: days.len(),
            recorded_today: records
                .values()
                .filter(|r| r.timestamp.date_naive() == today)
                .count(),
        }
    }

    /// Whether in-memory state has changes not yet on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Insert or replace the record for `record.url`, then save
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the save fails. The record stays in memory
    /// and is written by the next successful save.
    pub async fn record(&self, record: HistoryRecord) -> Result<(), PersistenceError> {
        let url = record.url.clone();
        let replaced = self.write().insert(url.clone(), record).is_some();
        tracing::debug!(url = %url, replaced, "Recorded download in history");
        self.mark_dirty_and_save().await
    }

    /// Remove the record for `url`; returns whether one existed
    pub async fn remove(&self, url: &str) -> Result<bool, PersistenceError> {
        let removed = self.write().remove(url).is_some();
        if removed {
            self.mark_dirty_and_save().await?;
        }
        Ok(removed)
    }

    /// Remove every record
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        self.write().clear();
        self.mark_dirty_and_save().await
    }

    /// Write pending changes to disk, if any
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        if self.is_dirty() {
            self.save().await
        } else {
            Ok(())
        }
    }

    async fn mark_dirty_and_save(&self) -> Result<(), PersistenceError> {
        self.dirty.store(true, Ordering::SeqCst);
        self.save().await
    }

    async fn save(&self) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(());
        };

        let _guard = self.save_lock.lock().await;

        let encoded = {
            let records = self.read();
            let ordered: std::collections::BTreeMap<&String, &HistoryRecord> = records.iter().collect();
            serde_json::to_string_pretty(&ordered)?
        };
        // Any change after the snapshot sets the flag again
        self.dirty.store(false, Ordering::SeqCst);

        if let Err(e) = write_atomically(path, encoded.as_bytes()).await {
            self.dirty.store(true, Ordering::SeqCst);
            tracing::warn!(path = %path.display(), error = %e, "Failed to save history; kept in memory");
            return Err(e);
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, HistoryRecord>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, HistoryRecord>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_err)
}

/// Decode a ledger document, dropping whatever cannot be reconciled
fn decode_document(contents: &str, path: &Path) -> HashMap<String, HistoryRecord> {
    let mut records = HashMap::new();
    if contents.trim().is_empty() {
        return records;
    }

    let document: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(contents) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "History file is unreadable, starting empty");
            return records;
        }
    };

    for (key, value) in document {
        if let Ok(day) = NaiveDate::parse_from_str(&key, "%Y-%m-%d")
            && let serde_json::Value::Array(entries) = value
        {
            import_legacy_day(day, entries, &mut records);
            continue;
        }

        match serde_json::from_value::<HistoryRecord>(value) {
            Ok(mut record) => {
                record.url = key.clone();
                records.insert(key, record);
            }
            Err(e) => {
                tracing::warn!(url = %key, error = %e, "Dropping malformed history entry");
            }
        }
    }

    records
}

/// Import one day of the date-grouped layout: `{"YYYY-MM-DD": [{url, title, output_path, timestamp}]}`
fn import_legacy_day(
    day: NaiveDate,
    entries: Vec<serde_json::Value>,
    records: &mut HashMap<String, HistoryRecord>,
) {
    for entry in entries {
        let field = |name: &str| entry.get(name).and_then(|v| v.as_str()).map(str::to_string);

        let Some(url) = field("url").filter(|u| !u.is_empty()) else {
            tracing::warn!(day = %day, "Dropping legacy history entry without URL");
            continue;
        };

        let timestamp = field("timestamp")
            .and_then(|t| parse_legacy_timestamp(&t))
            .or_else(|| day.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
            .unwrap_or_else(Utc::now);

        let record = HistoryRecord {
            url: url.clone(),
            title: field("title").unwrap_or_else(|| "Unknown".to_string()),
            output_path: field("output_path").map(PathBuf::from).unwrap_or_default(),
            category: crate::classifier::classify(&url)
                .map(|c| c.category)
                .unwrap_or(Category::Unknown),
            quality: QualityProfile::default(),
            timestamp,
        };

        // Later entries win, matching re-downloads appended on later days
        match records.get(&url) {
            Some(existing) if existing.timestamp > record.timestamp => {}
            _ => {
                records.insert(url, record);
            }
        }
    }
}

fn parse_legacy_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}
