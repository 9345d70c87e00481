//! Fingerprint-keyed result cache.
//!
//! Maps a repository's full name to the outcome of its last successful run.
//! An entry only short-circuits processing while the repository's default
//! branch still points at the recorded commit and the entry is younger than
//! the configured maximum age.
//!
//! # Persistence
//!
//! The whole table is written to `cache.json` on every mutation. Writes are
//! serialized through an in-process mutex and an advisory file lock, so
//! concurrent workers (or two overlapping runs) never interleave partial
//! documents. Reads use the in-memory table only. Async callers go through
//! [`ResultCache::call`] so the file lock is taken on the blocking pool.
//!
//! A missing or corrupt document loads as an empty table. A broken cache
//! degrades to "always miss"; it never stops a run.

mod entry;

pub use entry::{CacheDocument, CacheEntry, CacheStats};

use anyhow::{Context, Result};
use chrono::Utc;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

pub const CACHE_FILE: &str = "cache.json";
const LOCK_FILE: &str = "cache.json.lock";

/// Estimated processing time used before any real durations are recorded.
pub const DEFAULT_AVERAGE_DURATION_SECS: f64 = 30.0;

#[derive(Debug, Default)]
struct CacheTable {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

/// Persistent, thread-safe result cache.
#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
    table: RwLock<CacheTable>,
    persist_lock: Mutex<()>,
}

impl ResultCache {
    /// Open the cache stored in `dir`, creating nothing until the first write.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let table = match load_document(&dir.join(CACHE_FILE)) {
            Ok(Some(doc)) => {
                tracing::debug!(entries = doc.repositories.len(), "Loaded result cache");
                CacheTable {
                    entries: doc.repositories,
                    stats: doc.statistics,
                }
            }
            Ok(None) => CacheTable::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Result cache is unreadable, starting empty");
                CacheTable::default()
            }
        };

        Self {
            dir,
            table: RwLock::new(table),
            persist_lock: Mutex::new(()),
        }
    }

    /// Run a closure against the cache on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(self: &Arc<Self>, f: F) -> Result<R>
    where
        F: FnOnce(&ResultCache) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let cache = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&cache))
            .await
            .context("Cache task panicked")?
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Check whether `name` has a fresh entry for `fingerprint`.
    ///
    /// A positive answer counts as a hit and adds `average_duration_hint`
    /// seconds to the estimated time saved.
    pub fn is_fresh(
        &self,
        name: &str,
        fingerprint: &str,
        max_age: chrono::Duration,
        average_duration_hint: f64,
    ) -> bool {
        let fresh = {
            let table = self.read();
            table
                .entries
                .get(name)
                .is_some_and(|e| e.is_fresh_at(fingerprint, max_age, Utc::now()))
        };
        if fresh {
            let mut table = self.write();
            table.stats.hits += 1;
            table.stats.time_saved_secs += average_duration_hint;
        }
        fresh
    }

    pub fn get(&self, name: &str) -> Option<CacheEntry> {
        self.read().entries.get(name).cloned()
    }

    /// Record a completed run and persist the table.
    pub fn put(
        &self,
        name: &str,
        fingerprint: &str,
        had_issues: bool,
        result_summary: &str,
        duration: Duration,
    ) -> Result<()> {
        {
            let mut table = self.write();
            table.entries.insert(
                name.to_string(),
                CacheEntry {
                    commit_fingerprint: fingerprint.to_string(),
                    had_issues,
                    result_summary: result_summary.to_string(),
                    processing_duration: duration.as_secs_f64(),
                    recorded_at: Utc::now(),
                },
            );
            table.stats.misses += 1;
            table.stats.updates += 1;
        }
        self.persist()
    }

    /// Drop one entry so the next run re-analyses the repository.
    pub fn invalidate(&self, name: &str) -> Result<()> {
        let removed = self.write().entries.remove(name).is_some();
        if removed {
            self.persist()?;
        }
        Ok(())
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) -> Result<()> {
        {
            let mut table = self.write();
            table.entries.clear();
            table.stats = CacheStats::default();
        }
        self.persist()
    }

    /// Mean processing duration over all entries, in seconds.
    pub fn average_duration(&self) -> f64 {
        let table = self.read();
        if table.entries.is_empty() {
            return DEFAULT_AVERAGE_DURATION_SECS;
        }
        let total: f64 = table.entries.values().map(|e| e.processing_duration).sum();
        total / table.entries.len() as f64
    }

    pub fn stats(&self) -> CacheStats {
        self.read().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Write the full table to disk.
    ///
    /// The snapshot is taken after acquiring the persist lock, so a later
    /// writer can never be overwritten by an earlier, staler snapshot.
    fn persist(&self) -> Result<()> {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let doc = {
            let table = self.read();
            CacheDocument {
                repositories: table.entries.clone(),
                last_updated: Some(Utc::now()),
                statistics: table.stats.clone(),
            }
        };
        let content =
            serde_json::to_string_pretty(&doc).context("Failed to serialize result cache")?;

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))
            .context("Failed to open cache lock file")?;
        lock_file
            .lock_exclusive()
            .context("Failed to lock result cache")?;

        let target = self.path();
        let tmp = self.dir.join(format!("{}.tmp", CACHE_FILE));
        let result = (|| -> Result<()> {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &target)
                .with_context(|| format!("Failed to replace {}", target.display()))?;
            Ok(())
        })();

        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheTable> {
        self.table.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheTable> {
        self.table.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Returns `Ok(None)` when no document exists yet.
fn load_document(path: &Path) -> Result<Option<CacheDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(doc))
}
