//! Persistent learned-pattern cache.
//!
//! Maps a normalized message to the intent the fallback resolved it to,
//! with usage statistics. Mutations schedule a debounced write: the first
//! mutation in a quiet period arms a timer, later ones are absorbed by it.
//! The map, the timer handle and a generation number share one mutex, so
//! `flush()` can cancel the timer and write without a concurrently firing
//! timer duplicating or losing the write.
//!
//! File layout:
//!
//! ```json
//! { "version": 1, "entries": { "<key>": { "intent": {..}, "hitCount": 3,
//!   "createdAt": "..", "lastUsedAt": ".." } } }
//! ```

use crate::error::Result;
use crate::intent::Intent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// On-disk format version
pub const STORE_VERSION: u32 = 1;

/// Default quiet period before a scheduled write
pub const DEFAULT_WRITE_DEBOUNCE: Duration = Duration::from_secs(5);

/// A cached resolution with usage statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEntry {
    pub intent: Intent,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl LearningEntry {
    pub fn new(intent: Intent) -> Self {
        let now = Utc::now();
        Self {
            intent,
            hit_count: 1,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Count a use. `last_used_at` never moves backwards.
    fn touch(&mut self) {
        self.hit_count = self.hit_count.saturating_add(1);
        self.last_used_at = self.last_used_at.max(Utc::now());
    }
}

/// Persisted form of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStoreFile {
    pub version: u32,
    pub entries: BTreeMap<String, LearningEntry>,
}

/// Borrowed form used for writing, keys sorted for stable output
#[derive(Serialize)]
struct PatternStoreFileRef<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a LearningEntry>,
}

struct PendingWrite {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, LearningEntry>,
    pending: Option<PendingWrite>,
    next_generation: u64,
}

/// Learned-pattern cache backed by a JSON file
pub struct PatternStore {
    path: PathBuf,
    debounce: Duration,
    state: Arc<Mutex<StoreState>>,
}

impl PatternStore {
    /// Create an empty store bound to `path` without reading it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_debounce(path, DEFAULT_WRITE_DEBOUNCE)
    }

    pub fn with_debounce(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            debounce,
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    /// Create a store and load whatever is on disk.
    pub fn open(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        let store = Self::with_debounce(path, debounce);
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory entries with the file contents. A missing file
    /// or malformed content leaves the store empty; neither is an error.
    pub fn load(&self) {
        let entries = match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<PatternStoreFile>(&content) {
                Ok(file) => {
                    if file.version != STORE_VERSION {
                        warn!(
                            "Pattern store {} has version {}, expected {}",
                            self.path.display(),
                            file.version,
                            STORE_VERSION
                        );
                    }
                    file.entries.into_iter().collect()
                }
                Err(e) => {
                    warn!(
                        "Malformed pattern store {}, starting empty: {}",
                        self.path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No pattern store at {}, starting empty", self.path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!(
                    "Failed to read pattern store {}, starting empty: {}",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        };

        let mut state = self.lock();
        state.entries = entries;
        info!(
            "Loaded {} learned patterns from {}",
            state.entries.len(),
            self.path.display()
        );
    }

    pub fn get(&self, key: &str) -> Option<LearningEntry> {
        self.lock().entries.get(key).cloned()
    }

    /// Snapshot of every entry, sorted by key.
    pub fn get_all(&self) -> Vec<(String, LearningEntry)> {
        let state = self.lock();
        let mut all: Vec<(String, LearningEntry)> = state
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Insert or replace. Replacing keeps `created_at` and counts a hit.
    pub fn put(&self, key: &str, intent: Intent) {
        let mut state = self.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.intent = intent;
                entry.touch();
            }
            None => {
                state
                    .entries
                    .insert(key.to_string(), LearningEntry::new(intent));
            }
        }
        self.schedule_write(&mut state);
    }

    /// Count a hit on an existing key. Unknown keys are ignored.
    pub fn record_hit(&self, key: &str) {
        let mut state = self.lock();
        match state.entries.get_mut(key) {
            Some(entry) => entry.touch(),
            None => return,
        }
        self.schedule_write(&mut state);
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.lock();
        let existed = state.entries.remove(key).is_some();
        if existed {
            self.schedule_write(&mut state);
        }
        existed
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn export_json(&self) -> Result<String> {
        let state = self.lock();
        serialize_entries(&state.entries).map_err(Into::into)
    }

    /// Merge entries from a previously exported document. On a key
    /// collision the entry with the higher hit count wins. The document is
    /// parsed before the store is touched, so invalid input changes nothing.
    /// Returns the number of entries inserted or replaced.
    pub fn import_json(&self, json: &str) -> Result<usize> {
        let file: PatternStoreFile = serde_json::from_str(json)?;

        let mut state = self.lock();
        let mut changed = 0;
        for (key, incoming) in file.entries {
            let replace = match state.entries.get(&key) {
                Some(existing) => incoming.hit_count > existing.hit_count,
                None => true,
            };
            if replace {
                state.entries.insert(key, incoming);
                changed += 1;
            }
        }
        if changed > 0 {
            self.schedule_write(&mut state);
        }
        info!("Imported {} learned patterns", changed);
        Ok(changed)
    }

    /// Cancel any pending write and write now.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(pending) = state.pending.take() {
            pending.handle.abort();
        }
        write_entries(&self.path, &state.entries)
    }

    pub fn has_pending_write(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the write timer unless one is already pending. Must be called
    /// with the state lock held. Outside a tokio runtime the write happens
    /// immediately.
    fn schedule_write(&self, state: &mut StoreState) {
        if state.pending.is_some() {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                if let Err(e) = write_entries(&self.path, &state.entries) {
                    warn!("Failed to write pattern store {}: {}", self.path.display(), e);
                }
                return;
            }
        };

        let generation = state.next_generation;
        state.next_generation += 1;

        let shared = Arc::clone(&self.state);
        let path = self.path.clone();
        let debounce = self.debounce;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            // A flush (or a newer timer) took over while we slept.
            if state.pending.as_ref().map(|p| p.generation) != Some(generation) {
                return;
            }
            state.pending = None;
            match write_entries(&path, &state.entries) {
                Ok(()) => debug!("Debounced write of {} patterns", state.entries.len()),
                Err(e) => warn!("Failed to write pattern store {}: {}", path.display(), e),
            }
        });

        state.pending = Some(PendingWrite { generation, handle });
    }
}

impl Drop for PatternStore {
    fn drop(&mut self) {
        let pending = self.lock().pending.is_some();
        if pending {
            if let Err(e) = self.flush() {
                warn!(
                    "Failed to flush pattern store {} on drop: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

fn serialize_entries(entries: &HashMap<String, LearningEntry>) -> serde_json::Result<String> {
    let file = PatternStoreFileRef {
        version: STORE_VERSION,
        entries: entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
    };
    serde_json::to_string_pretty(&file)
}

/// Write through a temp file and rename so readers never see a torn file.
fn write_entries(path: &Path, entries: &HashMap<String, LearningEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serialize_entries(entries)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ledger_intent() -> Intent {
        Intent::new("tally", "get_ledger")
    }

    #[test]
    fn test_put_and_get() {
        let dir = tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.json"));

        store.put("ledger meril", ledger_intent());
        let entry = store.get("ledger meril").unwrap();
        assert_eq!(entry.hit_count, 1);
        assert_eq!(entry.created_at, entry.last_used_at);
        assert_eq!(entry.intent.action, "get_ledger");
        assert!(store.get("ledger").is_none());
    }

    #[test]
    fn test_put_existing_replaces_and_counts() {
        let dir = tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.json"));

        store.put("sales", Intent::new("tally", "get_sales"));
        let created = store.get("sales").unwrap().created_at;
        store.put("sales", Intent::new("tally", "get_sales_register"));

        let entry = store.get("sales").unwrap();
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.intent.action, "get_sales_register");
        assert_eq!(entry.created_at, created);
        assert!(entry.last_used_at >= created);
    }

    #[test]
    fn test_record_hit_only_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let store = PatternStore::new(&path);

        store.record_hit("missing");
        assert_eq!(store.size(), 0);
        assert!(!path.exists());

        store.put("ledger meril", ledger_intent());
        store.record_hit("ledger meril");
        store.record_hit("ledger meril");
        assert_eq!(store.get("ledger meril").unwrap().hit_count, 3);
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.json"));
        store.put("a", ledger_intent());
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = PatternStore::open(dir.path().join("nope.json"), DEFAULT_WRITE_DEBOUNCE);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        fs::write(&path, "{ not json").unwrap();
        let store = PatternStore::open(&path, DEFAULT_WRITE_DEBOUNCE);
        assert!(store.is_empty());
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("patterns.json");
        {
            let store = PatternStore::new(&path);
            store.put("ledger meril", ledger_intent().with_param("format", "pdf"));
            store.put("sales report", Intent::new("tally", "get_sales"));
            store.record_hit("sales report");
            store.flush().unwrap();
        }

        let reloaded = PatternStore::open(&path, DEFAULT_WRITE_DEBOUNCE);
        assert_eq!(reloaded.size(), 2);
        let ledger = reloaded.get("ledger meril").unwrap();
        assert_eq!(ledger.intent, ledger_intent().with_param("format", "pdf"));
        assert_eq!(reloaded.get("sales report").unwrap().hit_count, 2);
    }

    #[test]
    fn test_export_is_stable() {
        let dir = tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.json"));
        store.put("b", ledger_intent());
        store.put("a", ledger_intent());
        let first = store.export_json().unwrap();
        assert_eq!(first, store.export_json().unwrap());
        assert!(first.find("\"a\"").unwrap() < first.find("\"b\"").unwrap());
    }

    #[test]
    fn test_import_invalid_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let store = PatternStore::new(dir.path().join("patterns.json"));
        store.put("ledger meril", ledger_intent());
        let before = store.export_json().unwrap();

        assert!(store.import_json("{\"version\": 1, \"entries\": ").is_err());
        assert!(store.import_json("[1, 2, 3]").is_err());
        assert_eq!(store.export_json().unwrap(), before);
    }

    #[test]
    fn test_import_merge_keeps_higher_hit_count() {
        let dir = tempdir().unwrap();
        let source = PatternStore::new(dir.path().join("source.json"));
        source.put("shared", Intent::new("tally", "from_source"));
        for _ in 0..4 {
            source.record_hit("shared");
        }
        source.put("weak", Intent::new("tally", "weak_source"));
        source.put("only source", Intent::new("tally", "new"));
        let exported = source.export_json().unwrap();

        let target = PatternStore::new(dir.path().join("target.json"));
        target.put("shared", Intent::new("tally", "from_target"));
        target.put("weak", Intent::new("tally", "weak_target"));
        target.record_hit("weak");

        let changed = target.import_json(&exported).unwrap();
        assert_eq!(changed, 2);
        assert_eq!(target.size(), 3);
        assert_eq!(target.get("shared").unwrap().intent.action, "from_source");
        assert_eq!(target.get("shared").unwrap().hit_count, 5);
        assert_eq!(target.get("weak").unwrap().intent.action, "weak_target");
        assert_eq!(target.get("only source").unwrap().intent.action, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let store = PatternStore::with_debounce(&path, Duration::from_secs(5));

        store.put("a", ledger_intent());
        store.put("b", ledger_intent());
        store.record_hit("a");
        assert!(store.has_pending_write());
        assert!(!path.exists());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!store.has_pending_write());
        let on_disk: PatternStoreFile =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.entries.len(), 2);
        assert_eq!(on_disk.entries["a"].hit_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_cancels_pending_timer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let store = PatternStore::with_debounce(&path, Duration::from_secs(5));

        store.put("a", ledger_intent());
        store.flush().unwrap();
        assert!(!store.has_pending_write());
        assert!(path.exists());

        // Remove the file; a stale timer firing would recreate it.
        fs::remove_file(&path).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_flushes_pending_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        {
            let store = PatternStore::with_debounce(&path, Duration::from_secs(5));
            store.put("a", ledger_intent());
            assert!(!path.exists());
        }
        assert!(path.exists());
    }
}
