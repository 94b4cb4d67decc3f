use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::StoreError;
use crate::types::Verdict;

const SCRATCH_FILE: &str = "temp_history.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
}

type HistoryMap = BTreeMap<String, Vec<HistoryEntry>>;

/// Per-address event log. Events accumulate in memory and in the scratch file
/// until a verdict exists, then move atomically into the per-category file.
pub struct HistoryLog {
    dir: PathBuf,
    pending: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    // Serializes every file mutation; the scratch and category files share a
    // single-writer invariant.
    file_lock: Mutex<()>,
}

impl HistoryLog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            pending: Mutex::new(HashMap::new()),
            file_lock: Mutex::new(()),
        })
    }

    /// Record an event for an address that has no verdict yet.
    pub fn record(&self, address: &str, event: impl Into<String>) {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            event: event.into(),
        };
        info!(target: "engine", address, event = %entry.event);

        self.pending
            .lock()
            .entry(address.to_string())
            .or_default()
            .push(entry.clone());

        let _guard = self.file_lock.lock();
        if let Err(err) = self.append_scratch(address, &entry) {
            warn!(target: "engine", address, %err, "failed to persist history event");
        }
    }

    /// Move the address's pending events into the category file and drop the
    /// scratch copy.
    pub fn commit(&self, address: &str, verdict: Verdict) -> Result<(), StoreError> {
        let events = self.pending.lock().remove(address).unwrap_or_default();
        if events.is_empty() {
            return Ok(());
        }

        let _guard = self.file_lock.lock();
        let path = self.category_path(verdict);
        let mut history = read_map(&path)?;
        history.entry(address.to_string()).or_default().extend(events);
        write_map(&path, &history)?;

        let scratch = self.dir.join(SCRATCH_FILE);
        let mut temp = read_map(&scratch)?;
        if temp.remove(address).is_some() {
            write_map(&scratch, &temp)?;
        }
        Ok(())
    }

    /// Full history for one address, searched across every category file and
    /// the pending events.
    pub fn for_address(&self, address: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        for verdict in Verdict::ALL {
            let history = read_map(&self.category_path(verdict))?;
            if let Some(entries) = history.get(address) {
                return Ok(entries.clone());
            }
        }
        Ok(self
            .pending
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    /// All histories committed under one verdict.
    pub fn for_category(&self, verdict: Verdict) -> Result<HistoryMap, StoreError> {
        read_map(&self.category_path(verdict))
    }

    fn append_scratch(&self, address: &str, entry: &HistoryEntry) -> Result<(), StoreError> {
        let scratch = self.dir.join(SCRATCH_FILE);
        let mut temp = read_map(&scratch)?;
        temp.entry(address.to_string()).or_default().push(entry.clone());
        write_map(&scratch, &temp)
    }

    fn category_path(&self, verdict: Verdict) -> PathBuf {
        self.dir.join(format!("{}.json", verdict.as_str()))
    }
}

fn read_map(path: &Path) -> Result<HistoryMap, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(HistoryMap::new()),
        Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::json(path, e)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HistoryMap::new()),
        Err(source) => Err(StoreError::io(path, source)),
    }
}

fn write_map(path: &Path, map: &HistoryMap) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(map).map_err(|e| StoreError::json(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
