use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use super::StoreError;
use crate::types::{Verdict, VerificationResult};

const HEADER: [&str; 5] = ["Email", "Provider", "Timestamp", "Reason", "Method"];

/// Append-only per-category result files with an in-memory address index.
///
/// A write is idempotent across all four categories: once an address appears
/// in any file it is never written again.
pub struct ResultStore {
    data_dir: PathBuf,
    index: Mutex<HashMap<String, Verdict>>,
}

impl ResultStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| StoreError::io(&data_dir, e))?;

        let mut index = HashMap::new();
        for verdict in Verdict::ALL {
            let path = category_path(&data_dir, verdict);
            if path.exists() {
                load_addresses(&path, verdict, &mut index)?;
            } else {
                write_header(&path)?;
            }
        }

        info!(target: "store", dir = %data_dir.display(), known = index.len(), "result store opened");
        Ok(Self {
            data_dir,
            index: Mutex::new(index),
        })
    }

    /// Verdict already persisted for `address`, if any.
    pub fn lookup(&self, address: &str) -> Option<Verdict> {
        self.index.lock().get(address).copied()
    }

    /// Append the result unless its address is already persisted anywhere.
    /// Returns whether a row was written.
    pub fn append(&self, result: &VerificationResult) -> Result<bool, StoreError> {
        {
            let mut index = self.index.lock();
            if index.contains_key(&result.address) {
                return Ok(false);
            }
            index.insert(result.address.clone(), result.verdict);
        }

        let path = category_path(&self.data_dir, result.verdict);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record([
                result.address.as_str(),
                result.provider.as_str(),
                &result.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                result.reason.as_str(),
                result.method.as_str(),
            ])
            .map_err(|e| StoreError::csv(&path, e))?;
        writer.flush().map_err(|e| StoreError::io(&path, e))?;
        Ok(true)
    }

    /// Counts per verdict, from the in-memory index.
    pub fn summary(&self) -> BTreeMap<Verdict, usize> {
        let mut counts: BTreeMap<Verdict, usize> =
            Verdict::ALL.iter().map(|v| (*v, 0)).collect();
        for verdict in self.index.lock().values() {
            *counts.entry(*verdict).or_default() += 1;
        }
        counts
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn category_path(dir: &Path, verdict: Verdict) -> PathBuf {
    dir.join(format!("{}.csv", verdict.file_stem()))
}

fn write_header(path: &Path) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    writer
        .write_record(HEADER)
        .map_err(|e| StoreError::csv(path, e))?;
    writer.flush().map_err(|e| StoreError::io(path, e))
}

fn load_addresses(
    path: &Path,
    verdict: Verdict,
    index: &mut HashMap<String, Verdict>,
) -> Result<(), StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::csv(path, e))?;
    for record in reader.records() {
        let record = record.map_err(|e| StoreError::csv(path, e))?;
        if let Some(address) = record.get(0) {
            if !address.is_empty() {
                index.entry(address.to_string()).or_insert(verdict);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(address: &str, verdict: Verdict) -> VerificationResult {
        VerificationResult::new(address, verdict, "reason", "example.com", "smtp")
    }

    #[test]
    fn append_writes_one_row_per_address() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultStore::open(dir.path()).expect("open");

        assert!(store.append(&result("a@example.com", Verdict::Valid)).expect("append"));
        assert!(!store.append(&result("a@example.com", Verdict::Valid)).expect("append"));
        // Same address in another category is also refused.
        assert!(!store.append(&result("a@example.com", Verdict::Invalid)).expect("append"));

        let content = fs::read_to_string(dir.path().join("Valid.csv")).expect("read");
        assert_eq!(content.matches("a@example.com").count(), 1);
    }

    #[test]
    fn lookup_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = ResultStore::open(dir.path()).expect("open");
            store.append(&result("a@example.com", Verdict::Risky)).expect("append");
        }
        let store = ResultStore::open(dir.path()).expect("reopen");
        assert_eq!(store.lookup("a@example.com"), Some(Verdict::Risky));
        assert_eq!(store.lookup("b@example.com"), None);
    }

    #[test]
    fn summary_counts_by_verdict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultStore::open(dir.path()).expect("open");
        store.append(&result("a@example.com", Verdict::Valid)).expect("append");
        store.append(&result("b@example.com", Verdict::Valid)).expect("append");
        store.append(&result("c@example.com", Verdict::Custom)).expect("append");

        let summary = store.summary();
        assert_eq!(summary[&Verdict::Valid], 2);
        assert_eq!(summary[&Verdict::Custom], 1);
        assert_eq!(summary[&Verdict::Invalid], 0);
    }

    #[test]
    fn open_creates_all_category_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        ResultStore::open(dir.path()).expect("open");
        for stem in ["Valid", "Invalid", "Risky", "Custom"] {
            assert!(dir.path().join(format!("{stem}.csv")).exists());
        }
    }
}
