//! Per-batch CSV bookkeeping for the bounce probe.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::BounceError;

const HEADER: [&str; 4] = ["Email", "Status", "Timestamp", "Sender"];

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_VALID: &str = "valid";
pub const STATUS_INVALID: &str = "invalid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRow {
    pub address: String,
    pub status: String,
    pub timestamp: String,
    pub sender: String,
}

pub struct BatchFile {
    path: PathBuf,
}

impl BatchFile {
    pub fn create(
        dir: impl AsRef<Path>,
        batch_id: &str,
        addresses: &[String],
    ) -> Result<Self, BounceError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| BounceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{batch_id}.csv"));

        let mut writer = csv::Writer::from_path(&path).map_err(|source| BounceError::Csv {
            path: path.clone(),
            source,
        })?;
        writer
            .write_record(HEADER)
            .map_err(|source| BounceError::Csv {
                path: path.clone(),
                source,
            })?;
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        for address in addresses {
            writer
                .write_record([address.as_str(), STATUS_PENDING, now.as_str(), ""])
                .map_err(|source| BounceError::Csv {
                    path: path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| BounceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    pub fn open(dir: impl AsRef<Path>, batch_id: &str) -> Result<Self, BounceError> {
        let path = dir.as_ref().join(format!("{batch_id}.csv"));
        if !path.exists() {
            return Err(BounceError::UnknownBatch(batch_id.to_string()));
        }
        Ok(Self { path })
    }

    pub fn rows(&self) -> Result<Vec<BatchRow>, BounceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| BounceError::Csv {
                path: self.path.clone(),
                source,
            })?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| BounceError::Csv {
                path: self.path.clone(),
                source,
            })?;
            rows.push(BatchRow {
                address: record.get(0).unwrap_or_default().to_string(),
                status: record.get(1).unwrap_or_default().to_string(),
                timestamp: record.get(2).unwrap_or_default().to_string(),
                sender: record.get(3).unwrap_or_default().to_string(),
            });
        }
        Ok(rows)
    }

    pub fn set_sender(&self, address: &str, sender: &str) -> Result<(), BounceError> {
        self.rewrite(|row| {
            if row.address == address {
                row.sender = sender.to_string();
            }
        })
    }

    pub fn set_status(&self, address: &str, status: &str) -> Result<(), BounceError> {
        self.rewrite(|row| {
            if row.address == address {
                row.status = status.to_string();
            }
        })
    }

    pub fn set_statuses(
        &self,
        invalid: &[String],
        valid: &[String],
    ) -> Result<(), BounceError> {
        self.rewrite(|row| {
            if invalid.contains(&row.address) {
                row.status = STATUS_INVALID.to_string();
            } else if valid.contains(&row.address) {
                row.status = STATUS_VALID.to_string();
            }
        })
    }

    fn rewrite(&self, mut update: impl FnMut(&mut BatchRow)) -> Result<(), BounceError> {
        let mut rows = self.rows()?;
        for row in &mut rows {
            update(row);
        }

        let mut writer = csv::Writer::from_path(&self.path).map_err(|source| BounceError::Csv {
            path: self.path.clone(),
            source,
        })?;
        writer
            .write_record(HEADER)
            .map_err(|source| BounceError::Csv {
                path: self.path.clone(),
                source,
            })?;
        for row in rows {
            writer
                .write_record([
                    row.address.as_str(),
                    row.status.as_str(),
                    row.timestamp.as_str(),
                    row.sender.as_str(),
                ])
                .map_err(|source| BounceError::Csv {
                    path: self.path.clone(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| BounceError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> Vec<String> {
        vec!["a@example.com".to_string(), "b@example.com".to_string()]
    }

    #[test]
    fn create_writes_pending_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let batch = BatchFile::create(dir.path(), "batch_1", &addresses()).expect("create");
        let rows = batch.rows().expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.status == STATUS_PENDING));
    }

    #[test]
    fn statuses_and_sender_update_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let batch = BatchFile::create(dir.path(), "batch_2", &addresses()).expect("create");
        batch.set_sender("a@example.com", "probe@me.test").expect("sender");
        batch
            .set_statuses(&["a@example.com".to_string()], &["b@example.com".to_string()])
            .expect("statuses");

        let rows = batch.rows().expect("rows");
        assert_eq!(rows[0].status, STATUS_INVALID);
        assert_eq!(rows[0].sender, "probe@me.test");
        assert_eq!(rows[1].status, STATUS_VALID);
    }

    #[test]
    fn open_unknown_batch_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            BatchFile::open(dir.path(), "nope"),
            Err(BounceError::UnknownBatch(_))
        ));
    }
}
