use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::records::{EntryRow, RejectedRow};

/// One exported batch of store rows on disk (a JSON array of `entries` rows).
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
    rows: Vec<EntryRow>,
    rejected: Vec<RejectedRow>,
    loaded_at: DateTime<Utc>,
}

impl Snapshot {
    /// Load a snapshot file. The file must hold a JSON array; rows inside it
    /// that do not fit the row shape are set aside instead of failing the load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let values: Vec<Value> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;

        let mut snapshot = Self::from_rows(&path, Vec::with_capacity(values.len()));
        for (index, value) in values.into_iter().enumerate() {
            match EntryRow::from_value(value, index) {
                Ok(row) => snapshot.rows.push(row),
                Err(rejected) => {
                    tracing::warn!(
                        path = %path.display(),
                        err = %rejected.error,
                        "skipping unreadable row"
                    );
                    snapshot.rejected.push(rejected);
                }
            }
        }
        Ok(snapshot)
    }

    pub fn from_rows(path: impl AsRef<Path>, rows: Vec<EntryRow>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rows,
            rejected: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[EntryRow] {
        &self.rows
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}
