//! Local durable scratch list written by the sudden-closure path.
//!
//! Writes are synchronous and go through a temp file + rename so a crash in
//! the middle of a write never leaves a half-written list behind.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use log::warn;

use super::SessionRecord;
use crate::utils::lock;

pub struct PendingClosures {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PendingClosures {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create scratch directory {}", parent.display())
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Blocking; safe to call from a shutdown hook.
    pub fn append(&self, record: &SessionRecord) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let mut records = self.read_all()?;
        records.push(record.clone());
        self.write_all(&records)
    }

    pub fn load(&self) -> Result<Vec<SessionRecord>> {
        let _guard = lock(&self.write_lock);
        self.read_all()
    }

    /// Overwrite the list, e.g. with the records that failed to reconcile.
    pub fn replace(&self, records: &[SessionRecord]) -> Result<()> {
        let _guard = lock(&self.write_lock);
        if records.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).with_context(|| {
                    format!("failed to clear scratch list {}", self.path.display())
                })?;
            }
            return Ok(());
        }
        self.write_all(records)
    }

    fn read_all(&self) -> Result<Vec<SessionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read scratch list {}", self.path.display()))?;
        match serde_json::from_str(&contents) {
            Ok(records) => Ok(records),
            Err(err) => {
                // An unreadable list must not block capturing the next closure.
                warn!(
                    "discarding unreadable scratch list {}: {err}",
                    self.path.display()
                );
                Ok(Vec::new())
            }
        }
    }

    fn write_all(&self, records: &[SessionRecord]) -> Result<()> {
        let serialized = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serialized)
            .with_context(|| format!("failed to write scratch list {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move scratch list into {}", self.path.display()))
    }
}
