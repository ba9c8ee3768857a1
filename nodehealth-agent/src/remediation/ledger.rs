//! Reboot history, persisted as JSON so it outlives the reboot it records

use crate::error::{HealthError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Entries kept on disk; older ones are dropped on write
const MAX_ENTRIES: usize = 64;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    reboots: Vec<DateTime<Utc>>,
}

pub struct RebootLedger {
    path: Option<PathBuf>,
    memory: Mutex<Vec<DateTime<Utc>>>,
}

impl RebootLedger {
    /// Ledger backed by a JSON file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            memory: Mutex::new(Vec::new()),
        }
    }

    /// Ledger that forgets everything on process exit
    pub fn in_memory() -> Self {
        Self {
            path: None,
            memory: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> Result<Vec<DateTime<Utc>>> {
        match &self.path {
            Some(path) => Ok(load(path)?.reboots),
            None => Ok(self.memory.lock().clone()),
        }
    }

    pub fn count_since(&self, since: DateTime<Utc>) -> Result<usize> {
        Ok(self.entries()?.into_iter().filter(|t| *t >= since).count())
    }

    pub fn record(&self, at: DateTime<Utc>) -> Result<()> {
        let Some(path) = &self.path else {
            self.memory.lock().push(at);
            return Ok(());
        };

        let mut file = load(path)?;
        file.reboots.push(at);
        file.reboots.sort();
        if file.reboots.len() > MAX_ENTRIES {
            let excess = file.reboots.len() - MAX_ENTRIES;
            file.reboots.drain(..excess);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unusable(path, e))?;
        }
        let content = serde_json::to_string_pretty(&file).map_err(|e| unusable(path, e))?;
        std::fs::write(path, content).map_err(|e| unusable(path, e))?;

        debug!("Recorded reboot at {} in {}", at, path.display());
        Ok(())
    }
}

fn load(path: &Path) -> Result<LedgerFile> {
    if !path.exists() {
        return Ok(LedgerFile::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| unusable(path, e))?;
    if content.trim().is_empty() {
        return Ok(LedgerFile::default());
    }
    serde_json::from_str(&content).map_err(|e| unusable(path, e))
}

// An unreadable ledger blocks reboots rather than risking a loop
fn unusable(path: &Path, e: impl std::fmt::Display) -> HealthError {
    HealthError::RebootSuppressed(format!("reboot ledger {} unusable: {}", path.display(), e))
}
