//! Most-recent-first store of past analysis results.

use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::cache_validator::ValidatedSnapshot;
use crate::models::AnalysisResult;

/// Maximum number of remembered results.
pub const HISTORY_CAPACITY: usize = 6;

/// Bounded history keyed by company name.
///
/// Inserting a result whose `company_name` is already present replaces the
/// old entry and moves it to the front. The store never holds more than
/// `capacity` entries; the oldest falls off the end.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    entries: Vec<AnalysisResult>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl HistoryStore {
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            capacity: HISTORY_CAPACITY,
            path: None,
        }
    }

    /// Opens a file-backed store.
    ///
    /// A missing, unreadable or tampered file yields an empty history rather
    /// than an error; only I/O failures other than "not found" are reported.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut store = Self {
            entries: Vec::new(),
            capacity: HISTORY_CAPACITY,
            path: Some(path.clone()),
        };

        let serialized = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read history {}", path.display()))
            }
        };

        let Some(data) = ValidatedSnapshot::open(&serialized) else {
            tracing::warn!("Discarding corrupted history file {}", path.display());
            return Ok(store);
        };

        match serde_json::from_str::<Vec<AnalysisResult>>(&data) {
            Ok(entries) => {
                // Re-insert oldest first so the cap and dedup rules hold for hand-made files
                for entry in entries.into_iter().rev() {
                    store.insert(entry);
                }
                tracing::debug!("Loaded {} history entries", store.len());
            }
            Err(e) => tracing::warn!("Discarding unreadable history entries: {}", e),
        }

        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn insert(&mut self, result: AnalysisResult) {
        self.entries
            .retain(|existing| existing.company_name != result.company_name);
        self.entries.insert(0, result);
        self.entries.truncate(self.capacity);
    }

    /// Entries, most recent first.
    pub fn entries(&self) -> &[AnalysisResult] {
        &self.entries
    }

    pub fn get(&self, company_name: &str) -> Option<&AnalysisResult> {
        self.entries.iter().find(|e| e.company_name == company_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the store to its file. No-op for in-memory stores.
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = serde_json::to_string(&self.entries).context("Failed to serialize history")?;
        let envelope = ValidatedSnapshot::new(data)
            .to_json()
            .context("Failed to serialize history envelope")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        // Write then rename so a crash never leaves a half-written file behind
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, envelope)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Forgets every entry and removes the backing file.
    pub fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(())
    }
}
