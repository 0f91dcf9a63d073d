//! Favorites and download history, persisted as JSON in the data directory

use crate::record::{ImageRecord, Source};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One completed download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub record: ImageRecord,
    pub path: PathBuf,
    pub downloaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LibraryData {
    #[serde(default)]
    favorites: Vec<ImageRecord>,
    /// Most recent first
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

pub struct Library {
    data: LibraryData,
    path: PathBuf,
    max_history: usize,
}

impl Library {
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "pixelvault", "pixelvault")
            .map(|dirs| dirs.data_dir().join("library.json"))
            .unwrap_or_else(|| std::env::temp_dir().join("pixelvault").join("library.json"))
    }

    pub fn new(path: PathBuf, max_history: usize) -> Self {
        Self {
            data: LibraryData::default(),
            path,
            max_history,
        }
    }

    /// Load from `path`; a missing file is an empty library
    pub fn load(path: PathBuf, max_history: usize) -> Result<Self> {
        let mut library = Self::new(path, max_history);

        if library.path.exists() {
            let content = std::fs::read_to_string(&library.path)
                .with_context(|| format!("Failed to read library at {}", library.path.display()))?;
            library.data = serde_json::from_str(&content).context("Failed to parse library")?;
            library.data.history.truncate(max_history);
        }

        Ok(library)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write library at {}", self.path.display()))?;

        Ok(())
    }

    pub fn favorites(&self) -> &[ImageRecord] {
        &self.data.favorites
    }

    /// Favorites are keyed by id and source, since ids are only unique per provider
    pub fn is_favorite(&self, source: Source, id: &str) -> bool {
        self.data.favorites.iter().any(|r| r.source == source && r.id == id)
    }

    /// Add or remove. Returns true if the record is now a favorite.
    pub fn toggle_favorite(&mut self, record: &ImageRecord) -> bool {
        if self.remove_favorite(record.source, &record.id) {
            false
        } else {
            self.data.favorites.push(record.clone());
            true
        }
    }

    pub fn remove_favorite(&mut self, source: Source, id: &str) -> bool {
        let before = self.data.favorites.len();
        self.data.favorites.retain(|r| !(r.source == source && r.id == id));
        self.data.favorites.len() != before
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.data.history
    }

    /// Record a download; a repeat download of the same id moves it to the front
    pub fn record_download(&mut self, record: &ImageRecord, path: &Path) {
        self.data
            .history
            .retain(|e| !(e.record.id == record.id && e.record.source == record.source));
        self.data.history.insert(
            0,
            HistoryEntry {
                record: record.clone(),
                path: path.to_path_buf(),
                downloaded_at: Utc::now(),
            },
        );
        self.data.history.truncate(self.max_history);
    }

    pub fn clear_history(&mut self) -> usize {
        let removed = self.data.history.len();
        self.data.history.clear();
        removed
    }
}
