//! Per-bundle progress table (`progress.json`)
//!
//! Coarse visibility only: the record log is what makes reruns idempotent.
//! The table is loaded once, updated in memory, and rewritten whole after
//! each bundle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last completed pass over one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub last_run: DateTime<Utc>,
    /// Records written for the bundle in that pass.
    pub count: usize,
    /// Bundle directory.
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    entries: BTreeMap<String, ProgressEntry>,
}

impl ProgressStore {
    /// Load the table from `path`.
    ///
    /// A missing file starts an empty table. So does an unreadable one,
    /// with a warning: stale progress must never block a crawl.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring malformed progress file {}: {e}", path.display());
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("Cannot read progress file {}: {e}", path.display());
                BTreeMap::new()
            }
        };
        log::debug!("Loaded {} progress entries", entries.len());
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn get(&self, bundle: &str) -> Option<&ProgressEntry> {
        self.entries.get(bundle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the entry for `bundle` in memory.
    pub fn update(&mut self, bundle: &str, entry: ProgressEntry) {
        self.entries.insert(bundle.to_string(), entry);
    }

    /// Rewrite the whole table: write a tmp sibling, then rename over the old file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(&self.entries).context("cannot serialize progress")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("cannot write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(count: usize) -> ProgressEntry {
        ProgressEntry {
            last_run: Utc::now(),
            count,
            path: PathBuf::from("/srv/resources/esx_menu"),
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::load(&dir.path().join("progress.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ProgressStore::load(&path).is_empty());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/progress.json");

        let mut store = ProgressStore::load(&path);
        store.update("esx_menu", entry(3));
        store.update("qb-core", entry(7));
        store.save().unwrap();

        let reloaded = ProgressStore::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("esx_menu").unwrap().count, 3);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn update_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProgressStore::load(&dir.path().join("progress.json"));
        store.update("esx_menu", entry(3));
        store.update("esx_menu", entry(5));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("esx_menu").unwrap().count, 5);
    }

    #[test]
    fn file_schema_is_keyed_by_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut store = ProgressStore::load(&path);
        store.update("esx_menu", entry(2));
        store.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let obj = &raw["esx_menu"];
        assert_eq!(obj["count"], 2);
        assert!(obj["last_run"].is_string());
        assert_eq!(obj["path"], "/srv/resources/esx_menu");
    }
}
