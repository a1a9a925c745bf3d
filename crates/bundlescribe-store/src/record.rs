//! Dataset records and the append-only record log

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of the completion written when every inference attempt failed.
pub const ERROR_SENTINEL_PREFIX: &str = "[Error";

/// Substrings a crashed model runner leaves in its error output.
pub const RUNNER_CRASH_MARKERS: &[&str] = &["exit status 2", "llama runner process"];

/// Completion text recorded in place of a reply after exhausted retries.
pub fn error_sentinel(message: impl std::fmt::Display) -> String {
    format!("{ERROR_SENTINEL_PREFIX}: {message}]")
}

pub fn is_error_sentinel(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_SENTINEL_PREFIX)
}

/// Whether `text` reports a crashed runner (case-insensitive).
pub fn mentions_runner_crash(text: &str) -> bool {
    let lower = text.to_lowercase();
    RUNNER_CRASH_MARKERS.iter().any(|m| lower.contains(m))
}

/// One annotated fragment. Immutable once appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    /// Fingerprint over bundle root, file path and fragment text.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Bundle directory name.
    pub resource: String,
    /// Resolved source file the fragment came from.
    pub path: String,
    /// Snapshot of the bundle manifest at crawl time.
    pub manifest: serde_json::Value,
    /// User content sent to the model (header + fragment).
    pub prompt: String,
    /// Model reply, or a tagged error sentinel.
    pub completion: String,
}

/// Single-writer handle on the JSONL record log.
///
/// Every record is written as one complete line and flushed before
/// [`append`](Self::append) returns; nothing is held in memory across calls.
#[derive(Debug)]
pub struct RecordWriter {
    file: File,
    path: PathBuf,
    written: usize,
}

impl RecordWriter {
    /// Open `path` for appending, creating it and its parent directory if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open record log {}", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Append one record as a single line and flush it.
    pub fn append(&mut self, record: &DatasetRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("cannot serialize record")?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .with_context(|| format!("cannot append to {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }

    /// Records appended through this handle.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
