//! Expand manifest patterns into concrete source files

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::manifest::{BundleManifest, FileGroup};

/// Extensions that carry something worth annotating.
pub const DEFAULT_EXTENSIONS: [&str; 4] = [".lua", ".js", ".html", ".css"];

/// A file selected for extraction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedFile {
    /// Absolute, lexically normalized path.
    pub path: PathBuf,
    /// Lower-cased extension with its leading dot, e.g. `.lua`.
    pub extension: String,
}

impl ResolvedFile {
    fn new(path: PathBuf) -> Self {
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        Self { path, extension }
    }
}

/// Result of resolving one bundle's manifest.
#[derive(Debug, Default)]
pub struct Resolution {
    /// De-duplicated, sorted by path.
    pub files: Vec<ResolvedFile>,
    /// Patterns that matched nothing on disk.
    pub unmatched: Vec<String>,
}

/// Resolve every declared pattern of `manifest` against `bundle_root`.
///
/// Unmatched patterns are reported and skipped. Only files whose extension
/// is in `extensions` are returned.
pub fn resolve_files(
    manifest: &BundleManifest,
    bundle_root: &Path,
    extensions: &[String],
) -> Resolution {
    let root = std::path::absolute(bundle_root).unwrap_or_else(|_| bundle_root.to_path_buf());
    let mut found = BTreeSet::new();
    let mut unmatched = Vec::new();

    for group in FileGroup::ALL {
        for pattern in manifest.group(group) {
            if pattern.trim().is_empty() || pattern.starts_with("--") {
                continue;
            }
            let matches = expand_pattern(&root, pattern);
            if matches.is_empty() {
                log::warn!("No files matched pattern {pattern} in {}", root.display());
                unmatched.push(pattern.clone());
            }
            found.extend(matches);
        }
    }

    if let Some(ui_page) = &manifest.ui_page {
        let ui_path = normalize_path(&root.join(ui_page));
        if ui_path.is_file() {
            found.insert(ui_path);
        }
    }

    let files = found
        .into_iter()
        .map(ResolvedFile::new)
        .filter(|f| extensions.iter().any(|e| e.eq_ignore_ascii_case(&f.extension)))
        .collect();

    Resolution { files, unmatched }
}

/// Glob-expand `pattern` under `root`, falling back to the literal path.
fn expand_pattern(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let joined = root.join(pattern);
    let pattern_str = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern
    )
    .replace('\\', "/");

    let mut matches: Vec<PathBuf> = match glob::glob(&pattern_str) {
        Ok(paths) => paths
            .filter_map(|p| p.ok())
            .filter(|p| p.is_file())
            .map(|p| normalize_path(&p))
            .collect(),
        Err(e) => {
            log::debug!("Pattern {pattern} is not a valid glob ({e}), trying literal path");
            Vec::new()
        }
    };

    if matches.is_empty() && joined.is_file() {
        matches.push(normalize_path(&joined));
    }
    matches
}

/// Lexical normalization: drop `.` components and fold `..` into its parent.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
