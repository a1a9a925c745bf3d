//! Bundle discovery: every directory below the crawl root holding a manifest

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// A directory described by one manifest file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Directory base name, used as the resource name in records.
    pub name: String,
    /// Absolute bundle directory.
    pub root: PathBuf,
}

impl Bundle {
    pub fn from_root(root: PathBuf) -> Self {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Self { name, root }
    }

    pub fn manifest_path(&self, manifest_name: &str) -> PathBuf {
        self.root.join(manifest_name)
    }
}

/// Find bundles strictly below `root`, in sorted path order.
///
/// The root itself is never a bundle, even if it holds a manifest.
pub fn discover_bundles(root: &Path, manifest_name: &str) -> Result<Vec<Bundle>> {
    let root = std::path::absolute(root)
        .with_context(|| format!("cannot resolve crawl root {}", root.display()))?;
    let pattern = format!(
        "{}/**/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        glob::Pattern::escape(manifest_name)
    );
    log::debug!("Discovering bundles with {pattern}");

    let mut bundles: Vec<Bundle> = glob::glob(&pattern)
        .context("invalid discovery pattern")?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path during discovery: {e}");
                None
            }
        })
        .filter(|path| path.is_file())
        .filter_map(|path| path.parent().map(Path::to_path_buf))
        .filter(|dir| *dir != root)
        .map(Bundle::from_root)
        .collect();

    bundles.sort_by(|a, b| a.root.cmp(&b.root));
    bundles.dedup();
    Ok(bundles)
}
