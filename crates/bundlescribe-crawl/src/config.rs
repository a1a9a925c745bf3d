//! Runtime settings for the crawl loop

use std::path::PathBuf;
use std::time::Duration;

use crate::extract::ExtractOptions;
use crate::resolve::DEFAULT_EXTENSIONS;

/// Default system prompt. `{ext}` is replaced with the file extension.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert FiveM developer analyzing {ext} code. \
Explain what this block does, identify any events or NUI communication, \
and generate 2-3 realistic developer questions about it.";

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Directory searched for bundles
    pub root: PathBuf,
    /// Append-only record log
    pub dataset_path: PathBuf,
    /// Per-bundle progress table
    pub progress_path: PathBuf,
    /// File name that marks a bundle directory
    pub manifest_name: String,
    /// Pause between epochs
    pub epoch_interval: Duration,
    /// Pause after every inference call
    pub cooldown: Duration,
    /// Stop after the first epoch
    pub once: bool,
    pub extract: ExtractOptions,
    /// Extensions kept after resolution, lowercase with leading dot
    pub extensions: Vec<String>,
    pub system_prompt: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dataset_path: PathBuf::from("./dataset/dataset.jsonl"),
            progress_path: PathBuf::from("./dataset/progress.json"),
            manifest_name: "fxmanifest.lua".to_string(),
            epoch_interval: Duration::from_secs(3600),
            cooldown: Duration::from_millis(1500),
            once: false,
            extract: ExtractOptions::default(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl CrawlConfig {
    /// System prompt for a file with the given extension.
    pub fn system_prompt_for(&self, extension: &str) -> String {
        self.system_prompt.replace("{ext}", extension)
    }

    /// User content sent alongside one fragment.
    pub fn user_prompt(&self, bundle: &str, file: &str, fragment: &str) -> String {
        format!("Resource: {bundle}\nFile: {file}\n\n{fragment}")
    }
}
