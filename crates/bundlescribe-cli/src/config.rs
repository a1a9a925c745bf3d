//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bundlescribe_core::RetryPolicy;
use bundlescribe_crawl::{CommandRecovery, CrawlConfig, ExtractOptions, InferenceConfig};
use bundlescribe_store::DedupConfig;
use serde::Deserialize;

/// Global configuration for bundlescribe
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlSection,
    pub inference: InferenceSection,
    pub dedup: DedupSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    pub root: PathBuf,
    pub dataset_path: PathBuf,
    pub progress_path: PathBuf,
    pub manifest_name: String,
    pub epoch_interval_secs: u64,
    pub cooldown_ms: u64,
    pub chunk_limit: usize,
    pub min_fragment_len: usize,
    pub extensions: Vec<String>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        let crawl = CrawlConfig::default();
        Self {
            root: crawl.root,
            dataset_path: crawl.dataset_path,
            progress_path: crawl.progress_path,
            manifest_name: crawl.manifest_name,
            epoch_interval_secs: crawl.epoch_interval.as_secs(),
            cooldown_ms: crawl.cooldown.as_millis() as u64,
            chunk_limit: crawl.extract.chunk_limit,
            min_fragment_len: crawl.extract.min_fragment_len,
            extensions: crawl.extensions,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    /// Run after a runner crash; empty disables recovery.
    pub recovery_command: Vec<String>,
}

impl Default for InferenceSection {
    fn default() -> Self {
        let inference = InferenceConfig::default();
        Self {
            url: inference.url,
            model: inference.model,
            temperature: inference.temperature,
            max_output_tokens: inference.max_output_tokens,
            max_attempts: inference.retry.max_attempts,
            retry_delay_secs: inference.retry.delay.as_secs(),
            timeout_secs: inference.timeout.as_secs(),
            recovery_command: vec!["ollama".into(), "stop".into(), "all".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupSection {
    pub input: PathBuf,
    pub output: PathBuf,
    pub min_completion_len: usize,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            input: PathBuf::from("./dataset/dataset.jsonl"),
            output: PathBuf::from("./dataset/dataset.dedup.jsonl"),
            min_completion_len: DedupConfig::default().min_completion_len,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./bundlescribe.toml (current directory)
    /// 2. ~/.config/bundlescribe/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("bundlescribe.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "bundlescribe") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        let c = &self.crawl;
        CrawlConfig {
            root: c.root.clone(),
            dataset_path: c.dataset_path.clone(),
            progress_path: c.progress_path.clone(),
            manifest_name: c.manifest_name.clone(),
            epoch_interval: Duration::from_secs(c.epoch_interval_secs),
            cooldown: Duration::from_millis(c.cooldown_ms),
            extract: ExtractOptions {
                chunk_limit: c.chunk_limit,
                min_fragment_len: c.min_fragment_len,
            },
            extensions: c.extensions.iter().map(|e| normalize_extension(e)).collect(),
            ..Default::default()
        }
    }

    pub fn inference_config(&self) -> InferenceConfig {
        let i = &self.inference;
        InferenceConfig {
            url: i.url.clone(),
            model: i.model.clone(),
            temperature: i.temperature,
            max_output_tokens: i.max_output_tokens,
            retry: RetryPolicy {
                max_attempts: i.max_attempts,
                delay: Duration::from_secs(i.retry_delay_secs),
            },
            timeout: Duration::from_secs(i.timeout_secs),
        }
    }

    pub fn recovery_hook(&self) -> Option<CommandRecovery> {
        CommandRecovery::from_argv(&self.inference.recovery_command)
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            min_completion_len: self.dedup.min_completion_len,
        }
    }
}

/// `lua`, `.LUA` and `.lua` all mean `.lua`.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}
