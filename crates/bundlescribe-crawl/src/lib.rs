//! Bundlescribe Crawl - turns resource bundles into annotated fragments
//!
//! Discovers bundles by their manifest, resolves the files each manifest
//! declares, splits source files into logical fragments, and sends every
//! fragment through a single serialized inference endpoint. Results are
//! appended to the record log one at a time.
//!
//! # Example
//!
//! ```ignore
//! use bundlescribe_crawl::{CrawlConfig, InferenceClient, InferenceConfig, run};
//!
//! let config = CrawlConfig {
//!     root: "resources".into(),
//!     once: true,
//!     ..Default::default()
//! };
//! let client = InferenceClient::new(InferenceConfig::default());
//! let summary = run(&config, &client, &progress)?;
//! println!("{} records", summary.records);
//! ```

pub mod config;
pub mod discover;
pub mod extract;
pub mod inference;
pub mod manifest;
pub mod resolve;
pub mod runner;

// Re-exports
pub use config::CrawlConfig;
pub use discover::{Bundle, discover_bundles};
pub use extract::{CodeFragment, ExtractOptions, Strategy, extract_fragments};
pub use inference::{
    Annotate, CommandRecovery, InferenceClient, InferenceConfig, InferenceError, RecoveryHook,
};
pub use manifest::{BundleManifest, FileGroup, parse_manifest};
pub use resolve::{ResolvedFile, Resolution, resolve_files};
pub use runner::{BundleOutcome, EpochSummary, RunSummary, process_bundle, run, run_epoch};
