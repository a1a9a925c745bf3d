//! bundlescribe-store: durable artifacts of the crawl
//!
//! The append-only record log, the per-bundle progress table, content
//! fingerprints, and the offline passes over the record log (dedup and
//! instruction export).

pub mod dedup;
pub mod export;
pub mod hash;
pub mod ledger;
pub mod record;

pub use dedup::{DedupConfig, DedupSummary, dedup_file, dedup_stream};
pub use export::{ExportSummary, export_instructions};
pub use hash::{content_fingerprint, record_id};
pub use ledger::{ProgressEntry, ProgressStore};
pub use record::{
    DatasetRecord, RecordWriter, error_sentinel, is_error_sentinel, mentions_runner_crash,
};
