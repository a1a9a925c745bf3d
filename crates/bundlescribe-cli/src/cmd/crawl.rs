//! Crawl subcommand - annotate resource bundles into the record log

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use bundlescribe_core::{SharedProgress, fmt_num};
use bundlescribe_crawl::InferenceClient;
use clap::Args;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Directory searched for resource bundles
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Run a single epoch and exit
    #[arg(long)]
    pub once: bool,

    /// Record log to append to
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Per-bundle progress file
    #[arg(long)]
    pub progress_file: Option<PathBuf>,

    /// Chat endpoint URL
    #[arg(long)]
    pub url: Option<String>,

    /// Model name sent with every request
    #[arg(short, long)]
    pub model: Option<String>,

    /// Attempts per fragment before recording an error
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Seconds between epochs
    #[arg(long)]
    pub interval: Option<u64>,
}

pub fn run(args: CrawlArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let mut crawl = config.crawl_config();
    crawl.once = args.once;
    if let Some(root) = args.root {
        crawl.root = root;
    }
    if let Some(dataset) = args.dataset {
        crawl.dataset_path = dataset;
    }
    if let Some(progress_file) = args.progress_file {
        crawl.progress_path = progress_file;
    }
    if let Some(secs) = args.interval {
        crawl.epoch_interval = std::time::Duration::from_secs(secs);
    }

    let mut inference = config.inference_config();
    if let Some(url) = args.url {
        inference.url = url;
    }
    if let Some(model) = args.model {
        inference.model = model;
    }
    if let Some(n) = args.max_attempts {
        inference.retry.max_attempts = n;
    }

    log::info!("Crawling {}", crawl.root.display());
    log::info!("  Endpoint: {} ({})", inference.url, inference.model);
    log::info!("  Records: {}", crawl.dataset_path.display());

    let mut client = InferenceClient::new(inference);
    if let Some(hook) = config.recovery_hook() {
        client = client.with_recovery(Box::new(hook));
    }

    let summary = bundlescribe_crawl::run(&crawl, &client, progress)?;

    super::print_summary(
        "Crawl",
        &[
            ("Epochs", fmt_num(summary.epochs)),
            ("Bundles", fmt_num(summary.bundles)),
            ("Records", fmt_num(summary.records)),
        ],
    );

    if summary.interrupted {
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}
