//! Dedup subcommand - filter the record log into a training-ready file

use std::path::PathBuf;

use anyhow::Result;
use bundlescribe_core::SharedProgress;
use clap::Args;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct DedupArgs {
    /// Record log to read (default from config)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Filtered output file (default from config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Completions must be longer than this many characters
    #[arg(long)]
    pub min_completion_len: Option<usize>,
}

pub fn run(args: DedupArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let input = args.input.unwrap_or_else(|| config.dedup.input.clone());
    let output = args.output.unwrap_or_else(|| config.dedup.output.clone());
    let mut dedup = config.dedup_config();
    if let Some(n) = args.min_completion_len {
        dedup.min_completion_len = n;
    }

    log::info!("Dedup {} -> {}", input.display(), output.display());

    let pb = progress.counter_line("dedup");
    let summary = bundlescribe_store::dedup_file(&input, &output, &dedup, &pb);
    pb.finish_and_clear();
    let summary = summary?;

    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    Ok(())
}
