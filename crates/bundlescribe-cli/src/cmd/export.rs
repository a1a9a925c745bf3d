//! Export subcommand - instruction/input/output JSONL for fine-tuning tools

use std::path::PathBuf;

use anyhow::Result;
use bundlescribe_core::fmt_num;
use bundlescribe_store::export::DEFAULT_INSTRUCTION;
use clap::Args;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Record log to convert (default: dedup output from config)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Instruction JSONL to write
    #[arg(short, long, default_value = "./dataset/instructions.jsonl")]
    pub output: PathBuf,

    /// Instruction text attached to every example
    #[arg(long, default_value = DEFAULT_INSTRUCTION)]
    pub instruction: String,
}

pub fn run(args: ExportArgs, config: &Config) -> Result<()> {
    let input = args.input.unwrap_or_else(|| config.dedup.output.clone());
    log::info!("Export {} -> {}", input.display(), args.output.display());

    let summary = bundlescribe_store::export_instructions(&input, &args.output, &args.instruction)?;

    super::print_summary(
        "Export",
        &[
            ("Written", fmt_num(summary.written)),
            ("Skipped (blank)", fmt_num(summary.skipped)),
            ("Malformed", fmt_num(summary.malformed)),
        ],
    );
    Ok(())
}
