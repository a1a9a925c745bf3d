//! bundlescribe - Resource bundle annotation crawler
//!
//! Walks a tree of resource bundles, asks a local language model to
//! annotate every logical code fragment, and curates the resulting
//! record log into a training dataset.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use bundlescribe_core::shutdown_flag;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "bundlescribe")]
#[command(about = "Annotate resource bundles into a fine-tuning dataset")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./bundlescribe.toml or ~/.config/bundlescribe/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl bundles and append annotated records
    Crawl(cmd::crawl::CrawlArgs),
    /// Drop invalid and duplicate records
    Dedup(cmd::dedup::DedupArgs),
    /// Convert records to instruction JSONL
    Export(cmd::export::ExportArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(bundlescribe_core::ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug, progress bars show activity
    //   non-TTY: info unless --debug or --quiet
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    bundlescribe_core::init_logging(quiet, cli.debug, multi);

    setup_signal_handler()?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Crawl(args) => cmd::crawl::run(args, &config, &progress),
        Command::Dedup(args) => cmd::dedup::run(args, &config, &progress).map(|()| ExitCode::SUCCESS),
        Command::Export(args) => cmd::export::run(args, &config).map(|()| ExitCode::SUCCESS),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// First signal requests a graceful stop, a second one exits immediately.
fn setup_signal_handler() -> Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
        }
        .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let crawl = &config.crawl;
    let inference = &config.inference;
    table.add_row(vec!["Crawl root", &crawl.root.display().to_string()]);
    table.add_row(vec!["Record log", &crawl.dataset_path.display().to_string()]);
    table.add_row(vec!["Progress file", &crawl.progress_path.display().to_string()]);
    table.add_row(vec!["Manifest", &crawl.manifest_name]);
    table.add_row(vec!["Extensions", &crawl.extensions.join(" ")]);
    table.add_row(vec![
        "Fragments",
        &format!(
            "> {} chars, <= {} chars",
            crawl.min_fragment_len, crawl.chunk_limit
        ),
    ]);
    table.add_row(vec!["Epoch interval", &format!("{}s", crawl.epoch_interval_secs)]);
    table.add_row(vec!["Cooldown", &format!("{}ms", crawl.cooldown_ms)]);
    table.add_row(vec!["Endpoint", &inference.url]);
    table.add_row(vec!["Model", &inference.model]);
    table.add_row(vec!["Temperature", &inference.temperature.to_string()]);
    table.add_row(vec!["Max output tokens", &inference.max_output_tokens.to_string()]);
    table.add_row(vec![
        "Retries",
        &format!(
            "{} attempts, {}s apart",
            inference.max_attempts, inference.retry_delay_secs
        ),
    ]);
    table.add_row(vec!["Timeout", &format!("{}s", inference.timeout_secs)]);
    table.add_row(vec![
        "Recovery",
        if inference.recovery_command.is_empty() {
            "disabled"
        } else {
            "configured"
        },
    ]);
    table.add_row(vec![
        "Dedup",
        &format!(
            "{} -> {} (completion > {} chars)",
            config.dedup.input.display(),
            config.dedup.output.display(),
            config.dedup.min_completion_len
        ),
    ]);

    eprintln!("\n{table}");
}
