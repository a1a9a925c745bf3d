//! Instruction-format export of a (deduped) record log
//!
//! Produces `{instruction, input, output}` lines for downstream tooling.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_INSTRUCTION: &str = "Explain, analyze, or answer this resource code segment.";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InstructionRecord {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    /// Blank prompt or completion.
    pub skipped: usize,
    pub malformed: usize,
}

/// Map one record line to an instruction record, or `None` if either side is blank.
fn convert(entry: &serde_json::Value, instruction: &str) -> Option<InstructionRecord> {
    let prompt = entry["prompt"].as_str().unwrap_or("").trim();
    let completion = entry["completion"].as_str().unwrap_or("").trim();
    if prompt.is_empty() || completion.is_empty() {
        return None;
    }
    Some(InstructionRecord {
        instruction: instruction.to_string(),
        input: prompt.to_string(),
        output: completion.to_string(),
    })
}

/// Convert `input` (record JSONL) into instruction JSONL at `output`.
pub fn export_instructions(input: &Path, output: &Path, instruction: &str) -> Result<ExportSummary> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("cannot open {}", input.display()))?,
    );
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let mut writer = BufWriter::new(
        File::create(output).with_context(|| format!("cannot create {}", output.display()))?,
    );

    let mut summary = ExportSummary::default();
    for line in reader.lines() {
        let line = line.context("cannot read record log")?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<serde_json::Value>(&line) else {
            summary.malformed += 1;
            continue;
        };
        match convert(&entry, instruction) {
            Some(record) => {
                serde_json::to_writer(&mut writer, &record).context("cannot write export")?;
                writer.write_all(b"\n").context("cannot write export")?;
                summary.written += 1;
            }
            None => summary.skipped += 1,
        }
    }
    writer.flush().context("cannot flush export")?;

    log::info!(
        "Export complete: {} written, {} skipped, {} malformed",
        summary.written,
        summary.skipped,
        summary.malformed
    );
    Ok(summary)
}
