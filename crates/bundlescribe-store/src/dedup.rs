//! Offline validation and dedup of the record log
//!
//! Reads the append-only log line by line, drops malformed lines, failed or
//! truncated completions, and repeated prompt/completion pairs, and writes
//! the survivors to a new file. The input is never modified.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bundlescribe_core::fmt_num;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use indicatif::ProgressBar;
use rustc_hash::FxHashSet;

use crate::hash::content_fingerprint;
use crate::record::{is_error_sentinel, mentions_runner_crash};

#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    /// Completions must be strictly longer than this many characters (after trimming).
    pub min_completion_len: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_completion_len: 100,
        }
    }
}

/// Outcome counts of one dedup pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupSummary {
    pub lines_read: usize,
    pub kept: usize,
    /// Parsed fine but the completion failed validation.
    pub invalid: usize,
    /// Fingerprint already seen earlier in the pass.
    pub duplicates: usize,
    /// Not a JSON object.
    pub malformed: usize,
}

impl DedupSummary {
    pub fn dropped(&self) -> usize {
        self.invalid + self.duplicates + self.malformed
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Dedup")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Records").fg(Color::Cyan),
            ]);
        table.add_row(vec![Cell::new("Lines read"), Cell::new(fmt_num(self.lines_read))]);
        table.add_row(vec![Cell::new("Malformed"), Cell::new(fmt_num(self.malformed))]);
        table.add_row(vec![Cell::new("Invalid"), Cell::new(fmt_num(self.invalid))]);
        table.add_row(vec![Cell::new("Duplicates"), Cell::new(fmt_num(self.duplicates))]);
        table.add_row(vec![
            Cell::new("Kept").fg(Color::Green),
            Cell::new(fmt_num(self.kept)).fg(Color::Green),
        ]);
        format!("\n{table}")
    }

    pub fn print(&self) {
        eprintln!("{}", self.format_table());
    }

    pub fn log(&self) {
        log::info!(
            "Dedup complete: {} kept, {} dropped ({} invalid, {} duplicate, {} malformed)",
            fmt_num(self.kept),
            fmt_num(self.dropped()),
            fmt_num(self.invalid),
            fmt_num(self.duplicates),
            fmt_num(self.malformed)
        );
    }
}

/// Whether a completion is worth keeping.
pub fn is_valid_completion(completion: &str, config: &DedupConfig) -> bool {
    let text = completion.trim();
    text.chars().count() > config.min_completion_len
        && !is_error_sentinel(text)
        && !mentions_runner_crash(text)
}

/// Dedup a JSONL stream. First occurrence wins, in input order.
///
/// Kept lines are copied through unchanged, so a second pass over the
/// output drops nothing.
pub fn dedup_stream<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    config: &DedupConfig,
    pb: &ProgressBar,
) -> Result<DedupSummary> {
    let mut summary = DedupSummary::default();
    let mut seen = FxHashSet::default();

    for line in reader.lines() {
        let line = line.context("cannot read record log")?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        summary.lines_read += 1;
        pb.inc(1);

        let entry: serde_json::Value = match serde_json::from_str(line) {
            Ok(v @ serde_json::Value::Object(_)) => v,
            Ok(_) | Err(_) => {
                log::debug!("line {}: not a JSON object", summary.lines_read);
                summary.malformed += 1;
                continue;
            }
        };
        let prompt = entry["prompt"].as_str().unwrap_or("");
        let completion = entry["completion"].as_str().unwrap_or("");

        if !is_valid_completion(completion, config) {
            summary.invalid += 1;
            continue;
        }
        if !seen.insert(content_fingerprint(prompt, completion)) {
            summary.duplicates += 1;
            continue;
        }

        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .context("cannot write deduped record")?;
        summary.kept += 1;
    }

    writer.flush().context("cannot flush deduped output")?;
    Ok(summary)
}

/// Dedup `input` into `output`, replacing `output` atomically when done.
pub fn dedup_file(
    input: &Path,
    output: &Path,
    config: &DedupConfig,
    pb: &ProgressBar,
) -> Result<DedupSummary> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("cannot open {}", input.display()))?,
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    anyhow::ensure!(
        canonical_target(input)? != canonical_target(output)?,
        "dedup output must differ from input: {}",
        input.display()
    );
    let tmp = output.with_extension("jsonl.tmp");
    let writer = BufWriter::new(
        File::create(&tmp).with_context(|| format!("cannot create {}", tmp.display()))?,
    );

    let summary = dedup_stream(reader, writer, config, pb)?;
    std::fs::rename(&tmp, output)
        .with_context(|| format!("cannot move {} into place", output.display()))?;
    Ok(summary)
}

/// Absolute, symlink-free form of `path`. The file itself need not exist
/// yet, but its parent directory must.
fn canonical_target(path: &Path) -> Result<PathBuf> {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return Ok(resolved);
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .with_context(|| format!("not a file path: {}", path.display()))?;
    let parent = std::fs::canonicalize(parent)
        .with_context(|| format!("cannot resolve {}", parent.display()))?;
    Ok(parent.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "This block registers a net event that opens the garage menu and \
                        forwards the selected vehicle to the server for spawning.";

    fn line(prompt: &str, completion: &str) -> String {
        serde_json::json!({"id": "x", "prompt": prompt, "completion": completion}).to_string()
    }

    fn run(input: &str) -> (DedupSummary, String) {
        let mut out = Vec::new();
        let summary = dedup_stream(
            input.as_bytes(),
            &mut out,
            &DedupConfig::default(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    #[test]
    fn three_duplicates_keep_one() {
        let l = line("Resource: garage", LONG);
        let input = format!("{l}\n{l}\n{l}\n");
        let (summary, out) = run(&input);
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn duplicates_ignore_case_and_outer_whitespace() {
        let a = line("Resource: garage", LONG);
        let b = line("  resource: GARAGE", &format!("{}\n", LONG.to_uppercase()));
        let (summary, _) = run(&format!("{a}\n{b}\n"));
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.duplicates, 1);
    }

    #[test]
    fn first_seen_wins() {
        let a = serde_json::json!({"id": "first", "prompt": "p", "completion": LONG}).to_string();
        let b = serde_json::json!({"id": "second", "prompt": "p", "completion": LONG}).to_string();
        let (_, out) = run(&format!("{a}\n{b}\n"));
        assert!(out.contains("\"first\""));
        assert!(!out.contains("\"second\""));
    }

    #[test]
    fn invalid_completions_dropped() {
        let input = [
            line("p1", "too short"),
            line("p2", &format!("[Error: HTTP 500] {LONG}")),
            line("p3", &format!("{LONG} llama runner process has terminated")),
            line("p4", &format!("{LONG} exit status 2")),
            serde_json::json!({"prompt": "p5"}).to_string(),
        ]
        .join("\n");
        let (summary, out) = run(&input);
        assert_eq!(summary.invalid, 5);
        assert_eq!(summary.kept, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_counted_separately() {
        let input = format!("{{broken\n[1,2]\n{}\n", line("p", LONG));
        let (summary, _) = run(&input);
        assert_eq!(summary.malformed, 2);
        assert_eq!(summary.invalid, 0);
        assert_eq!(summary.kept, 1);
        assert_eq!(summary.dropped(), 2);
    }

    #[test]
    fn idempotent_on_own_output() {
        let input = [
            line("a", LONG),
            line("a", LONG),
            line("b", LONG),
            "garbage".to_string(),
            line("c", "short"),
        ]
        .join("\n");
        let (_, first) = run(&input);
        let (summary, second) = run(&first);
        assert_eq!(first, second);
        assert_eq!(summary.dropped(), 0);
    }

    #[test]
    fn completion_length_is_strict() {
        let config = DedupConfig {
            min_completion_len: 5,
        };
        assert!(!is_valid_completion("12345", &config));
        assert!(is_valid_completion("  123456  ", &config));
    }

    #[test]
    fn dedup_file_refuses_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.jsonl");
        std::fs::write(&path, "").unwrap();
        let err = dedup_file(&path, &path, &DedupConfig::default(), &ProgressBar::hidden());
        assert!(err.is_err());
    }

    #[test]
    fn dedup_file_refuses_same_file_spelled_differently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset/dataset.jsonl");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let original = format!("{}\n{}\n", line("a", LONG), line("a", LONG));
        std::fs::write(&path, &original).unwrap();

        let aliased = dir.path().join("dataset/./../dataset/dataset.jsonl");
        let err = dedup_file(&path, &aliased, &DedupConfig::default(), &ProgressBar::hidden());
        assert!(err.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn dedup_file_creates_output_beside_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dataset.jsonl");
        std::fs::write(&input, format!("{}\n", line("a", LONG))).unwrap();
        let output = dir.path().join("clean/dataset.jsonl");

        let summary =
            dedup_file(&input, &output, &DedupConfig::default(), &ProgressBar::hidden()).unwrap();
        assert_eq!(summary.kept, 1);
        assert!(output.is_file());
        assert!(!output.with_extension("jsonl.tmp").exists());
    }
}
