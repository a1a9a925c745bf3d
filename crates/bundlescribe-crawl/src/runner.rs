//! Epoch loop: discover, resolve, extract, annotate, append
//!
//! Everything here is sequential. Records are appended one at a time as
//! soon as their completion is known, and the progress table is rewritten
//! once per finished bundle. The shutdown flag is checked between
//! fragments, between bundles and during the epoch sleep.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bundlescribe_core::{ProgressContext, fmt_num, is_shutdown_requested, sleep_unless_shutdown};
use bundlescribe_store::{DatasetRecord, ProgressEntry, ProgressStore, RecordWriter, record_id};
use chrono::Utc;
use indicatif::ProgressBar;

use crate::config::CrawlConfig;
use crate::discover::{Bundle, discover_bundles};
use crate::extract::{CodeFragment, Strategy, extract_fragments};
use crate::inference::Annotate;
use crate::manifest::{BundleManifest, parse_manifest};
use crate::resolve::{ResolvedFile, resolve_files};

/// Result of processing one bundle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BundleOutcome {
    pub files: usize,
    pub records: usize,
    /// Shutdown was requested before every fragment was annotated.
    pub interrupted: bool,
}

/// Result of one pass over all discovered bundles.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpochSummary {
    pub bundles: usize,
    pub files: usize,
    pub records: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// Totals across every epoch of a [`run`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub epochs: usize,
    pub bundles: usize,
    pub records: usize,
    pub interrupted: bool,
}

impl RunSummary {
    fn absorb(&mut self, epoch: &EpochSummary) {
        self.epochs += 1;
        self.bundles += epoch.bundles;
        self.records += epoch.records;
        self.interrupted |= epoch.interrupted;
    }
}

/// Run epochs until shutdown, or once when `config.once` is set.
///
/// Only failures on the record log or progress file are returned as errors.
pub fn run(
    config: &CrawlConfig,
    annotator: &dyn Annotate,
    progress: &ProgressContext,
) -> Result<RunSummary> {
    let mut writer = RecordWriter::open(&config.dataset_path)?;
    let mut store = ProgressStore::load(&config.progress_path);
    let mut summary = RunSummary::default();

    log::info!(
        "Crawling {} ({} bundles seen before), records -> {}",
        config.root.display(),
        store.len(),
        config.dataset_path.display()
    );

    loop {
        let pb = progress.stage_line("crawl");
        let epoch = run_epoch(config, annotator, &mut writer, &mut store, &pb);
        pb.finish_and_clear();
        let epoch = epoch?;
        summary.absorb(&epoch);

        log::info!(
            "Epoch {} done: {} bundles, {} files, {} records in {:.1}s",
            summary.epochs,
            fmt_num(epoch.bundles),
            fmt_num(epoch.files),
            fmt_num(epoch.records),
            epoch.elapsed.as_secs_f64()
        );

        if epoch.interrupted || config.once {
            break;
        }
        log::info!("Next epoch in {}s", config.epoch_interval.as_secs());
        if !sleep_unless_shutdown(config.epoch_interval) {
            summary.interrupted = true;
            break;
        }
    }

    if summary.interrupted {
        log::warn!("Shutdown requested, crawl stopped");
    }
    log::info!(
        "{} records appended to {}",
        fmt_num(writer.written()),
        writer.path().display()
    );
    Ok(summary)
}

/// One full pass: rediscover bundles and process each in path order.
pub fn run_epoch(
    config: &CrawlConfig,
    annotator: &dyn Annotate,
    writer: &mut RecordWriter,
    store: &mut ProgressStore,
    pb: &ProgressBar,
) -> Result<EpochSummary> {
    let start = Instant::now();
    let bundles = discover_bundles(&config.root, &config.manifest_name)?;
    log::info!("Discovered {} bundles under {}", bundles.len(), config.root.display());

    let mut summary = EpochSummary::default();
    for bundle in &bundles {
        if is_shutdown_requested() {
            summary.interrupted = true;
            break;
        }
        pb.set_message(bundle.name.clone());

        let outcome = process_bundle(bundle, config, annotator, writer, pb)?;
        summary.files += outcome.files;
        summary.records += outcome.records;
        if outcome.interrupted {
            summary.interrupted = true;
            break;
        }

        summary.bundles += 1;
        store.update(
            &bundle.name,
            ProgressEntry {
                last_run: Utc::now(),
                count: outcome.records,
                path: bundle.root.clone(),
            },
        );
        store.save()?;
        log::info!("{}: {} records", bundle.name, outcome.records);
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Annotate every fragment of one bundle, appending a record per fragment.
///
/// A bundle without a readable manifest yields nothing. Unreadable source
/// files are skipped with a warning.
pub fn process_bundle(
    bundle: &Bundle,
    config: &CrawlConfig,
    annotator: &dyn Annotate,
    writer: &mut RecordWriter,
    pb: &ProgressBar,
) -> Result<BundleOutcome> {
    let mut outcome = BundleOutcome::default();

    let manifest = match read_manifest(&bundle.manifest_path(&config.manifest_name)) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => {
            log::debug!("{}: no manifest, skipping", bundle.name);
            return Ok(outcome);
        }
        Err(e) => {
            log::warn!("{}: {e:#}", bundle.name);
            return Ok(outcome);
        }
    };
    let snapshot = manifest.snapshot();

    let resolution = resolve_files(&manifest, &bundle.root, &config.extensions);
    for file in &resolution.files {
        let text = match std::fs::read(&file.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                log::warn!("Cannot read {}: {e}", file.path.display());
                continue;
            }
        };
        outcome.files += 1;

        let fragments = fragments_of(bundle, file, &text, config);
        log::debug!("{} -> {} fragments", file.path.display(), fragments.len());

        let system = config.system_prompt_for(&file.extension);
        for fragment in fragments {
            if is_shutdown_requested() {
                outcome.interrupted = true;
                return Ok(outcome);
            }
            pb.set_message(format!("{} {}", bundle.name, file.path.display()));

            let record = annotate_fragment(bundle, &fragment, &system, &snapshot, config, annotator);
            writer.append(&record)?;
            outcome.records += 1;

            // Pacing after every call, success or sentinel
            sleep_unless_shutdown(config.cooldown);
        }
    }

    Ok(outcome)
}

fn read_manifest(path: &Path) -> Result<Option<BundleManifest>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(Some(parse_manifest(&String::from_utf8_lossy(&bytes))))
}

fn fragments_of(
    bundle: &Bundle,
    file: &ResolvedFile,
    text: &str,
    config: &CrawlConfig,
) -> Vec<CodeFragment> {
    let strategy = Strategy::for_extension(&file.extension);
    extract_fragments(text, strategy, &config.extract)
        .into_iter()
        .map(|text| CodeFragment {
            bundle: bundle.name.clone(),
            file: file.path.clone(),
            text,
        })
        .collect()
}

fn annotate_fragment(
    bundle: &Bundle,
    fragment: &CodeFragment,
    system: &str,
    snapshot: &serde_json::Value,
    config: &CrawlConfig,
    annotator: &dyn Annotate,
) -> DatasetRecord {
    let file = fragment.file.display().to_string();
    let prompt = config.user_prompt(&fragment.bundle, &file, &fragment.text);
    let completion = annotator.annotate(system, &prompt);
    DatasetRecord {
        id: record_id(&bundle.root.display().to_string(), &file, &fragment.text),
        timestamp: Utc::now(),
        resource: fragment.bundle.clone(),
        path: file,
        manifest: snapshot.clone(),
        prompt,
        completion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every prompt pair and answers with a canned reply.
    struct FakeAnnotator {
        calls: Mutex<Vec<(String, String)>>,
        reply: String,
    }

    impl FakeAnnotator {
        fn new(reply: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                reply: reply.to_string(),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Annotate for FakeAnnotator {
        fn annotate(&self, system: &str, user: &str) -> String {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.reply.clone()
        }
    }

    const GARAGE_LUA: &str = "\
function OpenGarage(source)
    local vehicles = GetPlayerVehicles(source)
    TriggerClientEvent('garage:open', source, vehicles)
end

RegisterNetEvent('garage:store', function(plate)
    local vehicle = GetVehiclePedIsIn(PlayerPedId(), false)
    StoreVehicle(vehicle, plate)
end)
";

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn fixture() -> (tempfile::TempDir, CrawlConfig) {
        let dir = tempfile::tempdir().unwrap();
        let resources = dir.path().join("resources");
        write(
            &resources.join("garage/fxmanifest.lua"),
            "fx_version 'cerulean'\nname 'garage'\nclient_scripts { 'client.lua' }\n",
        );
        write(&resources.join("garage/client.lua"), GARAGE_LUA);
        let config = CrawlConfig {
            root: resources,
            dataset_path: dir.path().join("dataset/dataset.jsonl"),
            progress_path: dir.path().join("dataset/progress.json"),
            cooldown: Duration::ZERO,
            once: true,
            ..Default::default()
        };
        (dir, config)
    }

    fn read_records(path: &Path) -> Vec<DatasetRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn one_record_per_fragment_in_order() {
        let (_dir, config) = fixture();
        let annotator = FakeAnnotator::new("Opens the garage menu.");
        let summary = run(&config, &annotator, &ProgressContext::hidden()).unwrap();

        assert_eq!(summary.epochs, 1);
        assert_eq!(summary.bundles, 1);
        assert_eq!(summary.records, 2);
        assert!(!summary.interrupted);

        let records = read_records(&config.dataset_path);
        assert_eq!(records.len(), 2);
        assert!(records[0].prompt.contains("function OpenGarage"));
        assert!(records[1].prompt.contains("RegisterNetEvent('garage:store'"));
        for record in &records {
            assert_eq!(record.resource, "garage");
            assert_eq!(record.completion, "Opens the garage menu.");
            assert!(record.prompt.starts_with("Resource: garage\nFile: "));
            assert!(record.path.ends_with("client.lua"));
            assert_eq!(record.manifest["name"], "garage");
            assert_eq!(record.id.len(), 64);
        }
        assert_ne!(records[0].id, records[1].id);

        let calls = annotator.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.contains("analyzing .lua code"));
    }

    #[test]
    fn progress_saved_per_bundle() {
        let (_dir, config) = fixture();
        run(&config, &FakeAnnotator::new("ok"), &ProgressContext::hidden()).unwrap();

        let store = ProgressStore::load(&config.progress_path);
        let entry = store.get("garage").unwrap();
        assert_eq!(entry.count, 2);
        assert!(entry.path.ends_with("garage"));
    }

    #[test]
    fn reruns_append_rather_than_replace() {
        let (_dir, config) = fixture();
        let annotator = FakeAnnotator::new("ok");
        run(&config, &annotator, &ProgressContext::hidden()).unwrap();
        run(&config, &annotator, &ProgressContext::hidden()).unwrap();
        assert_eq!(read_records(&config.dataset_path).len(), 4);
    }

    #[test]
    fn missing_manifest_yields_nothing() {
        let (dir, config) = fixture();
        let bundle = Bundle::from_root(dir.path().join("resources/elsewhere"));
        let mut writer = RecordWriter::open(&config.dataset_path).unwrap();
        let annotator = FakeAnnotator::new("ok");

        let outcome =
            process_bundle(&bundle, &config, &annotator, &mut writer, &ProgressBar::hidden())
                .unwrap();
        assert_eq!(outcome, BundleOutcome::default());
        assert!(annotator.calls().is_empty());
    }

    #[test]
    fn sentinel_completions_are_still_recorded() {
        let (_dir, config) = fixture();
        let annotator = FakeAnnotator::new("[Error: HTTP 500: boom]");
        let summary = run(&config, &annotator, &ProgressContext::hidden()).unwrap();
        assert_eq!(summary.records, 2);
        let records = read_records(&config.dataset_path);
        assert!(records
            .iter()
            .all(|r| bundlescribe_store::is_error_sentinel(&r.completion)));
    }

    #[test]
    fn cooldown_follows_every_call() {
        let (_dir, mut config) = fixture();
        config.cooldown = Duration::from_millis(60);
        let annotator = FakeAnnotator::new("[Error: no complete reply within 600s]");

        let start = Instant::now();
        let summary = run(&config, &annotator, &ProgressContext::hidden()).unwrap();
        let elapsed = start.elapsed();

        // Two fragments, each followed by its own pause, sentinel replies included
        assert_eq!(summary.records, 2);
        assert!(elapsed >= Duration::from_millis(120), "{elapsed:?}");
    }

    #[test]
    fn writer_counts_appended_records() {
        let (_dir, config) = fixture();
        let bundle = Bundle::from_root(config.root.join("garage"));
        let mut writer = RecordWriter::open(&config.dataset_path).unwrap();

        let outcome = process_bundle(
            &bundle,
            &config,
            &FakeAnnotator::new("ok"),
            &mut writer,
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.files, 1);
        assert_eq!(writer.written(), 2);
        assert_eq!(writer.path(), config.dataset_path.as_path());
    }

    #[test]
    fn files_outside_extension_set_are_skipped() {
        let (dir, mut config) = fixture();
        write(
            &dir.path().join("resources/garage/fxmanifest.lua"),
            "client_scripts { 'client.lua' }\nfiles { 'data/vehicles.json' }\n",
        );
        write(&dir.path().join("resources/garage/data/vehicles.json"), "{}");
        config.extensions = vec![".json".to_string()];

        let summary = run(&config, &FakeAnnotator::new("ok"), &ProgressContext::hidden()).unwrap();
        assert_eq!(summary.records, 1);
        let records = read_records(&config.dataset_path);
        assert!(records[0].path.ends_with("vehicles.json"));
    }
}
