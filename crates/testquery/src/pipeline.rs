use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use tq_collector::{
    Correlator, PackageIndex, TestHarness, collect_code_lines, collect_coverage,
    collect_test_events,
};
use tq_cover::parse_profiles_file;
use tq_error::{Result, TqError};
use tq_locator::FunctionLocator;
use tq_store::Store;
use tq_types::TestAction;
use tracing::{info, info_span, warn};

use crate::config::BuildConfig;

const AGGREGATE_PROFILE: &str = "coverage.out";
const STAGED_DATABASE: &str = "staged.db";

/// Row counts of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub packages: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub coverage_blocks: usize,
    pub tests_correlated: usize,
    pub tests_failed_in_isolation: usize,
    pub unusable_profiles: usize,
    pub test_coverage_rows: usize,
    pub code_lines: usize,
    pub output: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Build the database described by `config` and write it to
/// `config.output`, replacing any previous file.
///
/// The store is assembled in memory; nothing is written to `config.output`
/// unless every stage succeeds.
pub fn build_database(config: &BuildConfig, harness: &dyn TestHarness) -> Result<BuildSummary> {
    build_database_with_cancel(config, harness, Arc::new(AtomicBool::new(false)))
}

/// [`build_database`] with a flag that stops correlation from starting
/// further tests once set.
pub fn build_database_with_cancel(
    config: &BuildConfig,
    harness: &dyn TestHarness,
    cancel: Arc<AtomicBool>,
) -> Result<BuildSummary> {
    let (store, mut summary) = populate(config, harness, cancel)?;

    let _span = info_span!("persist", output = %config.output.display()).entered();
    persist_replacing(&store, &config.output)?;
    summary.output = Some(config.output.clone());
    Ok(summary)
}

/// Write `store` next to `output` and rename it into place, so a failed
/// write never costs the previous database.
fn persist_replacing(store: &Store, output: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".testquery-")
        .tempdir_in(parent)?;
    let staged = staging.path().join(STAGED_DATABASE);
    store.persist_to(&staged)?;
    if output.exists() {
        info!("replacing existing database");
    }
    std::fs::rename(&staged, output)?;
    Ok(())
}

/// Run every collection stage into a fresh in-memory store.
pub fn build_in_memory(
    config: &BuildConfig,
    harness: &dyn TestHarness,
) -> Result<(Store, BuildSummary)> {
    populate(config, harness, Arc::new(AtomicBool::new(false)))
}

fn populate(
    config: &BuildConfig,
    harness: &dyn TestHarness,
    cancel: Arc<AtomicBool>,
) -> Result<(Store, BuildSummary)> {
    config.validate()?;
    let start = Instant::now();
    let spec = config.package_spec();
    let _span = info_span!("build", packages = %spec, harness = harness.program()).entered();

    let packages = PackageIndex::new(harness.list_packages(&config.packages)?);
    if packages.is_empty() {
        warn!("package specifier matched no packages");
    }

    let scratch = scratch_dir(config)?;
    let mut store = Store::open_in_memory()?;
    store.create_tables()?;

    let profile_path = scratch.path().join(AGGREGATE_PROFILE);
    let run = collect_test_events(harness, &config.packages, &profile_path)?;
    store.insert_tests(&run.records)?;

    let locator = FunctionLocator::new();
    let profiles = parse_profiles_file(&profile_path)?;
    let coverage = collect_coverage(&profiles, &packages, &locator)?;
    store.insert_coverage(&coverage)?;

    let report = Correlator::new(harness, &locator, &packages, scratch.path())
        .with_jobs(config.jobs)
        .with_cancel_flag(cancel)
        .correlate(&run.correlatable())?;
    store.insert_test_coverage(&report.rows)?;

    let code = collect_code_lines(&packages)?;
    store.insert_code(&code)?;

    store.set_metadata("pkg", &spec)?;
    let config_json = serde_json::to_string(config)
        .map_err(|err| TqError::Internal(format!("failed to encode config: {err}")))?;
    store.set_metadata("config", &config_json)?;
    store.set_metadata("tool_version", env!("CARGO_PKG_VERSION"))?;

    let locator_stats = locator.stats();
    let summary = BuildSummary {
        packages: packages.packages().len(),
        passed: run.count(TestAction::Pass),
        failed: run.count(TestAction::Fail),
        skipped: run.count(TestAction::Skip),
        coverage_blocks: coverage.len(),
        tests_correlated: report.correlated,
        tests_failed_in_isolation: report.failed_in_isolation,
        unusable_profiles: report.unusable_profiles,
        test_coverage_rows: report.rows.len(),
        code_lines: code.len(),
        output: None,
        elapsed: start.elapsed(),
    };
    info!(
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        coverage_blocks = summary.coverage_blocks,
        test_coverage_rows = summary.test_coverage_rows,
        source_files = locator_stats.files,
        elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
        "database built"
    );
    Ok((store, summary))
}

fn scratch_dir(config: &BuildConfig) -> Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("testquery-");
    let dir = match &config.scratch_dir {
        Some(parent) => {
            // The toolchain may run in another directory, so profile paths
            // handed to it must be absolute.
            let parent = if parent.is_absolute() {
                parent.clone()
            } else {
                std::env::current_dir()?.join(parent)
            };
            std::fs::create_dir_all(&parent)?;
            builder.tempdir_in(&parent)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir)
}
