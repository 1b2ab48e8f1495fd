//! Per-test coverage attribution.
//!
//! Every named pass/fail event is re-run alone with a private profile. The
//! blocks of that profile are attributed to the test and to the top-level
//! function that contains their start line.
//!
//! Failure policy per test:
//!
//! - harness cannot launch: fatal, the whole correlation stops
//! - test fails in isolation: logged and skipped
//! - profile missing or malformed: logged and skipped
//! - source missing or unscannable: rows kept with no function name
//!
//! With `jobs > 1` tests are pulled from a shared queue by a bounded set of
//! workers. Results flow over a channel to the calling thread, which is the
//! only one that assembles the report, and event order is restored there.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use crossbeam_deque::{Injector, Steal};
use tq_cover::{Profile, parse_profiles_file};
use tq_error::{Result, TqError};
use tq_locator::{FunctionIndex, FunctionLocator};
use tq_types::{TestCoverageResult, TestEvent};
use tracing::{debug, info, warn};

use crate::artifact::ProfileArtifact;
use crate::harness::TestHarness;
use crate::packages::PackageIndex;

/// Result of one test's isolated run.
#[derive(Debug)]
enum TestOutcome {
    Correlated(Vec<TestCoverageResult>),
    TestFailed,
    ProfileUnusable,
}

/// Rows produced by a correlation run plus per-outcome counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationReport {
    pub rows: Vec<TestCoverageResult>,
    pub correlated: usize,
    pub failed_in_isolation: usize,
    pub unusable_profiles: usize,
}

impl CorrelationReport {
    fn record(&mut self, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Correlated(rows) => {
                self.correlated += 1;
                self.rows.extend(rows);
            }
            TestOutcome::TestFailed => self.failed_in_isolation += 1,
            TestOutcome::ProfileUnusable => self.unusable_profiles += 1,
        }
    }
}

pub struct Correlator<'a> {
    harness: &'a dyn TestHarness,
    locator: &'a FunctionLocator,
    packages: &'a PackageIndex,
    artifact_dir: PathBuf,
    jobs: usize,
    cancel: Arc<AtomicBool>,
}

impl<'a> Correlator<'a> {
    /// `artifact_dir` receives the per-test profiles; each one is removed
    /// as soon as its test is processed.
    pub fn new(
        harness: &'a dyn TestHarness,
        locator: &'a FunctionLocator,
        packages: &'a PackageIndex,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            harness,
            locator,
            packages,
            artifact_dir: artifact_dir.into(),
            jobs: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of concurrent isolated runs; values below one mean one.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Once the flag is set no further test is started and the run ends
    /// with `TqError::Cancelled`.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Correlate `events`, ignoring any that are not named passes or fails.
    pub fn correlate(&self, events: &[TestEvent]) -> Result<CorrelationReport> {
        let tests: Vec<&TestEvent> = events.iter().filter(|e| e.is_correlatable()).collect();
        let start = Instant::now();
        info!(tests = tests.len(), jobs = self.jobs, "correlating tests");

        let report = if self.jobs == 1 || tests.len() <= 1 {
            self.correlate_sequential(&tests)?
        } else {
            self.correlate_parallel(&tests)?
        };

        info!(
            correlated = report.correlated,
            failed_in_isolation = report.failed_in_isolation,
            unusable_profiles = report.unusable_profiles,
            rows = report.rows.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "correlation finished"
        );
        Ok(report)
    }

    fn correlate_sequential(&self, tests: &[&TestEvent]) -> Result<CorrelationReport> {
        let mut report = CorrelationReport::default();
        for event in tests {
            if self.cancel.load(Ordering::Acquire) {
                return Err(TqError::Cancelled);
            }
            report.record(self.correlate_one(event)?);
        }
        Ok(report)
    }

    fn correlate_parallel(&self, tests: &[&TestEvent]) -> Result<CorrelationReport> {
        let queue = Injector::new();
        for (position, event) in tests.iter().enumerate() {
            queue.push((position, *event));
        }
        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<(usize, Result<TestOutcome>)>();
        let workers = self.jobs.min(tests.len());

        let mut slots: Vec<Option<Result<TestOutcome>>> = std::iter::repeat_with(|| None)
            .take(tests.len())
            .collect();

        std::thread::scope(|scope| {
            for worker in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let abort = &abort;
                scope.spawn(move || {
                    loop {
                        if abort.load(Ordering::Acquire) || self.cancel.load(Ordering::Acquire) {
                            break;
                        }
                        let (position, event) = match queue.steal() {
                            Steal::Success(job) => job,
                            Steal::Retry => continue,
                            Steal::Empty => break,
                        };
                        let outcome = self.correlate_one(event);
                        if outcome.is_err() {
                            abort.store(true, Ordering::Release);
                        }
                        if tx.send((position, outcome)).is_err() {
                            break;
                        }
                    }
                    debug!(worker, "correlation worker exiting");
                });
            }
            drop(tx);

            for (position, outcome) in rx {
                slots[position] = Some(outcome);
            }
        });

        let mut report = CorrelationReport::default();
        let mut incomplete = false;
        for slot in slots {
            match slot {
                Some(outcome) => report.record(outcome?),
                None => incomplete = true,
            }
        }
        if incomplete {
            return Err(TqError::Cancelled);
        }
        Ok(report)
    }

    fn correlate_one(&self, event: &TestEvent) -> Result<TestOutcome> {
        let test = event.test.as_str();
        let package = event.package.as_str();
        let artifact = ProfileArtifact::new(&self.artifact_dir, package, test);

        let output = self.harness.run_single(package, test, artifact.path())?;
        if !output.success {
            warn!(
                test,
                package,
                exit_code = ?output.exit_code,
                "test failed in isolated run, skipping its coverage"
            );
            return Ok(TestOutcome::TestFailed);
        }

        let profiles = match parse_profiles_file(artifact.path()) {
            Ok(profiles) => profiles,
            Err(err) if err.is_recoverable() => {
                warn!(test, package, error = %err, "unusable coverage profile, skipping test");
                return Ok(TestOutcome::ProfileUnusable);
            }
            Err(err) => return Err(err),
        };

        let mut rows = Vec::new();
        for profile in &profiles {
            self.attribute(test, profile, &mut rows)?;
        }
        debug!(test, package, rows = rows.len(), "correlated test");
        Ok(TestOutcome::Correlated(rows))
    }

    /// Append one row per block of `profile`. When the source file cannot be
    /// found, read or scanned, its rows carry no function name.
    fn attribute(
        &self,
        test: &str,
        profile: &Profile,
        rows: &mut Vec<TestCoverageResult>,
    ) -> Result<()> {
        let index = match self.source_for(profile) {
            Ok(index) => Some(index),
            Err(err) if err.is_recoverable() => {
                warn!(test, file = %profile.file_name, error = %err, "cannot resolve functions");
                None
            }
            Err(err) => return Err(err),
        };
        rows.extend(profile.blocks.iter().map(|block| {
            let function = index
                .as_ref()
                .map(|idx| idx.function_at(block.start.line).unwrap_or_default().to_owned());
            TestCoverageResult::from_block(
                test,
                profile.package(),
                profile.base_name(),
                block,
                function,
            )
        }));
        Ok(())
    }

    fn source_for(&self, profile: &Profile) -> Result<Arc<FunctionIndex>> {
        let path = self
            .packages
            .source_path(&profile.file_name)
            .ok_or_else(|| TqError::SourceNotFound {
                file: profile.file_name.clone(),
            })?;
        self.locator.index(&path)
    }
}
