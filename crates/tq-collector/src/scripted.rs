use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tq_error::{Result, TqError};
use tq_types::{PackageInfo, TestEvent};

use crate::harness::{HarnessOutput, TestHarness};

#[derive(Debug, Clone)]
enum SingleRun {
    Pass { profile: String },
    Fail,
    NoProfile,
}

/// [`TestHarness`] that replays a canned event stream and per-test
/// profiles instead of running a toolchain.
///
/// Unscripted single-test runs pass with an empty profile. Every
/// `run_single` call is recorded so callers can assert which tests were
/// re-executed.
#[derive(Debug, Default)]
pub struct ScriptedHarness {
    packages: Vec<PackageInfo>,
    stream: Vec<u8>,
    suite_success: bool,
    suite_profile: Option<String>,
    runs: HashMap<String, SingleRun>,
    launch_failure: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedHarness {
    pub fn new() -> Self {
        Self {
            suite_success: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_package(mut self, import_path: &str, dir: impl Into<PathBuf>) -> Self {
        self.packages.push(PackageInfo {
            import_path: import_path.to_owned(),
            dir: dir.into(),
            name: import_path.rsplit('/').next().unwrap_or_default().to_owned(),
        });
        self
    }

    /// Append records to the suite's event stream, one JSON object per line.
    #[must_use]
    pub fn with_events(mut self, events: impl IntoIterator<Item = TestEvent>) -> Self {
        for event in events {
            if let Ok(line) = serde_json::to_vec(&event) {
                self.stream.extend_from_slice(&line);
                self.stream.push(b'\n');
            }
        }
        self
    }

    /// Append raw bytes to the event stream, for malformed-input cases.
    #[must_use]
    pub fn with_raw_stream(mut self, bytes: &[u8]) -> Self {
        self.stream.extend_from_slice(bytes);
        self
    }

    #[must_use]
    pub fn with_suite_success(mut self, success: bool) -> Self {
        self.suite_success = success;
        self
    }

    #[must_use]
    pub fn with_suite_profile(mut self, profile: impl Into<String>) -> Self {
        self.suite_profile = Some(profile.into());
        self
    }

    /// The isolated run of `test` passes and writes `profile`.
    #[must_use]
    pub fn with_test_profile(mut self, test: &str, profile: impl Into<String>) -> Self {
        self.runs.insert(
            test.to_owned(),
            SingleRun::Pass {
                profile: profile.into(),
            },
        );
        self
    }

    /// The isolated run of `test` exits non-zero.
    #[must_use]
    pub fn with_failing_test(mut self, test: &str) -> Self {
        self.runs.insert(test.to_owned(), SingleRun::Fail);
        self
    }

    /// The isolated run of `test` passes but writes no profile.
    #[must_use]
    pub fn with_missing_profile(mut self, test: &str) -> Self {
        self.runs.insert(test.to_owned(), SingleRun::NoProfile);
        self
    }

    /// Every invocation fails as if the binary were missing.
    #[must_use]
    pub fn with_launch_failure(mut self) -> Self {
        self.launch_failure = true;
        self
    }

    /// `(package, test)` of every `run_single` call, in call order.
    pub fn single_runs(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    fn check_launch(&self) -> Result<()> {
        if self.launch_failure {
            return Err(TqError::HarnessLaunch {
                program: self.program().to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(())
    }
}

impl TestHarness for ScriptedHarness {
    fn program(&self) -> &str {
        "scripted"
    }

    fn list_packages(&self, _specifiers: &[String]) -> Result<Vec<PackageInfo>> {
        self.check_launch()?;
        Ok(self.packages.clone())
    }

    fn run_suite(&self, _specifiers: &[String], profile: &Path) -> Result<HarnessOutput> {
        self.check_launch()?;
        if let Some(text) = &self.suite_profile {
            std::fs::write(profile, text)?;
        }
        Ok(HarnessOutput {
            success: self.suite_success,
            exit_code: Some(if self.suite_success { 0 } else { 1 }),
            stdout: self.stream.clone(),
            stderr: Vec::new(),
        })
    }

    fn run_single(&self, package: &str, test: &str, profile: &Path) -> Result<HarnessOutput> {
        self.check_launch()?;
        self.calls.lock().push((package.to_owned(), test.to_owned()));
        let success = match self.runs.get(test) {
            Some(SingleRun::Pass { profile: text }) => {
                std::fs::write(profile, text)?;
                true
            }
            Some(SingleRun::Fail) => {
                // A failing run still leaves a profile behind.
                std::fs::write(profile, "mode: set\n")?;
                false
            }
            Some(SingleRun::NoProfile) => true,
            None => {
                std::fs::write(profile, "mode: set\n")?;
                true
            }
        };
        Ok(HarnessOutput {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}
