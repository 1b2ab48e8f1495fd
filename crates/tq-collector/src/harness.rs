//! The test harness seam and its `go` toolchain implementation.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};

use tq_error::{Result, TqError};
use tq_types::PackageInfo;
use tracing::{debug, info};

use crate::artifact::run_filter;

/// Captured result of one harness invocation that did start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessOutput {
    /// `false` for any non-zero exit; failing tests are a normal outcome.
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HarnessOutput {
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim_end().to_owned()
    }
}

impl From<Output> for HarnessOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// The external test toolchain, injected into the collector and correlator.
///
/// Implementations return `Err(TqError::HarnessLaunch)` only when the
/// process could not be started; a run whose tests fail still yields
/// `Ok` with `success == false`.
pub trait TestHarness: Send + Sync {
    /// Program name used in messages and metadata.
    fn program(&self) -> &str;

    /// Resolve package specifiers to import paths and directories.
    fn list_packages(&self, specifiers: &[String]) -> Result<Vec<PackageInfo>>;

    /// Run every test of `specifiers` with structured output, writing the
    /// aggregate coverage profile to `profile`.
    fn run_suite(&self, specifiers: &[String], profile: &Path) -> Result<HarnessOutput>;

    /// Run exactly one test (subtests included by full name) of `package`,
    /// writing its coverage profile to `profile`.
    fn run_single(&self, package: &str, test: &str, profile: &Path) -> Result<HarnessOutput>;
}

/// [`TestHarness`] backed by the `go` command.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: PathBuf,
    work_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    program: String,
}

impl GoToolchain {
    pub fn new(go: impl Into<PathBuf>) -> Self {
        let go = go.into();
        let program = go.display().to_string();
        Self {
            go,
            work_dir: None,
            timeout: None,
            program,
        }
    }

    /// Directory the commands run in; defaults to the current directory.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Forwarded to `go test -timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.go);
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn test_command(&self) -> Command {
        let mut cmd = self.command();
        cmd.arg("test");
        if let Some(timeout) = self.timeout {
            cmd.arg(format!("-timeout={}", go_duration(timeout)));
        }
        cmd
    }

    fn execute(&self, mut cmd: Command) -> Result<HarnessOutput> {
        debug!(command = ?cmd, "running harness");
        let start = Instant::now();
        let output = cmd.output().map_err(|source| TqError::HarnessLaunch {
            program: self.program.clone(),
            source,
        })?;
        let output = HarnessOutput::from(output);
        debug!(
            exit_code = ?output.exit_code,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            stdout_bytes = output.stdout.len(),
            "harness finished"
        );
        Ok(output)
    }
}

impl Default for GoToolchain {
    fn default() -> Self {
        Self::new("go")
    }
}

impl TestHarness for GoToolchain {
    fn program(&self) -> &str {
        &self.program
    }

    fn list_packages(&self, specifiers: &[String]) -> Result<Vec<PackageInfo>> {
        let mut cmd = self.command();
        cmd.args(["list", "-json"]).args(specifiers);
        let output = self.execute(cmd)?;
        let joined = specifiers.join(" ");
        if !output.success {
            return Err(TqError::PackageList {
                specifier: joined,
                detail: output.stderr_lossy(),
            });
        }
        let packages = decode_package_list(&output.stdout).map_err(|err| TqError::PackageList {
            specifier: joined,
            detail: err.to_string(),
        })?;
        info!(count = packages.len(), "listed packages");
        Ok(packages)
    }

    fn run_suite(&self, specifiers: &[String], profile: &Path) -> Result<HarnessOutput> {
        let mut cmd = self.test_command();
        cmd.args(specifiers)
            .arg("-json")
            .arg(coverprofile_arg(profile));
        self.execute(cmd)
    }

    fn run_single(&self, package: &str, test: &str, profile: &Path) -> Result<HarnessOutput> {
        let mut cmd = self.test_command();
        cmd.arg(package)
            .arg("-run")
            .arg(run_filter(test))
            .arg(coverprofile_arg(profile));
        self.execute(cmd)
    }
}

/// `go list -json` prints concatenated JSON objects, not an array.
pub fn decode_package_list(stream: &[u8]) -> serde_json::Result<Vec<PackageInfo>> {
    serde_json::Deserializer::from_slice(stream)
        .into_iter::<PackageInfo>()
        .collect()
}

fn coverprofile_arg(profile: &Path) -> String {
    format!("-coverprofile={}", profile.display())
}

/// Duration in the `time.ParseDuration` syntax the toolchain accepts.
fn go_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
