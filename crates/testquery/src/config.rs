use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tq_collector::GoToolchain;
use tq_error::{Result, TqError};

pub const DEFAULT_PACKAGES: &str = "./...";
pub const DEFAULT_OUTPUT: &str = "testquery.db";
pub const DEFAULT_GO: &str = "go";

pub const ENV_GO: &str = "TESTQUERY_GO";
pub const ENV_JOBS: &str = "TESTQUERY_JOBS";
pub const ENV_DB: &str = "TESTQUERY_DB";
pub const ENV_TIMEOUT: &str = "TESTQUERY_TIMEOUT";

/// Settings for one database build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Package specifiers passed to the toolchain.
    pub packages: Vec<String>,
    /// Database file written at the end of a successful build.
    pub output: PathBuf,
    pub go_binary: PathBuf,
    /// Directory the toolchain runs in; the current directory when unset.
    pub work_dir: Option<PathBuf>,
    /// Concurrent isolated test runs during correlation.
    pub jobs: usize,
    /// Forwarded to each test invocation as `-timeout`.
    pub timeout: Option<Duration>,
    /// Parent directory for profile artifacts; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            packages: vec![DEFAULT_PACKAGES.to_owned()],
            output: PathBuf::from(DEFAULT_OUTPUT),
            go_binary: PathBuf::from(DEFAULT_GO),
            work_dir: None,
            jobs: 1,
            timeout: None,
            scratch_dir: None,
        }
    }
}

impl BuildConfig {
    /// Defaults overlaid with `TESTQUERY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`; empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(go) = get(ENV_GO) {
            config.go_binary = PathBuf::from(go);
        }
        if let Some(db) = get(ENV_DB) {
            config.output = PathBuf::from(db);
        }
        if let Some(jobs) = get(ENV_JOBS) {
            config.jobs = parse_jobs(&jobs)?;
        }
        if let Some(timeout) = get(ENV_TIMEOUT) {
            config.timeout = Some(parse_duration(&timeout)?);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.packages.iter().all(|p| p.trim().is_empty()) {
            return Err(TqError::Config("no package specifier given".to_owned()));
        }
        if self.jobs == 0 {
            return Err(TqError::Config("jobs must be at least 1".to_owned()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(TqError::Config("output path is empty".to_owned()));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(TqError::Config("timeout must be positive".to_owned()));
        }
        Ok(())
    }

    /// The `go` harness these settings describe.
    pub fn harness(&self) -> GoToolchain {
        let harness = GoToolchain::new(&self.go_binary).with_timeout(self.timeout);
        match &self.work_dir {
            Some(dir) => harness.with_work_dir(dir),
            None => harness,
        }
    }

    /// Package specifiers as one display string.
    pub fn package_spec(&self) -> String {
        self.packages.join(" ")
    }
}

pub fn parse_jobs(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| TqError::Config(format!("invalid job count {value:?}")))
}

/// Parse `90`, `90s`, `1500ms`, `5m` or `1h`. A bare number is seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || TqError::Config(format!("invalid duration {value:?}"));
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let duration = match unit {
        "" | "s" => Duration::from_secs(amount),
        "ms" => Duration::from_millis(amount),
        "m" => Duration::from_secs(amount.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(amount.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(duration)
}
