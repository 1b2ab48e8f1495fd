use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for the testquery pipeline.
///
/// Variants are grouped by the pipeline stage that raises them so a fatal
/// error reaching the top level names the stage, the file or test involved,
/// and the underlying cause.
#[derive(Error, Debug)]
pub enum TqError {
    // === Test harness ===
    /// The harness binary could not be started at all (missing binary,
    /// permission denied). Distinct from tests failing.
    #[error("failed to launch `{program}`: {source}")]
    HarnessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The harness reported a build failure for a package.
    #[error("build failed for package {package}")]
    BuildFailed { package: String },

    /// The harness event stream contained a malformed record.
    #[error("failed to decode test event #{index}: {source}")]
    EventDecode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Package listing failed or produced undecodable output.
    #[error("failed to list packages for `{specifier}`: {detail}")]
    PackageList { specifier: String, detail: String },

    // === Coverage profiles ===
    /// A coverage profile could not be opened.
    #[error("failed to open coverage profile '{path}': {source}")]
    ProfileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A coverage profile line did not match the block grammar.
    #[error("coverage profile '{path}' line {line}: {detail}")]
    ProfileParse {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    // === Source analysis ===
    /// A source file could not be read.
    #[error("failed to read source '{path}': {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file could not be scanned into declarations.
    #[error("failed to parse source '{path}' at line {line}: {detail}")]
    SourceParse {
        path: PathBuf,
        line: u32,
        detail: String,
    },

    /// A profile referenced a file that maps to no known package directory.
    #[error("no source file found for profile entry '{file}'")]
    SourceNotFound { file: String },

    // === Store ===
    /// A schema statement failed; the whole schema batch was rolled back.
    #[error("failed to execute schema statement {statement:?}: {source}")]
    Schema {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A row-insertion pass failed and was rolled back.
    #[error("failed to populate {table}: {source}")]
    Populate {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // === Configuration / misc ===
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Collection was cancelled before it finished.
    #[error("collection cancelled")]
    Cancelled,

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TqError {
    /// Pipeline stage that raised this error, for user-facing messages.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::HarnessLaunch { .. } | Self::BuildFailed { .. } | Self::EventDecode { .. } => {
                "test execution"
            }
            Self::PackageList { .. } => "package discovery",
            Self::ProfileOpen { .. } | Self::ProfileParse { .. } => "coverage profile",
            Self::SourceRead { .. } | Self::SourceParse { .. } | Self::SourceNotFound { .. } => {
                "function resolution"
            }
            Self::Schema { .. } => "schema",
            Self::Populate { .. } | Self::Sqlite(_) => "store",
            Self::Config(_) => "configuration",
            Self::Io(_) => "io",
            Self::Cancelled => "cancellation",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the per-test correlator may log this error and move on to
    /// the next test or block instead of aborting the run.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProfileOpen { .. }
                | Self::ProfileParse { .. }
                | Self::SourceRead { .. }
                | Self::SourceParse { .. }
                | Self::SourceNotFound { .. }
        )
    }

    /// Convenience constructor for [`TqError::ProfileParse`].
    pub fn profile_parse(path: impl Into<PathBuf>, line: usize, detail: impl Into<String>) -> Self {
        Self::ProfileParse {
            path: path.into(),
            line,
            detail: detail.into(),
        }
    }

    /// Convenience constructor for [`TqError::SourceParse`].
    pub fn source_parse(path: impl Into<PathBuf>, line: u32, detail: impl Into<String>) -> Self {
        Self::SourceParse {
            path: path.into(),
            line,
            detail: detail.into(),
        }
    }
}

/// Result type alias using `TqError`.
pub type Result<T> = std::result::Result<T, TqError>;
