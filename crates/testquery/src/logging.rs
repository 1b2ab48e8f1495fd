//! Tracing setup for the CLI and for tests.
//!
//! Human-readable compact output goes to stderr so query results on stdout
//! stay clean. An optional JSON-lines file receives the same events with
//! their structured fields.

use std::path::PathBuf;
use std::sync::Mutex;

use tq_error::{Result, TqError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Lower the default filter from `info` to `trace`.
    pub verbose: bool,
    /// Also write JSON lines to this file.
    pub json_file: Option<PathBuf>,
}

/// Keeps the JSON log location around for the caller; the file itself is
/// owned by the installed subscriber.
#[derive(Debug)]
pub struct LogGuard {
    pub json_file: Option<PathBuf>,
}

fn default_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { "trace" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber. `RUST_LOG` overrides the default level.
///
/// Fails if the JSON file cannot be created or a subscriber is already set.
pub fn init_logging(options: &LogOptions) -> Result<LogGuard> {
    let json_layer = match &options.json_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Mutex::new(file))
                    .with_target(true)
                    .with_thread_ids(true),
            )
        }
        None => None,
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter(options.verbose))
        .with(terminal_layer)
        .with(json_layer)
        .try_init()
        .map_err(|err| TqError::Internal(format!("logging already initialised: {err}")))?;

    Ok(LogGuard {
        json_file: options.json_file.clone(),
    })
}

/// Test-writer subscriber; safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(default_filter(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_test_writer()
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_layer_records_structured_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.log.jsonl");
        let file = std::fs::File::create(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file)),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(test = "TestDiv", package = "example.com/calc", "test failed in isolated run");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["test"], "TestDiv");
        assert_eq!(line["fields"]["package"], "example.com/calc");
    }

    #[test]
    fn test_logging_can_be_initialised_repeatedly() {
        init_test_logging();
        init_test_logging();
        tracing::info!("still fine");
    }
}
