use std::collections::HashMap;
use std::path::Path;

use tq_error::{Result, TqError};
use tq_types::{TestAction, TestEvent};
use tracing::{error, info, warn};

use crate::harness::TestHarness;

/// Finished tests of one suite run, in stream order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRun {
    /// Every named pass, fail and skip record.
    pub records: Vec<TestEvent>,
    /// Whether the suite process exited zero.
    pub success: bool,
}

impl TestRun {
    /// Records that drive per-test re-execution: named passes and fails.
    pub fn correlatable(&self) -> Vec<TestEvent> {
        self.records
            .iter()
            .filter(|e| e.is_correlatable())
            .cloned()
            .collect()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TestEvent> {
        self.records.iter().filter(|e| e.is_skipped_test())
    }

    pub fn count(&self, action: TestAction) -> usize {
        self.records.iter().filter(|e| e.action == action).count()
    }
}

/// Decode a JSON-lines event stream. Records are independent, so decoding
/// stops at the first malformed one with its zero-based index.
pub fn decode_events(stream: &[u8]) -> Result<Vec<TestEvent>> {
    serde_json::Deserializer::from_slice(stream)
        .into_iter::<TestEvent>()
        .enumerate()
        .map(|(index, record)| record.map_err(|source| TqError::EventDecode { index, source }))
        .collect()
}

/// Run the whole suite once, writing the aggregate profile to `profile`,
/// and reduce its event stream to finished tests.
///
/// A non-zero exit is expected when tests fail and is not an error. A build
/// failure for any package aborts collection.
pub fn collect_test_events(
    harness: &dyn TestHarness,
    specifiers: &[String],
    profile: &Path,
) -> Result<TestRun> {
    let output = harness.run_suite(specifiers, profile)?;
    let events = decode_events(&output.stdout)?;

    if let Some(package) = events.iter().find_map(TestEvent::build_failure) {
        error!(package, stderr = %output.stderr_lossy(), "package failed to build");
        return Err(TqError::BuildFailed {
            package: package.to_owned(),
        });
    }
    if !output.success && events.is_empty() {
        error!(exit_code = ?output.exit_code, stderr = %output.stderr_lossy(), "test run produced no events");
        return Err(TqError::BuildFailed {
            package: specifiers.join(" "),
        });
    }

    let run = TestRun {
        records: finished_tests(events),
        success: output.success,
    };
    info!(
        passed = run.count(TestAction::Pass),
        failed = run.count(TestAction::Fail),
        skipped = run.count(TestAction::Skip),
        "collected test events"
    );
    if !run.success {
        warn!(exit_code = ?output.exit_code, "test run exited non-zero");
    }
    Ok(run)
}

/// Keep named terminal records, attaching the output lines the stream
/// reported for the same `(package, test)` when the record has none.
fn finished_tests(events: Vec<TestEvent>) -> Vec<TestEvent> {
    let mut pending: HashMap<(String, String), String> = HashMap::new();
    let mut finished = Vec::new();

    for mut event in events {
        if event.test.is_empty() {
            continue;
        }
        match event.action {
            TestAction::Output => {
                if let Some(text) = event.output.take() {
                    pending
                        .entry((event.package, event.test))
                        .or_default()
                        .push_str(&text);
                }
            }
            action if action.is_terminal() => {
                let captured = pending.remove(&(event.package.clone(), event.test.clone()));
                if event.output.is_none() {
                    event.output = captured.filter(|text| !text.is_empty());
                }
                finished.push(event);
            }
            _ => {}
        }
    }
    finished
}
