use serde::{Deserialize, Serialize};

/// Action reported by one harness event record.
///
/// Only `pass`, `fail` and `skip` describe a finished test; the other
/// actions are lifecycle or output chatter and never reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestAction {
    Start,
    Run,
    Pause,
    Cont,
    Pass,
    Bench,
    Fail,
    Output,
    Skip,
    BuildOutput,
    BuildFail,
    #[serde(other)]
    Unknown,
}

impl TestAction {
    /// Stable lowercase name, as written to the `all_tests.action` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Cont => "cont",
            Self::Pass => "pass",
            Self::Bench => "bench",
            Self::Fail => "fail",
            Self::Output => "output",
            Self::Skip => "skip",
            Self::BuildOutput => "build-output",
            Self::BuildFail => "build-fail",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this action finishes a test (pass, fail or skip).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip)
    }
}

impl std::fmt::Display for TestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded record of the harness's JSON-lines event stream.
///
/// Field names follow the harness wire format (`Time`, `Action`, ...);
/// lowercase spellings are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    #[serde(rename = "Time", alias = "time", default)]
    pub time: String,
    #[serde(rename = "Action", alias = "action")]
    pub action: TestAction,
    #[serde(rename = "Package", alias = "package", default)]
    pub package: String,
    #[serde(rename = "Test", alias = "test", default)]
    pub test: String,
    #[serde(
        rename = "Elapsed",
        alias = "elapsed",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub elapsed: Option<f64>,
    #[serde(
        rename = "Output",
        alias = "output",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output: Option<String>,
    #[serde(
        rename = "FailedBuild",
        alias = "failed_build",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub failed_build: Option<String>,
}

impl TestEvent {
    /// Build a terminal event by hand; used by scripted harnesses and tests.
    pub fn new(action: TestAction, package: impl Into<String>, test: impl Into<String>) -> Self {
        Self {
            time: String::new(),
            action,
            package: package.into(),
            test: test.into(),
            elapsed: None,
            output: None,
            failed_build: None,
        }
    }

    /// A record drives per-test re-execution only when it names a test and
    /// reports pass or fail.
    pub fn is_correlatable(&self) -> bool {
        !self.test.is_empty() && matches!(self.action, TestAction::Pass | TestAction::Fail)
    }

    /// A named test that was skipped. Kept for reporting, never re-run.
    pub fn is_skipped_test(&self) -> bool {
        !self.test.is_empty() && self.action == TestAction::Skip
    }

    /// Package failure caused by a build error rather than a failing test.
    pub fn build_failure(&self) -> Option<&str> {
        if self.action != TestAction::Fail {
            return None;
        }
        self.failed_build.as_deref().filter(|pkg| !pkg.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_harness_wire_format() {
        let line = r#"{"Time":"2025-06-01T10:00:00.123Z","Action":"pass","Package":"example.com/calc","Test":"TestDivide","Elapsed":0.01}"#;
        let event: TestEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.action, TestAction::Pass);
        assert_eq!(event.package, "example.com/calc");
        assert_eq!(event.test, "TestDivide");
        assert_eq!(event.elapsed, Some(0.01));
        assert!(event.output.is_none());
        assert!(event.is_correlatable());
    }

    #[test]
    fn unknown_actions_do_not_fail_decoding() {
        let line = r#"{"Action":"attr","Package":"p","Test":"T"}"#;
        let event: TestEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.action, TestAction::Unknown);
        assert!(!event.is_correlatable());
    }

    #[test]
    fn build_output_action_is_kebab_case() {
        let line = r#"{"Action":"build-output","ImportPath":"p"}"#;
        let event: TestEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.action, TestAction::BuildOutput);
        assert_eq!(event.action.to_string(), "build-output");
    }

    #[test]
    fn skip_and_package_events_are_not_correlatable() {
        let skip = TestEvent::new(TestAction::Skip, "p", "TestSkipped");
        assert!(!skip.is_correlatable());
        assert!(skip.is_skipped_test());

        let package_pass = TestEvent::new(TestAction::Pass, "p", "");
        assert!(!package_pass.is_correlatable());
    }

    #[test]
    fn build_failure_requires_fail_and_non_empty_marker() {
        let mut event = TestEvent::new(TestAction::Fail, "p", "");
        assert_eq!(event.build_failure(), None);
        event.failed_build = Some(String::new());
        assert_eq!(event.build_failure(), None);
        event.failed_build = Some("p [p.test]".to_owned());
        assert_eq!(event.build_failure(), Some("p [p.test]"));
        event.action = TestAction::Pass;
        assert_eq!(event.build_failure(), None);
    }
}
