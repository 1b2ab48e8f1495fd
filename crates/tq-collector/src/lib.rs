//! Test execution side of the testquery pipeline.
//!
//! Everything that talks to the test toolchain lives here, behind the
//! [`TestHarness`] trait:
//!
//! - [`events`]: run the suite once and decode its JSON-lines event stream
//! - [`coverage`]: turn the aggregate profile into `all_coverage` rows
//! - [`correlate`]: re-run each test alone and attribute its blocks
//! - [`code`]: read package sources into `all_code` rows
//!
//! [`ScriptedHarness`] replays canned streams and profiles so the pipeline
//! can run without a toolchain.

pub mod artifact;
pub mod code;
pub mod correlate;
pub mod coverage;
pub mod events;
pub mod harness;
pub mod packages;
pub mod scripted;

pub use artifact::{ProfileArtifact, artifact_name, run_filter, sanitize_test_name};
pub use code::collect_code_lines;
pub use correlate::{CorrelationReport, Correlator};
pub use coverage::collect_coverage;
pub use events::{TestRun, collect_test_events, decode_events};
pub use harness::{GoToolchain, HarnessOutput, TestHarness};
pub use packages::PackageIndex;
pub use scripted::ScriptedHarness;
