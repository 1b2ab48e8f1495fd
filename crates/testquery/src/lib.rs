//! testquery: Go test results as SQL.
//!
//! [`build_database`] runs the suite once, attributes the aggregate
//! coverage profile to functions, re-runs every test alone to attribute
//! coverage per test, reads package sources, and writes everything to a
//! SQLite file whose tables and views can be queried with plain SQL.

pub mod config;
pub mod logging;
pub mod pipeline;

pub use config::{BuildConfig, parse_duration};
pub use logging::{LogGuard, LogOptions, init_logging, init_test_logging};
pub use pipeline::{BuildSummary, build_database, build_database_with_cancel, build_in_memory};

pub use tq_collector::{GoToolchain, ScriptedHarness, TestHarness};
pub use tq_error::{Result, TqError};
pub use tq_store::{QueryResult, Store, Value};
pub use tq_types::{TestAction, TestEvent};
