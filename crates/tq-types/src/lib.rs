//! Core data model shared by every testquery crate.
//!
//! The pipeline moves data in one direction:
//! [`TestEvent`]s from the harness, [`CoverageBlock`]s from coverage
//! profiles, [`FunctionRange`]s from source scanning, and finally the
//! correlated [`CoverageResult`] / [`TestCoverageResult`] rows that land in
//! the relational store alongside [`CodeLine`]s.

mod coverage;
mod event;
mod source;

pub use coverage::{CoverageBlock, CoverageResult, Position, TestCoverageResult, split_file_path};
pub use event::{TestAction, TestEvent};
pub use source::{CodeLine, FunctionRange, PackageInfo};
