//! Relational store for testquery.
//!
//! The schema is applied as one transaction, then each table is filled by
//! its own population pass. Everything is rebuilt on every collection run,
//! so there are no migrations.

mod query;
mod store;

pub use query::QueryResult;
pub use rusqlite::types::Value;
pub use store::{SCHEMA, Store};
