//! SQLite storage for one build: schema, population passes, metadata and
//! ad hoc queries.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{CachedStatement, Connection, params};
use tq_error::{Result, TqError};
use tq_types::{CodeLine, CoverageResult, TestCoverageResult, TestEvent};
use tracing::{debug, info};

use crate::query::QueryResult;

/// Full schema: base tables, metadata and derived views.
pub const SCHEMA: &str = include_str!("schema.sql");

const INSERT_TEST: &str = "INSERT INTO all_tests (\"time\", \"action\", package, test, elapsed, \"output\") \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const INSERT_COVERAGE: &str = "INSERT INTO all_coverage \
     (package, file, start_line, start_col, end_line, end_col, stmt_num, count, function_name) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
const INSERT_TEST_COVERAGE: &str = "INSERT INTO test_coverage \
     (test_name, package, file, start_line, start_col, end_line, end_col, stmt_num, count, function_name) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";
const INSERT_CODE: &str =
    "INSERT INTO all_code (package, file, line_number, content) VALUES (?1, ?2, ?3, ?4)";

/// Execution counts are stored as SQLite integers.
fn sql_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// A single-writer SQLite connection holding the testquery schema.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("autocommit", &self.conn.is_autocommit())
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// Apply [`SCHEMA`].
    pub fn create_tables(&mut self) -> Result<()> {
        self.apply_schema(SCHEMA)
    }

    /// Execute a `;`-separated DDL script in one transaction. If any
    /// statement fails nothing is committed and the error names the
    /// statement.
    pub fn apply_schema(&mut self, ddl: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        let mut applied = 0usize;
        for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            tx.execute_batch(statement)
                .map_err(|source| TqError::Schema {
                    statement: statement.to_owned(),
                    source,
                })?;
            applied += 1;
        }
        tx.commit()?;
        debug!(statements = applied, "applied schema");
        Ok(())
    }

    /// Insert named pass/fail/skip records into `all_tests`.
    pub fn insert_tests(&mut self, events: &[TestEvent]) -> Result<usize> {
        self.populate("all_tests", INSERT_TEST, events, |stmt, e| {
            stmt.execute(params![
                e.time,
                e.action.as_str(),
                e.package,
                e.test,
                e.elapsed,
                e.output
            ])
        })
    }

    pub fn insert_coverage(&mut self, rows: &[CoverageResult]) -> Result<usize> {
        self.populate("all_coverage", INSERT_COVERAGE, rows, |stmt, r| {
            stmt.execute(params![
                r.package,
                r.file,
                r.start_line,
                r.start_col,
                r.end_line,
                r.end_col,
                r.stmt_num,
                sql_count(r.count),
                r.function_name
            ])
        })
    }

    pub fn insert_test_coverage(&mut self, rows: &[TestCoverageResult]) -> Result<usize> {
        self.populate("test_coverage", INSERT_TEST_COVERAGE, rows, |stmt, r| {
            stmt.execute(params![
                r.test_name,
                r.package,
                r.file,
                r.start_line,
                r.start_col,
                r.end_line,
                r.end_col,
                r.stmt_num,
                sql_count(r.count),
                r.function_name
            ])
        })
    }

    pub fn insert_code(&mut self, lines: &[CodeLine]) -> Result<usize> {
        self.populate("all_code", INSERT_CODE, lines, |stmt, l| {
            stmt.execute(params![l.package, l.file, l.line_number, l.content])
        })
    }

    /// One population pass: all rows or none, failures wrapped with the
    /// table name.
    fn populate<T>(
        &mut self,
        table: &'static str,
        sql: &str,
        rows: &[T],
        bind: impl Fn(&mut CachedStatement<'_>, &T) -> rusqlite::Result<usize>,
    ) -> Result<usize> {
        let wrap = |source| TqError::Populate { table, source };
        let tx = self.conn.transaction().map_err(wrap)?;
        {
            let mut stmt = tx.prepare_cached(sql).map_err(wrap)?;
            for row in rows {
                bind(&mut stmt, row).map_err(wrap)?;
            }
        }
        tx.commit().map_err(wrap)?;
        info!(table, rows = rows.len(), "populated table");
        Ok(rows.len())
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|source| TqError::Populate {
                table: "metadata",
                source,
            })?;
        Ok(())
    }

    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM metadata WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Write a compacted copy of the database to `path`, which must not
    /// already hold a database.
    pub fn persist_to(&self, path: &Path) -> Result<()> {
        let target = path.to_str().ok_or_else(|| {
            TqError::Config(format!("output path is not valid UTF-8: {}", path.display()))
        })?;
        self.conn.execute("VACUUM INTO ?1", [target])?;
        info!(path = %path.display(), "persisted database");
        Ok(())
    }

    /// Run one SQL statement verbatim. Result sets are returned as opaque
    /// values; other statements are executed and report their change count.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Ok(QueryResult::default());
        }
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        if columns.is_empty() {
            let changes = stmt.execute([])?;
            return Ok(QueryResult {
                columns,
                rows: Vec::new(),
                changes,
            });
        }

        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(QueryResult {
            columns,
            rows,
            changes: 0,
        })
    }

    /// `(name, type)` of every user table and view, tables first.
    pub fn objects(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY type, name",
        )?;
        let objects = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(objects)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use tq_types::{CoverageBlock, Position, TestAction};

    use super::*;

    fn store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store.create_tables().unwrap();
        store
    }

    fn count(store: &Store, sql: &str) -> i64 {
        store.connection().query_row(sql, [], |r| r.get(0)).unwrap()
    }

    fn block(start: u32, end: u32, count: u64) -> CoverageBlock {
        CoverageBlock {
            start: Position::new(start, 1),
            end: Position::new(end, 2),
            num_stmt: 1,
            count,
        }
    }

    #[test]
    fn debug_output_does_not_require_connection_debug() {
        let store = store();
        let rendered = format!("{store:?}");
        assert!(rendered.starts_with("Store {"), "{rendered}");
        assert!(rendered.contains("autocommit: true"), "{rendered}");

        // Results carrying a store can be unwrapped in tests.
        let failed: Result<(Store, usize)> = Err(TqError::Cancelled);
        assert!(matches!(failed.unwrap_err(), TqError::Cancelled));
    }

    #[test]
    fn schema_creates_tables_and_views() {
        let store = store();
        let objects = store.objects().unwrap();
        let names: Vec<_> = objects.iter().map(|(n, t)| (t.as_str(), n.as_str())).collect();
        for table in ["all_tests", "all_coverage", "test_coverage", "all_code", "metadata"] {
            assert!(names.contains(&("table", table)), "{names:?}");
        }
        for view in [
            "passed_tests",
            "failed_tests",
            "skipped_tests",
            "missing_coverage",
            "code_coverage",
            "test_code_coverage",
        ] {
            assert!(names.contains(&("view", view)), "{names:?}");
        }
    }

    #[test]
    fn malformed_schema_statement_rolls_back_everything() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store
            .apply_schema("CREATE TABLE a (x INTEGER); CREATE TABLEX b (y INTEGER);")
            .unwrap_err();
        match &err {
            TqError::Schema { statement, .. } => assert_eq!(statement, "CREATE TABLEX b (y INTEGER)"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.stage(), "schema");
        assert!(store.objects().unwrap().is_empty());
    }

    #[test]
    fn tests_table_and_action_views() {
        let mut store = store();
        let mut pass = TestEvent::new(TestAction::Pass, "p", "TestA");
        pass.elapsed = Some(0.25);
        pass.output = Some("ok\n".to_owned());
        let inserted = store
            .insert_tests(&[
                pass,
                TestEvent::new(TestAction::Fail, "p", "TestB"),
                TestEvent::new(TestAction::Skip, "p", "TestC"),
            ])
            .unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM passed_tests"), 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM failed_tests"), 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM skipped_tests"), 1);
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM all_tests WHERE elapsed IS NULL"),
            2
        );
    }

    #[test]
    fn missing_coverage_holds_zero_count_blocks() {
        let mut store = store();
        store
            .insert_coverage(&[
                CoverageResult::from_block("p", "foo.go", &block(3, 5, 1), "F"),
                CoverageResult::from_block("p", "foo.go", &block(7, 9, 0), "G"),
            ])
            .unwrap();
        let missing = store.query("SELECT function_name, count FROM missing_coverage").unwrap();
        assert_eq!(missing.rows, [vec![Value::Text("G".to_owned()), Value::Integer(0)]]);
    }

    #[test]
    fn code_coverage_joins_lines_to_ranges() {
        let mut store = store();
        let lines: Vec<_> = (1..=6)
            .map(|n| CodeLine {
                package: "p".to_owned(),
                file: "foo.go".to_owned(),
                line_number: n,
                content: format!("line {n}"),
            })
            .chain(std::iter::once(CodeLine {
                package: "p".to_owned(),
                file: "foo_test.go".to_owned(),
                line_number: 1,
                content: "package p".to_owned(),
            }))
            .collect();
        store.insert_code(&lines).unwrap();
        store
            .insert_coverage(&[
                CoverageResult::from_block("p", "foo.go", &block(2, 3, 4), "F"),
                CoverageResult::from_block("p", "foo.go", &block(3, 4, 7), "F"),
            ])
            .unwrap();

        let result = store
            .query("SELECT line_number, count FROM code_coverage WHERE file = 'foo.go'")
            .unwrap();
        let counts: Vec<_> = result
            .rows
            .iter()
            .map(|r| (r[0].clone(), r[1].clone()))
            .collect();
        assert_eq!(counts, [
            (Value::Integer(1), Value::Integer(0)),
            (Value::Integer(2), Value::Integer(4)),
            (Value::Integer(3), Value::Integer(7)),
            (Value::Integer(4), Value::Integer(7)),
            (Value::Integer(5), Value::Integer(0)),
            (Value::Integer(6), Value::Integer(0)),
        ]);
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM code_coverage WHERE file LIKE '%_test.go'"),
            0
        );
    }

    #[test]
    fn test_coverage_allows_null_function() {
        let mut store = store();
        store
            .insert_test_coverage(&[
                TestCoverageResult::from_block("TestA", "p", "foo.go", &block(1, 2, 1), Some("F".to_owned())),
                TestCoverageResult::from_block("TestA", "p", "gone.go", &block(1, 2, 1), None),
            ])
            .unwrap();
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM test_coverage WHERE function_name IS NULL"),
            1
        );
    }

    #[test]
    fn failed_pass_is_named_and_rolled_back() {
        let mut store = store();
        store.connection().execute_batch("DROP TABLE all_code").unwrap();
        let err = store
            .insert_code(&[CodeLine {
                package: "p".to_owned(),
                file: "a.go".to_owned(),
                line_number: 1,
                content: String::new(),
            }])
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to populate all_code"), "{err}");

        // Earlier passes stay committed.
        store
            .insert_tests(&[TestEvent::new(TestAction::Pass, "p", "TestA")])
            .unwrap();
        assert_eq!(count(&store, "SELECT COUNT(*) FROM all_tests"), 1);
    }

    #[test]
    fn query_executes_statements_without_result_sets() {
        let store = store();
        let result = store
            .query("INSERT INTO metadata (key, value) VALUES ('a', '1')")
            .unwrap();
        assert!(!result.has_columns());
        assert_eq!(result.changes, 1);

        let result = store.query("SELECT key, value FROM metadata").unwrap();
        assert_eq!(result.columns, ["key", "value"]);
        assert_eq!(result.get(0, "value"), Some(&Value::Text("1".to_owned())));
        assert!(store.query("   ").unwrap().is_empty());
        assert!(store.query("SELECT * FROM nope").is_err());
    }

    #[test]
    fn metadata_upserts() {
        let store = store();
        store.set_metadata("pkg", "./...").unwrap();
        store.set_metadata("pkg", "./internal/...").unwrap();
        assert_eq!(store.metadata("pkg").unwrap().as_deref(), Some("./internal/..."));
        assert_eq!(store.metadata("missing").unwrap(), None);
    }
}
