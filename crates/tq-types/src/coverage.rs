use serde::{Deserialize, Serialize};

/// A source position, 1-based. Orders by line, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.line, self.col)
    }
}

/// One contiguous statement range reported by a coverage profile.
///
/// Invariants (checked by the profile parser): `start <= end` and
/// `num_stmt >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageBlock {
    pub start: Position,
    pub end: Position,
    pub num_stmt: u32,
    pub count: u64,
}

/// Correlated aggregate coverage row (`all_coverage`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageResult {
    pub package: String,
    pub file: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub stmt_num: u32,
    pub count: u64,
    /// Enclosing top-level function; empty when the block sits outside any
    /// function body.
    pub function_name: String,
}

impl CoverageResult {
    pub fn from_block(
        package: impl Into<String>,
        file: impl Into<String>,
        block: &CoverageBlock,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            file: file.into(),
            start_line: block.start.line,
            start_col: block.start.col,
            end_line: block.end.line,
            end_col: block.end.col,
            stmt_num: block.num_stmt,
            count: block.count,
            function_name: function_name.into(),
        }
    }
}

/// Coverage row attributed to the single test whose isolated run produced
/// it (`test_coverage`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCoverageResult {
    pub test_name: String,
    pub package: String,
    pub file: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub stmt_num: u32,
    pub count: u64,
    /// `None` when the source file could not be analysed; `Some("")` when
    /// the block lies outside every function.
    pub function_name: Option<String>,
}

impl TestCoverageResult {
    pub fn from_block(
        test_name: impl Into<String>,
        package: impl Into<String>,
        file: impl Into<String>,
        block: &CoverageBlock,
        function_name: Option<String>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            package: package.into(),
            file: file.into(),
            start_line: block.start.line,
            start_col: block.start.col,
            end_line: block.end.line,
            end_col: block.end.col,
            stmt_num: block.num_stmt,
            count: block.count,
            function_name,
        }
    }
}

/// Split a profile file path (`<import path>/<file>.go`) into its package
/// part and its base name.
pub fn split_file_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((package, file)) => (package, file),
        None => ("", path),
    }
}
