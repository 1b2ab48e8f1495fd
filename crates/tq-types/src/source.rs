use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Line span of one top-level function or method declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionRange {
    pub name: String,
    pub start_line: u32,
    /// Inclusive.
    pub end_line: u32,
}

impl FunctionRange {
    pub fn new(name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            start_line,
            end_line,
        }
    }

    pub const fn contains(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// One line of source text (`all_code`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLine {
    pub package: String,
    pub file: String,
    pub line_number: u32,
    pub content: String,
}

/// A package resolved from a package specifier by the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(rename = "ImportPath", alias = "import_path", default)]
    pub import_path: String,
    #[serde(rename = "Dir", alias = "dir")]
    pub dir: PathBuf,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}
