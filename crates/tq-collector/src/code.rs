use std::collections::BTreeSet;
use std::path::PathBuf;

use tq_error::{Result, TqError};
use tq_types::CodeLine;
use tracing::{debug, info};

use crate::packages::PackageIndex;

/// One row per source line of every `.go` file directly inside each listed
/// package directory, test files included.
///
/// Files are visited in path order; the `package` column carries the import
/// path so rows join with coverage rows.
pub fn collect_code_lines(packages: &PackageIndex) -> Result<Vec<CodeLine>> {
    let mut seen_dirs = BTreeSet::new();
    let mut rows = Vec::new();
    let mut files = 0usize;

    for package in packages.packages() {
        if !seen_dirs.insert(package.dir.clone()) {
            continue;
        }
        for path in go_files(&package.dir)? {
            let content = std::fs::read_to_string(&path)
                .map_err(|source| TqError::SourceRead {
                    path: path.clone(),
                    source,
                })?;
            let file = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let before = rows.len();
            rows.extend(content.lines().zip(1u32..).map(|(line, number)| CodeLine {
                package: package.import_path.clone(),
                file: file.clone(),
                line_number: number,
                content: line.to_owned(),
            }));
            debug!(path = %path.display(), lines = rows.len() - before, "read source file");
            files += 1;
        }
    }
    info!(files, lines = rows.len(), "collected source lines");
    Ok(rows)
}

fn go_files(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "go") && entry.file_type()?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
