use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tq_error::{Result, TqError};
use tracing::{debug, trace};

use crate::index::FunctionIndex;

/// Outcome of scanning one file, kept so a bad file is read once per run.
#[derive(Debug, Clone)]
enum CachedIndex {
    Parsed(Arc<FunctionIndex>),
    ReadFailed(std::io::ErrorKind, String),
    ParseFailed(u32, String),
}

/// Counters for one locator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocatorStats {
    pub files: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Resolves `(file, line)` to the enclosing top-level function name.
///
/// Each file is scanned at most once; the locator is meant to live for one
/// build and is shared by reference between correlation workers.
#[derive(Debug, Default)]
pub struct FunctionLocator {
    cache: Mutex<HashMap<PathBuf, CachedIndex>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FunctionLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the function spanning `line`, or an empty string when the
    /// line is outside every top-level declaration.
    pub fn resolve(&self, path: &Path, line: u32) -> Result<String> {
        let index = self.index(path)?;
        let name = index.function_at(line).unwrap_or_default().to_owned();
        trace!(path = %path.display(), line, function = %name, "resolved");
        Ok(name)
    }

    /// Scanned declarations for `path`, from cache when available.
    pub fn index(&self, path: &Path) -> Result<Arc<FunctionIndex>> {
        if let Some(entry) = self.cache.lock().get(path).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Self::unpack(path, entry);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Scan outside the lock; concurrent misses on one file both scan and
        // the later insert wins with an identical value.
        let entry = match FunctionIndex::from_file(path) {
            Ok(index) => {
                debug!(path = %path.display(), functions = index.len(), "indexed source file");
                CachedIndex::Parsed(Arc::new(index))
            }
            Err(TqError::SourceRead { source, .. }) => {
                CachedIndex::ReadFailed(source.kind(), source.to_string())
            }
            Err(TqError::SourceParse { line, detail, .. }) => CachedIndex::ParseFailed(line, detail),
            Err(other) => return Err(other),
        };
        self.cache.lock().insert(path.to_path_buf(), entry.clone());
        Self::unpack(path, entry)
    }

    pub fn stats(&self) -> LocatorStats {
        LocatorStats {
            files: self.cache.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn unpack(path: &Path, entry: CachedIndex) -> Result<Arc<FunctionIndex>> {
        match entry {
            CachedIndex::Parsed(index) => Ok(index),
            CachedIndex::ReadFailed(kind, message) => Err(TqError::SourceRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(kind, message),
            }),
            CachedIndex::ParseFailed(line, detail) => Err(TqError::source_parse(path, line, detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn resolves_and_caches_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "main.go",
            "package main\n\nfunc main() {\n\tprintln()\n}\n",
        );
        let locator = FunctionLocator::new();

        assert_eq!(locator.resolve(&path, 4).unwrap(), "main");
        assert_eq!(locator.resolve(&path, 1).unwrap(), "");
        assert_eq!(locator.resolve(&path, 99).unwrap(), "");

        let stats = locator.stats();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn cached_file_is_not_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.go", "package a\n\nfunc A() {\n}\n");
        let locator = FunctionLocator::new();
        assert_eq!(locator.resolve(&path, 3).unwrap(), "A");

        std::fs::write(&path, "package a\n\nfunc B() {\n}\n").unwrap();
        assert_eq!(locator.resolve(&path, 3).unwrap(), "A");
    }

    #[test]
    fn failures_are_cached_and_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.go", "package bad\n\nfunc f() {\n");
        let missing = dir.path().join("missing.go");
        let locator = FunctionLocator::new();

        for _ in 0..2 {
            let err = locator.resolve(&bad, 3).unwrap_err();
            assert!(matches!(err, TqError::SourceParse { line: 3, .. }), "{err}");
            assert!(err.is_recoverable());

            let err = locator.resolve(&missing, 1).unwrap_err();
            match err {
                TqError::SourceRead { path, source } => {
                    assert_eq!(path, missing);
                    assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(locator.stats().misses, 2);
        assert_eq!(locator.stats().hits, 2);
    }

    #[test]
    fn shared_between_threads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "w.go", "package w\n\nfunc Work() {\n\tx++\n}\n");
        let locator = FunctionLocator::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for line in 3..=5 {
                        assert_eq!(locator.resolve(&path, line).unwrap(), "Work");
                    }
                });
            }
        });
        assert_eq!(locator.stats().files, 1);
    }
}
