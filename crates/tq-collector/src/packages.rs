use std::collections::HashMap;
use std::path::PathBuf;

use tq_types::{PackageInfo, split_file_path};

/// Listed packages, keyed by import path, used to find the source file
/// behind a profile entry (`<import path>/<file>.go`).
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: Vec<PackageInfo>,
    by_import_path: HashMap<String, usize>,
}

impl PackageIndex {
    pub fn new(packages: Vec<PackageInfo>) -> Self {
        let by_import_path = packages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.import_path.clone(), i))
            .collect();
        Self {
            packages,
            by_import_path,
        }
    }

    pub fn packages(&self) -> &[PackageInfo] {
        &self.packages
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, import_path: &str) -> Option<&PackageInfo> {
        self.by_import_path
            .get(import_path)
            .map(|&i| &self.packages[i])
    }

    /// On-disk source for a profile file name.
    ///
    /// The import-path prefix selects the package directory. When the
    /// prefix is unknown, the first listed directory that contains a file
    /// with the same base name is used.
    pub fn source_path(&self, profile_file: &str) -> Option<PathBuf> {
        let (import_path, base) = split_file_path(profile_file);
        if let Some(package) = self.get(import_path) {
            return Some(package.dir.join(base));
        }
        self.packages
            .iter()
            .map(|p| p.dir.join(base))
            .find(|candidate| candidate.is_file())
    }
}
