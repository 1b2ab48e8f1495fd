use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

fn non_word() -> &'static Regex {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    NON_WORD.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static pattern is valid"))
}

/// Replace every run of characters outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_test_name(test: &str) -> String {
    non_word().replace_all(test, "_").into_owned()
}

/// Longest sanitized prefix kept in an artifact name. File names are
/// limited to 255 bytes on common filesystems.
pub const MAX_NAME_PREFIX: usize = 100;

/// Per-test profile file name: the sanitized test name, cut to
/// [`MAX_NAME_PREFIX`] bytes, plus a hash of the full `(package, test)`
/// pair, so `TestA/b c` and `TestA/b_c` in one package, or `TestX` in two
/// packages, never share a file.
pub fn artifact_name(package: &str, test: &str) -> String {
    let mut key = Vec::with_capacity(package.len() + test.len() + 1);
    key.extend_from_slice(package.as_bytes());
    key.push(0);
    key.extend_from_slice(test.as_bytes());
    let mut prefix = sanitize_test_name(test);
    // Sanitized names are ASCII, so any byte offset is a char boundary.
    prefix.truncate(MAX_NAME_PREFIX);
    format!("{prefix}-{:016x}.out", xxh3_64(&key))
}

/// Exact-match `-run` filter for a test name. Each `/`-separated subtest
/// level is anchored and escaped on its own, since the toolchain matches
/// levels separately.
pub fn run_filter(test: &str) -> String {
    test.split('/')
        .map(|level| format!("^{}$", regex::escape(level)))
        .collect::<Vec<_>>()
        .join("/")
}

/// A per-test profile path that is removed when the guard drops, on every
/// exit path of the correlation step that owns it.
#[derive(Debug)]
pub struct ProfileArtifact {
    path: PathBuf,
}

impl ProfileArtifact {
    pub fn new(dir: &Path, package: &str, test: &str) -> Self {
        Self {
            path: dir.join(artifact_name(package, test)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProfileArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed profile artifact"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to remove profile artifact"),
        }
    }
}
