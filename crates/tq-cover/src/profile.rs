//! Coverage profile text: `mode:` header followed by one block per line.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use tq_error::{Result, TqError};
use tq_types::{CoverageBlock, Position, split_file_path};
use tracing::debug;

pub const MODE_SET: &str = "set";
pub const MODE_COUNT: &str = "count";
pub const MODE_ATOMIC: &str = "atomic";

const MODE_PREFIX: &str = "mode: ";

/// All blocks reported for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// File path as written by the toolchain: `<import path>/<file>.go`.
    pub file_name: String,
    pub mode: String,
    /// Sorted by start position, duplicates merged.
    pub blocks: Vec<CoverageBlock>,
}

impl Profile {
    /// Package part of [`Profile::file_name`].
    pub fn package(&self) -> &str {
        split_file_path(&self.file_name).0
    }

    /// Base name part of [`Profile::file_name`].
    pub fn base_name(&self) -> &str {
        split_file_path(&self.file_name).1
    }
}

/// Read and parse a profile file.
///
/// # Errors
///
/// `TqError::ProfileOpen` when the file cannot be read, otherwise the
/// errors of [`parse_profiles`].
pub fn parse_profiles_file(path: &Path) -> Result<Vec<Profile>> {
    let text = std::fs::read_to_string(path).map_err(|source| TqError::ProfileOpen {
        path: path.to_path_buf(),
        source,
    })?;
    parse_profiles(&text, path)
}

/// Parse profile text. `origin` only labels errors.
///
/// # Errors
///
/// `TqError::ProfileParse` when the header is missing, a block line does
/// not match the grammar, a numeric field is not a number, a block ends
/// before it starts, or two blocks with the same range disagree on their
/// statement count.
pub fn parse_profiles(text: &str, origin: &Path) -> Result<Vec<Profile>> {
    let mut lines = text.lines().enumerate();

    let mode = match lines.next() {
        Some((_, header)) => header
            .strip_prefix(MODE_PREFIX)
            .map(str::trim)
            .filter(|mode| !mode.is_empty())
            .ok_or_else(|| TqError::profile_parse(origin, 1, format!("bad mode line: {header:?}")))?,
        None => return Err(TqError::profile_parse(origin, 1, "missing mode header")),
    };

    let mut by_file: BTreeMap<String, Vec<(usize, CoverageBlock)>> = BTreeMap::new();
    for (index, line) in lines {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let (file, block) = parse_block_line(line)
            .map_err(|detail| TqError::profile_parse(origin, line_no, detail))?;
        by_file
            .entry(file.to_owned())
            .or_default()
            .push((line_no, block));
    }

    let mut profiles = Vec::with_capacity(by_file.len());
    for (file_name, mut blocks) in by_file {
        blocks.sort_by(|(_, a), (_, b)| (a.start, a.end).cmp(&(b.start, b.end)));
        let merged = merge_duplicates(mode, blocks, origin)?;
        profiles.push(Profile {
            file_name,
            mode: mode.to_owned(),
            blocks: merged,
        });
    }

    debug!(
        profile = %origin.display(),
        mode,
        files = profiles.len(),
        "parsed coverage profile"
    );
    Ok(profiles)
}

fn merge_duplicates(
    mode: &str,
    blocks: Vec<(usize, CoverageBlock)>,
    origin: &Path,
) -> Result<Vec<CoverageBlock>> {
    let mut merged: Vec<CoverageBlock> = Vec::with_capacity(blocks.len());
    for (line_no, block) in blocks {
        match merged.last_mut() {
            Some(last) if last.start == block.start && last.end == block.end => {
                if last.num_stmt != block.num_stmt {
                    return Err(TqError::profile_parse(
                        origin,
                        line_no,
                        format!(
                            "inconsistent statement count for {}-{}: {} vs {}",
                            block.start, block.end, last.num_stmt, block.num_stmt
                        ),
                    ));
                }
                if mode == MODE_SET {
                    last.count |= block.count;
                } else {
                    last.count = last.count.saturating_add(block.count);
                }
            }
            _ => merged.push(block),
        }
    }
    Ok(merged)
}

/// Parse `<file>:<sl>.<sc>,<el>.<ec> <numStmt> <count>`.
fn parse_block_line(line: &str) -> std::result::Result<(&str, CoverageBlock), String> {
    let mut fields = line.trim_end().rsplitn(3, ' ');
    let count = fields.next().unwrap_or_default();
    let num_stmt = fields.next();
    let location = fields.next();
    let (Some(num_stmt), Some(location)) = (num_stmt, location) else {
        return Err(format!("malformed block line: {line:?}"));
    };

    let (file, range) = location
        .rsplit_once(':')
        .ok_or_else(|| format!("missing ':' between file and range: {line:?}"))?;
    if file.is_empty() {
        return Err(format!("empty file name: {line:?}"));
    }
    let (start, end) = range
        .split_once(',')
        .ok_or_else(|| format!("missing ',' in range {range:?}"))?;

    let block = CoverageBlock {
        start: parse_position(start, "start")?,
        end: parse_position(end, "end")?,
        num_stmt: parse_number(num_stmt, "statement count")?,
        count: parse_number(count, "execution count")?,
    };
    if block.start > block.end {
        return Err(format!("block ends before it starts: {range}"));
    }
    if block.num_stmt == 0 {
        return Err(format!("block {range} has no statements"));
    }
    Ok((file, block))
}

fn parse_position(text: &str, what: &str) -> std::result::Result<Position, String> {
    let (line, col) = text
        .split_once('.')
        .ok_or_else(|| format!("malformed {what} position {text:?}"))?;
    Ok(Position::new(
        parse_number(line, what)?,
        parse_number(col, what)?,
    ))
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> std::result::Result<T, String> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("non-numeric {what}: {text:?}"));
    }
    text.parse()
        .map_err(|_| format!("{what} out of range: {text:?}"))
}

/// Serialize profiles back into the textual grammar. The header uses the
/// first profile's mode (`set` when there are none).
pub fn write_profiles(profiles: &[Profile]) -> String {
    let mode = profiles.first().map_or(MODE_SET, |p| p.mode.as_str());
    let mut out = format!("{MODE_PREFIX}{mode}\n");
    for profile in profiles {
        for block in &profile.blocks {
            let _ = writeln!(
                out,
                "{}:{},{} {} {}",
                profile.file_name, block.start, block.end, block.num_stmt, block.count
            );
        }
    }
    out
}
