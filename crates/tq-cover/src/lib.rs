//! Coverage profile grammar.
//!
//! ```text
//! mode: <mode-name>
//! <file-path>:<startLine>.<startCol>,<endLine>.<endCol> <numStmt> <count>
//! ```
//!
//! One header line followed by zero or more block lines. Parsing groups
//! blocks by file, sorts them by position and merges duplicate ranges the
//! way the toolchain's own reader does.

mod profile;

pub use profile::{MODE_ATOMIC, MODE_COUNT, MODE_SET, Profile, parse_profiles, parse_profiles_file, write_profiles};
