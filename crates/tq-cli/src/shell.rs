//! Line-oriented SQL shell over an open database.
//!
//! Input accumulates until it forms a complete statement: a `;` that is not
//! inside a string, a quoted identifier or a comment. Dot commands are only
//! recognised at the start of a statement.

use std::io::{self, BufRead, Write};

use testquery::Store;

use crate::render::{OutputFormat, render};

pub const PROMPT_PRIMARY: &str = "> ";
pub const PROMPT_CONTINUATION: &str = ">>> ";

pub fn run_shell<R, W, E>(
    store: &Store,
    format: OutputFormat,
    input: &mut R,
    out: &mut W,
    err: &mut E,
) -> i32
where
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut pending_sql = String::new();
    let mut line_buffer = String::new();

    loop {
        let prompt = if pending_sql.trim().is_empty() {
            PROMPT_PRIMARY
        } else {
            PROMPT_CONTINUATION
        };
        if write!(out, "{prompt}").and_then(|()| out.flush()).is_err() {
            return 1;
        }

        line_buffer.clear();
        let bytes_read = match input.read_line(&mut line_buffer) {
            Ok(bytes_read) => bytes_read,
            Err(error) => {
                let _ = writeln!(err, "ERROR: {error}");
                return 1;
            }
        };

        if bytes_read == 0 {
            if !pending_sql.trim().is_empty() {
                execute(store, pending_sql.trim(), format, out, err);
            }
            let _ = writeln!(out);
            return 0;
        }

        let line = line_buffer.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim();

        if pending_sql.trim().is_empty() {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('.') {
                match dot_command(store, trimmed, out) {
                    Ok(DotOutcome::Continue) => {}
                    Ok(DotOutcome::Quit) => return 0,
                    Err(message) => {
                        let _ = writeln!(err, "ERROR: {message}");
                    }
                }
                continue;
            }
        }

        if !pending_sql.is_empty() {
            pending_sql.push('\n');
        }
        pending_sql.push_str(line);

        if statement_complete(&pending_sql) {
            execute(store, pending_sql.trim(), format, out, err);
            pending_sql.clear();
        }
    }
}

enum DotOutcome {
    Continue,
    Quit,
}

fn dot_command<W: Write>(store: &Store, command: &str, out: &mut W) -> Result<DotOutcome, String> {
    match command {
        ".quit" | ".exit" => Ok(DotOutcome::Quit),
        ".help" => {
            write_shell_help(out).map_err(|e| e.to_string())?;
            Ok(DotOutcome::Continue)
        }
        ".tables" => {
            let objects = store.objects().map_err(|e| e.to_string())?;
            for (name, kind) in objects {
                writeln!(out, "{name:<20} {kind}").map_err(|e| e.to_string())?;
            }
            Ok(DotOutcome::Continue)
        }
        other => Err(format!("unknown command `{other}`; try .help")),
    }
}

fn execute<W: Write, E: Write>(
    store: &Store,
    sql: &str,
    format: OutputFormat,
    out: &mut W,
    err: &mut E,
) {
    match store.query(sql) {
        Ok(result) => {
            if render(&result, format, out).is_err() {
                let _ = writeln!(err, "ERROR: failed writing query results");
            }
        }
        Err(error) => {
            let _ = writeln!(err, "ERROR: {error}");
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexical {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Whether `buffer` ends with a statement terminator outside quotes and
/// comments. A trailing line comment after the `;` is allowed.
pub fn statement_complete(buffer: &str) -> bool {
    let mut state = Lexical::Code;
    let mut last_code = None;
    let mut chars = buffer.chars().peekable();

    while let Some(c) = chars.next() {
        state = match state {
            Lexical::Code => match c {
                '\'' | '"' | '`' => {
                    last_code = Some(c);
                    Lexical::Quoted(c)
                }
                '[' => {
                    last_code = Some(c);
                    Lexical::Quoted(']')
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    Lexical::LineComment
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    Lexical::BlockComment
                }
                c => {
                    if !c.is_whitespace() {
                        last_code = Some(c);
                    }
                    Lexical::Code
                }
            },
            // Doubled quotes re-enter the same quoted state on the next char.
            Lexical::Quoted(close) if c == close => Lexical::Code,
            Lexical::Quoted(close) => Lexical::Quoted(close),
            Lexical::LineComment if c == '\n' => Lexical::Code,
            Lexical::LineComment => Lexical::LineComment,
            Lexical::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                chars.next();
                Lexical::Code
            }
            Lexical::BlockComment => Lexical::BlockComment,
        };
    }

    matches!(state, Lexical::Code | Lexical::LineComment) && last_code == Some(';')
}

fn write_shell_help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Dot commands:\n\
         \n\
         .help      Show this help\n\
         .tables    List tables and views\n\
         .quit      Exit the shell\n\
         .exit      Exit the shell\n\
         \n\
         Enter SQL statements terminated by `;`. Useful starting points:\n\
         \n\
         SELECT * FROM failed_tests;\n\
         SELECT * FROM missing_coverage;\n\
         SELECT DISTINCT function_name FROM test_coverage WHERE test_name = 'TestX';\n",
    )
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store.create_tables().unwrap();
        store
            .query(
                "INSERT INTO all_tests (\"time\", \"action\", package, test, elapsed) \
                 VALUES ('t', 'fail', 'example.com/calc', 'TestDiv', 0.5)",
            )
            .unwrap();
        store
    }

    fn session(input: &str) -> (i32, String, String) {
        let store = store();
        let mut input = Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = run_shell(&store, OutputFormat::Table, &mut input, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn completion_ignores_semicolons_in_strings_and_comments() {
        assert!(statement_complete("SELECT 1;"));
        assert!(statement_complete("SELECT 1;  \n"));
        assert!(statement_complete("SELECT 1; -- trailing note"));
        assert!(statement_complete("SELECT 'a;b';"));
        assert!(statement_complete("SELECT 'it''s';"));
        assert!(statement_complete("SELECT \"x;y\" FROM t;"));
        assert!(!statement_complete("SELECT 1"));
        assert!(!statement_complete("SELECT ';"));
        assert!(!statement_complete("SELECT 1 -- ;"));
        assert!(!statement_complete("SELECT 1 /* ; */"));
        assert!(!statement_complete("SELECT 1; /* open"));
        assert!(!statement_complete("SELECT [a;"));
    }

    #[test]
    fn multi_line_statement_uses_continuation_prompt() {
        let (code, out, err) = session("SELECT test\nFROM failed_tests;\n.quit\n");
        assert_eq!(code, 0);
        assert!(err.is_empty(), "{err}");
        assert!(out.starts_with("> >>> "), "{out}");
        assert!(out.contains("| TestDiv |"), "{out}");
        assert!(out.contains("(1 row)"), "{out}");
    }

    #[test]
    fn errors_are_reported_and_the_shell_continues() {
        let (code, out, err) = session("SELECT * FROM nowhere;\nSELECT 2 AS two;\n");
        assert_eq!(code, 0);
        assert!(err.starts_with("ERROR: "), "{err}");
        assert!(err.contains("nowhere"), "{err}");
        assert!(out.contains("| 2   |"), "{out}");
    }

    #[test]
    fn dot_commands() {
        let (code, out, err) = session(".tables\n.help\n.bogus\n.exit\nSELECT 1;\n");
        assert_eq!(code, 0);
        assert!(out.contains("all_tests"), "{out}");
        assert!(out.contains("missing_coverage"), "{out}");
        assert!(out.contains(".quit      Exit the shell"), "{out}");
        assert!(err.contains("unknown command `.bogus`"), "{err}");
        // .exit stops before the SELECT runs.
        assert!(!out.contains("(1 row)"), "{out}");
    }

    #[test]
    fn pending_statement_runs_at_end_of_input() {
        let (code, out, _) = session("SELECT 40 + 2 AS answer");
        assert_eq!(code, 0);
        assert!(out.contains("| 42     |"), "{out}");
    }
}
