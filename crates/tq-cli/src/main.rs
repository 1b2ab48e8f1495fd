mod render;
mod shell;

use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use testquery::{
    BuildConfig, BuildSummary, LogOptions, Store, TestHarness, TqError, build_database,
    init_logging, parse_duration,
};
use tracing::info;

use crate::render::{OutputFormat, render};
use crate::shell::run_shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Build,
    Query,
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    command: Command,
    config: BuildConfig,
    force: bool,
    format: OutputFormat,
    sql: Option<String>,
    log: LogOptions,
    show_help: bool,
}

fn main() {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    let exit_code = run(std::env::args_os(), &mut input, &mut stdout, &mut stderr);
    drop(input);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run<I, R, W, E>(args: I, input: &mut R, out: &mut W, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let base = match BuildConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            let _ = writeln!(err, "error: {error}");
            return 2;
        }
    };
    let options = match parse_args(args, base) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            let _ = write_usage(err);
            return 2;
        }
    };
    if options.show_help {
        return if write_usage(out).is_err() { 1 } else { 0 };
    }

    let _guard = match init_logging(&options.log) {
        Ok(guard) => guard,
        Err(error) => {
            let _ = writeln!(err, "error: {error}");
            return 1;
        }
    };
    let harness = options.config.harness();
    execute(&options, &harness, input, out, err)
}

/// Run a parsed command against `harness`.
fn execute<R, W, E>(
    options: &CliOptions,
    harness: &dyn TestHarness,
    input: &mut R,
    out: &mut W,
    err: &mut E,
) -> i32
where
    R: BufRead,
    W: Write,
    E: Write,
{
    match options.command {
        Command::Build => match build_database(&options.config, harness) {
            Ok(summary) => {
                if write_summary(&summary, out).is_err() {
                    return 1;
                }
                0
            }
            Err(error) => report(&error, err),
        },
        Command::Query => {
            let store = match open_or_build(options, harness, err) {
                Ok(store) => store,
                Err(error) => return report(&error, err),
            };
            let sql = options.sql.as_deref().unwrap_or_default();
            match store.query(sql) {
                Ok(result) => {
                    if render(&result, options.format, out).is_err() {
                        let _ = writeln!(err, "error: failed writing query results");
                        return 1;
                    }
                    0
                }
                Err(error) => report(&error, err),
            }
        }
        Command::Shell => match open_or_build(options, harness, err) {
            Ok(store) => run_shell(&store, options.format, input, out, err),
            Err(error) => report(&error, err),
        },
    }
}

/// Open the configured database, building it first when it does not exist
/// or a rebuild was forced.
fn open_or_build<E: Write>(
    options: &CliOptions,
    harness: &dyn TestHarness,
    err: &mut E,
) -> Result<Store, TqError> {
    let path = &options.config.output;
    if options.force || !path.exists() {
        info!(output = %path.display(), force = options.force, "building database");
        let summary = build_database(&options.config, harness)?;
        let _ = write_summary(&summary, err);
    }
    Store::open(path)
}

fn report<E: Write>(error: &TqError, err: &mut E) -> i32 {
    let _ = writeln!(err, "error: {} failed: {error}", error.stage());
    1
}

fn write_summary<W: Write>(summary: &BuildSummary, out: &mut W) -> io::Result<()> {
    let output = summary
        .output
        .as_deref()
        .map_or_else(|| "<memory>".to_owned(), |path| path.display().to_string());
    writeln!(
        out,
        "wrote {output}: {} passed, {} failed, {} skipped across {} package(s)",
        summary.passed, summary.failed, summary.skipped, summary.packages,
    )?;
    writeln!(
        out,
        "  {} coverage blocks, {} tests correlated ({} failed in isolation, {} unusable profiles), {} test coverage rows",
        summary.coverage_blocks,
        summary.tests_correlated,
        summary.tests_failed_in_isolation,
        summary.unusable_profiles,
        summary.test_coverage_rows,
    )?;
    writeln!(
        out,
        "  {} source lines in {:.2}s",
        summary.code_lines,
        summary.elapsed.as_secs_f64()
    )
}

fn parse_args<I>(args: I, base: BuildConfig) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = args.into_iter();
    let _argv0 = iter.next();

    let mut options = CliOptions {
        command: Command::Build,
        config: base,
        force: false,
        format: OutputFormat::Table,
        sql: None,
        log: LogOptions::default(),
        show_help: false,
    };
    let mut command = None;
    let mut packages: Vec<String> = Vec::new();
    let mut positional: Vec<String> = Vec::new();

    while let Some(argument) = iter.next() {
        let arg = argument.to_string_lossy().into_owned();
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_owned(), Some(value.to_owned())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            match inline.clone() {
                Some(value) => Ok(value),
                None => iter
                    .next()
                    .map(|v| v.to_string_lossy().into_owned())
                    .ok_or_else(|| format!("missing value for `{name}`")),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => options.show_help = true,
            "-f" | "--force" => options.force = true,
            "-v" | "--verbose" => options.log.verbose = true,
            "--pkg" => packages.push(value("--pkg")?),
            "-o" | "--output" | "--db" => options.config.output = PathBuf::from(value(&flag)?),
            "-j" | "--jobs" => {
                let raw = value(&flag)?;
                options.config.jobs = raw
                    .parse()
                    .map_err(|_| format!("invalid value `{raw}` for `--jobs`"))?;
            }
            "--go" => options.config.go_binary = PathBuf::from(value("--go")?),
            "--timeout" => {
                let raw = value("--timeout")?;
                options.config.timeout = Some(parse_duration(&raw).map_err(|e| e.to_string())?);
            }
            "--work-dir" => options.config.work_dir = Some(PathBuf::from(value("--work-dir")?)),
            "--scratch-dir" => {
                options.config.scratch_dir = Some(PathBuf::from(value("--scratch-dir")?));
            }
            "--format" => options.format = OutputFormat::parse(&value("--format")?)?,
            "--log-json" => options.log.json_file = Some(PathBuf::from(value("--log-json")?)),
            _ if flag.starts_with('-') && flag.len() > 1 => {
                return Err(format!("unknown option `{flag}`"));
            }
            _ if command.is_none() => {
                command = Some(match arg.as_str() {
                    "build" => Command::Build,
                    "query" => Command::Query,
                    "shell" => Command::Shell,
                    other => return Err(format!("unknown command `{other}`")),
                });
            }
            _ => positional.push(arg),
        }
    }

    if options.show_help {
        return Ok(options);
    }
    options.command = command.ok_or_else(|| String::from("missing command"))?;
    if !packages.is_empty() {
        options.config.packages = packages;
    }

    match options.command {
        Command::Query => {
            if positional.is_empty() {
                return Err(String::from("`query` needs an SQL statement"));
            }
            options.sql = Some(positional.join(" "));
        }
        Command::Build | Command::Shell => {
            if let Some(extra) = positional.first() {
                return Err(format!("unexpected argument `{extra}`"));
            }
        }
    }
    options.config.validate().map_err(|e| e.to_string())?;
    Ok(options)
}

fn write_usage<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Usage: testquery <build|query|shell> [OPTIONS] [SQL]\n\
         \n\
         Commands:\n\
         \n\
         build                 Run the tests and write the database\n\
         query SQL             Run one statement (builds the database if missing)\n\
         shell                 Interactive SQL shell (builds the database if missing)\n\
         \n\
         Options:\n\
         \n\
         --pkg SPEC            Package specifier, repeatable (default ./...)\n\
         -o, --output PATH     Database file (alias --db, default testquery.db)\n\
         -f, --force           Rebuild the database before query or shell\n\
         -j, --jobs N          Tests re-run concurrently during correlation\n\
         --go PATH             go binary\n\
         --timeout DURATION    Per-invocation test timeout, e.g. 90s or 5m\n\
         --work-dir DIR        Directory the go toolchain runs in\n\
         --scratch-dir DIR     Parent directory for coverage profile artifacts\n\
         --format table|json   Result format for query and shell\n\
         -v, --verbose         Trace-level logging (RUST_LOG overrides)\n\
         --log-json PATH       Also write JSON log lines to PATH\n\
         \n\
         Environment: TESTQUERY_GO, TESTQUERY_JOBS, TESTQUERY_DB, TESTQUERY_TIMEOUT\n",
    )
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::io::Cursor;
    use std::path::Path;
    use std::time::Duration;

    use testquery::{ScriptedHarness, TestAction, TestEvent, init_test_logging};

    use super::*;

    const PKG: &str = "example.com/calc";

    fn parse_from(args: &[&str]) -> Result<CliOptions, String> {
        let os_args: Vec<OsString> = args.iter().map(OsString::from).collect();
        parse_args(os_args, BuildConfig::default())
    }

    fn harness(src: &Path) -> ScriptedHarness {
        std::fs::write(
            src.join("calc.go"),
            "package calc\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n",
        )
        .unwrap();
        ScriptedHarness::new()
            .with_package(PKG, src)
            .with_events([TestEvent::new(TestAction::Pass, PKG, "TestAdd")])
            .with_suite_profile("mode: set\nexample.com/calc/calc.go:3.25,5.2 1 1\n")
    }

    fn options(dir: &Path, args: &[&str]) -> CliOptions {
        let mut argv = vec!["testquery"];
        argv.extend_from_slice(args);
        let mut options = parse_from(&argv).unwrap();
        options.config.output = dir.join("calc.db");
        options.config.scratch_dir = Some(dir.join("scratch"));
        options
    }

    fn exec(options: &CliOptions, harness: &dyn TestHarness, input: &str) -> (i32, String, String) {
        let mut input = Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = execute(options, harness, &mut input, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn parse_flags_and_subcommand() {
        let options = parse_from(&[
            "testquery",
            "build",
            "--pkg",
            "./calc/...",
            "--pkg=./util",
            "-o",
            "out.db",
            "--jobs=4",
            "--timeout",
            "90s",
            "--work-dir",
            "/src",
            "-v",
        ])
        .unwrap();
        assert_eq!(options.command, Command::Build);
        assert_eq!(options.config.packages, ["./calc/...", "./util"]);
        assert_eq!(options.config.output, PathBuf::from("out.db"));
        assert_eq!(options.config.jobs, 4);
        assert_eq!(options.config.timeout, Some(Duration::from_secs(90)));
        assert_eq!(options.config.work_dir.as_deref(), Some(Path::new("/src")));
        assert!(options.log.verbose);
    }

    #[test]
    fn query_joins_positional_sql() {
        let options =
            parse_from(&["testquery", "query", "--format", "json", "SELECT", "*", "FROM", "all_tests"])
                .unwrap();
        assert_eq!(options.sql.as_deref(), Some("SELECT * FROM all_tests"));
        assert_eq!(options.format, OutputFormat::Json);
        assert_eq!(options.config.packages, ["./..."]);
    }

    #[test]
    fn parse_errors() {
        let cases: &[(&[&str], &str)] = &[
            (&["testquery"], "missing command"),
            (&["testquery", "bake"], "unknown command"),
            (&["testquery", "build", "--wat"], "unknown option"),
            (&["testquery", "build", "--jobs"], "missing value"),
            (&["testquery", "build", "--jobs", "x"], "invalid value"),
            (&["testquery", "build", "--jobs", "0"], "jobs must be at least 1"),
            (&["testquery", "query"], "needs an SQL statement"),
            (&["testquery", "shell", "extra"], "unexpected argument"),
            (&["testquery", "query", "--format", "xml", "SELECT 1"], "unknown format"),
        ];
        for (args, expected) in cases {
            let error = parse_from(args).unwrap_err();
            assert!(error.contains(expected), "{args:?}: {error}");
        }
    }

    #[test]
    fn help_short_circuits() {
        let options = parse_from(&["testquery", "--help"]).unwrap();
        assert!(options.show_help);

        let mut out = Vec::new();
        write_usage(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("Usage: testquery"));
    }

    #[test]
    fn query_builds_missing_database_first() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let harness = harness(dir.path());
        let options = options(dir.path(), &["query", "SELECT function_name, count FROM all_coverage"]);

        let (code, out, err) = exec(&options, &harness, "");
        assert_eq!(code, 0, "{err}");
        assert!(err.contains("1 passed, 0 failed, 0 skipped"), "{err}");
        assert!(out.contains("| Add           | 1     |"), "{out}");
        assert!(options.config.output.exists());
    }

    #[test]
    fn existing_database_is_reused_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let good = harness(dir.path());
        let options = options(dir.path(), &["query", "SELECT COUNT(*) AS n FROM all_tests"]);
        assert_eq!(exec(&options, &good, "").0, 0);

        // A harness that cannot launch proves the second query never builds.
        let broken = ScriptedHarness::new().with_launch_failure();
        let (code, out, _) = exec(&options, &broken, "");
        assert_eq!(code, 0);
        assert!(out.contains("| 1 |"), "{out}");

        let forced = CliOptions {
            force: true,
            ..options
        };
        let (code, _, err) = exec(&forced, &broken, "");
        assert_eq!(code, 1);
        assert!(err.starts_with("error: test execution failed:"), "{err}");
    }

    #[test]
    fn shell_runs_against_built_database() {
        let dir = tempfile::tempdir().unwrap();
        let harness = harness(dir.path());
        let options = options(dir.path(), &["shell"]);

        let (code, out, err) = exec(&options, &harness, "SELECT test\n  FROM passed_tests;\n.quit\n");
        assert_eq!(code, 0, "{err}");
        assert!(out.contains("| TestAdd |"), "{out}");
    }

    #[test]
    fn build_prints_summary() {
        let dir = tempfile::tempdir().unwrap();
        let harness = harness(dir.path());
        let options = options(dir.path(), &["build"]);

        let (code, out, _) = exec(&options, &harness, "");
        assert_eq!(code, 0);
        assert!(out.starts_with("wrote "), "{out}");
        assert!(out.contains("1 tests correlated"), "{out}");
    }
}
