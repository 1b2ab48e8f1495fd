//! End-to-end build against a real `go` binary and the fixture module in
//! `tests/fixtures/calc`. Skipped when no toolchain is installed.

use std::path::PathBuf;
use std::process::Command;

use testquery::{BuildConfig, Store, Value, build_database, init_test_logging};

fn go_available() -> bool {
    Command::new("go")
        .arg("version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/calc")
}

fn strings(store: &Store, sql: &str) -> Vec<String> {
    store
        .query(sql)
        .unwrap()
        .rows
        .into_iter()
        .map(|row| match &row[0] {
            Value::Text(t) => t.clone(),
            other => format!("{other:?}"),
        })
        .collect()
}

#[test]
fn builds_database_from_fixture_module() {
    if !go_available() {
        eprintln!("SKIP: go toolchain not found");
        return;
    }
    init_test_logging();
    let out = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        output: out.path().join("calc.db"),
        work_dir: Some(fixture()),
        scratch_dir: Some(out.path().join("scratch")),
        jobs: 2,
        ..BuildConfig::default()
    };

    let summary = build_database(&config, &config.harness()).unwrap();
    assert!(summary.failed >= 1, "{summary:?}");
    assert_eq!(summary.skipped, 1);

    let store = Store::open(&config.output).unwrap();
    assert_eq!(
        strings(&store, "SELECT test FROM failed_tests"),
        ["TestDivideWrongExpectation"]
    );
    assert_eq!(strings(&store, "SELECT test FROM skipped_tests"), ["TestNotYet"]);

    let passed = strings(&store, "SELECT test FROM passed_tests ORDER BY test");
    assert!(passed.contains(&"TestAdd/positive_numbers".to_owned()), "{passed:?}");

    // The closure passed to each() resolves to Sum, its top-level function.
    let sum_functions = strings(
        &store,
        "SELECT DISTINCT function_name FROM test_coverage \
         WHERE test_name = 'TestSum' AND count > 0 ORDER BY function_name",
    );
    assert_eq!(sum_functions, ["Sum", "each"]);

    let subtest = strings(
        &store,
        "SELECT DISTINCT function_name FROM test_coverage \
         WHERE test_name = 'TestAdd/negative_numbers' AND count > 0",
    );
    assert_eq!(subtest, ["Add"]);

    let failing = strings(
        &store,
        "SELECT test_name FROM test_coverage WHERE test_name = 'TestDivideWrongExpectation'",
    );
    assert!(failing.is_empty(), "{failing:?}");
    assert_eq!(
        strings(
            &store,
            "SELECT DISTINCT function_name FROM all_coverage ORDER BY function_name"
        ),
        ["Add", "Divide", "Sum", "each"]
    );

    let leftovers: Vec<_> = std::fs::read_dir(out.path().join("scratch")).unwrap().collect();
    assert!(leftovers.is_empty());
}
