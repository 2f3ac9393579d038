//! End-to-end scenarios and quantified invariants exercised through
//! `Session::run`, the way the teacher drives its own integration tests
//! through `Bash::exec` rather than unit-testing the evaluator directly.
//!
//! Invariant 1 (parse/print idempotence) needs a canonical AST printer
//! this crate doesn't implement — out of scope, not tested here.

use assert_matches::assert_matches;
use bashbox::error::BashboxError;
use bashbox::session::{Session, SessionConfig};

fn run(script: &str) -> (String, String, i32) {
    let mut session = Session::new(SessionConfig::new()).expect("session construction");
    let result = session.run(script).expect("script execution");
    (result.stdout, result.stderr, result.exit_code)
}

#[test]
fn scenario_1_hello_world() {
    let (stdout, _, code) = run(r#"echo "Hello, World!""#);
    assert_eq!(stdout, "Hello, World!\n");
    assert_eq!(code, 0);
}

#[test]
fn scenario_2_pipeline_sort() {
    let (stdout, _, code) = run(r#"echo "banana apple cherry" | tr " " "\n" | sort"#);
    assert_eq!(stdout, "apple\nbanana\ncherry\n");
    assert_eq!(code, 0);
}

#[test]
fn scenario_3_arithmetic() {
    let (stdout, _, code) = run("x=5; echo $((x * 2))");
    assert_eq!(stdout, "10\n");
    assert_eq!(code, 0);
}

#[test]
fn scenario_4_array_expansion() {
    let (stdout, _, code) = run(r#"arr=(a b c); echo "${arr[@]}""#);
    assert_eq!(stdout, "a b c\n");
    assert_eq!(code, 0);
}

#[test]
fn scenario_5_vfs_round_trip() {
    let (stdout, _, code) = run("echo test > /tmp/f.txt; cat /tmp/f.txt");
    assert_eq!(stdout, "test\n");
    assert_eq!(code, 0);
}

#[test]
fn scenario_6_local_scoping() {
    let (stdout, _, code) = run("f() { local x=1; echo $x; }; x=0; f; echo $x");
    assert_eq!(stdout, "1\n0\n");
    assert_eq!(code, 0);
}

#[test]
fn scenario_7_errexit_stops_script() {
    let (stdout, _, code) = run("set -e; false; echo nope");
    assert_eq!(stdout, "");
    assert_eq!(code, 1);
}

#[test]
fn invariant_2_quoting_preserves_bytes() {
    let (stdout, _, code) = run(r#"x='a  b"c\d'; echo "$x""#);
    assert_eq!(stdout, "a  b\"c\\d\n");
    assert_eq!(code, 0);
}

#[test]
fn invariant_3_ifs_field_splitting_preserves_empty_field() {
    let (stdout, _, code) = run(r#"IFS=":"; x="a::b"; for w in $x; do echo "[$w]"; done"#);
    assert_eq!(stdout, "[a]\n[]\n[b]\n");
    assert_eq!(code, 0);
}

#[test]
fn invariant_4_subshell_isolation() {
    let (stdout, _, code) = run("v=before; (v=1); echo $v");
    assert_eq!(stdout, "before\n");
    assert_eq!(code, 0);
}

#[test]
fn invariant_5_exit_status_propagation() {
    let (_, _, code) = run("true | false; exit $?");
    assert_eq!(code, 1);

    let (_, _, code) = run("set -o pipefail; false | true; exit $?");
    assert_eq!(code, 1);

    let (_, _, code) = run("true | true; exit $?");
    assert_eq!(code, 0);
}

#[test]
fn invariant_6_vfs_round_trip_arbitrary_text() {
    let (stdout, _, code) = run("echo X > /f && cat /f");
    assert_eq!(stdout, "X\n");
    assert_eq!(code, 0);
}

#[test]
fn invariant_7_arithmetic_division_by_zero_fails() {
    let (_, stderr, code) = run("echo $((1 / 0))");
    assert_ne!(code, 0);
    assert!(!stderr.is_empty());
}

#[test]
fn readonly_variable_cannot_be_reassigned_or_unset() {
    let (_, _, code) = run("readonly x=1; x=2; echo should-not-print");
    assert_ne!(code, 0);

    let (stdout, _, code) = run("readonly x=1; unset x; echo $x");
    assert_ne!(code, 0);
    assert_eq!(stdout, "");
}

#[test]
fn compound_division_by_zero_raises_error_instead_of_panicking() {
    let (_, stderr, code) = run("x=5; ((x /= 0))");
    assert_ne!(code, 0);
    assert!(!stderr.is_empty());

    let (_, stderr, code) = run("x=5; ((x %= 0))");
    assert_ne!(code, 0);
    assert!(!stderr.is_empty());
}

#[test]
fn invariant_8_limit_enforcement_on_infinite_loop() {
    let mut config = SessionConfig::new();
    config.limits.max_wall_clock = std::time::Duration::from_millis(200);
    config.limits.max_statements = 50_000_000;
    let mut session = Session::new(config).expect("session construction");
    let result = session.run("while true; do :; done").expect("script execution");
    assert_eq!(result.exit_code, 124);
}

#[test]
fn sessions_are_reusable_across_calls() {
    let mut session = Session::new(SessionConfig::new()).expect("session construction");
    session.run("x=1").unwrap();
    let result = session.run("echo $x").unwrap();
    assert_eq!(result.stdout, "1\n");
}

#[test]
fn reentrant_run_is_rejected() {
    // Only reachable in practice via a custom `Command` calling back into
    // its own session; simulated here by asserting the `busy` guard's
    // error shape directly is out of reach without a callback, so this
    // just documents the variant a host should match on.
    let err = BashboxError::Reentrant;
    assert_matches!(err, BashboxError::Reentrant);
    assert_eq!(BashboxError::Reentrant.exit_code(), 1);
}

#[test]
fn vfs_byte_quota_is_enforced_on_write() {
    let mut config = SessionConfig::new();
    config.limits.max_vfs_bytes = 4;
    let mut session = Session::new(config).unwrap();
    let result = session.run("echo hello > /f.txt").unwrap();
    assert_ne!(result.exit_code, 0);
}

#[test]
fn syntax_error_is_reported_as_syntax_kind_with_exit_2() {
    let mut session = Session::new(SessionConfig::new()).unwrap();
    let result = session.run("if true then echo missing-fi").unwrap();
    assert_eq!(result.exit_code, 2);
}

#[test]
fn function_and_alias_state_persists_across_calls() {
    let mut session = Session::new(SessionConfig::new()).expect("session construction");
    session.run("greet() { echo hi; }").unwrap();
    let result = session.run("greet").unwrap();
    assert_eq!(result.stdout, "hi\n");
}
