#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Integration tests for the `lock` command: advisory exclusion between
//! independent lock pools, path resolution and result variables.

mod common;

use common::{DeployTestContextBuilder, RecordingLog, args};
use filedeploy::commands;
use filedeploy::lock::DIRECTORY_LOCK_NAME;

#[test]
fn directory_lock_resolves_against_source_dir() {
    let ctx = DeployTestContextBuilder::new().with_source_dir("cache").build();
    let mut session = ctx.session();

    let code = commands::lock::run(
        &mut session,
        &args(&["cache/../cache", "DIRECTORY", "RESULT_VARIABLE", "res"]),
        &[],
        &RecordingLog::default(),
    )
    .unwrap();

    assert_eq!(code, 0);
    assert_eq!(session.vars.get("res"), Some("0"));
    let lock_file = ctx.source_dir().join("cache").join(DIRECTORY_LOCK_NAME);
    assert!(lock_file.is_file());
    assert!(session.locks.is_held(&lock_file));
}

#[test]
fn second_pool_times_out_while_first_holds_the_file() {
    let ctx = DeployTestContextBuilder::new().build();
    let mut first = ctx.session();
    let mut second = ctx.session();
    let log = RecordingLog::default();

    commands::lock::run(&mut first, &args(&["shared.lock"]), &[], &log).unwrap();
    let code = commands::lock::run(
        &mut second,
        &args(&["shared.lock", "TIMEOUT", "0", "RESULT_VARIABLE", "res"]),
        &[],
        &log,
    )
    .unwrap();

    assert_eq!(code, 1);
    assert_eq!(second.vars.get("res"), Some("Timeout reached"));
    assert!(first.locks.is_held(&ctx.source_dir().join("shared.lock")));
}

#[test]
fn lock_is_available_again_after_release() {
    let ctx = DeployTestContextBuilder::new().build();
    let mut first = ctx.session();
    let mut second = ctx.session();
    let log = RecordingLog::default();

    commands::lock::run(&mut first, &args(&["shared.lock"]), &[], &log).unwrap();
    commands::lock::run(&mut first, &args(&["shared.lock", "RELEASE"]), &[], &log).unwrap();
    let code = commands::lock::run(
        &mut second,
        &args(&["shared.lock", "TIMEOUT", "0", "RESULT_VARIABLE", "res"]),
        &[],
        &log,
    )
    .unwrap();

    assert_eq!(code, 0);
    assert_eq!(second.vars.get("res"), Some("0"));
}

#[test]
fn timeout_without_result_variable_is_fatal() {
    let ctx = DeployTestContextBuilder::new().build();
    let mut first = ctx.session();
    let mut second = ctx.session();
    let log = RecordingLog::default();

    commands::lock::run(&mut first, &args(&["shared.lock"]), &[], &log).unwrap();
    let err = commands::lock::run(&mut second, &args(&["shared.lock", "TIMEOUT", "0"]), &[], &log)
        .unwrap_err();
    assert!(err.to_string().starts_with("error locking file\n"));
    assert!(err.to_string().ends_with("\nTimeout reached."));
}

#[test]
fn unknown_keyword_is_rejected() {
    let ctx = DeployTestContextBuilder::new().build();
    let err = commands::lock::run(
        &mut ctx.session(),
        &args(&["x.lock", "FOREVER"]),
        &[],
        &RecordingLog::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("but got: \"FOREVER\"."));
}

#[test]
#[cfg(unix)]
fn skipped_command_is_reported() {
    let ctx = DeployTestContextBuilder::new().build();
    let mut first = ctx.session();
    let mut second = ctx.session();
    let log = RecordingLog::default();

    commands::lock::run(&mut first, &args(&["shared.lock"]), &[], &log).unwrap();
    let marker = ctx.root_path().join("ran");
    let script = format!("touch '{}'", marker.display());
    let code = commands::lock::run(
        &mut second,
        &args(&["shared.lock", "TIMEOUT", "0", "RESULT_VARIABLE", "res"]),
        &args(&["sh", "-c", &script]),
        &log,
    )
    .unwrap();

    assert_eq!(code, 1);
    assert!(!marker.exists());
    assert_eq!(log.messages("warn").len(), 1);
}
