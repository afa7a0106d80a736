#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Integration tests for the `install` command: announcements, manifest
//! accumulation across invocations and state-file persistence.

mod common;

use common::{DeployTestContextBuilder, RecordingLog, args};
use filedeploy::commands;
use filedeploy::copier::{InstallManifest, MANIFEST_VARIABLE};
use filedeploy::session::Variables;

#[test]
fn install_announces_then_reports_up_to_date() {
    let ctx = DeployTestContextBuilder::new().with_source_file("tool.conf", "x").build();
    let mut session = ctx.session();
    let dest = ctx.path_arg("prefix/etc");
    let argv = args(&["FILES", "tool.conf", "DESTINATION", &dest]);

    let first = RecordingLog::default();
    commands::install::run(&mut session, &argv, &first).unwrap();
    assert_eq!(first.messages("status"), vec![format!("Installing: {dest}/tool.conf")]);

    let second = RecordingLog::default();
    commands::install::run(&mut session, &argv, &second).unwrap();
    assert_eq!(second.messages("status"), vec![format!("Up-to-date: {dest}/tool.conf")]);
}

#[test]
fn message_never_is_silent() {
    let ctx = DeployTestContextBuilder::new().with_source_file("a", "x").build();
    let mut session = ctx.session();
    let dest = ctx.path_arg("prefix");
    let log = RecordingLog::default();

    commands::install::run(
        &mut session,
        &args(&["FILES", "a", "DESTINATION", &dest, "MESSAGE_NEVER"]),
        &log,
    )
    .unwrap();
    assert!(log.messages("status").is_empty());
}

#[test]
#[cfg(unix)]
fn programs_gain_execute_bits() {
    use std::os::unix::fs::PermissionsExt as _;

    let ctx = DeployTestContextBuilder::new().with_source_file("run.sh", "#!/bin/sh\n").build();
    let mut session = ctx.session();
    let dest = ctx.path_arg("prefix/bin");

    commands::install::run(
        &mut session,
        &args(&["PROGRAMS", "run.sh", "DESTINATION", &dest]),
        &RecordingLog::default(),
    )
    .unwrap();

    let mode = std::fs::metadata(ctx.root_path().join("prefix/bin/run.sh"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn manifest_survives_a_state_file_round_trip() {
    let ctx = DeployTestContextBuilder::new()
        .with_source_file("a", "a")
        .with_source_file("b", "b")
        .build();
    let state = ctx.root_path().join("state.json");
    let dest = ctx.path_arg("prefix");

    // Two separate runs, as two CLI invocations would perform them.
    for file in ["a", "b"] {
        let vars = Variables::load(&state).unwrap();
        let mut session = ctx.session().with_vars(vars);
        commands::install::run(
            &mut session,
            &args(&["FILES", file, "DESTINATION", &dest]),
            &RecordingLog::default(),
        )
        .unwrap();
        session.vars.save(&state).unwrap();
    }

    let vars = Variables::load(&state).unwrap();
    let manifest = InstallManifest::parse(vars.get(MANIFEST_VARIABLE).unwrap());
    assert_eq!(manifest.entries(), [format!("{dest}/a"), format!("{dest}/b")]);
}

#[test]
fn optional_missing_source_is_skipped() {
    let ctx = DeployTestContextBuilder::new().build();
    let mut session = ctx.session();
    let dest = ctx.path_arg("prefix");

    commands::install::run(
        &mut session,
        &args(&["FILES", "absent", "DESTINATION", &dest, "OPTIONAL"]),
        &RecordingLog::default(),
    )
    .unwrap();
    assert!(!ctx.root_path().join("prefix/absent").exists());
}

#[test]
fn obsolete_keywords_are_rejected() {
    let ctx = DeployTestContextBuilder::new().with_source_file("a", "x").build();
    let mut session = ctx.session();
    let dest = ctx.path_arg("prefix");
    let err = commands::install::run(
        &mut session,
        &args(&["FILES", "a", "DESTINATION", &dest, "COMPONENTS", "runtime"]),
        &RecordingLog::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("COMPONENTS"));
}
