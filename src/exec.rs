//! Child process execution for commands run while a lock is held.
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::Command;

/// Exit code reported when the child was terminated by a signal.
const SIGNALED_EXIT_CODE: i32 = 1;

/// Run `command` (program followed by arguments) with inherited standard
/// streams, optionally in `dir`, and return its exit code.
///
/// # Errors
///
/// Returns an error if `command` is empty or the program cannot be started.
pub fn run_inherited(command: &[String], dir: Option<&Path>) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("no command given");
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    let status = cmd
        .status()
        .with_context(|| format!("failed to execute: {program}"))?;
    Ok(status.code().unwrap_or(SIGNALED_EXIT_CODE))
}
