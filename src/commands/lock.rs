//! Command: acquire or release a path lock.
//!
//! The invocation runs inside a file frame, so `GUARD FILE` locks are
//! released when the command returns and `GUARD FUNCTION` reports that no
//! function is being defined. With a trailing command, the lock is held
//! while the command runs and the command's exit code is returned.
use anyhow::{Result, bail};
use std::path::Path;

use crate::error::DeployError;
use crate::exec;
use crate::lock::{LockArgs, parse_lock_args};
use crate::logging::Log;
use crate::session::Session;

/// Run the lock command.
///
/// # Errors
///
/// Returns an error for malformed arguments, a failed acquisition or
/// release without a result variable, or a command that cannot be started.
pub fn run(session: &mut Session, args: &[String], command: &[String], log: &dyn Log) -> Result<u8> {
    let lock = parse_lock_args(args, &session.config.source_dir)?;
    if lock.release && !command.is_empty() {
        bail!("LOCK RELEASE does not take a command to run");
    }

    let Session {
        locks, vars, owner, config, ..
    } = session;
    let _file_frame = locks.enter_file();

    let outcome = if lock.release {
        log.debug(&format!("releasing {}", lock.path.display()));
        locks.release(&lock.path, *owner)
    } else {
        log.debug(&format!("locking {} (GUARD {})", lock.path.display(), lock.scope));
        locks
            .acquire(&lock.path, lock.scope, *owner, lock.timeout)
            .map(|_| ())
    };

    if let Err(err) = outcome {
        let message = result_message(&err);
        let Some(var) = &lock.result_variable else {
            bail!("error locking file\n  \"{}\"\n{message}.", lock.path.display());
        };
        log.debug(&format!("{var} = {message}"));
        vars.set(var.as_str(), message);
        if !command.is_empty() {
            log.warn(&format!(
                "not running {}: lock on {} not acquired",
                command.join(" "),
                lock.path.display()
            ));
        }
        return Ok(1);
    }
    if let Some(var) = &lock.result_variable {
        vars.set(var.as_str(), "0");
    }

    if command.is_empty() {
        return Ok(0);
    }
    run_locked(&lock, command, config.binary_dir.as_path(), log)
}

fn run_locked(lock: &LockArgs, command: &[String], dir: &Path, log: &dyn Log) -> Result<u8> {
    log.info(&format!("running {} with {} locked", command.join(" "), lock.path.display()));
    let dir = dir.is_dir().then_some(dir);
    let code = exec::run_inherited(command, dir)?;
    log.debug(&format!("command exited with {code}"));
    Ok(u8::try_from(code).unwrap_or(1))
}

/// Text stored in a result variable for a failed lock operation.
fn result_message(err: &DeployError) -> String {
    match err {
        DeployError::Io { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;
    use crate::lock::{DIRECTORY_LOCK_NAME, LockScope, LockTimeout, OwnerToken};
    use crate::logging::MockLog;
    use crate::platform::Platform;
    use std::path::Path;

    fn quiet_log() -> MockLog {
        let mut log = MockLog::new();
        log.expect_debug().returning(|_| ());
        log.expect_info().returning(|_| ());
        log.expect_warn().returning(|_| ());
        log
    }

    fn session(dir: &Path) -> Session {
        Session::new(DeployConfig::for_dirs(dir, dir), Platform::detect())
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // Result variable
    // -----------------------------------------------------------------------

    #[test]
    fn success_sets_zero_and_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let code = run(
            &mut session,
            &args(&["out", "DIRECTORY", "RESULT_VARIABLE", "res"]),
            &[],
            &quiet_log(),
        )
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(session.vars.get("res"), Some("0"));
        assert!(dir.path().join("out").join(DIRECTORY_LOCK_NAME).is_file());
    }

    #[test]
    fn timeout_is_reported_through_result_variable() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let path = dir.path().join("held.lock");
        let other = OwnerToken::new();
        session
            .locks
            .acquire(&path, LockScope::Process, other, LockTimeout::Infinite)
            .unwrap();

        let code = run(
            &mut session,
            &args(&["held.lock", "TIMEOUT", "0", "RESULT_VARIABLE", "res"]),
            &[],
            &quiet_log(),
        )
        .unwrap();
        assert_eq!(code, 1);
        assert_eq!(session.vars.get("res"), Some("Timeout reached"));
        assert!(session.locks.is_held(&path));
    }

    #[test]
    fn same_owner_conflict_without_result_variable_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let path = dir.path().join("mine.lock");
        let owner = session.owner;
        session
            .locks
            .acquire(&path, LockScope::Process, owner, LockTimeout::Infinite)
            .unwrap();

        let err = run(&mut session, &args(&["mine.lock"]), &[], &quiet_log()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("error locking file\n  \"{}\"\nFile already locked.", path.display())
        );
    }

    #[test]
    fn release_of_unheld_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        run(
            &mut session,
            &args(&["x.lock", "RELEASE", "RESULT_VARIABLE", "res"]),
            &[],
            &quiet_log(),
        )
        .unwrap();
        assert_eq!(session.vars.get("res"), Some("File is not locked"));
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    #[test]
    fn guard_function_outside_function() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        run(
            &mut session,
            &args(&["f.lock", "GUARD", "FUNCTION", "RESULT_VARIABLE", "res"]),
            &[],
            &quiet_log(),
        )
        .unwrap();
        assert_eq!(
            session.vars.get("res"),
            Some("'GUARD FUNCTION' not used in function definition")
        );
    }

    #[test]
    fn guard_file_releases_when_command_returns() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        run(&mut session, &args(&["f.lock", "GUARD", "FILE"]), &[], &quiet_log()).unwrap();
        assert!(!session.locks.is_held(&dir.path().join("f.lock")));
    }

    #[test]
    fn guard_process_outlives_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        run(&mut session, &args(&["p.lock"]), &[], &quiet_log()).unwrap();
        assert!(session.locks.is_held(&dir.path().join("p.lock")));
    }

    // -----------------------------------------------------------------------
    // Trailing command
    // -----------------------------------------------------------------------

    #[test]
    fn release_with_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let err = run(&mut session, &args(&["a", "RELEASE"]), &args(&["true"]), &quiet_log())
            .unwrap_err();
        assert!(err.to_string().contains("RELEASE"));
    }

    #[test]
    #[cfg(unix)]
    fn command_runs_while_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let code = run(
            &mut session,
            &args(&["c.lock"]),
            &args(&["sh", "-c", "test -f c.lock && exit 4"]),
            &quiet_log(),
        )
        .unwrap();
        assert_eq!(code, 4);
    }

    #[test]
    fn result_message_uses_os_text_for_io_errors() {
        let err = DeployError::io(
            "file\n  \"/x\"\ncreation failed (check permissions)",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied"),
        );
        assert_eq!(result_message(&err), "Permission denied");
    }
}
