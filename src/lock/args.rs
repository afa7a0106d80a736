//! Keyword parser for the lock surface.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DeployError, Result};
use crate::platform::collapse_path;

use super::{LockScope, LockTimeout};

/// File name locked inside a directory when `DIRECTORY` is given.
pub const DIRECTORY_LOCK_NAME: &str = "deploy.lock";

/// A parsed lock invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockArgs {
    /// Normalized lock file path.
    pub path: PathBuf,
    /// Release instead of acquire.
    pub release: bool,
    /// Scope for acquisition.
    pub scope: LockScope,
    /// Variable receiving the result message.
    pub result_variable: Option<String>,
    /// Acquisition timeout.
    pub timeout: LockTimeout,
}

/// Parse `path [DIRECTORY] [RELEASE] [GUARD scope] [RESULT_VARIABLE var]
/// [TIMEOUT seconds]`.
///
/// Relative paths resolve against `source_dir`. The default scope is
/// `PROCESS` and the default timeout is infinite.
///
/// # Errors
///
/// Returns [`DeployError::Argument`] for a missing path, an unknown keyword
/// or a keyword missing its value.
pub fn parse_lock_args(args: &[String], source_dir: &Path) -> Result<LockArgs> {
    let Some((path, rest)) = args.split_first() else {
        return Err(DeployError::argument("LOCK requires at least one argument"));
    };

    let mut directory = false;
    let mut release = false;
    let mut scope = LockScope::Process;
    let mut result_variable = None;
    let mut timeout = LockTimeout::Infinite;

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "DIRECTORY" => directory = true,
            "RELEASE" => release = true,
            "GUARD" => {
                let value = iter.next().ok_or_else(|| {
                    DeployError::argument("expected FUNCTION, FILE or PROCESS after GUARD")
                })?;
                scope = value.parse()?;
            }
            "RESULT_VARIABLE" => {
                let value = iter.next().ok_or_else(|| {
                    DeployError::argument("expected variable name after RESULT_VARIABLE")
                })?;
                result_variable = Some(value.clone());
            }
            "TIMEOUT" => {
                let value = iter
                    .next()
                    .ok_or_else(|| DeployError::argument("expected timeout value after TIMEOUT"))?;
                let seconds: u64 = value.parse().map_err(|_| {
                    DeployError::argument(format!(
                        "TIMEOUT value \"{value}\" is not an unsigned integer."
                    ))
                })?;
                timeout = LockTimeout::After(Duration::from_secs(seconds));
            }
            other => {
                return Err(DeployError::argument(format!(
                    "expected DIRECTORY, RELEASE, GUARD, RESULT_VARIABLE or TIMEOUT\nbut got: \"{other}\"."
                )));
            }
        }
    }

    let mut path = collapse_path(source_dir, Path::new(path));
    if directory {
        path.push(DIRECTORY_LOCK_NAME);
    }

    Ok(LockArgs {
        path,
        release,
        scope,
        result_variable,
        timeout,
    })
}
