//! Commands: download and upload.
//!
//! A transport failure or hash mismatch is fatal unless the caller asked
//! for a status variable, in which case the status string records it and
//! the command still succeeds.
use anyhow::Result;

use crate::logging::Log;
use crate::session::{Session, Variables};
use crate::transfer::{
    Direction, TransferEngine, TransferInvocation, parse_download_args, parse_upload_args,
};

/// Run the download command.
///
/// # Errors
///
/// Returns an error for malformed arguments, a destination that cannot be
/// written, or a failed transfer without a status variable.
pub fn download(session: &mut Session, args: &[String], log: &dyn Log) -> Result<()> {
    let invocation = parse_download_args(args, &session.config)?;
    run(&invocation, &TransferEngine::new(log), &mut session.vars, log)
}

/// Run the upload command.
///
/// # Errors
///
/// Returns an error for malformed arguments, an unreadable source file, or
/// a failed transfer without a status variable.
pub fn upload(session: &mut Session, args: &[String], log: &dyn Log) -> Result<()> {
    let invocation = parse_upload_args(args, &session.config)?;
    run(&invocation, &TransferEngine::new(log), &mut session.vars, log)
}

/// Execute a parsed transfer and publish its outcome into `vars`.
///
/// # Errors
///
/// See [`download`] and [`upload`].
pub fn run(
    invocation: &TransferInvocation,
    engine: &TransferEngine<'_>,
    vars: &mut Variables,
    log: &dyn Log,
) -> Result<()> {
    for warning in &invocation.warnings {
        log.warn(&format!("{}: {warning}", invocation.direction));
    }

    let request = &invocation.request;
    log.stage(&format!("{} {}", invocation.direction, request.url));
    let result = match invocation.direction {
        Direction::Download => engine.download(request)?,
        Direction::Upload => engine.upload(request)?,
    };

    let status = result.status();
    log.debug(&format!("status: {status}"));
    if let Some(var) = &invocation.status_variable {
        vars.set(var.as_str(), status);
    }
    if let Some(var) = &invocation.log_variable {
        vars.set(var.as_str(), result.log.clone().unwrap_or_default());
    }

    match result.error(&request.file) {
        None => Ok(()),
        Some(err) if invocation.status_variable.is_some() => {
            log.error(&err.to_string());
            Ok(())
        }
        Some(err) => Err(err.into()),
    }
}
