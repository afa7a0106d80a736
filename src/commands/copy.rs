//! Command: rule-driven copy.
use anyhow::Result;

use crate::copier::{CopyContext, FileCopier, parse_copy_args};
use crate::logging::Log;
use crate::session::Session;

/// Run the copy command.
///
/// # Errors
///
/// Returns an error if the arguments are malformed or any entry fails to
/// copy; entries after the failing one are not attempted.
pub fn run(session: &Session, args: &[String], log: &dyn Log) -> Result<()> {
    let ctx = CopyContext {
        platform: &session.platform,
        config: &session.config,
    };
    let invocation = parse_copy_args(args, ctx)?;

    log.stage(&format!("Copying to {}", invocation.spec.destination));
    log.debug(&format!(
        "{} source(s), {} rule(s)",
        invocation.spec.files.len(),
        invocation.rules.rules().len()
    ));

    let stats = FileCopier::new(&invocation, ctx, log)?.run()?;
    log.info(&format!(
        "{} copied, {} up to date, {} excluded",
        stats.copied, stats.up_to_date, stats.excluded
    ));
    Ok(())
}
