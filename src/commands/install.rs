//! Command: install with manifest recording.
use anyhow::Result;

use crate::copier::{CopyContext, Installer, parse_install_args};
use crate::logging::Log;
use crate::session::Session;

/// Run the install command.
///
/// Installed destinations are appended to the session's manifest variable,
/// including those installed before a failure.
///
/// # Errors
///
/// Returns an error if the arguments are malformed or any entry fails to
/// install.
pub fn run(session: &mut Session, args: &[String], log: &dyn Log) -> Result<()> {
    let Session {
        config,
        platform,
        vars,
        ..
    } = session;
    let ctx = CopyContext {
        platform,
        config,
    };
    let invocation = parse_install_args(args, ctx)?;

    log.stage(&format!("Installing to {}", invocation.spec.destination));
    log.debug(&format!(
        "type {:?}, {} source(s)",
        invocation.policy.target_type,
        invocation.spec.files.len()
    ));

    let mut installer = Installer::new(&invocation, ctx, log, vars)?;
    let stats = installer.run()?;
    log.info(&format!(
        "{} installed, {} up to date",
        stats.copied, stats.up_to_date
    ));
    Ok(())
}
