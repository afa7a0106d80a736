//! Top-level subcommand orchestration.
//!
//! Each command parses its keyword arguments with the library parser for its
//! surface, runs against the shared [`Session`], and reports through the
//! [`Log`] trait. Commands return the process exit code on success.
pub mod copy;
pub mod install;
pub mod lock;
pub mod transfer;
pub mod version;

use anyhow::Result;

use crate::cli::Command;
use crate::logging::Log;
use crate::session::Session;

/// Dispatch `command` against `session`.
///
/// # Errors
///
/// Returns the first fatal error raised by the command.
pub fn run(command: &Command, session: &mut Session, log: &dyn Log) -> Result<u8> {
    match command {
        Command::Copy(opts) => copy::run(session, &opts.args, log).map(|()| 0),
        Command::Install(opts) => install::run(session, &opts.args, log).map(|()| 0),
        Command::Download(opts) => transfer::download(session, &opts.argv(), log).map(|()| 0),
        Command::Upload(opts) => transfer::upload(session, &opts.argv(), log).map(|()| 0),
        Command::Lock(opts) => lock::run(session, &opts.argv(), &opts.command, log),
        Command::Version => {
            version::run();
            Ok(0)
        }
    }
}
