//! `filedeploy` binary entry point.
use anyhow::{Context as _, Result};
use clap::Parser;
use std::process::ExitCode;

use filedeploy::cli::{Cli, Command};
use filedeploy::config::DeployConfig;
use filedeploy::platform::Platform;
use filedeploy::session::{Session, Variables};
use filedeploy::{commands, logging};

#[allow(clippy::print_stdout)]
fn main() -> Result<ExitCode> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    if matches!(args.command, Command::Version) {
        commands::version::run();
        return Ok(ExitCode::SUCCESS);
    }

    let name = args.command.name();
    logging::init_subscriber(args.verbose, name);
    let log = logging::Logger::new(name);

    let cwd = std::env::current_dir().context("determining current directory")?;
    let config = DeployConfig::load(args.global.config.as_deref(), |key| std::env::var(key).ok(), &cwd)?;
    let vars = match &args.global.state {
        Some(path) => Variables::load(path)?,
        None => Variables::default(),
    };
    let before = vars.clone();
    let mut session = Session::new(config, Platform::detect()).with_vars(vars);

    let outcome = commands::run(&args.command, &mut session, &log);

    if let Some(path) = &args.global.state {
        session.vars.save(path)?;
    }
    for (name, value) in session.vars.changed_from(&before) {
        println!("{name}={value}");
    }
    if outcome.is_err()
        && let Some(path) = log.log_path()
    {
        log.info(&format!("log written to {}", path.display()));
    }

    outcome.map(ExitCode::from)
}
