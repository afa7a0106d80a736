//! Command: print version information.

/// Version string, overridable at build time through `FILEDEPLOY_VERSION`.
#[must_use]
pub fn version() -> &'static str {
    option_env!("FILEDEPLOY_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the filedeploy version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("filedeploy {}", version());
}
