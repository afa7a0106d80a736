//! Install runs: a [`FileCopier`] bound to the run-scoped manifest.
use crate::error::{DeployError, Result};
use crate::logging::Log;
use crate::session::Variables;

use super::{CopyContext, CopyInvocation, CopyStats, FileCopier, InstallManifest, MANIFEST_VARIABLE};

/// Runs an install invocation and records installed files.
///
/// The manifest is read from [`MANIFEST_VARIABLE`] on construction and
/// written back when the installer is dropped, whether or not the run
/// succeeded.
#[derive(Debug)]
pub struct Installer<'a> {
    copier: FileCopier<'a>,
    vars: &'a mut Variables,
}

impl<'a> Installer<'a> {
    /// Create an installer for `invocation`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] if the configured default
    /// directory permissions are invalid.
    pub fn new(
        invocation: &'a CopyInvocation,
        ctx: CopyContext<'a>,
        log: &'a dyn Log,
        vars: &'a mut Variables,
    ) -> Result<Self> {
        let manifest = InstallManifest::parse(vars.get(MANIFEST_VARIABLE).unwrap_or_default());
        let copier = FileCopier::new(invocation, ctx, log)?.with_manifest(manifest);
        Ok(Self { copier, vars })
    }

    /// Install every source entry.
    ///
    /// # Errors
    ///
    /// Returns the first failure; earlier entries stay installed and
    /// recorded.
    pub fn run(&mut self) -> Result<CopyStats> {
        self.copier.run()
    }
}

impl Drop for Installer<'_> {
    fn drop(&mut self) {
        self.vars
            .set(MANIFEST_VARIABLE, self.copier.manifest().to_string());
    }
}
