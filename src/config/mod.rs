//! Deployment configuration: TOML file plus environment overrides.
pub mod toml_loader;

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::DeployError;
use crate::permissions::{Mode, PermissionTable};
use crate::platform::collapse_path;

/// Configuration consumed by the copy, install, transfer and lock commands.
///
/// Every field is optional in the TOML file; [`DeployConfig::load`] fills
/// unset directories with the working directory.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Base for relative source entries and lock paths; the protected tree.
    pub source_dir: PathBuf,
    /// Base for relative destinations.
    pub binary_dir: PathBuf,
    /// Refuse writes under `source_dir` that are not also under `binary_dir`.
    pub disable_source_changes: bool,
    /// DESTDIR-style redirect root for installs.
    pub destdir: Option<String>,
    /// Installer copies even when destination timestamps match.
    pub install_always: bool,
    /// Shared and module libraries do not gain execute bits.
    pub install_so_no_exe: bool,
    /// Permission keywords applied to directories the installer creates.
    pub default_directory_permissions: Option<Vec<String>>,
    /// Default TLS peer verification for transfers.
    pub tls_verify: Option<bool>,
    /// Default CA bundle for transfers.
    pub tls_cainfo: Option<PathBuf>,
    /// Default netrc level (`IGNORED`, `OPTIONAL`, `REQUIRED`).
    pub netrc: Option<String>,
    /// Default netrc file.
    pub netrc_file: Option<PathBuf>,
}

impl DeployConfig {
    /// Load configuration from an optional TOML file, apply overrides from
    /// `env`, and default unset directories to `cwd`. The netrc file
    /// defaults to `.netrc` in the home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    pub fn load(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
        cwd: &Path,
    ) -> Result<Self> {
        let mut config: Self = match path {
            Some(p) => toml_loader::load_config(p)
                .with_context(|| format!("loading {}", p.display()))?,
            None => Self::default(),
        };
        config.apply_env(&env);
        if config.netrc_file.is_none() {
            config.netrc_file = env("HOME")
                .or_else(|| env("USERPROFILE"))
                .map(|home| PathBuf::from(home).join(".netrc"));
        }
        config.source_dir = collapse_path(cwd, &config.source_dir);
        config.binary_dir = collapse_path(cwd, &config.binary_dir);
        Ok(config)
    }

    /// Configuration rooted at explicit source and binary directories.
    #[must_use]
    pub fn for_dirs(source_dir: &Path, binary_dir: &Path) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            binary_dir: binary_dir.to_path_buf(),
            ..Self::default()
        }
    }

    /// Override fields from environment variables looked up through `env`.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("FILEDEPLOY_SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FILEDEPLOY_BINARY_DIR") {
            self.binary_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FILEDEPLOY_DISABLE_SOURCE_CHANGES") {
            self.disable_source_changes = is_on(&v);
        }
        if let Some(v) = env("DESTDIR") {
            self.destdir = Some(v);
        }
        if let Some(v) = env("FILEDEPLOY_INSTALL_ALWAYS") {
            self.install_always = is_on(&v);
        }
        if let Some(v) = env("FILEDEPLOY_INSTALL_SO_NO_EXE") {
            self.install_so_no_exe = is_on(&v);
        }
        if let Some(v) = env("FILEDEPLOY_DEFAULT_DIRECTORY_PERMISSIONS") {
            self.default_directory_permissions = Some(
                v.split(';')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        if let Some(v) = env("FILEDEPLOY_TLS_VERIFY") {
            self.tls_verify = Some(is_on(&v));
        }
        if let Some(v) = env("FILEDEPLOY_TLS_CAINFO") {
            self.tls_cainfo = Some(PathBuf::from(v));
        }
        if let Some(v) = env("FILEDEPLOY_NETRC") {
            self.netrc = Some(v);
        }
        if let Some(v) = env("FILEDEPLOY_NETRC_FILE") {
            self.netrc_file = Some(PathBuf::from(v));
        }
    }

    /// The redirect root, if set and non-empty.
    #[must_use]
    pub fn destdir(&self) -> Option<&str> {
        self.destdir.as_deref().filter(|d| !d.is_empty())
    }

    /// Resolve the default directory-creation permissions.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] for an unknown permission keyword.
    pub fn default_directory_mode(&self, table: &PermissionTable) -> Result<Option<Mode>, DeployError> {
        let Some(tokens) = &self.default_directory_permissions else {
            return Ok(None);
        };
        let mut mode = Mode::NONE;
        for token in tokens {
            mode |= table.lookup(token).ok_or_else(|| {
                DeployError::argument(format!(
                    "Invalid default directory permission \"{token}\""
                ))
            })?;
        }
        Ok(Some(mode))
    }

    /// Default TLS verification (on unless configured otherwise).
    #[must_use]
    pub fn tls_verify(&self) -> bool {
        self.tls_verify.unwrap_or(true)
    }

    /// Refuse a write to `path` if it lands in the protected source tree.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::PathSafety`] when source changes are disabled
    /// and `path` is under `source_dir` but not under `binary_dir`.
    pub fn check_writable(&self, path: &Path) -> Result<(), DeployError> {
        if !self.disable_source_changes {
            return Ok(());
        }
        let target = collapse_path(&self.binary_dir, path);
        if target.starts_with(&self.source_dir) && !target.starts_with(&self.binary_dir) {
            return Err(DeployError::PathSafety { path: target });
        }
        Ok(())
    }
}

/// Interpret a configuration flag the way build tools do: `1`, `ON`, `YES`,
/// `TRUE`, `Y` (any case) are true; everything else is false.
#[must_use]
pub fn is_on(value: &str) -> bool {
    matches!(
        value.to_ascii_uppercase().as_str(),
        "1" | "ON" | "YES" | "TRUE" | "Y"
    )
}
