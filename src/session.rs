//! Run-scoped state shared by consecutive invocations: the variable store
//! (manifest, status and result variables) and the lock pool.
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::DeployConfig;
use crate::lock::{LockPool, OwnerToken};
use crate::platform::Platform;

/// Named string variables written by commands (`STATUS`, `LOG`,
/// `RESULT_VARIABLE`, the install manifest).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Set a variable, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Iterate variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variables whose value differs from (or is absent in) `before`.
    pub fn changed_from<'a>(&'a self, before: &'a Self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.iter().filter(|(name, value)| before.get(name) != Some(*value))
    }

    /// Load variables from a JSON state file; a missing file yields an
    /// empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))
    }

    /// Save variables to a JSON state file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing state")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing state file {}", path.display()))
    }
}

/// Everything one run of commands needs.
#[derive(Debug)]
pub struct Session {
    /// Loaded configuration.
    pub config: DeployConfig,
    /// Target platform.
    pub platform: Platform,
    /// Variable store.
    pub vars: Variables,
    /// Path locks held by this process.
    pub locks: LockPool,
    /// Owner token used for locks taken by this session.
    pub owner: OwnerToken,
}

impl Session {
    /// Create a session with an empty variable store.
    #[must_use]
    pub fn new(config: DeployConfig, platform: Platform) -> Self {
        Self {
            config,
            platform,
            vars: Variables::default(),
            locks: LockPool::new(),
            owner: OwnerToken::new(),
        }
    }

    /// Replace the variable store.
    #[must_use]
    pub fn with_vars(mut self, vars: Variables) -> Self {
        self.vars = vars;
        self
    }
}
