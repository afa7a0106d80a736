//! The run-scoped list of installed destination paths.
use std::fmt;

/// Variable that carries the manifest between install invocations.
pub const MANIFEST_VARIABLE: &str = "FILEDEPLOY_INSTALL_MANIFEST_FILES";

/// Ordered, append-only list of installed files, stored as a
/// semicolon-joined string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallManifest {
    entries: Vec<String>,
}

impl InstallManifest {
    /// Parse a semicolon-joined manifest; empty segments are dropped.
    #[must_use]
    pub fn parse(joined: &str) -> Self {
        Self {
            entries: joined
                .split(';')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Append an installed path.
    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Installed paths in order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for InstallManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join(";"))
    }
}
