//! Target-platform facts resolved once at startup and passed explicitly to
//! the rule set, copier and lock pool.
use std::path::{Component, Path, PathBuf};

use crate::permissions::PermissionTable;

/// Immutable platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Whether file-name comparisons ignore case.
    pub case_insensitive_paths: bool,
    /// Whether `C:`-style drive prefixes are recognised on paths.
    pub drive_letters: bool,
    /// Permission keyword table for this platform.
    pub permissions: PermissionTable,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub fn detect() -> Self {
        let windows = cfg!(windows);
        Self {
            case_insensitive_paths: windows || cfg!(target_os = "macos"),
            drive_letters: windows,
            permissions: if windows {
                PermissionTable::windows()
            } else {
                PermissionTable::posix()
            },
        }
    }

    /// Create a platform with explicit case sensitivity (for testing).
    #[must_use]
    pub const fn new(case_insensitive_paths: bool, drive_letters: bool) -> Self {
        Self {
            case_insensitive_paths,
            drive_letters,
            permissions: PermissionTable::posix(),
        }
    }

    /// Return `true` if `path` is absolute in the sense used by argument
    /// resolution: a leading separator, or a drive prefix where supported.
    #[must_use]
    pub fn is_full_path(&self, path: &str) -> bool {
        if path.starts_with('/') || path.starts_with('\\') {
            return true;
        }
        self.drive_letters && drive_prefix_len(path) == 2
    }

    /// Resolve `path` against `base` when it is relative.
    #[must_use]
    pub fn resolve(&self, base: &Path, path: &str) -> String {
        if self.is_full_path(path) {
            path.to_string()
        } else {
            format!("{}/{path}", to_slash(base))
        }
    }
}

/// Length of a `X:` drive prefix, or zero.
#[must_use]
pub fn drive_prefix_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    match bytes {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => 2,
        _ => 0,
    }
}

/// Render a path with forward slashes.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

/// Lexically normalize `path` against `base`: relative paths are joined to
/// `base`, `.` components are dropped and `..` pops the previous component.
/// Symlinks are not resolved.
#[must_use]
pub fn collapse_path(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
