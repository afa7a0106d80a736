//! Value types produced by argument parsing and consumed by the copier.
use std::fmt;
use std::str::FromStr;

use crate::error::DeployError;
use crate::permissions::Mode;
use crate::rules::MatchRuleSet;

/// Where final permissions come from when no rule overrides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Mirror the source entry's current bits.
    UseSource,
    /// Built-in default for the invocation kind.
    ExplicitDefault(Mode),
    /// Bits listed in the arguments.
    Explicit(Mode),
}

impl PermissionPolicy {
    /// Resolve the final mode: `rule` bits win, then the policy's explicit
    /// bits, then the source's bits. An explicit set that names no bits
    /// at all falls back to the source too.
    pub fn resolve(self, rule: Mode, source: impl FnOnce() -> Option<Mode>) -> Mode {
        if !rule.is_empty() {
            return rule;
        }
        match self {
            Self::Explicit(mode) | Self::ExplicitDefault(mode) if !mode.is_empty() => mode,
            _ => source().unwrap_or(Mode::NONE),
        }
    }
}

/// What to copy and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySpec {
    /// Source entries in argument order, as written.
    pub files: Vec<String>,
    /// Destination root, absolute after parsing.
    pub destination: String,
    /// Root that relative source entries are taken from, preserving their
    /// relative directory under the destination.
    pub files_from_dir: Option<String>,
    /// Destination name for a single installed file.
    pub rename: Option<String>,
    /// Policy for regular files and symlink targets.
    pub file_permissions: PermissionPolicy,
    /// Policy for directories.
    pub dir_permissions: PermissionPolicy,
}

/// Install target kind, which drives default permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    /// Plain data file.
    #[default]
    File,
    /// Script or other non-compiled program.
    Program,
    /// Compiled executable.
    Executable,
    /// Static archive.
    StaticLibrary,
    /// Shared library.
    SharedLibrary,
    /// Loadable module.
    Module,
    /// Directory tree.
    Directory,
}

impl TargetType {
    /// Default file mode for this target kind.
    #[must_use]
    pub fn default_file_mode(self, so_no_exe: bool) -> Mode {
        let executable = match self {
            Self::Executable | Self::Program => true,
            Self::SharedLibrary | Self::Module => !so_no_exe,
            Self::File | Self::StaticLibrary | Self::Directory => false,
        };
        if executable {
            Mode::DEFAULT_FILE | Mode::ALL_EXECUTE
        } else {
            Mode::DEFAULT_FILE
        }
    }
}

impl FromStr for TargetType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FILE" => Ok(Self::File),
            "PROGRAM" => Ok(Self::Program),
            "EXECUTABLE" => Ok(Self::Executable),
            "STATIC_LIBRARY" => Ok(Self::StaticLibrary),
            "SHARED_LIBRARY" => Ok(Self::SharedLibrary),
            "MODULE" => Ok(Self::Module),
            "DIRECTORY" => Ok(Self::Directory),
            other => Err(DeployError::argument(format!(
                "Option TYPE given unknown value \"{other}\"."
            ))),
        }
    }
}

/// Install message verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageMode {
    /// Announce both installs and up-to-date entries.
    #[default]
    Default,
    /// Same output as the default, selected explicitly.
    Always,
    /// Announce only entries that changed.
    Lazy,
    /// Announce nothing.
    Never,
}

impl MessageMode {
    /// Whether a message is printed for an entry with this outcome.
    #[must_use]
    pub const fn announces(self, copied: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Lazy => copied,
            Self::Default | Self::Always => true,
        }
    }
}

/// Plain copy or install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// `copy` surface.
    Copy,
    /// `install` surface.
    Install,
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "COPY"),
            Self::Install => write!(f, "INSTALL"),
        }
    }
}

/// Behavior switches for one copy or install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPolicy {
    /// Copy or install.
    pub mode: CopyMode,
    /// Copy even when destination timestamps match.
    pub always: bool,
    /// A missing source is silently skipped.
    pub optional: bool,
    /// Install message verbosity.
    pub messages: MessageMode,
    /// Install target kind.
    pub target_type: TargetType,
    /// Length of the DESTDIR prefix stripped from manifest entries.
    pub destdir_len: usize,
}

impl CopyPolicy {
    /// Policy for a plain copy.
    #[must_use]
    pub const fn copy() -> Self {
        Self {
            mode: CopyMode::Copy,
            always: false,
            optional: false,
            messages: MessageMode::Never,
            target_type: TargetType::File,
            destdir_len: 0,
        }
    }

    /// Policy for an install of `target_type`.
    #[must_use]
    pub const fn install(target_type: TargetType) -> Self {
        Self {
            mode: CopyMode::Install,
            always: false,
            optional: false,
            messages: MessageMode::Default,
            target_type,
            destdir_len: 0,
        }
    }
}

/// A fully parsed copy or install request.
#[derive(Debug, Clone)]
pub struct CopyInvocation {
    /// Sources, destination and permission policies.
    pub spec: CopySpec,
    /// Match rules in declaration order.
    pub rules: MatchRuleSet,
    /// Behavior switches.
    pub policy: CopyPolicy,
}
