//! Permission bitmasks and the keyword table that maps `OWNER_READ`-style
//! tokens to OS mode bits.
use std::fmt;
use std::fs;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::path::Path;

/// A permission bitmask expressed as OS-native mode bits.
///
/// The empty mask means "leave permissions untouched".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl Mode {
    /// No bits set.
    pub const NONE: Self = Self(0);
    /// Owner read, write and execute.
    pub const OWNER_RWX: Self = Self(0o700);
    /// Owner write.
    pub const OWNER_WRITE: Self = Self(0o200);
    /// Execute for owner, group and world.
    pub const ALL_EXECUTE: Self = Self(0o111);
    /// Default installer file permissions (`rw-r--r--`).
    pub const DEFAULT_FILE: Self = Self(0o644);
    /// Default installer directory permissions (`rwxr-xr-x`).
    pub const DEFAULT_DIRECTORY: Self = Self(0o755);

    /// Build a mode from raw bits, keeping only permission and set-id bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0o7777)
    }

    /// Raw mode bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Return `true` when no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Return `true` when every bit of `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `self` if non-empty, otherwise `fallback`.
    #[must_use]
    pub const fn or_else(self, fallback: Self) -> Self {
        if self.is_empty() { fallback } else { self }
    }
}

impl BitOr for Mode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Mapping from permission keywords to mode bits for one target platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTable {
    entries: [(&'static str, Mode); 11],
}

impl PermissionTable {
    /// POSIX mode bits (`S_IRUSR` and friends).
    #[must_use]
    pub const fn posix() -> Self {
        Self {
            entries: [
                ("OWNER_READ", Mode(0o400)),
                ("OWNER_WRITE", Mode(0o200)),
                ("OWNER_EXECUTE", Mode(0o100)),
                ("GROUP_READ", Mode(0o040)),
                ("GROUP_WRITE", Mode(0o020)),
                ("GROUP_EXECUTE", Mode(0o010)),
                ("WORLD_READ", Mode(0o004)),
                ("WORLD_WRITE", Mode(0o002)),
                ("WORLD_EXECUTE", Mode(0o001)),
                ("SETUID", Mode(0o4000)),
                ("SETGID", Mode(0o2000)),
            ],
        }
    }

    /// Windows CRT bits: only the owner triplet maps to real attributes, the
    /// group and world bits are carried for round-tripping but never applied.
    #[must_use]
    pub const fn windows() -> Self {
        // _S_IREAD/_S_IWRITE/_S_IEXEC share their values with the POSIX owner bits.
        Self::posix()
    }

    /// Look up a single keyword.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<Mode> {
        self.entries
            .iter()
            .find(|(name, _)| *name == token)
            .map(|&(_, mode)| mode)
    }

    /// Return `true` if `token` names a permission bit.
    #[must_use]
    pub fn is_keyword(&self, token: &str) -> bool {
        self.lookup(token).is_some()
    }
}

/// Read the permission bits of an existing filesystem entry.
pub fn read_mode(path: &Path) -> io::Result<Mode> {
    let meta = fs::metadata(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(Mode::from_bits(meta.permissions().mode()))
    }
    #[cfg(not(unix))]
    {
        let base = if meta.permissions().readonly() { 0o444 } else { 0o666 };
        let exec = if meta.is_dir() { 0o111 } else { 0 };
        Ok(Mode::from_bits(base | exec))
    }
}

/// Apply `mode` to `path`. An empty mode is a no-op.
pub fn apply_mode(path: &Path, mode: Mode) -> io::Result<()> {
    if mode.is_empty() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode.bits()))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(!mode.contains(Mode::OWNER_WRITE));
        fs::set_permissions(path, perms)
    }
}
