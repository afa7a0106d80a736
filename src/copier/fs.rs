//! Filesystem primitives used by the copier.
//!
//! Helpers return raw [`io::Result`]s; the copier attaches the path context
//! when converting to [`DeployError::Io`](crate::error::DeployError::Io).
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::permissions::{Mode, apply_mode, read_mode};

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Create `path` and any missing ancestors, applying `mode` to every
/// directory this call creates.
pub fn make_directory(path: &Path, mode: Option<Mode>) -> io::Result<()> {
    let Some(mode) = mode else {
        return fs::create_dir_all(path);
    };
    let mut missing: Vec<PathBuf> = Vec::new();
    let mut cursor = Some(path);
    while let Some(dir) = cursor {
        if dir.as_os_str().is_empty() || dir.is_dir() {
            break;
        }
        missing.push(dir.to_path_buf());
        cursor = dir.parent();
    }
    for dir in missing.iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => apply_mode(dir, mode)?,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Remove a file or symlink at `path`, including broken symlinks.
/// Does nothing if nothing is there.
pub fn remove_existing(path: &Path) -> io::Result<()> {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if is_dir_like(&meta) {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Directory symlinks on Windows report `is_dir() == false` from
/// `symlink_metadata`, so the raw attribute is checked there.
fn is_dir_like(meta: &fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0 // FILE_ATTRIBUTE_DIRECTORY
    }
    #[cfg(not(windows))]
    {
        meta.is_dir() && !meta.file_type().is_symlink()
    }
}

/// Create a symlink at `link` pointing to `target`.
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        let resolved = link.parent().map_or_else(|| target.to_path_buf(), |p| p.join(target));
        if resolved.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}

/// Return `true` when `a` and `b` name the same existing filesystem entry.
pub fn same_entry(a: &Path, b: &Path) -> bool {
    let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a), fs::metadata(b)) else {
        return false;
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino()
    }
    #[cfg(not(unix))]
    {
        let _ = (meta_a, meta_b);
        matches!((fs::canonicalize(a), fs::canonicalize(b)), (Ok(x), Ok(y)) if x == y)
    }
}

/// Return `true` unless both paths exist with identical modification times.
pub fn times_differ(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(meta_a), Ok(meta_b)) => {
            FileTime::from_last_modification_time(&meta_a)
                != FileTime::from_last_modification_time(&meta_b)
        }
        _ => true,
    }
}

/// Copy access and modification times from `from` onto `to`.
pub fn copy_times(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::metadata(from)?;
    filetime::set_file_times(
        to,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
}

/// Replace the contents of `to` with those of `from`, creating the parent
/// directory and clearing a read-only destination first.
pub fn copy_contents(from: &Path, to: &Path) -> io::Result<()> {
    ensure_parent_dir(to)?;
    if let Ok(meta) = fs::symlink_metadata(to)
        && (meta.permissions().readonly() || meta.file_type().is_symlink())
    {
        fs::remove_file(to)?;
    }
    fs::copy(from, to).map(|_| ())
}

/// Add owner-write to an existing file so its times can be updated.
pub fn ensure_owner_writable(path: &Path) -> io::Result<()> {
    let mode = read_mode(path)?;
    if mode.contains(Mode::OWNER_WRITE) {
        return Ok(());
    }
    apply_mode(path, mode | Mode::OWNER_WRITE)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ensure_parent_dir_creates_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c.txt");
        ensure_parent_dir(&target).unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn make_directory_applies_mode_to_created_dirs_only() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("keep");
        fs::create_dir(&existing).unwrap();
        apply_mode(&existing, Mode::from_bits(0o755)).unwrap();

        let target = existing.join("x/y");
        make_directory(&target, Some(Mode::from_bits(0o750))).unwrap();
        assert_eq!(read_mode(&existing).unwrap().bits(), 0o755);
        assert_eq!(read_mode(&existing.join("x")).unwrap().bits(), 0o750);
        assert_eq!(read_mode(&target).unwrap().bits(), 0o750);
    }

    #[test]
    fn make_directory_without_mode_is_create_dir_all() {
        let dir = tempfile::tempdir().unwrap();
        make_directory(&dir.path().join("p/q"), None).unwrap();
        assert!(dir.path().join("p/q").is_dir());
    }

    #[test]
    fn remove_existing_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        remove_existing(&dir.path().join("nothing")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn remove_existing_removes_broken_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("dangling");
        create_symlink(Path::new("missing-target"), &link).unwrap();
        remove_existing(&link).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn same_entry_detects_identity() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "x").unwrap();
        let other = dir.path().join("g");
        fs::write(&other, "x").unwrap();
        assert!(same_entry(&file, &dir.path().join("./f")));
        assert!(!same_entry(&file, &other));
        assert!(!same_entry(&file, &dir.path().join("missing")));
    }

    #[test]
    fn copy_times_makes_times_equal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "1").unwrap();
        fs::write(&b, "2").unwrap();
        filetime::set_file_mtime(&a, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        assert!(times_differ(&a, &b));
        copy_times(&a, &b).unwrap();
        assert!(!times_differ(&a, &b));
        assert!(times_differ(&a, &dir.path().join("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn copy_contents_replaces_read_only_destination() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("sub/to");
        fs::write(&from, "new").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(&to, "old").unwrap();
        apply_mode(&to, Mode::from_bits(0o444)).unwrap();
        copy_contents(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
    }
}
