//! Rule-driven copy and install of files, symlinks and directory trees.
//!
//! One algorithm serves both surfaces; a [`CopyPolicy`] value selects the
//! install behaviors (messages, manifest, optional sources, target type).
//!
//! Directories are populated under staged permissions: while children are
//! written the directory carries at least owner read/write/execute, and the
//! requested final mode is applied afterwards.

mod args;
mod fs;
mod install;
mod manifest;
mod types;

pub use args::{CopyContext, apply_destdir, parse_copy_args, parse_install_args};
pub use install::Installer;
pub use manifest::{InstallManifest, MANIFEST_VARIABLE};
pub use types::{
    CopyInvocation, CopyMode, CopyPolicy, CopySpec, MessageMode, PermissionPolicy, TargetType,
};

use std::io;
use std::path::{Path, PathBuf};

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::logging::Log;
use crate::permissions::{Mode, apply_mode, read_mode};
use crate::platform::{Platform, to_slash};
use crate::rules::MatchProperties;

/// Counts of what a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Entries whose content (or link) was written.
    pub copied: usize,
    /// Entries skipped because they were already current.
    pub up_to_date: usize,
    /// Entries skipped by an exclude rule.
    pub excluded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
    Link,
}

/// Executes one [`CopyInvocation`].
pub struct FileCopier<'a> {
    invocation: &'a CopyInvocation,
    platform: &'a Platform,
    config: &'a DeployConfig,
    log: &'a dyn Log,
    default_dir_mode: Option<Mode>,
    manifest: InstallManifest,
    stats: CopyStats,
}

impl std::fmt::Debug for FileCopier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCopier")
            .field("invocation", &self.invocation)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<'a> FileCopier<'a> {
    /// Create a copier for `invocation`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] if the configured default
    /// directory permissions contain an unknown keyword.
    pub fn new(
        invocation: &'a CopyInvocation,
        ctx: CopyContext<'a>,
        log: &'a dyn Log,
    ) -> Result<Self> {
        let default_dir_mode = match invocation.policy.mode {
            CopyMode::Install => ctx.config.default_directory_mode(&ctx.platform.permissions)?,
            CopyMode::Copy => None,
        };
        Ok(Self {
            invocation,
            platform: ctx.platform,
            config: ctx.config,
            log,
            default_dir_mode,
            manifest: InstallManifest::default(),
            stats: CopyStats::default(),
        })
    }

    /// Seed the manifest that installed paths are appended to.
    #[must_use]
    pub fn with_manifest(mut self, manifest: InstallManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// The manifest accumulated so far.
    #[must_use]
    pub const fn manifest(&self) -> &InstallManifest {
        &self.manifest
    }

    /// Copy every source entry in order. The first failure aborts the
    /// remaining entries.
    ///
    /// # Errors
    ///
    /// Returns the first [`DeployError`] raised by any entry.
    pub fn run(&mut self) -> Result<CopyStats> {
        let spec = &self.invocation.spec;
        let destination = Path::new(&spec.destination);
        self.config.check_writable(destination)?;

        if self.invocation.policy.mode == CopyMode::Install
            && self.invocation.policy.target_type != TargetType::Directory
        {
            self.prepare_destination(destination)?;
        }

        for file in &spec.files {
            let (from, to) = self.resolve_entry(file)?;
            self.install(&from, &to)?;
        }
        Ok(self.stats)
    }

    fn prepare_destination(&self, destination: &Path) -> Result<()> {
        if !destination.exists() {
            fs::make_directory(destination, self.default_dir_mode).map_err(|e| {
                DeployError::io(
                    format!(
                        "cannot create directory: {}. Maybe need administrative privileges.",
                        destination.display()
                    ),
                    e,
                )
            })?;
        }
        if !destination.is_dir() {
            return Err(DeployError::io(
                format!("INSTALL destination: {} is not a directory.", destination.display()),
                io::Error::from(io::ErrorKind::NotADirectory),
            ));
        }
        Ok(())
    }

    /// Map one source entry to its source and destination paths.
    fn resolve_entry(&self, file: &str) -> Result<(PathBuf, PathBuf)> {
        let spec = &self.invocation.spec;
        let full = if !file.is_empty() && !self.platform.is_full_path(file) {
            let base = spec
                .files_from_dir
                .clone()
                .unwrap_or_else(|| to_slash(&self.config.source_dir));
            format!("{base}/{file}")
        } else if spec.files_from_dir.is_some() {
            return Err(DeployError::argument(if file.is_empty() {
                "option FILES_FROM_DIR does not accept an empty file name."
            } else {
                "option FILES_FROM_DIR requires all files to be specified as relative paths."
            }));
        } else {
            file.to_string()
        };

        let (_, from_name) = split_last(&full);
        let mut to = spec.destination.clone();
        if spec.files_from_dir.is_some() {
            let (relative_dir, _) = split_last(file);
            if !relative_dir.is_empty() {
                to = format!("{to}/{relative_dir}");
            }
        }
        let to_name = spec.rename.as_deref().unwrap_or(from_name);
        if !to_name.is_empty() {
            to = format!("{to}/{to_name}");
        }

        // A trailing separator names a directory's contents.
        let from = if from_name.is_empty() && !full.is_empty() {
            let trimmed = full.trim_end_matches('/');
            if trimmed.is_empty() { "/" } else { trimmed }.to_string()
        } else {
            full
        };
        Ok((PathBuf::from(from), PathBuf::from(to)))
    }

    /// Copy one entry from `from` to `to`, dispatching on its kind.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] for an empty source name outside a
    /// directory install, and [`DeployError::Io`] for any filesystem
    /// failure, including a missing non-optional source.
    pub fn install(&mut self, from: &Path, to: &Path) -> Result<()> {
        let policy = self.invocation.policy;
        if from.as_os_str().is_empty() {
            if policy.mode == CopyMode::Install && policy.target_type == TargetType::Directory {
                return self.install_directory(from, to, MatchProperties::default());
            }
            return Err(DeployError::argument(format!(
                "{} encountered an empty string input file name.",
                policy.mode
            )));
        }

        let is_dir = from.is_dir();
        let props = self.invocation.rules.evaluate(&to_slash(from), is_dir);
        if props.exclude {
            self.log.debug(&format!("excluded {}", from.display()));
            self.stats.excluded += 1;
            return Ok(());
        }

        if fs::same_entry(from, to) {
            return Ok(());
        }

        match std::fs::symlink_metadata(from) {
            Ok(meta) if meta.file_type().is_symlink() => self.install_symlink(from, to),
            Ok(_) if is_dir => self.install_directory(from, to, props),
            Ok(_) => self.install_file(from, to, props),
            Err(_) if policy.optional => Ok(()),
            Err(e) => Err(DeployError::io(
                format!("{} cannot find \"{}\"", policy.mode, from.display()),
                e,
            )),
        }
    }

    fn install_symlink(&mut self, from: &Path, to: &Path) -> Result<()> {
        let target = std::fs::read_link(from).map_err(|e| {
            DeployError::io(
                format!(
                    "cannot read symlink \"{}\" to duplicate at \"{}\"",
                    from.display(),
                    to.display()
                ),
                e,
            )
        })?;

        let copy = self.invocation.policy.always
            || std::fs::read_link(to).map_or(true, |existing| existing != target);
        self.report(to, EntryKind::Link, copy);
        if !copy {
            return Ok(());
        }

        fs::remove_existing(to).ok();
        let duplicate = fs::ensure_parent_dir(to).and_then(|()| fs::create_symlink(&target, to));
        duplicate.map_err(|e| {
            DeployError::io(
                format!(
                    "cannot duplicate symlink \"{}\" at \"{}\"",
                    from.display(),
                    to.display()
                ),
                e,
            )
        })?;
        self.stats.copied += 1;
        Ok(())
    }

    fn install_file(
        &mut self,
        from: &Path,
        to: &Path,
        props: MatchProperties,
    ) -> Result<()> {
        let always = self.invocation.policy.always;
        let copy = always || fs::times_differ(from, to);
        self.report(to, EntryKind::File, copy);

        if copy {
            fs::copy_contents(from, to).map_err(|e| {
                DeployError::io(
                    format!(
                        "cannot copy file \"{}\" to \"{}\"",
                        from.display(),
                        to.display()
                    ),
                    e,
                )
            })?;
            self.stats.copied += 1;
            if !always {
                fs::ensure_owner_writable(to)
                    .and_then(|()| fs::copy_times(from, to))
                    .map_err(|e| {
                        DeployError::io(
                            format!("cannot set modification time on \"{}\"", to.display()),
                            e,
                        )
                    })?;
            }
        } else {
            self.stats.up_to_date += 1;
        }

        let mode = self
            .invocation
            .spec
            .file_permissions
            .resolve(props.permissions, || read_mode(from).ok());
        apply_mode(to, mode).map_err(|e| {
            DeployError::io(format!("cannot set permissions on \"{}\"", to.display()), e)
        })
    }

    fn install_directory(
        &mut self,
        from: &Path,
        to: &Path,
        props: MatchProperties,
    ) -> Result<()> {
        self.report(to, EntryKind::Directory, !to.is_dir());
        fs::make_directory(to, self.default_dir_mode).map_err(|e| {
            DeployError::io(format!("cannot make directory \"{}\"", to.display()), e)
        })?;

        let has_source = !from.as_os_str().is_empty();
        let final_mode = self
            .invocation
            .spec
            .dir_permissions
            .resolve(props.permissions, || {
                if has_source { read_mode(from).ok() } else { None }
            });

        let (staged, deferred) = if final_mode.contains(Mode::OWNER_RWX) {
            (final_mode, None)
        } else {
            (final_mode | Mode::OWNER_RWX, Some(final_mode))
        };
        self.set_dir_mode(to, staged)?;

        let populated = if has_source {
            self.install_children(from, to)
        } else {
            Ok(())
        };

        let finalized = deferred.map_or(Ok(()), |mode| self.set_dir_mode(to, mode));
        populated.and(finalized)
    }

    fn set_dir_mode(&self, dir: &Path, mode: Mode) -> Result<()> {
        apply_mode(dir, mode).map_err(|e| {
            DeployError::io(format!("cannot set permissions on \"{}\"", dir.display()), e)
        })
    }

    fn install_children(&mut self, from: &Path, to: &Path) -> Result<()> {
        let listing_error = |e| {
            DeployError::io(format!("cannot list directory \"{}\"", from.display()), e)
        };
        let mut names = std::fs::read_dir(from)
            .map_err(listing_error)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(listing_error)?;
        names.sort();
        for name in names {
            self.install(&from.join(&name), &to.join(&name))?;
        }
        Ok(())
    }

    fn report(&mut self, to: &Path, kind: EntryKind, copied: bool) {
        let policy = self.invocation.policy;
        let path = to_slash(to);
        match policy.mode {
            CopyMode::Copy => {
                let verb = if copied { "Copying" } else { "Up-to-date" };
                self.log.debug(&format!("{verb}: {path}"));
            }
            CopyMode::Install => {
                if policy.messages.announces(copied) {
                    let verb = if copied { "Installing" } else { "Up-to-date" };
                    self.log.status(&format!("{verb}: {path}"));
                }
                if kind != EntryKind::Directory {
                    let entry = path.get(policy.destdir_len..).unwrap_or(&path);
                    self.manifest.push(entry);
                }
            }
        }
    }
}

/// Split a forward-slash path at its last separator.
fn split_last(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::MockLog;
    use std::fs as stdfs;

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        platform: Platform,
        config: DeployConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().to_path_buf();
            stdfs::create_dir_all(root.join("src")).unwrap();
            stdfs::create_dir_all(root.join("build")).unwrap();
            let config = DeployConfig::for_dirs(&root.join("src"), &root.join("build"));
            Self {
                _tmp: tmp,
                root,
                platform: Platform::new(false, false),
                config,
            }
        }

        fn ctx(&self) -> CopyContext<'_> {
            CopyContext {
                platform: &self.platform,
                config: &self.config,
            }
        }

        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.root.join("src").join(rel);
            stdfs::create_dir_all(path.parent().unwrap()).unwrap();
            stdfs::write(&path, content).unwrap();
            path
        }

        fn copy(&self, args: &[&str]) -> Result<CopyStats> {
            let args: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();
            let invocation = parse_copy_args(&args, self.ctx())?;
            let log = quiet_log();
            FileCopier::new(&invocation, self.ctx(), &log)?.run()
        }
    }

    fn quiet_log() -> MockLog {
        let mut log = MockLog::new();
        log.expect_debug().returning(|_| ());
        log.expect_status().returning(|_| ());
        log
    }

    // -----------------------------------------------------------------------
    // Entry resolution
    // -----------------------------------------------------------------------

    #[test]
    fn split_last_handles_edges() {
        assert_eq!(split_last("/a/b"), ("/a", "b"));
        assert_eq!(split_last("a/b/"), ("a/b", ""));
        assert_eq!(split_last("name"), ("", "name"));
    }

    #[test]
    fn relative_sources_resolve_against_source_dir() {
        let fx = Fixture::new();
        fx.write("a.txt", "a");
        let stats = fx.copy(&["a.txt", "DESTINATION", "out"]).unwrap();
        assert_eq!(stats.copied, 1);
        assert_eq!(
            stdfs::read_to_string(fx.root.join("build/out/a.txt")).unwrap(),
            "a"
        );
    }

    #[test]
    fn files_from_dir_preserves_relative_layout() {
        let fx = Fixture::new();
        fx.write("tree/x/y.txt", "y");
        fx.copy(&["x/y.txt", "DESTINATION", "out", "FILES_FROM_DIR", "tree"])
            .unwrap();
        assert!(fx.root.join("build/out/x/y.txt").is_file());
    }

    #[test]
    fn files_from_dir_rejects_absolute_entries() {
        let fx = Fixture::new();
        let abs = fx.write("a.txt", "a");
        let err = fx
            .copy(&[abs.to_str().unwrap(), "DESTINATION", "out", "FILES_FROM_DIR", "."])
            .unwrap_err();
        assert!(matches!(err, DeployError::Argument(_)));
    }

    #[test]
    fn files_from_dir_names_empty_entries() {
        let fx = Fixture::new();
        fx.write("tree/a.txt", "a");
        let err = fx
            .copy(&["", "DESTINATION", "out", "FILES_FROM_DIR", "tree"])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "option FILES_FROM_DIR does not accept an empty file name."
        );
    }

    #[test]
    fn trailing_slash_copies_directory_contents() {
        let fx = Fixture::new();
        fx.write("dir/inner.txt", "i");
        fx.copy(&["dir/", "DESTINATION", "out"]).unwrap();
        assert!(fx.root.join("build/out/inner.txt").is_file());
        assert!(!fx.root.join("build/out/dir").exists());
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    #[test]
    fn same_entry_is_noop() {
        let fx = Fixture::new();
        let file = fx.write("same.txt", "s");
        let invocation = parse_copy_args(&["x".to_string(), "DESTINATION".to_string(), "/".to_string()], fx.ctx()).unwrap();
        let log = MockLog::new();
        let mut copier = FileCopier::new(&invocation, fx.ctx(), &log).unwrap();
        copier.install(&file, &file).unwrap();
        assert_eq!(copier.stats, CopyStats::default());
        assert_eq!(stdfs::read_to_string(&file).unwrap(), "s");
    }

    #[test]
    fn empty_source_is_argument_error_for_copy() {
        let fx = Fixture::new();
        let err = fx.copy(&["", "DESTINATION", "out"]).unwrap_err();
        assert!(matches!(err, DeployError::Argument(_)));
    }

    #[test]
    fn missing_source_is_io_error() {
        let fx = Fixture::new();
        let err = fx.copy(&["missing.txt", "DESTINATION", "out"]).unwrap_err();
        match err {
            DeployError::Io { context, .. } => assert!(context.contains("cannot find")),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn failure_aborts_remaining_entries() {
        let fx = Fixture::new();
        fx.write("b.txt", "b");
        let err = fx.copy(&["missing.txt", "b.txt", "DESTINATION", "out"]);
        assert!(err.is_err());
        assert!(!fx.root.join("build/out/b.txt").exists());
    }

    #[test]
    fn excluded_entries_are_skipped() {
        let fx = Fixture::new();
        fx.write("d/keep.h", "k");
        fx.write("d/skip.o", "s");
        let stats = fx
            .copy(&["d", "DESTINATION", "out", "PATTERN", "*.o", "EXCLUDE"])
            .unwrap();
        assert_eq!(stats.excluded, 1);
        assert!(fx.root.join("build/out/d/keep.h").exists());
        assert!(!fx.root.join("build/out/d/skip.o").exists());
    }

    #[test]
    fn files_matching_keeps_only_matching_files() {
        let fx = Fixture::new();
        fx.write("d/a.h", "");
        fx.write("d/a.c", "");
        fx.write("d/sub/b.h", "");
        fx.copy(&["d", "DESTINATION", "out", "FILES_MATCHING", "PATTERN", "*.h"])
            .unwrap();
        assert!(fx.root.join("build/out/d/a.h").exists());
        assert!(fx.root.join("build/out/d/sub/b.h").exists());
        assert!(!fx.root.join("build/out/d/a.c").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recreated_not_followed() {
        let fx = Fixture::new();
        fx.write("target.txt", "t");
        fs::create_symlink(Path::new("target.txt"), &fx.root.join("src/link")).unwrap();
        let stats = fx.copy(&["link", "DESTINATION", "out"]).unwrap();
        assert_eq!(stats.copied, 1);
        let copied = fx.root.join("build/out/link");
        assert_eq!(stdfs::read_link(&copied).unwrap(), PathBuf::from("target.txt"));

        let again = fx.copy(&["link", "DESTINATION", "out"]).unwrap();
        assert_eq!(again.copied, 0);
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    #[test]
    fn rerun_with_matching_times_writes_nothing() {
        let fx = Fixture::new();
        fx.write("d/a.txt", "a");
        fx.write("d/b.txt", "b");
        let first = fx.copy(&["d", "DESTINATION", "out"]).unwrap();
        assert_eq!(first.copied, 2);
        let second = fx.copy(&["d", "DESTINATION", "out"]).unwrap();
        assert_eq!(second.copied, 0);
        assert_eq!(second.up_to_date, 2);
    }

    #[test]
    fn copy_preserves_modification_time() {
        let fx = Fixture::new();
        let src = fx.write("a.txt", "a");
        filetime::set_file_mtime(&src, filetime::FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
        fx.copy(&["a.txt", "DESTINATION", "out"]).unwrap();
        let meta = stdfs::metadata(fx.root.join("build/out/a.txt")).unwrap();
        assert_eq!(
            filetime::FileTime::from_last_modification_time(&meta).unix_seconds(),
            1_500_000_000
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_permissions_follow_rule_then_explicit_then_source() {
        let fx = Fixture::new();
        let a = fx.write("d/a.sh", "");
        let b = fx.write("d/b.txt", "");
        apply_mode(&a, Mode::from_bits(0o600)).unwrap();
        apply_mode(&b, Mode::from_bits(0o640)).unwrap();

        fx.copy(&["d", "DESTINATION", "src_perms"]).unwrap();
        assert_eq!(read_mode(&fx.root.join("build/src_perms/d/b.txt")).unwrap().bits(), 0o640);

        fx.copy(&[
            "d", "DESTINATION", "explicit", "FILE_PERMISSIONS", "OWNER_READ", "OWNER_WRITE",
            "PATTERN", "*.sh", "PERMISSIONS", "OWNER_READ", "OWNER_EXECUTE",
        ])
        .unwrap();
        assert_eq!(read_mode(&fx.root.join("build/explicit/d/a.sh")).unwrap().bits(), 0o500);
        assert_eq!(read_mode(&fx.root.join("build/explicit/d/b.txt")).unwrap().bits(), 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn empty_file_permissions_keep_source_bits() {
        let fx = Fixture::new();
        let src = fx.write("plain.txt", "");
        apply_mode(&src, Mode::from_bits(0o640)).unwrap();
        fx.copy(&["plain.txt", "DESTINATION", "out", "FILE_PERMISSIONS"]).unwrap();
        assert_eq!(read_mode(&fx.root.join("build/out/plain.txt")).unwrap().bits(), 0o640);
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    #[test]
    fn read_only_directory_is_populated_before_final_mode() {
        let fx = Fixture::new();
        fx.write("tree/one", "1");
        fx.write("tree/two", "2");
        fx.write("tree/three", "3");
        stdfs::create_dir_all(fx.root.join("src/tree/sub")).unwrap();

        fx.copy(&["tree", "DESTINATION", "out", "DIRECTORY_PERMISSIONS", "OWNER_READ"])
            .unwrap();

        let out = fx.root.join("build/out/tree");
        assert_eq!(read_mode(&out).unwrap().bits(), 0o400);
        apply_mode(&out, Mode::from_bits(0o700)).unwrap();
        for name in ["one", "two", "three"] {
            assert!(out.join(name).is_file(), "{name} should be written");
        }
        assert_eq!(read_mode(&out.join("sub")).unwrap().bits(), 0o400);
        apply_mode(&out.join("sub"), Mode::from_bits(0o700)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn final_mode_is_applied_even_when_a_child_fails() {
        let fx = Fixture::new();
        fx.write("tree/ok", "1");
        fs::create_symlink(Path::new("nowhere"), &fx.root.join("src/tree/zz")).unwrap();
        stdfs::create_dir_all(fx.root.join("build/out/tree/zz/blocker")).unwrap();
        stdfs::write(fx.root.join("build/out/tree/zz/blocker/f"), "").unwrap();

        let result = fx.copy(&["tree", "DESTINATION", "out", "DIRECTORY_PERMISSIONS", "OWNER_READ", "OWNER_EXECUTE"]);
        assert!(result.is_err());
        let out = fx.root.join("build/out/tree");
        assert_eq!(read_mode(&out).unwrap().bits(), 0o500);
        apply_mode(&out, Mode::from_bits(0o700)).unwrap();
    }
}
