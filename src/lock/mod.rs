//! Scoped advisory path locks.
//!
//! A [`LockPool`] tracks which paths this process holds and on whose
//! behalf. Cross-process exclusion comes from an OS advisory lock on the
//! lock file ([`fs2`]); the in-process map stops one owner from deadlocking
//! on itself and makes other owners in the same process wait.
//!
//! Function and file scopes are frames opened with
//! [`LockPool::enter_function`] / [`LockPool::enter_file`]; dropping the
//! returned [`ScopeGuard`] releases every lock taken in that frame.
//! Process-scope locks live until released or until the pool is dropped.

mod args;

pub use args::{DIRECTORY_LOCK_NAME, LockArgs, parse_lock_args};

use fs2::FileExt;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{self, DeployError};

/// Default interval between acquisition attempts while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// When a lock is implicitly released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// At the end of the enclosing function frame.
    Function,
    /// At the end of the enclosing file frame.
    File,
    /// On explicit release or process exit.
    Process,
}

impl FromStr for LockScope {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FUNCTION" => Ok(Self::Function),
            "FILE" => Ok(Self::File),
            "PROCESS" => Ok(Self::Process),
            other => Err(DeployError::argument(format!(
                "expected FUNCTION, FILE or PROCESS after GUARD, but got: \"{other}\"."
            ))),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => write!(f, "FUNCTION"),
            Self::File => write!(f, "FILE"),
            Self::Process => write!(f, "PROCESS"),
        }
    }
}

/// Identity of a lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    /// Allocate a token distinct from every other token in this process.
    #[must_use]
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OwnerToken {
    fn default() -> Self {
        Self::new()
    }
}

/// How long an acquisition may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeout {
    /// Wait until the lock is available.
    #[default]
    Infinite,
    /// Give up after this long.
    After(Duration),
}

/// A held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    /// Normalized lock file path.
    pub path: PathBuf,
    /// Release scope.
    pub scope: LockScope,
    /// Holder.
    pub owner: OwnerToken,
    /// Timeout the lock was acquired with.
    pub timeout: LockTimeout,
}

#[derive(Debug)]
struct HeldLock {
    file: File,
    owner: OwnerToken,
    frame: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    File,
}

#[derive(Debug, Default)]
struct PoolState {
    held: HashMap<PathBuf, HeldLock>,
    frames: Vec<(u64, FrameKind)>,
}

/// Bookkeeping for every lock this process holds.
#[derive(Debug)]
pub struct LockPool {
    state: Mutex<PoolState>,
    next_frame: AtomicU64,
    poll_interval: Duration,
}

impl Default for LockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl LockPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            next_frame: AtomicU64::new(1),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the wait interval between attempts.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a function frame.
    pub fn enter_function(&self) -> ScopeGuard<'_> {
        self.enter(FrameKind::Function)
    }

    /// Open a file frame.
    pub fn enter_file(&self) -> ScopeGuard<'_> {
        self.enter(FrameKind::File)
    }

    fn enter(&self, kind: FrameKind) -> ScopeGuard<'_> {
        let id = self.next_frame.fetch_add(1, Ordering::Relaxed);
        self.lock_state().frames.push((id, kind));
        ScopeGuard { pool: self, id }
    }

    fn leave(&self, id: u64) {
        let mut state = self.lock_state();
        if let Some(pos) = state.frames.iter().position(|&(frame, _)| frame == id) {
            state.frames.truncate(pos);
        }
        let released: Vec<PathBuf> = state
            .held
            .iter()
            .filter(|(_, held)| held.frame.is_some_and(|f| !state.frames.iter().any(|&(g, _)| g == f)))
            .map(|(path, _)| path.clone())
            .collect();
        for path in released {
            if let Some(held) = state.held.remove(&path) {
                unlock_file(&path, &held.file);
            }
        }
    }

    fn innermost(state: &PoolState, kind: FrameKind) -> Option<u64> {
        state
            .frames
            .iter()
            .rev()
            .find(|&&(_, k)| k == kind)
            .map(|&(id, _)| id)
    }

    /// Acquire `path` for `owner`.
    ///
    /// The lock file and its parent directories are created if missing.
    /// While another owner holds the path (in this process or another) the
    /// call retries until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`DeployError::LockConflict`] if `owner` already holds `path`.
    /// - [`DeployError::LockTimeout`] if the timeout elapsed.
    /// - [`DeployError::Argument`] if `scope` has no enclosing frame.
    /// - [`DeployError::Io`] if the lock file cannot be created or locked.
    pub fn acquire(
        &self,
        path: &Path,
        scope: LockScope,
        owner: OwnerToken,
        timeout: LockTimeout,
    ) -> error::Result<LockHandle> {
        let frame = {
            let state = self.lock_state();
            match scope {
                LockScope::Function => Some(Self::innermost(&state, FrameKind::Function).ok_or_else(|| {
                    DeployError::argument("'GUARD FUNCTION' not used in function definition")
                })?),
                LockScope::File => Some(Self::innermost(&state, FrameKind::File).ok_or_else(|| {
                    DeployError::argument("'GUARD FILE' not used in file processing")
                })?),
                LockScope::Process => None,
            }
        };

        let file = open_lock_file(path)?;
        let deadline = match timeout {
            LockTimeout::Infinite => None,
            LockTimeout::After(limit) => Some(Instant::now() + limit),
        };

        loop {
            {
                let mut state = self.lock_state();
                match state.held.get(path) {
                    Some(held) if held.owner == owner => {
                        return Err(DeployError::LockConflict {
                            path: path.to_path_buf(),
                        });
                    }
                    Some(_) => {}
                    None => match file.try_lock_exclusive() {
                        Ok(()) => {
                            state.held.insert(path.to_path_buf(), HeldLock { file, owner, frame });
                            return Ok(LockHandle {
                                path: path.to_path_buf(),
                                scope,
                                owner,
                                timeout,
                            });
                        }
                        Err(e) if is_contended(&e) => {}
                        Err(e) => {
                            return Err(DeployError::io(
                                format!("cannot lock \"{}\"", path.display()),
                                e,
                            ));
                        }
                    },
                }
            }

            let wait = match deadline {
                None => self.poll_interval,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(DeployError::LockTimeout {
                            path: path.to_path_buf(),
                        });
                    }
                    remaining.min(self.poll_interval)
                }
            };
            std::thread::sleep(wait);
        }
    }

    /// Release `path` held by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::LockNotHeld`] without changing any state if
    /// `owner` does not hold `path`.
    pub fn release(&self, path: &Path, owner: OwnerToken) -> error::Result<()> {
        let mut state = self.lock_state();
        match state.held.get(path) {
            Some(held) if held.owner == owner => {
                if let Some(held) = state.held.remove(path) {
                    unlock_file(path, &held.file);
                }
                Ok(())
            }
            _ => Err(DeployError::LockNotHeld {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Whether any owner in this process holds `path`.
    #[must_use]
    pub fn is_held(&self, path: &Path) -> bool {
        self.lock_state().held.contains_key(path)
    }

    /// Number of paths currently held.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.lock_state().held.len()
    }
}

/// Releases the locks of one function or file frame when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard closes the scope immediately"]
pub struct ScopeGuard<'a> {
    pool: &'a LockPool,
    id: u64,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.pool.leave(self.id);
    }
}

fn open_lock_file(path: &Path) -> error::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            DeployError::io(
                format!(
                    "directory\n  \"{}\"\ncreation failed (check permissions)",
                    parent.display()
                ),
                e,
            )
        })?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| {
            DeployError::io(
                format!(
                    "file\n  \"{}\"\ncreation failed (check permissions)",
                    path.display()
                ),
                e,
            )
        })
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Drop the OS lock on `file`. Closing the handle releases it as well, so
/// a failure here is only reported.
fn unlock_file(path: &Path, file: &File) {
    if let Err(e) = FileExt::unlock(file) {
        tracing::debug!("unlocking {} failed: {e}", path.display());
    }
}
