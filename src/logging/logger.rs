//! Structured logger that counts problems and mirrors everything to a file.
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::Log;
use super::utils::log_file_path;

/// Implement the methods of [`Log`] by delegating to inherent methods of the
/// same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Logger backed by the global `tracing` subscriber.
///
/// All messages are written to a persistent log file at
/// `$XDG_CACHE_HOME/filedeploy/<command>.log` (default
/// `~/.cache/filedeploy/<command>.log`) with timestamps and ANSI codes
/// stripped, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl Logger {
    /// Create a new logger.
    ///
    /// The log file itself is created by
    /// [`init_subscriber`](super::subscriber::init_subscriber); this
    /// constructor only remembers where it lives.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
            warnings: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Number of warnings logged so far.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    /// Number of errors logged so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: "filedeploy::stage", "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file via the [`FileLayer`](super::subscriber::FileLayer)).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a status line such as `Installing: /usr/bin/tool`.
    pub fn status(&self, msg: &str) {
        tracing::info!(target: "filedeploy::status", "{msg}");
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, status);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    fn contents(log: &Logger) -> String {
        fs::read_to_string(log.log_path().expect("log path should exist")).unwrap()
    }

    #[test]
    fn log_file_is_created_with_header() {
        let (log, _tmp, _guard) = isolated_logger();
        let text = contents(&log);
        assert!(text.starts_with("# filedeploy "), "header missing: {text}");
        assert!(text.contains(" test started "));
    }

    #[test]
    fn debug_always_written_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        let marker = format!("debug-marker-{}", std::process::id());
        log.debug(&marker);
        assert!(contents(&log).contains(&format!("debug  {marker}")));
    }

    #[test]
    fn levels_are_tagged_in_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.stage("Installing files");
        log.status("Installing: /opt/bin/tool");
        log.warn("careful");
        log.error("broken");
        let text = contents(&log);
        assert!(text.contains("stage  Installing files"));
        assert!(text.contains("status Installing: /opt/bin/tool"));
        assert!(text.contains("warn   careful"));
        assert!(text.contains("error  broken"));
    }

    #[test]
    fn ansi_codes_are_stripped_from_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.info("\x1b[32mgreen\x1b[0m text");
        let text = contents(&log);
        assert!(text.contains("green text"));
        assert!(!text.contains("\x1b["));
    }

    #[test]
    fn counts_warnings_and_errors() {
        let (log, _tmp, _guard) = isolated_logger();
        let as_trait: &dyn Log = &log;
        as_trait.warn("one");
        as_trait.warn("two");
        as_trait.error("three");
        as_trait.info("not counted");
        assert_eq!(log.warning_count(), 2);
        assert_eq!(log.error_count(), 1);
    }
}
