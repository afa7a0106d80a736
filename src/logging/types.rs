//! The [`Log`] trait shared by the engine and its commands.

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) forwards to `tracing`; unit tests use
/// the generated `MockLog` to assert on emitted messages.
#[cfg_attr(test, mockall::automock)]
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log an advisory status line (install announcements, transfer
    /// progress). Never affects outcomes.
    fn status(&self, msg: &str);
}
