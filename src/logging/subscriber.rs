//! Tracing subscriber setup.
//!
//! Every event is classified once into a [`LineKind`] from its level and
//! target. The console renders kinds the way build tools report install
//! steps (`-- Installing: ...`), and the per-command log file records each
//! kind under a fixed-width tag so a run can be grepped afterwards.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::Level;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

const STAGE_TARGET: &str = "filedeploy::stage";
const STATUS_TARGET: &str = "filedeploy::status";

/// What a log line means to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    /// Start of a command's work (`Installing to /opt`).
    Stage,
    /// Per-entry or per-transfer progress (`Up-to-date: /opt/a`).
    Status,
    Error,
    Warn,
    Info,
    Debug,
}

impl LineKind {
    fn classify(level: Level, target: &str) -> Self {
        match (level, target) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warn,
            (Level::INFO, STAGE_TARGET) => Self::Stage,
            (Level::INFO, STATUS_TARGET) => Self::Status,
            (Level::INFO, _) => Self::Info,
            _ => Self::Debug,
        }
    }

    const fn tag(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Status => "status",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Console rendering of one message.
fn console_line(kind: LineKind, msg: &str) -> String {
    match kind {
        LineKind::Error => format!("\x1b[31mfiledeploy error:\x1b[0m {msg}"),
        LineKind::Warn => format!("\x1b[33mfiledeploy warning:\x1b[0m {msg}"),
        LineKind::Stage => format!("\x1b[1m{msg}\x1b[0m"),
        LineKind::Status => format!("-- {msg}"),
        LineKind::Info => msg.to_string(),
        LineKind::Debug => format!("\x1b[2m   {msg}\x1b[0m"),
    }
}

/// Log file rendering of one message, ANSI codes removed.
fn file_line(ts: &str, kind: LineKind, msg: &str) -> String {
    format!("{ts} {:<6} {}", kind.tag(), strip_ansi(msg))
}

/// Pulls the `message` field out of an event.
#[derive(Default)]
struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0 = value.to_string();
        }
    }
}

fn message_of(event: &tracing::Event<'_>) -> String {
    let mut visitor = MessageVisitor::default();
    event.record(&mut visitor);
    visitor.0
}

/// Appends every event to `$XDG_CACHE_HOME/filedeploy/<command>.log`.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log for `command` and start it with a one-line run
    /// header. `None` when the file cannot be written.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let version =
            option_env!("FILEDEPLOY_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let cwd = std::env::current_dir().map_or_else(|_| "?".to_string(), |d| d.display().to_string());
        let header = format!(
            "# filedeploy {version} {command} started {} in {cwd}\n",
            format_utc_datetime()
        );
        fs::write(&path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let kind = LineKind::classify(*metadata.level(), metadata.target());
        let line = file_line(&format_utc_time(), kind, &message_of(event));
        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console event format built on [`console_line`].
struct DeployFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for DeployFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let kind = LineKind::classify(*metadata.level(), metadata.target());
        writeln!(writer, "{}", console_line(kind, &message_of(event)))
    }
}

/// Install the global subscriber for one `command` run.
///
/// Warnings and errors go to stderr, everything else to stdout; `verbose`
/// lets debug lines through to the console. The log file always receives
/// debug and above. Call once, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console_layer = fmt::layer()
        .event_format(DeployFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_level_then_target() {
        assert_eq!(LineKind::classify(Level::INFO, STAGE_TARGET), LineKind::Stage);
        assert_eq!(LineKind::classify(Level::INFO, STATUS_TARGET), LineKind::Status);
        assert_eq!(LineKind::classify(Level::INFO, "filedeploy"), LineKind::Info);
        assert_eq!(LineKind::classify(Level::WARN, STATUS_TARGET), LineKind::Warn);
        assert_eq!(LineKind::classify(Level::TRACE, "x"), LineKind::Debug);
    }

    #[test]
    fn status_lines_use_install_prefix() {
        assert_eq!(
            console_line(LineKind::Status, "Installing: /opt/bin/tool"),
            "-- Installing: /opt/bin/tool"
        );
        assert_eq!(console_line(LineKind::Info, "3 copied"), "3 copied");
    }

    #[test]
    fn file_lines_are_tagged_and_plain() {
        let lines = [
            file_line("10:00:00", LineKind::Stage, "Installing to /opt"),
            file_line("10:00:01", LineKind::Status, "\x1b[1mUp-to-date: /opt/a\x1b[0m"),
            file_line("10:00:02", LineKind::Warn, "Unexpected argument: X"),
        ]
        .join("\n");
        insta::assert_snapshot!(lines, @r"
        10:00:00 stage  Installing to /opt
        10:00:01 status Up-to-date: /opt/a
        10:00:02 warn   Unexpected argument: X
        ");
    }
}
