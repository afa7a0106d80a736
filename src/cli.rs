//! Command-line definitions.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI entry point for the file deployment engine.
#[derive(Parser, Debug)]
#[command(
    name = "filedeploy",
    about = "Rule-driven file copy and install, verified transfers and path locks",
    version
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared across all subcommands
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON file carrying variables (install manifest, results) between runs
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy files and directories according to match rules
    Copy(KeywordArgs),
    /// Install files, programs or directories and record them in the manifest
    Install(KeywordArgs),
    /// Download a URL to a file
    Download(DownloadOpts),
    /// Upload a file to a URL
    Upload(UploadOpts),
    /// Acquire or release a path lock, optionally running a command under it
    Lock(LockOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the per-command log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Copy(_) => "copy",
            Self::Install(_) => "install",
            Self::Download(_) => "download",
            Self::Upload(_) => "upload",
            Self::Lock(_) => "lock",
            Self::Version => "version",
        }
    }
}

/// Keyword arguments passed through to the copy and install parsers.
#[derive(Args, Debug, Clone)]
pub struct KeywordArgs {
    /// Keywords and values, e.g. `FILES a b DESTINATION out`
    #[arg(required = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Options for the `download` subcommand.
#[derive(Args, Debug, Clone)]
pub struct DownloadOpts {
    /// Source URL
    pub url: String,
    /// Destination file
    pub file: String,
    /// Transfer keywords, e.g. `TIMEOUT 30 EXPECTED_HASH SHA256=...`
    #[arg(allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl DownloadOpts {
    /// Positional arguments followed by keywords.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        [self.url.clone(), self.file.clone()]
            .into_iter()
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Options for the `upload` subcommand.
#[derive(Args, Debug, Clone)]
pub struct UploadOpts {
    /// Source file
    pub file: String,
    /// Destination URL
    pub url: String,
    /// Transfer keywords, e.g. `TIMEOUT 30 USERPWD user:pw`
    #[arg(allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl UploadOpts {
    /// Positional arguments followed by keywords.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        [self.file.clone(), self.url.clone()]
            .into_iter()
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Options for the `lock` subcommand.
#[derive(Args, Debug, Clone)]
pub struct LockOpts {
    /// File (or directory, with `DIRECTORY`) to lock
    pub path: String,
    /// Lock keywords, e.g. `GUARD FILE TIMEOUT 5 RESULT_VARIABLE res`
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,
    /// Command to run while the lock is held
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl LockOpts {
    /// Path followed by keywords.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.path.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
