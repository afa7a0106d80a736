//! Checksum-verified, progress-reporting downloads and uploads.
//!
//! [`TransferEngine`] drives one [`Transport`] per call. A download streams
//! the body straight into the destination file and, when an expected hash
//! was given, verifies the file afterwards regardless of how the transport
//! ended. An upload streams the local file as the request body and keeps
//! the peer's response for the log.
mod args;
mod hash;
mod netrc;
mod progress;
mod transport;

pub use args::{TransferInvocation, parse_download_args, parse_upload_args};
pub use hash::{ExpectedHash, HashAlgorithm};
pub use netrc::{Credentials, NetrcLevel, lookup as netrc_lookup, resolve_credentials};
pub use progress::ProgressReporter;
pub use transport::{
    FileTransport, HttpTransport, TransferCode, TransferEvents, Transport, TransportError,
    transport_for,
};

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{self, DeployError};
use crate::logging::Log;

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// URL to file.
    Download,
    /// File to URL.
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "DOWNLOAD"),
            Self::Upload => write!(f, "UPLOAD"),
        }
    }
}

/// Everything one transfer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Remote URL.
    pub url: String,
    /// Local file (destination for downloads, source for uploads).
    pub file: PathBuf,
    /// Digest the downloaded file must carry.
    pub expected_hash: Option<ExpectedHash>,
    /// Overall timeout.
    pub timeout: Option<Duration>,
    /// Abort when no data moves for this long.
    pub inactivity_timeout: Option<Duration>,
    /// Verify the TLS peer.
    pub tls_verify: bool,
    /// CA bundle replacing the default roots.
    pub tls_cainfo: Option<PathBuf>,
    /// Explicit credentials (`USERPWD`).
    pub credentials: Option<Credentials>,
    /// Netrc policy.
    pub netrc: NetrcLevel,
    /// Netrc file consulted by the policy.
    pub netrc_file: Option<PathBuf>,
    /// Extra `Name: value` request headers.
    pub headers: Vec<String>,
    /// Report percentage progress.
    pub show_progress: bool,
    /// Keep the protocol trace for the caller.
    pub capture_log: bool,
}

impl TransferRequest {
    /// A request with no options: TLS verification on, no timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            expected_hash: None,
            timeout: None,
            inactivity_timeout: None,
            tls_verify: true,
            tls_cainfo: None,
            credentials: None,
            netrc: NetrcLevel::Ignored,
            netrc_file: None,
            headers: Vec::new(),
            show_progress: false,
            capture_log: false,
        }
    }

    fn host(&self) -> Option<String> {
        let uri: ureq::http::Uri = self.url.parse().ok()?;
        uri.host().map(str::to_string)
    }

    fn resolved_credentials(&self) -> Option<Credentials> {
        resolve_credentials(
            self.credentials.as_ref(),
            self.netrc,
            self.netrc_file.as_deref(),
            self.host().as_deref(),
        )
    }
}

/// A post-transfer digest that differs from the expected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMismatch {
    /// Algorithm used.
    pub algorithm: HashAlgorithm,
    /// Expected digest.
    pub expected: String,
    /// Digest of the file on disk.
    pub actual: String,
}

/// Outcome of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Transport status code (0 on success).
    pub code: i32,
    /// Transport status message.
    pub message: String,
    /// Protocol trace when capture was requested.
    pub log: Option<String>,
    /// Set when the downloaded file failed verification.
    pub mismatch: Option<HashMismatch>,
}

impl TransferResult {
    fn transport(outcome: Result<(), TransportError>, log: Option<String>) -> Self {
        let code = match &outcome {
            Ok(()) => TransferCode::Ok,
            Err(e) => e.code,
        };
        Self {
            code: code.code(),
            message: code.message().to_string(),
            log,
            mismatch: None,
        }
    }

    /// Status string for a status variable: `<code>;"<message>"`, or
    /// `1;HASH mismatch: ...` when verification failed after a successful
    /// transport.
    #[must_use]
    pub fn status(&self) -> String {
        match &self.mismatch {
            Some(m) if self.code == 0 => format!(
                "1;HASH mismatch: expected: {} actual: {}",
                m.expected, m.actual
            ),
            _ => format!("{};\"{}\"", self.code, self.message),
        }
    }

    /// `true` when the transport succeeded and verification (if any) passed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0 && self.mismatch.is_none()
    }

    /// The failure as an error: verification first, then transport.
    #[must_use]
    pub fn error(&self, file: &Path) -> Option<DeployError> {
        if let Some(m) = &self.mismatch {
            return Some(DeployError::Verification {
                file: file.to_path_buf(),
                algorithm: m.algorithm.to_string(),
                expected: m.expected.clone(),
                actual: m.actual.clone(),
            });
        }
        (self.code != 0).then(|| DeployError::Network {
            code: self.code,
            message: self.message.clone(),
        })
    }
}

/// Runs downloads and uploads.
pub struct TransferEngine<'a> {
    log: &'a dyn Log,
    transport: Option<&'a dyn Transport>,
}

impl fmt::Debug for TransferEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("fixed_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> TransferEngine<'a> {
    /// Engine selecting the transport by URL scheme.
    #[must_use]
    pub fn new(log: &'a dyn Log) -> Self {
        Self {
            log,
            transport: None,
        }
    }

    /// Use `transport` for every URL.
    #[must_use]
    pub fn with_transport(mut self, transport: &'a dyn Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    fn transport_for(&self, url: &str) -> Result<&'a dyn Transport, TransportError> {
        match self.transport {
            Some(t) => Ok(t),
            None => transport_for(url),
        }
    }

    /// Download `request.url` into `request.file`.
    ///
    /// Returns early without touching the network when the file already
    /// carries the expected hash. Transport failures and hash mismatches
    /// are reported in the result, not as errors.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if the destination cannot be created or
    /// hashed.
    pub fn download(&self, request: &TransferRequest) -> error::Result<TransferResult> {
        if let Some(expected) = &request.expected_hash
            && request.file.is_file()
            && expected.actual(&request.file).is_ok_and(|actual| actual == expected.digest)
        {
            self.log.debug(&format!(
                "{} already has the expected {}",
                request.file.display(),
                expected.label()
            ));
            return Ok(TransferResult {
                code: 0,
                message: format!(
                    "returning early; file already exists with expected {}",
                    expected.label()
                ),
                log: None,
                mismatch: None,
            });
        }

        if let Some(parent) = request.file.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                DeployError::io(
                    format!(
                        "DOWNLOAD error: cannot create directory '{}' - Specify file by full path name and verify that you have directory creation and file write privileges",
                        parent.display()
                    ),
                    e,
                )
            })?;
        }
        let file = File::create(&request.file).map_err(|e| {
            DeployError::io(
                format!("DOWNLOAD cannot open file '{}' for write", request.file.display()),
                e,
            )
        })?;

        self.log.debug(&format!("downloading {} to {}", request.url, request.file.display()));
        let mut events = TransferEvents::new(
            self.log,
            request.capture_log,
            request.show_progress.then(ProgressReporter::download),
        );
        let credentials = request.resolved_credentials();
        let outcome = self.transport_for(&request.url).and_then(|transport| {
            let mut sink = BufWriter::new(file);
            transport.download(request, credentials.as_ref(), &mut sink, &mut events)
        });
        if let Err(e) = &outcome {
            events.text(&e.detail);
        }
        let mut result = TransferResult::transport(outcome, events.into_trace());

        if let Some(expected) = &request.expected_hash {
            let actual = expected.actual(&request.file).map_err(|e| {
                DeployError::io("DOWNLOAD cannot compute hash on downloaded file", e)
            })?;
            if actual != expected.digest {
                result.mismatch = Some(HashMismatch {
                    algorithm: expected.algorithm,
                    expected: expected.digest.clone(),
                    actual,
                });
            }
        }
        Ok(result)
    }

    /// Upload `request.file` to `request.url`.
    ///
    /// The log, when captured, is `Response:\n<body>\n` followed by
    /// `Debug:\n<trace>\n`, each part present only when non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if the file cannot be opened.
    pub fn upload(&self, request: &TransferRequest) -> error::Result<TransferResult> {
        let mut source = File::open(&request.file).map_err(|e| {
            DeployError::io(
                format!("UPLOAD cannot open file '{}' for reading", request.file.display()),
                e,
            )
        })?;
        let length = source
            .metadata()
            .map_err(|e| DeployError::io(format!("cannot stat '{}'", request.file.display()), e))?
            .len();

        self.log.debug(&format!("uploading {} to {}", request.file.display(), request.url));
        let mut events = TransferEvents::new(
            self.log,
            request.capture_log,
            request.show_progress.then(ProgressReporter::upload),
        );
        let credentials = request.resolved_credentials();
        let mut response = Vec::new();
        let outcome = self.transport_for(&request.url).and_then(|transport| {
            transport.upload(
                request,
                credentials.as_ref(),
                &mut source,
                length,
                &mut response,
                &mut events,
            )
        });
        if let Err(e) = &outcome {
            events.text(&e.detail);
        }

        let trace = events.into_trace();
        let log = request.capture_log.then(|| {
            let mut log = String::new();
            if !response.is_empty() {
                log.push_str("Response:\n");
                log.push_str(&String::from_utf8_lossy(&response));
                log.push('\n');
            }
            if let Some(trace) = trace.filter(|t| !t.is_empty()) {
                log.push_str("Debug:\n");
                log.push_str(&trace);
                log.push('\n');
            }
            log
        });
        Ok(TransferResult::transport(outcome, log))
    }
}
