//! Transports move bytes between a URL and a local stream.
//!
//! [`HttpTransport`] speaks HTTP(S) through `ureq`; [`FileTransport`] serves
//! `file://` URLs from the local filesystem. Both report protocol trace,
//! data chunks and progress through [`TransferEvents`], and fail with a
//! libcurl-compatible [`TransferCode`].
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use ureq::tls::{PemItem, RootCerts, TlsConfig};
use ureq::{Agent, BodyReader, SendBody};

use crate::logging::Log;

use super::TransferRequest;
use super::netrc::Credentials;
use super::progress::ProgressReporter;

const MAX_REDIRECTS: u32 = 50;
const USER_AGENT: &str = concat!("filedeploy/", env!("CARGO_PKG_VERSION"));
const CHUNK_SIZE: usize = 16 * 1024;

/// Transfer status codes, numbered as libcurl numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCode {
    /// Success.
    Ok,
    /// URL scheme has no transport.
    UnsupportedProtocol,
    /// URL could not be parsed.
    UrlMalformat,
    /// Host name did not resolve.
    CouldntResolveHost,
    /// TCP connection failed.
    CouldntConnect,
    /// Server answered with an HTTP error status.
    HttpReturnedError,
    /// Writing received data failed.
    WriteError,
    /// Reading local data failed.
    ReadError,
    /// Overall or inactivity timeout expired.
    OperationTimedOut,
    /// TLS handshake failed.
    SslConnectError,
    /// A `file://` source could not be read.
    FileCouldntReadFile,
    /// A request was built from an invalid argument.
    BadFunctionArgument,
    /// Redirect limit reached.
    TooManyRedirects,
    /// Sending data to the peer failed.
    SendError,
    /// Receiving data from the peer failed.
    RecvError,
    /// The CA bundle could not be used.
    SslCacertBadFile,
}

impl TransferCode {
    /// Numeric status.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UnsupportedProtocol => 1,
            Self::UrlMalformat => 3,
            Self::CouldntResolveHost => 6,
            Self::CouldntConnect => 7,
            Self::HttpReturnedError => 22,
            Self::WriteError => 23,
            Self::ReadError => 26,
            Self::OperationTimedOut => 28,
            Self::SslConnectError => 35,
            Self::FileCouldntReadFile => 37,
            Self::BadFunctionArgument => 43,
            Self::TooManyRedirects => 47,
            Self::SendError => 55,
            Self::RecvError => 56,
            Self::SslCacertBadFile => 77,
        }
    }

    /// Standard message for the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Ok => "No error",
            Self::UnsupportedProtocol => "Unsupported protocol",
            Self::UrlMalformat => "URL using bad/illegal format or missing URL",
            Self::CouldntResolveHost => "Couldn't resolve host name",
            Self::CouldntConnect => "Couldn't connect to server",
            Self::HttpReturnedError => "HTTP response code said error",
            Self::WriteError => "Failed writing received data to disk/application",
            Self::ReadError => "Failed to open/read local data from file/application",
            Self::OperationTimedOut => "Timeout was reached",
            Self::SslConnectError => "SSL connect error",
            Self::FileCouldntReadFile => "Couldn't read a file:// file",
            Self::BadFunctionArgument => "A libcurl function was given a bad argument",
            Self::TooManyRedirects => "Number of redirects hit maximum amount",
            Self::SendError => "Failed sending data to the peer",
            Self::RecvError => "Failure when receiving data from the peer",
            Self::SslCacertBadFile => "Problem with the SSL CA cert (path? access rights?)",
        }
    }
}

/// A failed transfer: status code plus transport detail for the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    /// Status code.
    pub code: TransferCode,
    /// Transport-specific detail.
    pub detail: String,
}

impl TransportError {
    /// Create an error with `detail`.
    pub fn new(code: TransferCode, detail: impl fmt::Display) -> Self {
        Self {
            code,
            detail: detail.to_string(),
        }
    }
}

/// Sink for protocol trace and progress produced during one transfer.
pub struct TransferEvents<'a> {
    log: &'a dyn Log,
    trace: Option<String>,
    progress: Option<ProgressReporter>,
}

impl fmt::Debug for TransferEvents<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEvents")
            .field("trace", &self.trace)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl<'a> TransferEvents<'a> {
    /// Create a sink. `capture_trace` keeps the protocol trace for the
    /// caller; `progress` reports percentages through [`Log::status`].
    pub fn new(log: &'a dyn Log, capture_trace: bool, progress: Option<ProgressReporter>) -> Self {
        Self {
            log,
            trace: capture_trace.then(String::new),
            progress,
        }
    }

    fn append(&mut self, text: &str) {
        if let Some(trace) = &mut self.trace {
            trace.push_str(text);
            if !text.ends_with('\n') {
                trace.push('\n');
            }
        }
    }

    /// Informational transport text.
    pub fn text(&mut self, text: &str) {
        self.log.debug(text);
        self.append(text);
    }

    /// Headers sent to the peer.
    pub fn header_out(&mut self, text: &str) {
        self.append(text);
    }

    /// Headers received from the peer.
    pub fn header_in(&mut self, text: &str) {
        self.append(text);
    }

    /// A data chunk of `len` bytes moved in either direction.
    pub fn data(&mut self, len: usize) {
        self.append(&format!("[{len} bytes data]"));
    }

    /// `now` of `total` bytes have moved.
    pub fn progress(&mut self, now: u64, total: u64) {
        if let Some(line) = self.progress.as_mut().and_then(|p| p.update(now, total)) {
            self.log.status(&line);
        }
    }

    /// The captured trace, if capture was requested.
    #[must_use]
    pub fn into_trace(self) -> Option<String> {
        self.trace
    }
}

/// Moves bytes for one URL scheme.
pub trait Transport {
    /// Stream the resource at `request.url` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns the status code of the failure.
    fn download(
        &self,
        request: &TransferRequest,
        credentials: Option<&Credentials>,
        sink: &mut dyn Write,
        events: &mut TransferEvents<'_>,
    ) -> Result<(), TransportError>;

    /// Stream `length` bytes from `body` to `request.url`, collecting the
    /// peer's response text in `response`.
    ///
    /// # Errors
    ///
    /// Returns the status code of the failure.
    fn upload(
        &self,
        request: &TransferRequest,
        credentials: Option<&Credentials>,
        body: &mut (dyn Read + Send),
        length: u64,
        response: &mut Vec<u8>,
        events: &mut TransferEvents<'_>,
    ) -> Result<(), TransportError>;
}

/// Select the transport for `url` by scheme.
///
/// # Errors
///
/// Returns [`TransferCode::UrlMalformat`] when the URL has no scheme and
/// [`TransferCode::UnsupportedProtocol`] for schemes without a transport.
pub fn transport_for(url: &str) -> Result<&'static dyn Transport, TransportError> {
    let (scheme, _) = url
        .split_once("://")
        .ok_or_else(|| TransportError::new(TransferCode::UrlMalformat, format!("no scheme in URL \"{url}\"")))?;
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "https" => Ok(&HttpTransport),
        "file" => Ok(&FileTransport),
        other => Err(TransportError::new(
            TransferCode::UnsupportedProtocol,
            format!("Protocol \"{other}\" not supported"),
        )),
    }
}

/// Copy `reader` into `sink` chunk by chunk, reporting each chunk and
/// enforcing the request's overall and inactivity timeouts.
///
/// Read failures map to `read_failure`, write failures to
/// [`TransferCode::WriteError`].
fn stream(
    reader: &mut dyn Read,
    sink: &mut dyn Write,
    total: Option<u64>,
    request: &TransferRequest,
    events: &mut TransferEvents<'_>,
    read_failure: TransferCode,
) -> Result<u64, TransportError> {
    let mut buf = vec![0_u8; CHUNK_SIZE];
    let started = Instant::now();
    let mut last_activity = started;
    let mut done: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => {
                return Err(TransportError::new(TransferCode::OperationTimedOut, e));
            }
            Err(e) => return Err(TransportError::new(read_failure, e)),
        };
        let now = Instant::now();
        check_timeouts(request, started, last_activity, now)?;
        last_activity = now;

        let chunk = buf.get(..n).unwrap_or_default();
        sink.write_all(chunk)
            .map_err(|e| TransportError::new(TransferCode::WriteError, e))?;
        done += n as u64;
        events.data(n);
        events.progress(done, total.unwrap_or(0));
    }
    sink.flush()
        .map_err(|e| TransportError::new(TransferCode::WriteError, e))?;
    Ok(done)
}

fn check_timeouts(
    request: &TransferRequest,
    started: Instant,
    last_activity: Instant,
    now: Instant,
) -> Result<(), TransportError> {
    if let Some(limit) = request.inactivity_timeout
        && now.duration_since(last_activity) > limit
    {
        return Err(TransportError::new(
            TransferCode::OperationTimedOut,
            format!("no data transferred for {} seconds", limit.as_secs()),
        ));
    }
    if let Some(limit) = request.timeout
        && now.duration_since(started) > limit
    {
        return Err(TransportError::new(
            TransferCode::OperationTimedOut,
            format!("operation exceeded {} seconds", limit.as_secs()),
        ));
    }
    Ok(())
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Reader that fails with [`io::ErrorKind::TimedOut`] once its source has
/// produced nothing for `idle`.
///
/// The source is drained on a background thread, so a read blocked inside
/// the source cannot hold the caller past the limit. The thread exits when
/// the source ends, fails, or this reader is dropped and the next chunk
/// cannot be delivered.
struct IdleReader {
    chunks: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    offset: usize,
    idle: Duration,
}

impl IdleReader {
    fn spawn(mut source: impl Read + Send + 'static, idle: Duration) -> io::Result<Self> {
        let (tx, chunks) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("transfer-body".to_string())
            .spawn(move || {
                let mut buf = vec![0_u8; CHUNK_SIZE];
                loop {
                    let chunk = match source.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => Ok(buf.get(..n).unwrap_or_default().to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e),
                    };
                    let failed = chunk.is_err();
                    if tx.send(chunk).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self {
            chunks,
            pending: Vec::new(),
            offset: 0,
            idle,
        })
    }
}

impl Read for IdleReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() {
            match self.chunks.recv_timeout(self.idle) {
                Ok(chunk) => {
                    self.pending = chunk?;
                    self.offset = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data transferred for {} seconds", self.idle.as_secs()),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let mut rest = self.pending.get(self.offset..).unwrap_or_default();
        let n = rest.read(buf)?;
        self.offset += n;
        Ok(n)
    }
}

/// Response body reader, bounded by the request's inactivity timeout when
/// one is set.
fn body_reader(body: BodyReader<'static>, request: &TransferRequest) -> Result<Box<dyn Read>, TransportError> {
    match request.inactivity_timeout {
        Some(idle) => IdleReader::spawn(body, idle)
            .map(|reader| Box::new(reader) as Box<dyn Read>)
            .map_err(|e| TransportError::new(TransferCode::RecvError, e)),
        None => Ok(Box::new(body)),
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// HTTP(S) transport: follows redirects, treats HTTP error statuses as
/// failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl HttpTransport {
    fn agent(request: &TransferRequest) -> Result<Agent, TransportError> {
        let mut builder = Agent::config_builder()
            .http_status_as_error(true)
            .max_redirects(MAX_REDIRECTS)
            .user_agent(USER_AGENT)
            .tls_config(tls_config(request)?);
        if let Some(limit) = request.timeout {
            builder = builder.timeout_global(Some(limit));
        }
        if let Some(limit) = request.inactivity_timeout {
            builder = builder
                .timeout_connect(Some(limit))
                .timeout_recv_response(Some(limit));
        }
        Ok(Agent::new_with_config(builder.build()))
    }
}

fn tls_config(request: &TransferRequest) -> Result<TlsConfig, TransportError> {
    let mut builder = TlsConfig::builder().disable_verification(!request.tls_verify);
    if let Some(path) = &request.tls_cainfo {
        let pem = fs::read(path).map_err(|e| {
            TransportError::new(
                TransferCode::SslCacertBadFile,
                format!("cannot read CA bundle {}: {e}", path.display()),
            )
        })?;
        let certs: Vec<_> = ureq::tls::parse_pem(&pem)
            .filter_map(|item| match item {
                Ok(PemItem::Certificate(cert)) => Some(cert.to_owned()),
                _ => None,
            })
            .collect();
        if certs.is_empty() {
            return Err(TransportError::new(
                TransferCode::SslCacertBadFile,
                format!("no certificates in {}", path.display()),
            ));
        }
        builder = builder.root_certs(RootCerts::Specific(Arc::new(certs)));
    }
    Ok(builder.build())
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    let code = match &err {
        ureq::Error::StatusCode(_) => TransferCode::HttpReturnedError,
        ureq::Error::Timeout(_) => TransferCode::OperationTimedOut,
        ureq::Error::HostNotFound => TransferCode::CouldntResolveHost,
        ureq::Error::ConnectionFailed => TransferCode::CouldntConnect,
        ureq::Error::BadUri(_) => TransferCode::UrlMalformat,
        ureq::Error::TooManyRedirects => TransferCode::TooManyRedirects,
        ureq::Error::Tls(_) => TransferCode::SslConnectError,
        ureq::Error::Http(_) => TransferCode::BadFunctionArgument,
        ureq::Error::Io(e) if is_timeout(e) => TransferCode::OperationTimedOut,
        _ => TransferCode::RecvError,
    };
    let detail = match err {
        ureq::Error::StatusCode(status) => format!("The requested URL returned error: {status}"),
        other => other.to_string(),
    };
    TransportError::new(code, detail)
}

fn request_headers(request: &TransferRequest, credentials: Option<&Credentials>) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(creds) = credentials {
        headers.push(("Authorization".to_string(), creds.basic_auth()));
    }
    for header in &request.headers {
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

fn describe_request(method: &str, url: &str, headers: &[(String, String)]) -> String {
    let mut text = format!("{method} {url} HTTP/1.1\r\n");
    for (name, value) in headers {
        let value = if name.eq_ignore_ascii_case("Authorization") {
            "<redacted>"
        } else {
            value.as_str()
        };
        text.push_str(&format!("{name}: {value}\r\n"));
    }
    text.push_str("\r\n");
    text
}

fn describe_response(response: &ureq::http::Response<ureq::Body>) -> String {
    let mut text = format!("{:?} {}\r\n", response.version(), response.status());
    for (name, value) in response.headers() {
        text.push_str(&format!(
            "{}: {}\r\n",
            name.as_str(),
            value.to_str().unwrap_or("<binary>")
        ));
    }
    text.push_str("\r\n");
    text
}

impl Transport for HttpTransport {
    fn download(
        &self,
        request: &TransferRequest,
        credentials: Option<&Credentials>,
        sink: &mut dyn Write,
        events: &mut TransferEvents<'_>,
    ) -> Result<(), TransportError> {
        let agent = Self::agent(request)?;
        let headers = request_headers(request, credentials);
        let mut call = agent.get(&request.url);
        for (name, value) in &headers {
            call = call.header(name.as_str(), value.as_str());
        }
        events.text(&format!("Requesting {}", request.url));
        events.header_out(&describe_request("GET", &request.url, &headers));

        let response = call.call().map_err(map_ureq_error)?;
        events.header_in(&describe_response(&response));
        let total = response.body().content_length();
        let mut reader = body_reader(response.into_body().into_reader(), request)?;
        stream(&mut *reader, sink, total, request, events, TransferCode::RecvError)?;
        Ok(())
    }

    fn upload(
        &self,
        request: &TransferRequest,
        credentials: Option<&Credentials>,
        body: &mut (dyn Read + Send),
        length: u64,
        response: &mut Vec<u8>,
        events: &mut TransferEvents<'_>,
    ) -> Result<(), TransportError> {
        let agent = Self::agent(request)?;
        let mut headers = request_headers(request, credentials);
        headers.push(("Content-Length".to_string(), length.to_string()));
        let mut call = agent.put(&request.url);
        for (name, value) in &headers {
            call = call.header(name.as_str(), value.as_str());
        }
        events.text(&format!("Uploading to {}", request.url));
        events.header_out(&describe_request("PUT", &request.url, &headers));

        let (result, failure) = {
            let mut metered = MeteredReader::new(body, length, events);
            let result = call.send(SendBody::from_reader(&mut metered));
            (result, metered.failure.take())
        };
        if let Some(failure) = failure {
            return Err(failure);
        }
        let reply = result.map_err(map_ureq_error)?;
        events.header_in(&describe_response(&reply));
        body_reader(reply.into_body().into_reader(), request)?
            .read_to_end(response)
            .map_err(|e| {
                let code = if is_timeout(&e) {
                    TransferCode::OperationTimedOut
                } else {
                    TransferCode::RecvError
                };
                TransportError::new(code, e)
            })?;
        Ok(())
    }
}

/// Reader that reports upload progress and remembers local read failures.
struct MeteredReader<'b, 'e, 'l> {
    inner: &'b mut (dyn Read + Send),
    events: &'e mut TransferEvents<'l>,
    total: u64,
    done: u64,
    failure: Option<TransportError>,
}

impl<'b, 'e, 'l> MeteredReader<'b, 'e, 'l> {
    fn new(inner: &'b mut (dyn Read + Send), total: u64, events: &'e mut TransferEvents<'l>) -> Self {
        Self {
            inner,
            events,
            total,
            done: 0,
            failure: None,
        }
    }
}

impl Read for MeteredReader<'_, '_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                if n > 0 {
                    self.done += n as u64;
                    self.events.data(n);
                    self.events.progress(self.done, self.total);
                }
                Ok(n)
            }
            Err(e) => {
                self.failure = Some(TransportError::new(TransferCode::ReadError, &e));
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// file://
// ---------------------------------------------------------------------------

/// Local-file transport for `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    fn path(url: &str) -> Result<PathBuf, TransportError> {
        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| TransportError::new(TransferCode::UrlMalformat, url))?;
        let rest = rest.strip_prefix("localhost").unwrap_or(rest);
        if !rest.starts_with('/') {
            return Err(TransportError::new(
                TransferCode::UrlMalformat,
                format!("file URL \"{url}\" has a remote host"),
            ));
        }
        let path = match rest.get(1..) {
            Some(tail) if cfg!(windows) && crate::platform::drive_prefix_len(tail) == 2 => tail,
            _ => rest,
        };
        Ok(PathBuf::from(path))
    }
}

impl Transport for FileTransport {
    fn download(
        &self,
        request: &TransferRequest,
        _credentials: Option<&Credentials>,
        sink: &mut dyn Write,
        events: &mut TransferEvents<'_>,
    ) -> Result<(), TransportError> {
        let path = Self::path(&request.url)?;
        events.text(&format!("Reading {}", path.display()));
        let mut file = File::open(&path)
            .map_err(|e| TransportError::new(TransferCode::FileCouldntReadFile, format!("{}: {e}", path.display())))?;
        let total = file.metadata().ok().map(|m| m.len());
        stream(&mut file, sink, total, request, events, TransferCode::FileCouldntReadFile)?;
        Ok(())
    }

    fn upload(
        &self,
        request: &TransferRequest,
        _credentials: Option<&Credentials>,
        body: &mut (dyn Read + Send),
        length: u64,
        _response: &mut Vec<u8>,
        events: &mut TransferEvents<'_>,
    ) -> Result<(), TransportError> {
        let path = Self::path(&request.url)?;
        events.text(&format!("Writing {}", path.display()));
        let mut file = File::create(&path)
            .map_err(|e| TransportError::new(TransferCode::WriteError, format!("{}: {e}", path.display())))?;
        stream(body, &mut file, Some(length), request, events, TransferCode::ReadError)?;
        Ok(())
    }
}
