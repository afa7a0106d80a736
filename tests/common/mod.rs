// Shared helpers for integration tests.
//
// Provides a temporary source/binary tree with a fluent builder, a logger
// that records every message, and a one-shot HTTP server so transfer tests
// never leave the loopback interface.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::io::{BufRead as _, BufReader, Read as _, Write as _};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;

use filedeploy::config::DeployConfig;
use filedeploy::logging::Log;
use filedeploy::platform::Platform;
use filedeploy::session::Session;

/// An isolated deployment tree backed by a [`tempfile::TempDir`]:
/// `<root>/src` is the source directory and `<root>/build` the binary
/// directory.
pub struct DeployTestContext {
    /// Temporary directory holding both trees.
    pub root: tempfile::TempDir,
}

impl DeployTestContext {
    /// Create empty source and binary directories.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("src")).expect("create src dir");
        std::fs::create_dir_all(root.path().join("build")).expect("create build dir");
        Self { root }
    }

    /// Root of the temporary tree.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// The source directory.
    pub fn source_dir(&self) -> PathBuf {
        self.root.path().join("src")
    }

    /// The binary directory.
    pub fn binary_dir(&self) -> PathBuf {
        self.root.path().join("build")
    }

    /// `name` under the root, as a forward-slash string for keyword args.
    pub fn path_arg(&self, name: &str) -> String {
        self.root
            .path()
            .join(name)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Configuration rooted at this tree.
    pub fn config(&self) -> DeployConfig {
        DeployConfig::for_dirs(&self.source_dir(), &self.binary_dir())
    }

    /// A fresh session over [`Self::config`] with a POSIX-style platform.
    pub fn session(&self) -> Session {
        Session::new(self.config(), Platform::detect())
    }
}

/// Fluent builder for [`DeployTestContext`].
pub struct DeployTestContextBuilder {
    ctx: DeployTestContext,
}

impl DeployTestContextBuilder {
    /// Begin building a context with empty trees.
    pub fn new() -> Self {
        Self {
            ctx: DeployTestContext::new(),
        }
    }

    /// Write `content` to `src/<relative>`, creating parent directories.
    pub fn with_source_file(self, relative: &str, content: &str) -> Self {
        let path = self.ctx.source_dir().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create source parent");
        }
        std::fs::write(&path, content).expect("write source file");
        self
    }

    /// Create the directory `src/<relative>`.
    pub fn with_source_dir(self, relative: &str) -> Self {
        std::fs::create_dir_all(self.ctx.source_dir().join(relative)).expect("create source dir");
        self
    }

    /// Finish building and return the configured context.
    pub fn build(self) -> DeployTestContext {
        self.ctx
    }
}

/// Convert string slices into an owned argument vector.
pub fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

/// A [`Log`] that keeps every message as `(level, message)`.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLog {
    fn push(&self, level: &'static str, msg: &str) {
        self.entries
            .lock()
            .expect("recording log poisoned")
            .push((level, msg.to_string()));
    }

    /// All messages logged at `level`, in order.
    pub fn messages(&self, level: &str) -> Vec<String> {
        self.entries
            .lock()
            .expect("recording log poisoned")
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Log for RecordingLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
    fn status(&self, msg: &str) {
        self.push("status", msg);
    }
}

/// A request captured by [`OneShotServer`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request line, e.g. `GET /file HTTP/1.1`.
    pub request_line: String,
    /// Header lines as sent.
    pub headers: Vec<String>,
    /// Body bytes (read according to `Content-Length`).
    pub body: Vec<u8>,
}

impl CapturedRequest {
    /// Value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// An HTTP server on a loopback port that answers exactly one request with
/// a canned response and hands the request back to the test.
pub struct OneShotServer {
    /// `http://127.0.0.1:<port>`
    pub base_url: String,
    handle: JoinHandle<CapturedRequest>,
}

impl OneShotServer {
    /// Serve `status` (e.g. `200 OK`) with `body`.
    pub fn respond(status: &str, body: &[u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let port = listener.local_addr().expect("local addr").port();
        let mut response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);

        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let captured = read_request(&mut reader);
            let mut stream = stream;
            stream.write_all(&response).expect("write response");
            stream.flush().expect("flush response");
            captured
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            handle,
        }
    }

    /// URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Wait for the request to be served and return it.
    pub fn request(self) -> CapturedRequest {
        self.handle.join().expect("server thread panicked")
    }
}

fn read_request(reader: &mut BufReader<std::net::TcpStream>) -> CapturedRequest {
    let mut request_line = String::new();
    reader.read_line(&mut request_line).expect("read request line");
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        let line = line.trim_end().to_string();
        if line.is_empty() {
            break;
        }
        headers.push(line);
    }
    let mut captured = CapturedRequest {
        request_line: request_line.trim_end().to_string(),
        headers,
        body: Vec::new(),
    };
    let length: usize = captured
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).expect("read body");
    captured.body = body;
    captured
}
