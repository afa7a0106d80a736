//! Keyword parser for the download and upload surfaces.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DeployConfig, is_on};
use crate::error::{DeployError, Result};
use crate::platform::collapse_path;

use super::{Credentials, Direction, ExpectedHash, NetrcLevel, TransferRequest};

/// A parsed transfer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInvocation {
    /// Transfer direction.
    pub direction: Direction,
    /// The request to run.
    pub request: TransferRequest,
    /// Variable receiving the status string.
    pub status_variable: Option<String>,
    /// Variable receiving the protocol log.
    pub log_variable: Option<String>,
    /// Non-fatal complaints about unexpected arguments.
    pub warnings: Vec<String>,
}

/// Parse `url file [options...]`.
///
/// # Errors
///
/// Returns [`DeployError::Argument`] for missing positional arguments, a
/// keyword missing its value, an invalid timeout or a malformed hash.
pub fn parse_download_args(
    args: &[String],
    config: &DeployConfig,
) -> Result<TransferInvocation> {
    parse(Direction::Download, args, config)
}

/// Parse `file url [options...]`.
///
/// # Errors
///
/// Returns [`DeployError::Argument`] for missing positional arguments, a
/// keyword missing its value or an invalid timeout.
pub fn parse_upload_args(
    args: &[String],
    config: &DeployConfig,
) -> Result<TransferInvocation> {
    parse(Direction::Upload, args, config)
}

fn parse(
    direction: Direction,
    args: &[String],
    config: &DeployConfig,
) -> Result<TransferInvocation> {
    let [first, second, rest @ ..] = args else {
        return Err(DeployError::argument(format!(
            "{direction} must be called with at least three arguments."
        )));
    };
    let (url, file) = match direction {
        Direction::Download => (first, second),
        Direction::Upload => (second, first),
    };

    let mut request = TransferRequest::new(url.clone(), resolve_file(&config.binary_dir, file));
    request.tls_verify = config.tls_verify();
    request.tls_cainfo.clone_from(&config.tls_cainfo);
    request.netrc = config.netrc.as_deref().unwrap_or_default().parse()?;
    request.netrc_file.clone_from(&config.netrc_file);

    let mut status_variable = None;
    let mut log_variable = None;
    let mut warnings = Vec::new();

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        let mut value = |what: &str| {
            iter.next()
                .ok_or_else(|| DeployError::argument(format!("{direction} missing {what} for {arg}.")))
        };
        match (arg.as_str(), direction) {
            ("TIMEOUT", _) => request.timeout = seconds(direction, arg, value("time")?)?,
            ("INACTIVITY_TIMEOUT", _) => {
                request.inactivity_timeout = seconds(direction, arg, value("time")?)?;
            }
            ("LOG", _) => {
                log_variable = Some(value("VAR")?.clone());
                request.capture_log = true;
            }
            ("STATUS", _) => status_variable = Some(value("VAR")?.clone()),
            ("TLS_VERIFY", _) => request.tls_verify = is_on(value("bool value")?),
            ("TLS_CAINFO", _) => {
                request.tls_cainfo = Some(resolve_file(&config.binary_dir, value("file value")?));
            }
            ("NETRC", _) => request.netrc = value("level value")?.parse()?,
            ("NETRC_FILE", _) => {
                request.netrc_file = Some(resolve_file(&config.binary_dir, value("file value")?));
            }
            ("USERPWD", _) => request.credentials = Some(Credentials::from_userpwd(value("string")?)),
            ("HTTPHEADER", _) => {
                let header = value("string")?;
                if !header.contains(':') {
                    return Err(DeployError::argument(format!(
                        "{direction} HTTPHEADER \"{header}\" is not of the form Name: value"
                    )));
                }
                request.headers.push(header.clone());
            }
            ("SHOW_PROGRESS", _) => request.show_progress = true,
            ("EXPECTED_MD5", Direction::Download) => {
                request.expected_hash = Some(ExpectedHash::md5(value("sum value")?));
            }
            ("EXPECTED_HASH", Direction::Download) => {
                request.expected_hash = Some(ExpectedHash::parse(value("ALGO=value")?)?);
            }
            (other, _) => warnings.push(format!("Unexpected argument: {other}")),
        }
    }

    Ok(TransferInvocation {
        direction,
        request,
        status_variable,
        log_variable,
        warnings,
    })
}

fn resolve_file(base: &Path, file: &str) -> PathBuf {
    collapse_path(base, Path::new(file))
}

fn seconds(direction: Direction, keyword: &str, value: &str) -> Result<Option<Duration>> {
    let secs: u64 = value.parse().map_err(|_| {
        DeployError::argument(format!(
            "{direction} {keyword} value \"{value}\" is not a whole number of seconds."
        ))
    })?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
