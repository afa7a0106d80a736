//! Credentials: `USERPWD` strings and netrc lookups.
use base64::Engine as _;
use std::path::Path;
use std::str::FromStr;

use crate::error::DeployError;

/// How the netrc file is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetrcLevel {
    /// Never read the netrc file.
    #[default]
    Ignored,
    /// Use netrc credentials only when none were given explicitly.
    Optional,
    /// Netrc credentials replace explicit ones.
    Required,
}

impl FromStr for NetrcLevel {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "IGNORED" => Ok(Self::Ignored),
            "OPTIONAL" => Ok(Self::Optional),
            "REQUIRED" => Ok(Self::Required),
            _ => Err(DeployError::argument(format!(
                "NETRC accepts one of IGNORED, OPTIONAL or REQUIRED but got: {s}"
            ))),
        }
    }
}

/// A user name and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub user: String,
    /// Password (possibly empty).
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Split `user:password` at the first colon.
    #[must_use]
    pub fn from_userpwd(userpwd: &str) -> Self {
        let (user, password) = userpwd.split_once(':').unwrap_or((userpwd, ""));
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// `Authorization` header value for HTTP basic authentication.
    #[must_use]
    pub fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.user, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

/// Find the credentials for `host` in netrc `content`: the first matching
/// `machine` entry, else the `default` entry.
#[must_use]
pub fn lookup(content: &str, host: &str) -> Option<Credentials> {
    #[derive(PartialEq)]
    enum Target {
        None,
        Machine(bool),
        Default,
    }

    let mut tokens = content.split_whitespace();
    let mut target = Target::None;
    let mut user: Option<String> = None;
    let mut password: Option<String> = None;
    let mut fallback: Option<Credentials> = None;

    let finish = |target: &Target, user: &mut Option<String>, password: &mut Option<String>| {
        let creds = (user.take(), password.take());
        match (target, creds) {
            (Target::Machine(true) | Target::Default, (Some(user), password)) => Some(Credentials {
                user,
                password: password.unwrap_or_default(),
            }),
            _ => None,
        }
    };

    while let Some(token) = tokens.next() {
        match token {
            "machine" => {
                if let Some(found) = finish(&target, &mut user, &mut password) {
                    if target == Target::Default {
                        fallback.get_or_insert(found);
                    } else {
                        return Some(found);
                    }
                }
                let name = tokens.next().unwrap_or_default();
                target = Target::Machine(name.eq_ignore_ascii_case(host));
            }
            "default" => {
                if let Some(found) = finish(&target, &mut user, &mut password) {
                    if target == Target::Default {
                        fallback.get_or_insert(found);
                    } else {
                        return Some(found);
                    }
                }
                target = Target::Default;
            }
            "login" => user = tokens.next().map(String::from),
            "password" => password = tokens.next().map(String::from),
            "account" => {
                tokens.next();
            }
            _ => {}
        }
    }

    match finish(&target, &mut user, &mut password) {
        Some(found) if target != Target::Default => Some(found),
        Some(found) => fallback.or(Some(found)),
        None => fallback,
    }
}

/// Pick the credentials for a request.
///
/// Explicit credentials win unless `level` is [`NetrcLevel::Required`]; the
/// netrc file is read only when it can contribute. An unreadable netrc file
/// contributes nothing.
#[must_use]
pub fn resolve_credentials(
    explicit: Option<&Credentials>,
    level: NetrcLevel,
    netrc_file: Option<&Path>,
    host: Option<&str>,
) -> Option<Credentials> {
    let explicit = explicit.cloned();
    let from_netrc = || {
        let content = std::fs::read_to_string(netrc_file?).ok()?;
        lookup(&content, host?)
    };
    match level {
        NetrcLevel::Ignored => explicit,
        NetrcLevel::Optional => explicit.or_else(from_netrc),
        NetrcLevel::Required => from_netrc().or(explicit),
    }
}
