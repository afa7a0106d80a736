//! Expected-hash handling for verified downloads.
use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::str::FromStr;

use sha2::Digest;

use crate::error::{self, DeployError};

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MD5" => Ok(Self::Md5),
            "SHA1" => Ok(Self::Sha1),
            "SHA224" => Ok(Self::Sha224),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            "SHA3_224" | "SHA3_256" | "SHA3_384" | "SHA3_512" => Err(DeployError::argument(format!(
                "DOWNLOAD EXPECTED_HASH given unsupported ALGO: {s}"
            ))),
            _ => Err(DeployError::argument(format!(
                "DOWNLOAD EXPECTED_HASH given unknown ALGO: {s}"
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha224 => "SHA224",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        };
        f.write_str(name)
    }
}

impl HashAlgorithm {
    /// Lowercase hex digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn hash_file(self, path: &Path) -> io::Result<String> {
        let reader = BufReader::new(File::open(path)?);
        match self {
            Self::Md5 => digest_reader::<md5::Md5>(reader),
            Self::Sha1 => digest_reader::<sha1::Sha1>(reader),
            Self::Sha224 => digest_reader::<sha2::Sha224>(reader),
            Self::Sha256 => digest_reader::<sha2::Sha256>(reader),
            Self::Sha384 => digest_reader::<sha2::Sha384>(reader),
            Self::Sha512 => digest_reader::<sha2::Sha512>(reader),
        }
    }
}

fn digest_reader<D: Digest + io::Write>(mut reader: impl io::Read) -> io::Result<String> {
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)?;
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in &digest {
        write!(hex, "{b:02x}").unwrap_or(());
    }
    Ok(hex)
}

/// A digest the transferred file must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedHash {
    /// Digest algorithm.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
    label: String,
}

impl ExpectedHash {
    /// Parse `ALGO=value`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] when `=` is missing or the
    /// algorithm is unknown or unsupported.
    pub fn parse(spec: &str) -> error::Result<Self> {
        let (algo, value) = spec.split_once('=').ok_or_else(|| {
            DeployError::argument(format!(
                "DOWNLOAD EXPECTED_HASH expects ALGO=value but got: {spec}"
            ))
        })?;
        let algorithm: HashAlgorithm = algo.parse()?;
        Ok(Self {
            algorithm,
            digest: value.to_ascii_lowercase(),
            label: format!("{algo} hash"),
        })
    }

    /// The legacy `EXPECTED_MD5` form.
    #[must_use]
    pub fn md5(value: &str) -> Self {
        Self {
            algorithm: HashAlgorithm::Md5,
            digest: value.to_ascii_lowercase(),
            label: "MD5 sum".to_string(),
        }
    }

    /// How the hash is named in status messages (`SHA256 hash`, `MD5 sum`).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Hash `path` and return the actual digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn actual(&self, path: &Path) -> io::Result<String> {
        self.algorithm.hash_file(path)
    }
}
