//! OCI content digests.
//!
//! [`Digest`] is a validated `algorithm:hex` string. Parsing defers to
//! `oci_spec::image::Digest` so that the accepted grammar matches the OCI
//! image specification. [`DigestWriter`] hashes a byte stream while
//! forwarding it, which is how layer digests are computed in a single pass.

use crate::error::{LayupError, Result};
use oci_spec::image::Digest as OciDigest;
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

#[cfg(test)]
mod tests;

/// Represents a content digest such as `sha256:7173b8...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Computes the sha256 digest of `bytes`.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::Digest;
    ///
    /// let digest = Digest::sha256(b"");
    /// assert_eq!(
    ///     digest.to_string(),
    ///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    /// );
    /// ```
    pub fn sha256(bytes: &[u8]) -> Self {
        Self::from_sha256(Sha256::digest(bytes))
    }

    fn from_sha256<B: AsRef<[u8]>>(hash: B) -> Self {
        let mut hex = String::with_capacity(64);
        for byte in hash.as_ref() {
            hex.push_str(&format!("{:02x}", byte));
        }
        Digest(format!("sha256:{}", hex))
    }

    /// Returns the algorithm part, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or_default()
    }

    /// Returns the encoded hash part.
    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, h)| h).unwrap_or_default()
    }

    /// Returns the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks `bytes` against this digest.
    ///
    /// Only sha256 is supported; other algorithms are reported as a
    /// validation error rather than silently accepted.
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        if self.algorithm() != "sha256" {
            return Err(LayupError::validation(format!(
                "Unsupported digest algorithm: {}. Only sha256 is currently supported",
                self.algorithm()
            )));
        }

        let computed = Digest::sha256(bytes);
        if &computed != self {
            return Err(LayupError::validation(format!(
                "Digest mismatch: expected {}, computed {}",
                self, computed
            )));
        }
        Ok(())
    }
}

impl FromStr for Digest {
    type Err = LayupError;

    fn from_str(s: &str) -> Result<Self> {
        let oci_digest = OciDigest::from_str(s).map_err(|e| LayupError::Validation {
            message: format!("Invalid digest format: {}", e),
            source: Some(Box::new(e)),
        })?;
        let text = oci_digest.to_string();

        if let Some(hex) = text.strip_prefix("sha256:")
            && (hex.len() != 64 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
        {
            return Err(LayupError::validation(format!(
                "Invalid digest format: '{}' is not a sha256 hex string",
                s
            )));
        }

        Ok(Digest(text))
    }
}

impl TryFrom<String> for Digest {
    type Error = LayupError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A writer that hashes and counts everything written through it.
///
/// # Examples
///
/// ```
/// use liblayup::digest::{Digest, DigestWriter};
/// use std::io::Write;
///
/// let mut writer = DigestWriter::new(Vec::new());
/// writer.write_all(b"hello").unwrap();
/// let (inner, digest, size) = writer.finish();
///
/// assert_eq!(inner, b"hello");
/// assert_eq!(size, 5);
/// assert_eq!(digest, Digest::sha256(b"hello"));
/// ```
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Returns the number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Consumes the writer, returning the inner writer, the digest and the byte count.
    pub fn finish(self) -> (W, Digest, u64) {
        let digest = Digest::from_sha256(self.hasher.finalize());
        (self.inner, digest, self.written)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
