//! Content fingerprints for source snippets
//!
//! A snippet is identified only by its bytes. The fingerprint is the SHA-256
//! digest of those bytes rendered as lowercase hex, and it is the sole key of
//! the build cache: it names both the cache entry directory and the files in it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Immutable source text supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Snippet(String);

impl Snippet {
    /// Wrap source text
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    /// The raw source text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bytes written to disk and hashed
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Compute the fingerprint of this snippet
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.as_bytes())
    }
}

impl From<String> for Snippet {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Snippet {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Deterministic content identifier (SHA-256 hash as hex string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of arbitrary bytes
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hex::encode(hash))
    }

    /// Parse a fingerprint from its hex form
    ///
    /// # Errors
    ///
    /// Returns error if the string is not 64 lowercase hex digits
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let s = hex.into();
        let valid = s.len() == 64
            && s
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, 'a'..='f'));
        if valid {
            Ok(Self(s))
        } else {
            Err(Error::invalid_fingerprint(s))
        }
    }

    /// Get the hex representation
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines and reports
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Fingerprint a snippet
#[must_use]
pub fn fingerprint(snippet: &Snippet) -> Fingerprint {
    snippet.fingerprint()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_same_fingerprint() {
        let a = Snippet::new("package main\nfunc main() {}\n");
        let b = Snippet::new(String::from("package main\nfunc main() {}\n"));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_one_byte_changes_fingerprint() {
        let a = Snippet::new("print OK");
        let b = Snippet::new("print OK ");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_empty_snippet_is_valid() {
        let fp = Snippet::new("").fingerprint();
        assert_eq!(
            fp.as_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_from_hex_round_trips_display() {
        let fp = Snippet::new("hello").fingerprint();
        let parsed = Fingerprint::from_hex(fp.to_string()).unwrap();
        assert_eq!(parsed, fp);
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex("Z".repeat(64)).is_err());
        assert!(Fingerprint::from_hex("A".repeat(64)).is_err());
        assert!(Fingerprint::from_hex("../".repeat(22)).is_err());
    }

    #[test]
    fn test_serde_rejects_invalid_fingerprint() {
        let ok: Fingerprint = serde_json::from_str(&format!("\"{}\"", "a".repeat(64))).unwrap();
        assert_eq!(ok.as_hex().len(), 64);
        assert!(serde_json::from_str::<Fingerprint>("\"nope\"").is_err());
    }
}
