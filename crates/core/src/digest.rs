//! Content digest of a container image.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Content-addressed identifier of an image, e.g. `sha256:9f86d0...`.
///
/// The registry reports it as an opaque version name and the container
/// runtime reports it after the `@` of the resolved image reference; both
/// sides are compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Create a digest, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDigest`] when the value is empty or contains
    /// whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::invalid_digest(value, "digest is empty"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(Error::invalid_digest(value, "digest contains whitespace"));
        }
        Ok(Self(value))
    }

    /// Borrow the digest text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}
