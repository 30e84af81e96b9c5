//! Access tokens.
//!
//! An access token is the opaque credential bound 1:1 to a session. Knowing
//! the token is what lets a renter lease the session, so tokens must be
//! unguessable and must never appear whole in logs.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random bytes behind each token (hex-encoded on the wire).
const TOKEN_BYTES: usize = 32;

/// An opaque, cryptographically random access token.
///
/// The `Debug` impl redacts everything past the first eight characters so
/// tokens stay out of diagnostic output; use [`AccessToken::as_str`] when the
/// full value is genuinely needed (responses, redirect URLs).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Generate a fresh token from 32 CSPRNG bytes.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a token received from a caller.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Return the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A redacted prefix suitable for logging.
    #[must_use]
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", self.redacted())
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
