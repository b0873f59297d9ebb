//! User identity validation
//!
//! Two identifier shapes are accepted everywhere an identity enters the client:
//! `u_` followed by a hyphenated UUID, or `u_` followed by a 40 character hex
//! digest. Matching is case-insensitive.

use crate::{Result, TreeholeError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static UUID_IDENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^u_[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("valid identity regex")
});

static DIGEST_IDENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^u_[0-9a-f]{40}$").expect("valid identity regex"));

/// Whether `candidate` has one of the accepted identity shapes
pub fn is_valid_identity(candidate: &str) -> bool {
    UUID_IDENTITY.is_match(candidate) || DIGEST_IDENTITY.is_match(candidate)
}

/// A validated user identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap an identity. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if is_valid_identity(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(TreeholeError::IdentityInvalid)
        }
    }

    /// The identity string as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last six characters, used when a user has no display name
    pub fn short_label(&self) -> &str {
        let cut = self.0.len().saturating_sub(6);
        &self.0[cut..]
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = TreeholeError;

    fn try_from(value: String) -> Result<Self> {
        Identity::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
