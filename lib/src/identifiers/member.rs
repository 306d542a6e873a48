use std::{borrow::Borrow, fmt::Display};

use serde::{Deserialize, Serialize};

/// The name a participant picked when joining a session.
///
/// Names are compared byte for byte, so `Alice` and `alice` are two
/// different members. The empty name is reserved for envelopes the
/// server emits on its own behalf (see [`MemberId::host`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Identifier stamped on envelopes that originate from the server.
    pub const fn host() -> Self {
        Self(String::new())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_host(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for MemberId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
