//! Bearer token handed to the feed by whoever owns the login session.
//!
//! The feed never validates or refreshes the token; an expired one simply
//! comes back from the server as an HTTP 401.

use std::fmt;
use std::sync::Arc;

/// Opaque bearer token. Clone is cheap and `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the token from `STORYFEED_TOKEN`, if set and non-empty
    pub fn from_env() -> Option<Self> {
        std::env::var("STORYFEED_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Self::new(t.trim()))
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let token = AuthToken::new("eyJhbGciOiJIUzI1NiJ9.secret");
        assert_eq!(format!("{:?}", token), "AuthToken(***)");
        assert_eq!(token.as_str(), "eyJhbGciOiJIUzI1NiJ9.secret");
    }
}
