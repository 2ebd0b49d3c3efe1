use thiserror::Error;

/// Errors that end a single load attempt.
///
/// Every variant is `Clone` so one outcome can be handed to every caller
/// waiting on the same load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Cache write failed: {0}")]
    Storage(String),

    #[error("Feed was shut down before the load completed")]
    Cancelled,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FeedError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        FeedError::Http {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        FeedError::Storage(err.to_string())
    }

    /// Whether the failure came from the remote side rather than the cache.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            FeedError::Network(_) | FeedError::Http { .. } | FeedError::Decode(_)
        )
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FeedError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_short_body() {
        let err = FeedError::from_status(reqwest::StatusCode::UNAUTHORIZED, "Missing token");
        assert_eq!(
            err,
            FeedError::Http {
                status: 401,
                body: "Missing token".to_string()
            }
        );
        assert!(err.is_remote());
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = "x".repeat(2000);
        match FeedError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body) {
            FeedError::Http { status, body } => {
                assert_eq!(status, 500);
                assert!(body.starts_with(&"x".repeat(500)));
                assert!(body.ends_with("(truncated, 2000 total bytes)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = FeedError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }

    #[test]
    fn test_storage_is_not_remote() {
        assert!(!FeedError::storage("disk full").is_remote());
        assert!(!FeedError::Cancelled.is_remote());
    }
}
