//! Error types for the ThreatGlobe environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, Error)]
pub enum EnvError {
    /// Image download failed (HTTP error, connection closed, etc.)
    #[error("Fetch error for {url}: {reason}")]
    FetchError { url: String, reason: String },

    /// Downloaded bytes could not be turned into a bitmap
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a fetch error for the given URL.
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchError {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = EnvError::fetch("https://example.org/a.png", "404");
        assert_eq!(
            err.to_string(),
            "Fetch error for https://example.org/a.png: 404"
        );
    }
}
