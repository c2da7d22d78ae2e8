//! Error types for GitHub App authentication and API access.

use thiserror::Error;

/// Failures while authenticating as the app or the installation.
///
/// This type is `Clone` so a single token refresh can hand the same outcome
/// to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The private key could not be parsed as a PEM-encoded RSA key.
    /// Retrying cannot help.
    #[error("Invalid GitHub App private key: {0}")]
    KeyFormat(String),

    /// Signing the app JWT or exchanging it for an installation token failed.
    #[error("Failed to obtain installation access token: {0}")]
    TokenAcquisition(String),
}

impl AuthError {
    pub fn token_acquisition(message: impl Into<String>) -> Self {
        Self::TokenAcquisition(message.into())
    }
}

/// Errors that can occur when calling the GitHub REST API.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Network-level error during HTTP communication.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// GitHub answered with a non-success status.
    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("Invalid response from GitHub: {0}")]
    InvalidResponse(String),

    /// An endpoint URL could not be built from the configured base URL.
    #[error("Invalid GitHub API URL: {0}")]
    InvalidUrl(String),

    /// File content could not be decoded.
    #[error("Failed to decode file content: {0}")]
    Decode(String),
}

impl GitHubError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// True for 401/403, which mean the installation token is no longer accepted.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 401 || *status == 403)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_rejection() {
        assert!(GitHubError::api_error(401, "Bad credentials").is_auth_rejection());
        assert!(GitHubError::api_error(403, "Forbidden").is_auth_rejection());
        assert!(!GitHubError::api_error(404, "Not Found").is_auth_rejection());
        assert!(!GitHubError::from(AuthError::KeyFormat("bad".into())).is_auth_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = GitHubError::api_error(502, "Bad Gateway");
        assert_eq!(err.to_string(), "GitHub API error: 502 - Bad Gateway");

        let err = GitHubError::from(AuthError::token_acquisition("timed out"));
        assert_eq!(
            err.to_string(),
            "Failed to obtain installation access token: timed out"
        );
    }
}
