//! Error types for the client library.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while talking to Frontegg.
///
/// Issuance failures surface as [`ClientError::Authentication`]. Everything the
/// tool transport raises is passed through unchanged so callers can decide
/// whether to retry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Vendor token issuance was rejected or returned an unusable body.
    ///
    /// Carries the HTTP status and the raw response body.
    #[error("Authentication error: {status} - {body}")]
    Authentication {
        /// HTTP status of the issuance response.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Network or HTTP request failure.
    ///
    /// DNS resolution, connection failures, timeouts configured on the HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The tool endpoint answered with a non-success HTTP status.
    #[error("HTTP error: {status} - {body}")]
    Http {
        /// HTTP status returned by the server.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The tool endpoint returned a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected or malformed response from a collaborator.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A request was attempted before the transport completed its handshake.
    #[error("Transport is not connected")]
    NotConnected,

    /// Error raised by a custom [`McpTransport`](crate::transport::McpTransport).
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// End-user token verification failed.
    ///
    /// The facade converts this into `false`; it is only seen when calling an
    /// [`IdentityVerifier`](crate::identity::IdentityVerifier) directly.
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Tool input is not a JSON object.
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    /// Client configuration issue.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A context value cannot be encoded as an HTTP header.
    #[error("Invalid header value for '{name}'")]
    InvalidHeader {
        /// Header name whose value was rejected.
        name: &'static str,
    },

    /// No service credential has been issued yet.
    #[error("No service credential available")]
    MissingCredential,

    /// Initialization of the shared instance failed.
    ///
    /// Every caller that waited on the same attempt receives the same error.
    #[error("Client initialization failed: {0}")]
    Initialization(#[source] Arc<ClientError>),

    /// A context update named a different agent than the one the client was built for.
    #[error("Agent id mismatch: client is bound to '{expected}', got '{actual}'")]
    AgentIdMismatch {
        /// Agent id fixed at construction.
        expected: String,
        /// Agent id passed by the caller.
        actual: String,
    },
}

impl ClientError {
    /// Check if this error is potentially retryable.
    ///
    /// Returns `true` for network errors, rate limits and 5xx responses.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } | Self::Authentication { status, .. } => {
                *status == 429 || *status >= 500
            }
            Self::Initialization(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// Check if this is a vendor token issuance failure.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Initialization(inner) => inner.is_authentication_error(),
            _ => false,
        }
    }

    /// Wrap an arbitrary transport error.
    pub fn transport(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transport(error.into())
    }
}

/// Result type alias using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
