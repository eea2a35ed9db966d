//! Error types for federated identity token validation.

use crate::error::AuthError;

/// Errors that can occur while validating a federated identity token.
///
/// Errors split into two classes:
/// - key lookup failures ([`is_retryable`](Self::is_retryable)), caused by
///   the identity provider's certificate endpoint;
/// - token or claims failures, which are permanent for the presented token.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The token could not be decoded.
    #[error("Malformed federated token: {0}")]
    MalformedToken(String),

    /// The token header names an algorithm other than RS256.
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The token header carries no key ID.
    #[error("Federated token is missing key ID (kid) header")]
    MissingKeyId,

    /// The certificate endpoint could not be reached or answered badly.
    #[error("Failed to fetch signing certificates: {0}")]
    KeyFetch(String),

    /// The certificate endpoint does not list the token's key ID.
    #[error("Signing key not found: {0}")]
    KeyNotFound(String),

    /// The certificate endpoint URL is unusable.
    #[error("Invalid certificate endpoint: {0}")]
    InvalidEndpoint(String),

    /// The token signature does not verify against the provider key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The issuer is not one of the trusted issuers.
    #[error("Issuer check failed: '{actual}' is not a trusted issuer")]
    IssuerMismatch {
        /// The issuer found in the token.
        actual: String,
    },

    /// The audience is not our client ID.
    #[error("Audience check failed: expected '{expected}', got '{actual}'")]
    AudienceMismatch {
        /// The configured client ID.
        expected: String,
        /// The audience found in the token.
        actual: String,
    },

    /// The token has expired.
    #[error("Expiry check failed: federated token has expired")]
    TokenExpired,
}

impl FederationError {
    /// Returns `true` if the failure came from fetching provider keys.
    ///
    /// Such failures may succeed when retried later; all others are permanent
    /// for the presented token.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyFetch(_) | Self::KeyNotFound(_))
    }

    /// Returns `true` if this is an issuer, audience or expiry violation.
    #[must_use]
    pub fn is_claims_violation(&self) -> bool {
        matches!(
            self,
            Self::IssuerMismatch { .. } | Self::AudienceMismatch { .. } | Self::TokenExpired
        )
    }
}

impl From<FederationError> for AuthError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::InvalidEndpoint(message) => AuthError::configuration(message),
            e if e.is_retryable() => AuthError::identity_provider("google", e.to_string()),
            e => AuthError::federated_claims_rejected(e.to_string()),
        }
    }
}
