//! Authentication and authorization error types.
//!
//! Every failure surfaced by this crate to an HTTP caller is an [`AuthError`].
//! Component-level errors ([`JwtError`](crate::token::JwtError),
//! [`FederationError`](crate::federation::FederationError),
//! [`CacheError`](crate::cache::CacheError)) convert into it.

use std::fmt;

/// Errors that can occur while issuing, verifying or resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The bearer token is malformed, forged or otherwise unusable.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The session token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token is no longer the live session for its identity.
    #[error("Token revoked")]
    TokenRevoked,

    /// The `Authorization` header is present but not of the form `Bearer <token>`.
    #[error("Invalid authentication header: {message}")]
    InvalidAuthenticationToken {
        /// Description of the header problem.
        message: String,
    },

    /// Email and password do not match a user.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// A request field failed validation.
    #[error("Validation failed: {field} {message}")]
    Validation {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The request lacks an authenticated identity.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The identity is authenticated but not allowed to proceed.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// A federated identity token failed issuer, audience, expiry or signature checks.
    #[error("Federated token rejected: {message}")]
    FederatedClaimsRejected {
        /// Which check failed.
        message: String,
    },

    /// The identity provider could not be reached or did not return usable keys.
    #[error("Identity provider error: {provider} - {message}")]
    IdentityProvider {
        /// The identity provider name.
        provider: String,
        /// Description of the error.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The token cache cannot answer reliably.
    #[error("Token cache unavailable: {message}")]
    CacheUnavailable {
        /// Description of the cache state.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidAuthenticationToken` error.
    #[must_use]
    pub fn invalid_authentication_token(message: impl Into<String>) -> Self {
        Self::InvalidAuthenticationToken {
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `FederatedClaimsRejected` error.
    #[must_use]
    pub fn federated_claims_rejected(message: impl Into<String>) -> Self {
        Self::FederatedClaimsRejected {
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IdentityProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `CacheUnavailable` error.
    #[must_use]
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::CacheUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::InvalidAuthenticationToken { .. }
                | Self::InvalidCredentials
                | Self::Validation { .. }
                | Self::Unauthorized { .. }
                | Self::Forbidden { .. }
                | Self::FederatedClaimsRejected { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::IdentityProvider { .. }
                | Self::Storage { .. }
                | Self::CacheUnavailable { .. }
                | Self::Configuration { .. }
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if the presented credential itself was rejected.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::InvalidAuthenticationToken { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::TokenExpired => ErrorCategory::Token,
            Self::TokenRevoked => ErrorCategory::Token,
            Self::InvalidAuthenticationToken { .. } => ErrorCategory::Token,
            Self::InvalidCredentials => ErrorCategory::Authentication,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Unauthorized { .. } => ErrorCategory::Authentication,
            Self::Forbidden { .. } => ErrorCategory::Authorization,
            Self::FederatedClaimsRejected { .. } => ErrorCategory::Federation,
            Self::IdentityProvider { .. } => ErrorCategory::Federation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::CacheUnavailable { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of authentication/authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication-related errors (identity verification).
    Authentication,
    /// Authorization-related errors (account state checks).
    Authorization,
    /// Token-related errors (validation, expiration, revocation).
    Token,
    /// Malformed request input.
    Validation,
    /// Identity provider federation errors.
    Federation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Federation => write!(f, "federation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
