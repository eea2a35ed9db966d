//! Session token issuing and verification.
//!
//! Session tokens are JWTs signed with a shared secret using HS256. Only that
//! algorithm is accepted on verification: a token whose header names any other
//! algorithm is rejected before its signature is looked at.
//!
//! ## Example
//!
//! ```ignore
//! use trakteer_auth::token::SessionTokenService;
//!
//! let service = SessionTokenService::new(secret.as_bytes(), "trakteer", Duration::from_secs(86_400));
//!
//! let issued = service.issue("a@b.com", "user")?;
//! let claims = service.verify(&issued.token)?;
//! assert_eq!(claims.sub, "a@b.com");
//! ```

use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::AuthError;

/// The only algorithm session tokens are signed and verified with.
pub const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during session token operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token header names an algorithm other than HS256.
    #[error("Unexpected signing algorithm: {algorithm}")]
    UnexpectedAlgorithm {
        /// The algorithm found in the token header.
        algorithm: String,
    },

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// A required claim is missing.
    #[error("Missing required claim: {claim}")]
    MissingClaim {
        /// Name of the missing claim.
        claim: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `UnexpectedAlgorithm` error.
    #[must_use]
    pub fn unexpected_algorithm(algorithm: impl Into<String>) -> Self {
        Self::UnexpectedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim {
            claim: claim.into(),
        }
    }

    /// Returns `true` if the token was well-formed and correctly signed but has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    /// Returns `true` if the claims set itself is unusable (missing or mistyped fields).
    #[must_use]
    pub fn is_claims_error(&self) -> bool {
        matches!(self, Self::InvalidClaims { .. } | Self::MissingClaim { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::unexpected_algorithm(err.to_string())
            }
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature => Self::invalid_claims(err.to_string()),
            ErrorKind::MissingRequiredClaim(claim) => Self::missing_claim(claim.clone()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::EncodingError { message } => AuthError::internal(message),
            other => AuthError::invalid_token(other.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the identity (email) the token was issued to.
    pub sub: String,

    /// Role of the identity at issuance.
    pub role: String,

    /// Unique token identifier.
    pub jti: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Audience.
    pub aud: String,
}

impl SessionClaims {
    /// Returns `true` if the claims have expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.exp <= now.unix_timestamp()
    }
}

/// A freshly issued session token together with its claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded token.
    pub token: String,
    /// The claims encoded in `token`.
    pub claims: SessionClaims,
    /// Issuance time.
    pub issued_at: OffsetDateTime,
    /// Expiry time.
    pub expires_at: OffsetDateTime,
}

// ============================================================================
// Session Token Service
// ============================================================================

/// Issues and verifies session tokens.
///
/// Immutable after construction; share it behind an `Arc`.
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    audience: String,
    lifetime: Duration,
}

impl SessionTokenService {
    /// Creates a new session token service.
    ///
    /// # Arguments
    /// * `secret` - Shared HMAC secret
    /// * `audience` - Audience claim stamped into and required from every token
    /// * `lifetime` - Validity window of issued tokens
    #[must_use]
    pub fn new(secret: &[u8], audience: impl Into<String>, lifetime: Duration) -> Self {
        let audience = audience.into();

        let mut validation = Validation::new(SESSION_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            audience,
            lifetime,
        }
    }

    /// Creates a service from the session configuration.
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.secret.as_bytes(), &config.audience, config.expires)
    }

    /// Issues a session token for `identity` with `role`.
    ///
    /// # Errors
    /// Returns `EncodingError` if signing fails.
    pub fn issue(&self, identity: &str, role: &str) -> Result<IssuedToken, JwtError> {
        self.issue_at(identity, role, OffsetDateTime::now_utc())
    }

    /// Issues a session token as if the current time were `issued_at`.
    ///
    /// # Errors
    /// Returns `EncodingError` if signing fails.
    pub fn issue_at(
        &self,
        identity: &str,
        role: &str,
        issued_at: OffsetDateTime,
    ) -> Result<IssuedToken, JwtError> {
        let expires_at = issued_at + self.lifetime;
        let claims = SessionClaims {
            sub: identity.to_string(),
            role: role.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::new(SESSION_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))?;

        Ok(IssuedToken {
            token,
            claims,
            issued_at,
            expires_at,
        })
    }

    /// Verifies a session token and returns its claims.
    ///
    /// # Errors
    /// Returns `Expired` if the token's expiry has passed, and another variant
    /// if the token is malformed, forged or signed with a different algorithm.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, JwtError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Verifies a session token against the given current time.
    ///
    /// # Errors
    /// See [`verify`](Self::verify).
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<SessionClaims, JwtError> {
        let claims = self.decode_checked(token, now)?;
        serde_json::from_value(Value::Object(claims))
            .map_err(|e| JwtError::invalid_claims(e.to_string()))
    }

    /// Verifies a session token and returns only its subject identity.
    ///
    /// # Errors
    /// Same as [`verify`](Self::verify); additionally `MissingClaim` when
    /// there is no `sub` claim and `InvalidClaims` when it is not a non-empty string.
    pub fn extract_identity(&self, token: &str) -> Result<String, JwtError> {
        self.extract_identity_at(token, OffsetDateTime::now_utc())
    }

    /// Extracts the subject identity against the given current time.
    ///
    /// # Errors
    /// See [`extract_identity`](Self::extract_identity).
    pub fn extract_identity_at(&self, token: &str, now: OffsetDateTime) -> Result<String, JwtError> {
        let claims = self.decode_checked(token, now)?;
        match claims.get("sub") {
            Some(Value::String(sub)) if !sub.is_empty() => Ok(sub.clone()),
            Some(Value::String(_)) => Err(JwtError::invalid_claims("subject claim is empty")),
            Some(_) => Err(JwtError::invalid_claims("subject claim is not a string")),
            None => Err(JwtError::missing_claim("sub")),
        }
    }

    /// Returns the audience stamped into issued tokens.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Returns the validity window of issued tokens.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Shared decode path: algorithm check, signature and audience validation,
    /// then an explicit expiry check against `now`.
    fn decode_checked(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Map<String, Value>, JwtError> {
        let header = decode_header(token)?;
        if header.alg != SESSION_ALGORITHM {
            return Err(JwtError::unexpected_algorithm(format!("{:?}", header.alg)));
        }

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)?;

        let exp = data
            .claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or_else(|| JwtError::invalid_claims("exp claim is not an integer"))?;
        if exp <= now.unix_timestamp() {
            return Err(JwtError::Expired);
        }

        Ok(data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
