//! Google ID token validation.
//!
//! A federated token is accepted only if its RS256 signature verifies against
//! the provider key named in its header, and all of the following hold:
//! the issuer is trusted, the audience is our client ID, the expiry is in the
//! future. The three claim checks are evaluated independently.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::certs::CertificateProvider;
use super::error::FederationError;
use crate::config::FederationConfig;

/// Identity claims carried by a Google ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedClaims {
    /// Email address of the signed-in account.
    #[serde(default)]
    pub email: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Whether the provider has verified the email address.
    #[serde(default)]
    pub email_verified: bool,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Issuer.
    #[serde(default)]
    pub iss: String,

    /// Audience (the OAuth client ID the token was minted for).
    #[serde(default)]
    pub aud: String,

    /// Expiration time (Unix timestamp).
    #[serde(default)]
    pub exp: i64,
}

/// Validates federated identity tokens.
pub struct FederatedTokenValidator {
    certificates: Arc<dyn CertificateProvider>,
    client_id: String,
    trusted_issuers: Vec<String>,
}

impl FederatedTokenValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        certificates: Arc<dyn CertificateProvider>,
        client_id: impl Into<String>,
        trusted_issuers: Vec<String>,
    ) -> Self {
        Self {
            certificates,
            client_id: client_id.into(),
            trusted_issuers,
        }
    }

    /// Creates a validator from the federation configuration.
    #[must_use]
    pub fn from_config(
        certificates: Arc<dyn CertificateProvider>,
        config: &FederationConfig,
    ) -> Self {
        Self::new(
            certificates,
            &config.client_id,
            config.trusted_issuers.clone(),
        )
    }

    /// Validates a federated token and returns its claims.
    ///
    /// # Errors
    ///
    /// Key lookup failures are returned as retryable errors
    /// (see [`FederationError::is_retryable`]); decoding, signature and claim
    /// failures are permanent.
    pub async fn validate(&self, token: &str) -> Result<FederatedClaims, FederationError> {
        self.validate_at(token, OffsetDateTime::now_utc()).await
    }

    /// Validates a federated token against the given current time.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub async fn validate_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<FederatedClaims, FederationError> {
        let header =
            decode_header(token).map_err(|e| FederationError::MalformedToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(FederationError::UnsupportedAlgorithm(format!(
                "{:?}",
                header.alg
            )));
        }
        let kid = header.kid.ok_or(FederationError::MissingKeyId)?;

        let key = self.certificates.decoding_key(&kid).await?;

        // Signature only; claims are checked below so each failure is reported on its own.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<FederatedClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    FederationError::InvalidSignature
                }
                _ => FederationError::MalformedToken(e.to_string()),
            })?
            .claims;

        self.check_claims(&claims, now)?;

        tracing::debug!(email = %claims.email, iss = %claims.iss, "Federated token validated");
        Ok(claims)
    }

    /// Applies the issuer, audience and expiry checks to decoded claims.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn check_claims(
        &self,
        claims: &FederatedClaims,
        now: OffsetDateTime,
    ) -> Result<(), FederationError> {
        if !self.trusted_issuers.iter().any(|iss| iss == &claims.iss) {
            return Err(FederationError::IssuerMismatch {
                actual: claims.iss.clone(),
            });
        }
        if claims.aud != self.client_id {
            return Err(FederationError::AudienceMismatch {
                expected: self.client_id.clone(),
                actual: claims.aud.clone(),
            });
        }
        if claims.exp <= now.unix_timestamp() {
            return Err(FederationError::TokenExpired);
        }
        Ok(())
    }
}
