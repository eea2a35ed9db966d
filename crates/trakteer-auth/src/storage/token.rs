//! Token storage trait.
//!
//! The backing store holds at most one live session token per identity;
//! writes are upserts keyed by identity.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;

/// A persisted session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Identity the token belongs to (the user's email).
    pub identity: String,

    /// The encoded session token.
    pub token: String,

    /// Role carried by the token.
    pub role: String,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the token stops being valid.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Storage operations for session tokens.
///
/// Callers bound every call with their own timeouts; implementations are not
/// expected to retry.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Returns the full identity → token mapping.
    async fn fetch_all(&self) -> AuthResult<HashMap<String, String>>;

    /// Inserts or replaces the token record for `record.identity`.
    async fn upsert(&self, record: TokenRecord) -> AuthResult<()>;

    /// Returns the token record for an identity, if any.
    async fn fetch_one(&self, identity: &str) -> AuthResult<Option<TokenRecord>>;

    /// Deletes the token record for an identity.
    ///
    /// Returns `true` if a record was removed.
    async fn delete(&self, identity: &str) -> AuthResult<bool>;
}
