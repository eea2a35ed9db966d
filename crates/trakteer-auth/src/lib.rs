//! # trakteer-auth
//!
//! Session credentials for the Trakteer API.
//!
//! This crate provides:
//! - Session token issuing and verification (HS256)
//! - Email and password registration with Argon2 password hashes
//! - Google Sign-In federated token validation
//! - An in-memory cache of live session tokens, kept fresh from the token store
//! - Per-request identity resolution and authorization gates for axum
//!
//! ## Overview
//!
//! A login issues a signed session token, stores it as the identity's only
//! live session and adds it to the [`TokenCache`]. Every request then runs
//! through [`resolve_identity`](middleware::resolve_identity), which verifies
//! the bearer token and cross-checks it against the cache (falling back to
//! the store on a miss) before loading the user. Logging out deletes the live
//! session, so the old token stops resolving immediately.
//!
//! ## Modules
//!
//! - [`config`] - Session, federation and cache configuration
//! - [`token`] - Session token issuing and verification
//! - [`credentials`] - Password hashing and email checks
//! - [`federation`] - Federated identity token validation
//! - [`cache`] - Token cache and its background refresher
//! - [`session`] - Login and logout
//! - [`middleware`] - HTTP identity resolution and gates
//! - [`storage`] - Storage traits for users and tokens

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod federation;
pub mod middleware;
pub mod session;
pub mod storage;
pub mod token;

#[cfg(test)]
mod testing;

pub use cache::{CacheError, CacheVersion, RefresherHandle, TokenCache, TokenCacheRefresher};
pub use config::{AuthConfig, ConfigError};
pub use credentials::{hash_password, validate_email, verify_password};
pub use error::{AuthError, ErrorCategory};
pub use federation::{
    CertificateProvider, FederatedClaims, FederatedTokenValidator, FederationError,
    HttpCertificateProvider,
};
pub use middleware::{
    AuthState, CurrentIdentity, Identity, RequireActivated, RequireAuthenticated,
    resolve_identity,
};
pub use session::{IssuedSession, SessionService};
pub use storage::{NewUser, TokenRecord, TokenStorage, User, UserStorage};
pub use token::{IssuedToken, JwtError, SessionClaims, SessionTokenService};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use trakteer_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::cache::{CacheError, TokenCache, TokenCacheRefresher};
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::middleware::{
        AuthState, CurrentIdentity, Identity, RequireActivated, RequireAuthenticated,
        resolve_identity,
    };
    pub use crate::session::{IssuedSession, SessionService};
    pub use crate::storage::{NewUser, TokenRecord, TokenStorage, User, UserStorage};
    pub use crate::token::SessionTokenService;
}
