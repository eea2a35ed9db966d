//! HTTP middleware for request authentication.
//!
//! - [`resolve_identity`] - resolves the caller for every request
//! - [`CurrentIdentity`], [`RequireAuthenticated`], [`RequireActivated`] -
//!   extractors gating handlers on the resolved identity
//! - `IntoResponse` for [`AuthError`](crate::AuthError) with the
//!   `{"error": ...}` envelope

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{
    AuthState, CurrentIdentity, RequireActivated, RequireAuthenticated, resolve, resolve_identity,
};
pub use error::error_response;
pub use types::Identity;
