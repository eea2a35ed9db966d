//! Federated identity (Google Sign-In) token validation.
//!
//! - [`certs`] - Fetching provider signing keys by key ID
//! - [`google`] - ID token signature and claim validation
//! - [`error`] - Federation error types

pub mod certs;
pub mod error;
pub mod google;

pub use certs::{CertificateProvider, HttpCertificateProvider};
pub use error::FederationError;
pub use google::{FederatedClaims, FederatedTokenValidator};
