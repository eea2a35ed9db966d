//! Session token generation and validation.

pub mod jwt;

pub use jwt::{IssuedToken, JwtError, SESSION_ALGORITHM, SessionClaims, SessionTokenService};
