//! Storage traits for auth-related data.
//!
//! Backends (see `trakteer-db-memory`) implement these traits; the auth crate
//! only consumes them.

pub mod token;
pub mod user;

pub use token::{TokenRecord, TokenStorage};
pub use user::{NewUser, User, UserStorage};
