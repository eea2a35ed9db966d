//! In-memory storage backend for Trakteer.
//!
//! Implements the `trakteer-auth` storage traits over [`dashmap::DashMap`].
//! Data lives for the lifetime of the process.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trakteer_auth::TokenCache;
//! use trakteer_db_memory::InMemoryTokenStorage;
//!
//! let tokens = Arc::new(InMemoryTokenStorage::new());
//! let cache = TokenCache::new(tokens.clone());
//! cache.init(10, std::time::Duration::from_millis(300)).await?;
//! ```

pub mod token;
pub mod user;

pub use token::InMemoryTokenStorage;
pub use user::InMemoryUserStorage;
