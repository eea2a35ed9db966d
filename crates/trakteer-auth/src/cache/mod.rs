//! In-memory token cache.
//!
//! - [`TokenCache`] - identity → token snapshot with bounded-retry initialization
//! - [`TokenCacheRefresher`] - periodic reload with staleness escalation

pub mod refresh;
pub mod token_cache;

use std::time::Duration;

use time::OffsetDateTime;

pub use refresh::{RefresherHandle, TokenCacheRefresher};
pub use token_cache::{CacheVersion, TokenCache};

use crate::error::AuthError;

/// Errors that make the token cache unusable.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Initialization exhausted its retries without a successful load.
    #[error("token cache not available after {attempts} attempts: {last_error}")]
    NotAvailable {
        /// Number of load attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// Background refresh kept failing past the validity threshold.
    #[error("token cache too old: last loaded at {last_loaded_at:?}, threshold {threshold:?}")]
    TooOld {
        /// Time of the last successful load, if any.
        last_loaded_at: Option<OffsetDateTime>,
        /// Configured validity threshold.
        threshold: Duration,
    },

    /// The refresh task ended abnormally.
    #[error("token cache refresher stopped: {0}")]
    Stopped(String),
}

impl From<CacheError> for AuthError {
    fn from(err: CacheError) -> Self {
        AuthError::cache_unavailable(err.to_string())
    }
}
