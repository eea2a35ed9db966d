//! Identity → token snapshot.
//!
//! The cache serves the resolver's per-request cross-check without touching
//! the token store. Its contents come from full reloads; local [`add`] and
//! [`remove`] calls make a fresh login or logout visible before the next one.
//!
//! A reload fetches the store mapping without holding the lock, so a local
//! mutation may land while the fetch is in flight. While any reload is
//! fetching, local mutations are journaled with a sequence number, and a
//! reload replays the entries recorded after it started on top of the fetched
//! mapping before installing it. Entries older than every in-flight reload
//! are already reflected in the store data and are dropped; with no reload in
//! flight the journal is empty.
//!
//! [`add`]: TokenCache::add
//! [`remove`]: TokenCache::remove

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::CacheError;
use crate::AuthResult;
use crate::storage::TokenStorage;

#[derive(Debug, Clone)]
enum LocalChange {
    Add { identity: String, token: String },
    Remove { identity: String },
}

impl LocalChange {
    fn apply(&self, tokens: &mut HashMap<String, String>) {
        match self {
            Self::Add { identity, token } => {
                tokens.insert(identity.clone(), token.clone());
            }
            Self::Remove { identity } => {
                tokens.remove(identity);
            }
        }
    }
}

#[derive(Default)]
struct Snapshot {
    tokens: HashMap<String, String>,
    loaded_at: Option<OffsetDateTime>,
    /// Sequence number of the latest local change.
    seq: u64,
    journal: Vec<(u64, LocalChange)>,
}

/// Opaque position in the cache's local change history.
///
/// Taken with [`TokenCache::version`] and checked by
/// [`TokenCache::add_if_unchanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheVersion(u64);

/// In-memory mirror of the token store.
pub struct TokenCache {
    storage: Arc<dyn TokenStorage>,
    snapshot: RwLock<Snapshot>,
    /// Start sequence numbers of the reloads currently fetching.
    in_flight: Mutex<Vec<u64>>,
    available: AtomicBool,
}

/// Deregisters a reload that is dropped before it installs.
struct InFlightReload<'a> {
    in_flight: &'a Mutex<Vec<u64>>,
    started_at_seq: u64,
}

impl Drop for InFlightReload<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if let Some(pos) = in_flight.iter().position(|s| *s == self.started_at_seq) {
            in_flight.swap_remove(pos);
        }
    }
}

impl TokenCache {
    /// Creates an empty, uninitialized cache over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            storage,
            snapshot: RwLock::new(Snapshot::default()),
            in_flight: Mutex::new(Vec::new()),
            available: AtomicBool::new(false),
        }
    }

    /// Performs the initial load, retrying with linear backoff.
    ///
    /// After failed attempt `n` the cache waits `n × retry_period` before
    /// trying again, for at most `max_retries` attempts.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotAvailable`] when every attempt failed. The
    /// cache must not be used to serve traffic in that case.
    pub async fn init(&self, max_retries: u32, retry_period: Duration) -> Result<(), CacheError> {
        let mut last_error = String::from("no load attempted");

        for attempt in 1..=max_retries {
            match self.reload().await {
                Ok(count) => {
                    tracing::info!(attempt, tokens = count, "Token cache initialized");
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt == max_retries {
                        break;
                    }
                    let backoff = retry_backoff(retry_period, attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = max_retries,
                        error = %e,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Token cache load failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        tracing::error!(
            attempts = max_retries,
            error = %last_error,
            "Token cache could not be initialized"
        );
        Err(CacheError::NotAvailable {
            attempts: max_retries,
            last_error,
        })
    }

    /// Replaces the snapshot with the store's current mapping.
    ///
    /// Returns the number of cached tokens. On error the previous snapshot
    /// stays in place.
    ///
    /// # Errors
    ///
    /// Propagates the storage error from `fetch_all`.
    pub async fn reload(&self) -> AuthResult<usize> {
        let guard = {
            // Holding the read lock keeps local changes out while registering.
            let snapshot = self.snapshot.read().await;
            self.in_flight.lock().push(snapshot.seq);
            InFlightReload {
                in_flight: &self.in_flight,
                started_at_seq: snapshot.seq,
            }
        };

        let fetched = self.storage.fetch_all().await;

        let mut snapshot = self.snapshot.write().await;
        let started_at_seq = guard.started_at_seq;
        drop(guard);
        let oldest_in_flight = self.in_flight.lock().iter().min().copied();

        let result = fetched.map(|mut tokens| {
            for (seq, change) in &snapshot.journal {
                if *seq > started_at_seq {
                    change.apply(&mut tokens);
                }
            }
            let count = tokens.len();
            snapshot.tokens = tokens;
            snapshot.loaded_at = Some(OffsetDateTime::now_utc());
            count
        });

        match oldest_in_flight {
            Some(oldest) => snapshot.journal.retain(|(seq, _)| *seq > oldest),
            None => snapshot.journal.clear(),
        }
        drop(snapshot);

        let count = result?;
        self.available.store(true, Ordering::Release);
        tracing::debug!(tokens = count, "Token cache reloaded");
        Ok(count)
    }

    /// Returns `true` if `identity` is cached with exactly `token`.
    pub async fn matches(&self, identity: &str, token: &str) -> bool {
        self.snapshot
            .read()
            .await
            .tokens
            .get(identity)
            .is_some_and(|cached| cached == token)
    }

    /// Returns `true` if any token is cached for `identity`.
    pub async fn contains(&self, identity: &str) -> bool {
        self.snapshot.read().await.tokens.contains_key(identity)
    }

    /// Caches `token` as the live token for `identity`.
    ///
    /// Does not write to the store.
    pub async fn add(&self, identity: impl Into<String>, token: impl Into<String>) {
        let change = LocalChange::Add {
            identity: identity.into(),
            token: token.into(),
        };
        let mut snapshot = self.snapshot.write().await;
        self.record(&mut snapshot, change);
    }

    /// Drops the cached token for `identity`.
    ///
    /// Returns `true` if a token was cached. Does not write to the store.
    pub async fn remove(&self, identity: &str) -> bool {
        let mut snapshot = self.snapshot.write().await;
        let present = snapshot.tokens.contains_key(identity);
        self.record(
            &mut snapshot,
            LocalChange::Remove {
                identity: identity.to_string(),
            },
        );
        present
    }

    /// Current position in the local change history.
    pub async fn version(&self) -> CacheVersion {
        CacheVersion(self.snapshot.read().await.seq)
    }

    /// Caches `token` for `identity` only if no local change happened since
    /// `since`.
    ///
    /// A store read taken after `since` may predate a concurrent login or
    /// logout; re-caching it would undo that change. Returns `true` if the
    /// token was cached.
    pub async fn add_if_unchanged(
        &self,
        identity: impl Into<String>,
        token: impl Into<String>,
        since: CacheVersion,
    ) -> bool {
        let mut snapshot = self.snapshot.write().await;
        if snapshot.seq != since.0 {
            return false;
        }
        let change = LocalChange::Add {
            identity: identity.into(),
            token: token.into(),
        };
        self.record(&mut snapshot, change);
        true
    }

    fn record(&self, snapshot: &mut Snapshot, change: LocalChange) {
        snapshot.seq += 1;
        change.apply(&mut snapshot.tokens);
        if !self.in_flight.lock().is_empty() {
            let seq = snapshot.seq;
            snapshot.journal.push((seq, change));
        }
    }

    /// Time of the last successful reload.
    pub async fn last_loaded_at(&self) -> Option<OffsetDateTime> {
        self.snapshot.read().await.loaded_at
    }

    /// Number of cached identities.
    pub async fn len(&self) -> usize {
        self.snapshot.read().await.tokens.len()
    }

    /// Returns `true` if no identities are cached.
    pub async fn is_empty(&self) -> bool {
        self.snapshot.read().await.tokens.is_empty()
    }

    /// Returns `true` once a load has succeeded and the cache has not been
    /// declared unavailable since.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Declares the cache unusable until the next successful reload.
    pub fn mark_unavailable(&self) {
        if self.available.swap(false, Ordering::AcqRel) {
            tracing::warn!("Token cache marked unavailable");
        }
    }

    /// Returns `true` if the last successful load is older than `threshold`
    /// at `now`, or if no load ever succeeded.
    pub async fn is_stale(&self, threshold: Duration, now: OffsetDateTime) -> bool {
        match self.last_loaded_at().await {
            Some(loaded_at) => now > loaded_at + threshold,
            None => true,
        }
    }

    #[cfg(test)]
    async fn journal_len(&self) -> usize {
        self.snapshot.read().await.journal.len()
    }
}

/// Wait after failed attempt `attempt`, saturating at `Duration::MAX`.
fn retry_backoff(retry_period: Duration, attempt: u32) -> Duration {
    retry_period.saturating_mul(attempt)
}
