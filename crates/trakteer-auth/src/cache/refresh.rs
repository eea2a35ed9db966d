//! Background refresh of the token cache.
//!
//! The refresher reloads the cache on a fixed period. A failed reload is
//! tolerated while the last good snapshot is younger than the validity
//! threshold; past it, the refresher marks the cache unavailable and stops
//! with [`CacheError::TooOld`]. A shutdown signal stops it with `Ok(())`.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::CacheError;
use super::token_cache::TokenCache;
use crate::config::TokenCacheConfig;

/// Periodically reloads a [`TokenCache`].
pub struct TokenCacheRefresher {
    cache: Arc<TokenCache>,
    refresh_period: Duration,
    validity_threshold: Duration,
}

impl TokenCacheRefresher {
    /// Creates a refresher.
    #[must_use]
    pub fn new(
        cache: Arc<TokenCache>,
        refresh_period: Duration,
        validity_threshold: Duration,
    ) -> Self {
        Self {
            cache,
            refresh_period,
            validity_threshold,
        }
    }

    /// Creates a refresher from the cache configuration.
    #[must_use]
    pub fn from_config(cache: Arc<TokenCache>, config: &TokenCacheConfig) -> Self {
        Self::new(cache, config.refresh_period, config.validity_threshold)
    }

    /// Runs the refresh loop until shutdown or until the cache goes stale.
    ///
    /// The first reload happens one period after the call; the cache is
    /// expected to have been initialized already.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::TooOld`] when a reload fails and the last
    /// successful one is older than the validity threshold.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), CacheError> {
        info!(
            refresh_period = ?self.refresh_period,
            validity_threshold = ?self.validity_threshold,
            "Token cache refresher started"
        );

        let mut ticker = interval(self.refresh_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_once(OffsetDateTime::now_utc()).await?;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Token cache refresher shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn refresh_once(&self, now: OffsetDateTime) -> Result<(), CacheError> {
        let err = match self.cache.reload().await {
            Ok(count) => {
                debug!(tokens = count, "Token cache refreshed");
                return Ok(());
            }
            Err(e) => e,
        };

        let last_loaded_at = self.cache.last_loaded_at().await;
        warn!(
            error = %err,
            last_loaded_at = ?last_loaded_at,
            "Token cache refresh failed"
        );

        if self.cache.is_stale(self.validity_threshold, now).await {
            error!(
                last_loaded_at = ?last_loaded_at,
                validity_threshold = ?self.validity_threshold,
                "Token cache is too old, giving up"
            );
            self.cache.mark_unavailable();
            return Err(CacheError::TooOld {
                last_loaded_at,
                threshold: self.validity_threshold,
            });
        }
        Ok(())
    }

    /// Spawns the refresh loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> RefresherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        RefresherHandle {
            shutdown: shutdown_tx,
            task,
            outcome: None,
        }
    }
}

/// Handle to a spawned [`TokenCacheRefresher`].
pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), CacheError>>,
    /// Result of the loop, once [`exited`](Self::exited) has observed it.
    outcome: Option<Result<(), CacheError>>,
}

impl RefresherHandle {
    /// Signals the refresher to stop.
    pub fn shutdown(&self) {
        // The task may already have exited.
        let _ = self.shutdown.send(true);
    }

    /// Returns `true` if the refresh loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.task.is_finished()
    }

    /// Waits for the refresh loop to exit without consuming the handle.
    ///
    /// Cancel safe. The loop's result is kept for [`join`](Self::join).
    pub async fn exited(&mut self) {
        if self.outcome.is_none() {
            let result = (&mut self.task).await;
            self.outcome = Some(flatten(result));
        }
    }

    /// Waits for the refresh loop to exit and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or [`CacheError::Stopped`] if the task
    /// panicked or was aborted.
    pub async fn join(self) -> Result<(), CacheError> {
        match self.outcome {
            Some(outcome) => outcome,
            None => flatten(self.task.await),
        }
    }

    /// Signals shutdown and waits for the loop to exit.
    ///
    /// # Errors
    ///
    /// See [`join`](Self::join).
    pub async fn stop(self) -> Result<(), CacheError> {
        self.shutdown();
        self.join().await
    }
}

fn flatten(
    result: Result<Result<(), CacheError>, tokio::task::JoinError>,
) -> Result<(), CacheError> {
    result.unwrap_or_else(|e| Err(CacheError::Stopped(e.to_string())))
}
