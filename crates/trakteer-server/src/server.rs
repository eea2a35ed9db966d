use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use trakteer_auth::{TokenCacheRefresher, TokenStorage, UserStorage, resolve_identity};
use trakteer_db_memory::{InMemoryTokenStorage, InMemoryUserStorage};

use crate::{config::AppConfig, handlers, state::AppState};

pub struct TrakteerServer {
    addr: SocketAddr,
    config: AppConfig,
    state: AppState,
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;

    // Health checks stay reachable whatever the Authorization header says.
    let health = Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz));

    let api = Router::new()
        .route("/v1/auth/register", post(handlers::register))
        .route("/v1/auth/login", post(handlers::login))
        .route("/v1/auth/google", post(handlers::google_login))
        .route("/v1/auth/logout", post(handlers::logout))
        .route("/v1/me", get(handlers::me))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            resolve_identity,
        ));

    health
        .merge(api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri(),
                )
            }),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    config: AppConfig,
    token_storage: Option<Arc<dyn TokenStorage>>,
    user_storage: Option<Arc<dyn UserStorage>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            token_storage: None,
            user_storage: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn with_token_storage(mut self, storage: Arc<dyn TokenStorage>) -> Self {
        self.token_storage = Some(storage);
        self
    }

    pub fn with_user_storage(mut self, storage: Arc<dyn UserStorage>) -> Self {
        self.user_storage = Some(storage);
        self
    }

    /// Wires the application and performs the initial token cache load.
    ///
    /// Fails if the cache cannot be loaded within its retry budget; the
    /// server must not start serving in that case.
    pub async fn build(self) -> anyhow::Result<TrakteerServer> {
        let token_storage = self
            .token_storage
            .unwrap_or_else(|| Arc::new(InMemoryTokenStorage::new()) as Arc<dyn TokenStorage>);
        let user_storage = self
            .user_storage
            .unwrap_or_else(|| Arc::new(InMemoryUserStorage::new()) as Arc<dyn UserStorage>);

        let state = AppState::new(&self.config.auth, token_storage, user_storage)?;

        let cache_cfg = &self.config.auth.cache;
        state
            .cache
            .init(cache_cfg.max_retries, cache_cfg.retry_period)
            .await?;

        Ok(TrakteerServer {
            addr: self.config.addr(),
            config: self.config,
            state,
        })
    }
}

impl TrakteerServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn app(&self) -> Router {
        build_app(&self.config, self.state.clone())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` completes or the token cache
    /// goes stale, then stops the cache refresher.
    ///
    /// Returns an error if the refresher gave up on a stale cache.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.app();
        tracing::info!(addr = %listener.local_addr()?, "listening");
        let mut refresher =
            TokenCacheRefresher::from_config(self.state.cache.clone(), &self.config.auth.cache)
                .spawn();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let served = tokio::select! {
            served = &mut server => Some(served),
            _ = shutdown => None,
            _ = refresher.exited() => {
                tracing::error!("Token cache unavailable, shutting down");
                None
            }
        };
        let served = match served {
            Some(served) => served,
            None => {
                let _ = stop_tx.send(());
                server.await
            }
        };

        let stopped = refresher.stop().await;
        served??;
        stopped?;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
