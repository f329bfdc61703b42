mod routes;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{auth, config::ConfigHolder, metrics::Metrics, runner::ProcessRunner, Result};

/// How the server accepts connections. Fixed for the lifetime of the process.
#[derive(Clone)]
pub enum Listener {
    Plain,
    Tls(RustlsConfig),
}

impl Listener {
    pub fn tls_config(&self) -> Option<RustlsConfig> {
        match self {
            Listener::Plain => None,
            Listener::Tls(tls) => Some(tls.clone()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ProcessRunner>,
    pub metrics: Metrics,
}

pub struct Server {
    state: AppState,
    config: Arc<ConfigHolder>,
}

impl Server {
    pub fn new(config: Arc<ConfigHolder>, runner: Arc<ProcessRunner>, metrics: Metrics) -> Self {
        Self {
            state: AppState { runner, metrics },
            config,
        }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/", post(routes::webhook))
            .route("/metrics", get(routes::metrics))
            .route("/_health", get(routes::health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn_with_state(
                        self.config.clone(),
                        auth::require_auth,
                    )),
            )
            .with_state(self.state.clone())
    }

    /// Serves until `handle` is told to shut down.
    pub async fn serve(self, addr: SocketAddr, listener: Listener, handle: Handle) -> Result<()> {
        let app = self.build_router().into_make_service();
        match listener {
            Listener::Plain => axum_server::bind(addr).handle(handle).serve(app).await?,
            Listener::Tls(tls) => {
                axum_server::bind_rustls(addr, tls)
                    .handle(handle)
                    .serve(app)
                    .await?
            }
        }
        Ok(())
    }
}
