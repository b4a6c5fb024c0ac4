use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::metrics::encode_metrics;
use common::types::Health;
use service::ServiceRegistry;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

use crate::errors::ServerError;

/// State handed to every handler.
pub type SharedRegistry = Arc<ServiceRegistry>;

async fn ping() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics() -> (StatusCode, String) {
    encode_metrics()
}

/// One HTTP listener and the routes it serves.
///
/// Every application answers `GET /ping` and `GET /metrics`; callers add
/// their own handlers with [`Application::routes`]. Handlers receive the
/// registry as state and look services up by name.
pub struct Application {
    name: String,
    host: IpAddr,
    port: u16,
    routes: Router<SharedRegistry>,
    static_dirs: Vec<(String, PathBuf)>,
    body_limit: Option<usize>,
}

impl Application {
    /// Listen on `0.0.0.0:port`. Port 0 picks a free port; see [`RunningApp::addr`].
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            routes: Router::new(),
            static_dirs: Vec::new(),
            body_limit: None,
        }
    }

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Merge `router` into this application. Panics (axum) if a path is registered twice.
    pub fn routes(mut self, router: Router<SharedRegistry>) -> Self {
        self.routes = self.routes.merge(router);
        self
    }

    /// Serve files under `path` at `prefix`.
    pub fn static_dir(mut self, prefix: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.static_dirs.push((prefix.into(), path.into()));
        self
    }

    /// Reject request bodies larger than `bytes` with 413. Unset, axum's default (2 MiB) applies.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = Some(bytes);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn into_router(self, registry: SharedRegistry) -> Router {
        let mut router = self
            .routes
            .route("/ping", get(ping))
            .route("/metrics", get(metrics));
        for (prefix, path) in self.static_dirs {
            router = router.nest_service(&prefix, ServeDir::new(path));
        }
        if let Some(bytes) = self.body_limit {
            router = router.layer(DefaultBodyLimit::max(bytes));
        }
        router
            .with_state(registry)
            .layer(CorsLayer::very_permissive())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG))
                    .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
            )
    }

    /// Bind the listener and serve in a background task.
    pub async fn start(self, registry: SharedRegistry) -> Result<RunningApp, ServerError> {
        let name = self.name.clone();
        let requested = SocketAddr::new(self.host, self.port);
        let bind_err = |source| ServerError::Bind { app: name.clone(), addr: requested, source };

        let listener = TcpListener::bind(requested).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        let app = self.into_router(registry);

        let task_name = name.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(app = %task_name, error = %e, "application stopped serving");
            }
        });
        info!(app = %name, %addr, "application listening");
        Ok(RunningApp { name, addr, task })
    }
}

/// A bound application. Dropping it leaves the listener running; call
/// [`RunningApp::stop`] to tear it down.
pub struct RunningApp {
    name: String,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl RunningApp {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Abort the serve task. Requests in flight are dropped.
    pub fn stop(&self) {
        self.task.abort();
    }
}
