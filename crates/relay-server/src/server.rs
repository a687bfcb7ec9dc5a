//! `HubServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::MessageHandler;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::HubConfig;
use crate::errors::HubError;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::ingress::PublishSource;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::upgrade::{self, PeerAddr};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, broadcaster, and ingress.
    pub hub: Arc<Hub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay hub server.
pub struct HubServer {
    config: HubConfig,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl HubServer {
    /// Create a server that passes every message through `handler`.
    pub fn new(config: HubConfig, handler: Arc<dyn MessageHandler>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let hub = Arc::new(Hub::new(config.clone(), handler, shutdown.token()));
        Self {
            config,
            hub,
            shutdown,
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        let router = Router::new()
            .route("/subscribe", get(subscribe_handler))
            .route("/publish", post(publish_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let router = match &self.config.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        };
        router.layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in a background task. Returns the bound address and
    /// the serving task, which ends once shutdown is initiated.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), HubError> {
        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| HubError::Bind {
                addr: bind.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| HubError::Bind { addr: bind, source })?;

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "relay hub listening");
        Ok((addr, handle))
    }

    /// The hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

/// GET /subscribe
async fn subscribe_handler(
    ws: WebSocketUpgrade,
    PeerAddr(peer): PeerAddr,
    State(state): State<AppState>,
) -> Response {
    upgrade::subscribe(ws, peer, state.hub)
}

/// POST /publish
async fn publish_handler(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    body: Body,
) -> Result<StatusCode, HubError> {
    let limit = state.hub.config().max_payload_bytes;
    let payload = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| HubError::PayloadTooLarge {
            size: limit + 1,
            limit,
        })?;
    let _ = state
        .hub
        .publish(PublishSource::Http, &peer, payload)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.registry().len(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
