//! `RelayServer`: axum HTTP + WebSocket server.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::{Extension, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::ConnectionMetadata;
use relay_tasks::{TaskExecutor, TaskStore};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connections::ConnectionRegistry;
use crate::health::{HealthReporter, HealthResponse};
use crate::http::tasks::TaskApi;
use crate::rooms::RoomBroadcaster;
use crate::router::EventRouter;
use crate::sessions::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::sweeper::CleanupSweeper;
use crate::websocket::run_ws_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Inbound event dispatch and the registries behind it.
    pub router: EventRouter,
    /// `/health` snapshot source.
    pub health: HealthReporter,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    router: EventRouter,
    tasks: TaskApi,
    health: HealthReporter,
    metrics: PrometheusHandle,
    shutdown: ShutdownCoordinator,
}

impl RelayServer {
    /// Build the registries around `rooms` and wire them to the task API.
    ///
    /// `rooms` is passed in because the executor's notifier publishes through
    /// the same broadcaster.
    pub fn new(
        config: ServerConfig,
        rooms: Arc<RoomBroadcaster>,
        store: Arc<dyn TaskStore>,
        executor: TaskExecutor,
        metrics: PrometheusHandle,
    ) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(Arc::clone(&rooms)));
        let sessions = Arc::new(SessionRegistry::new());
        let health = HealthReporter::new(
            Arc::clone(&connections),
            Arc::clone(&sessions),
            Instant::now(),
        );
        Self {
            config: Arc::new(config),
            router: EventRouter::new(connections, sessions, rooms),
            tasks: TaskApi::new(store, executor),
            health,
            metrics,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            router: self.router.clone(),
            health: self.health.clone(),
            metrics: self.metrics.clone(),
            config: Arc::clone(&self.config),
            shutdown: self.shutdown.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .merge(self.tasks.clone().routes())
            .layer(cors_layer(&self.config.allowed_origins))
            .layer(TraceLayer::new_for_http())
    }

    /// Session sweeper over this server's registries.
    pub fn sweeper(&self) -> CleanupSweeper {
        CleanupSweeper::new(
            Arc::clone(self.router.sessions()),
            Arc::clone(self.router.connections()),
            Arc::clone(self.router.rooms()),
        )
        .with_ttl(self.config.session_ttl)
        .with_interval(self.config.sweep_interval)
    }

    /// Bind, then serve and sweep until the shutdown token fires.
    ///
    /// Returns the bound address and a handle that completes once both the
    /// HTTP server and the sweeper have stopped.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "relay server listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let sweeper = self.sweeper();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(token.clone().cancelled_owned())
                .into_future();
            let (served, ()) = tokio::join!(serve, sweeper.run(token));
            if let Err(e) = served {
                warn!(error = %e, "http server stopped with error");
            }
            info!("relay server stopped");
        });
        Ok((addr, handle))
    }

    /// Event router shared with socket sessions.
    pub fn event_router(&self) -> &EventRouter {
        &self.router
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health.report())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
) -> impl IntoResponse {
    let metadata = ConnectionMetadata {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        remote_addr: peer.map(|Extension(ConnectInfo(addr))| addr.to_string()),
    };
    ws.on_upgrade(move |socket| {
        run_ws_session(
            socket,
            state.router,
            metadata,
            state.config,
            state.shutdown.token(),
        )
    })
}
