//! HTTP query surface and Prometheus endpoint.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collector::HealthCollector;
use crate::error::{Error, Result};
use crate::kubernetes::ClusterProvider;
use crate::observability::ToolboxMetrics;
use crate::types::{ApiResponse, Config, NamespaceSummary, NodeInfo, PodInfo, ServiceInfo};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const AUTH_REALM: &str = "Basic realm=\"KubeToolbox\"";

pub fn build_time() -> &'static str {
    option_env!("BUILD_TIME").unwrap_or("unknown")
}

pub fn git_commit() -> &'static str {
    option_env!("GIT_COMMIT").unwrap_or("unknown")
}

/// Static basic-auth credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Credentials to enforce, or `None` when auth is disabled.
    pub fn from_config(config: &Config) -> Option<Self> {
        config.enable_auth.then(|| Self {
            username: config.auth_username.clone(),
            password: config.auth_password.clone(),
        })
    }

    fn matches(&self, authorization: Option<&str>) -> bool {
        let Some((user, pass)) = authorization.and_then(decode_basic) else {
            return false;
        };
        user == self.username && pass == self.password
    }
}

fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Shared state for the web UI routes.
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn ClusterProvider>,
    collector: HealthCollector,
    credentials: Option<Credentials>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ClusterProvider>, metrics: ToolboxMetrics, credentials: Option<Credentials>) -> Self {
        let collector = HealthCollector::new(provider.clone(), metrics);
        Self { provider, collector, credentials }
    }
}

/// A collaborator failure rendered as a 500 envelope.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self.0, "API request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiResponse::failure(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
struct NamespaceQuery {
    namespace: Option<String>,
}

impl NamespaceQuery {
    fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or("default")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthInfo {
    version: &'static str,
    build_time: &'static str,
    commit_hash: &'static str,
    status: &'static str,
    mode: &'static str,
}

async fn index() -> String {
    format!("KubeToolbox Web UI - Version {}", VERSION)
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthInfo>> {
    let info = HealthInfo {
        version: VERSION,
        build_time: build_time(),
        commit_hash: git_commit(),
        status: "healthy",
        mode: state.provider.mode(),
    };
    Json(ApiResponse::ok(info).with_message("KubeToolbox is running"))
}

async fn namespaces(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(ApiResponse::ok(state.provider.list_namespaces().await?)))
}

async fn pods(State(state): State<AppState>, Query(query): Query<NamespaceQuery>) -> ApiResult<Vec<PodInfo>> {
    let units = state.provider.list_units(query.namespace()).await?;
    Ok(Json(ApiResponse::ok(units.iter().map(PodInfo::from).collect())))
}

async fn services(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<Vec<ServiceInfo>> {
    Ok(Json(ApiResponse::ok(state.provider.list_services(query.namespace()).await?)))
}

async fn nodes(State(state): State<AppState>) -> ApiResult<Vec<NodeInfo>> {
    Ok(Json(ApiResponse::ok(state.provider.list_nodes().await?)))
}

async fn healthcheck(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<NamespaceSummary> {
    Ok(Json(ApiResponse::ok(state.collector.check_namespace(query.namespace()).await?)))
}

async fn require_auth(State(credentials): State<Arc<Credentials>>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if credentials.matches(authorization) {
        return next.run(request).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, AUTH_REALM)],
        "Unauthorized",
    )
        .into_response()
}

/// Web UI router. Every route sits behind basic auth when credentials are set.
pub fn web_router(state: AppState) -> Router {
    let credentials = state.credentials.clone();
    let router = Router::new()
        .route("/", get(index))
        .route("/api/v1/health", get(health))
        .route("/api/v1/namespaces", get(namespaces))
        .route("/api/v1/pods", get(pods))
        .route("/api/v1/services", get(services))
        .route("/api/v1/nodes", get(nodes))
        .route("/api/v1/healthcheck", get(healthcheck))
        .with_state(state);

    match credentials {
        Some(credentials) => router.layer(middleware::from_fn_with_state(Arc::new(credentials), require_auth)),
        None => router,
    }
}

async fn metrics(State(metrics): State<ToolboxMetrics>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn metrics_router(metrics_handle: ToolboxMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(metrics_handle)
}

/// Serve `router` on `addr` until `cancel` fires. In-flight requests get
/// `SHUTDOWN_GRACE` to drain before the server is dropped.
pub async fn serve(name: &'static str, addr: SocketAddr, router: Router, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("bind {} server on {}: {}", name, addr, e)))?;
    info!(server = name, %addr, "Starting server");

    let server = axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    let grace = async {
        cancel.cancelled().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        result = &mut server => {
            result.map_err(|e| Error::transport(format!("{} server: {}", name, e)))?;
            info!(server = name, "Server shut down");
        }
        _ = grace => {
            warn!(server = name, grace_secs = SHUTDOWN_GRACE.as_secs(), "Grace period elapsed, closing server");
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        () = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
