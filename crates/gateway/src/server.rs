//! Axum-based HTTP server for the command router.

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use citydesk_controller::CommandRouter;
use citydesk_core::{config::ServerConfig, traits::RecordFilter, Error, Result};

use crate::error::ApiError;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Longest `wait_ms` a status request may ask for.
const MAX_WAIT_MS: u64 = 60_000;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Allowed CORS origins; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            allowed_origins: server.allowed_origins.clone(),
            enable_tracing: true,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub router: CommandRouter,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, router: CommandRouter) -> Self {
        Self {
            config,
            state: Arc::new(AppState { router }),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins = &self.config.allowed_origins;
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            return layer.allow_origin(Any);
        }
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/commands", post(submit_handler).get(list_handler))
            .route("/v1/commands/stats", get(command_stats_handler))
            .route("/v1/commands/:id", get(command_handler))
            .route("/v1/providers", get(providers_handler))
            .route("/v1/providers/usage", get(usage_handler))
            .route("/v1/providers/:id", get(provider_info_handler))
            .route("/v1/providers/:id/invoke", post(invoke_handler))
            .route("/v1/invoke/fallback", post(fallback_handler))
            .route("/v1/invoke/cross-validate", post(cross_validate_handler))
            .route("/v1/rate-limits", get(rate_limits_handler))
            .route("/v1/rate-limits/:provider/override", post(override_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        router = router.layer(self.cors_layer());

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server until shutdown.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::config(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub providers: usize,
}

/// Command submission.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub intent: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default = "anonymous")]
    pub submitter: String,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn anonymous() -> String {
    "anonymous".to_string()
}

/// Command submission acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub command_id: String,
    pub state: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Wait up to this long for the command to finish.
    pub wait_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    /// Only count commands created in the last `hours` hours.
    pub hours: Option<u64>,
}

/// Direct single-provider call.
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Call across several providers; empty list means all by priority.
#[derive(Debug, Deserialize)]
pub struct MultiInvokeRequest {
    #[serde(default)]
    pub providers: Vec<String>,
    pub prompt: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RateLimitQuery {
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub capacity_delta: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverrideResponse {
    pub status: String,
    pub provider: String,
    pub capacity_delta: u64,
    pub ttl_secs: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: state.router.providers().len(),
    })
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = state
        .router
        .submit_named(&payload.intent, payload.parameters, &payload.submitter)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            command_id: id,
            state: "pending".to_string(),
        }),
    ))
}

async fn command_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<impl IntoResponse> {
    let command = match query.wait_ms {
        Some(ms) if ms > 0 => {
            state
                .router
                .wait_for(&id, Duration::from_millis(ms.min(MAX_WAIT_MS)))
                .await?
        }
        _ => state.router.get(&id).await?,
    };
    Ok(Json(command))
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RecordFilter>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.list(&filter).await?))
}

async fn command_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<impl IntoResponse> {
    let window = query
        .hours
        .map(|hours| Duration::from_secs(hours.saturating_mul(3600)));
    Ok(Json(state.router.stats(window).await?))
}

async fn providers_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.providers())
}

async fn usage_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.usage_stats())
}

async fn provider_info_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.provider_info(&id)?))
}

async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<InvokeRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .router
        .invoke_provider(&id, &payload.prompt, payload.context.as_deref())
        .await?;
    Ok(Json(result))
}

async fn fallback_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MultiInvokeRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .router
        .invoke_with_fallback(&payload.providers, &payload.prompt, payload.context.as_deref())
        .await?;
    Ok(Json(outcome))
}

async fn cross_validate_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MultiInvokeRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .router
        .cross_validate(&payload.providers, &payload.prompt, payload.context.as_deref())
        .await?;
    Ok(Json(report))
}

async fn rate_limits_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RateLimitQuery>,
) -> impl IntoResponse {
    Json(state.router.rate_limit_stats(query.provider.as_deref()))
}

async fn override_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Json(payload): Json<OverrideRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.ttl_secs == 0 {
        return Err(Error::invalid_request("ttl_secs must be positive").into());
    }
    state.router.override_rate_limit(
        &provider,
        payload.capacity_delta,
        Duration::from_secs(payload.ttl_secs),
    )?;

    Ok(Json(OverrideResponse {
        status: "applied".to_string(),
        provider,
        capacity_delta: payload.capacity_delta,
        ttl_secs: payload.ttl_secs,
    }))
}
