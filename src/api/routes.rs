use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::Verdict;
use crate::pipeline::Pipeline;
use crate::observability::{MetricsRegistry, TimingGuard};
use crate::policy::ActivePolicy;

use super::middleware::authorize;
use super::request::TrustRequest;
use super::response::{
    ErrorResponse, HealthResponse, ReadyResponse, RulesResponse, TrustResponse,
};

/// Shared application state.
pub struct AppState {
    /// Current policy and pipeline (updated via watch channel)
    pub policy_rx: watch::Receiver<Arc<ActivePolicy>>,

    pub metrics: Arc<MetricsRegistry>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,

    /// Deadline imposed on each invocation
    pub invocation_timeout: Duration,

    /// Latency budget in milliseconds
    pub latency_budget_ms: u64,
}

/// A rejected invocation, ready to be sent to the client.
pub type Rejection = (StatusCode, Json<ErrorResponse>);

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/v1/resources/:resource",
            get(handle_resource).put(handle_resource).delete(handle_resource),
        )
        .route_layer(from_fn_with_state(Arc::clone(&state), authorize));

    Router::new()
        .route("/v1/trust", post(handle_trust))
        .route("/v1/rules", get(handle_rules))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Run `pipeline` under the configured deadline.
///
/// Records metrics and logs the outcome; the pipeline itself does not log.
pub async fn evaluate<P, C>(
    state: &AppState,
    pipeline: &Pipeline<P, C>,
    policy_version: &str,
    request_id: Uuid,
    input: Value,
    context: Option<Value>,
) -> Result<Verdict, Rejection>
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    let timing = TimingGuard::new(&state.metrics);

    let outcome =
        match tokio::time::timeout(state.invocation_timeout, pipeline.trust(input, context)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                state.metrics.record_timeout();
                warn!(
                    request_id = %request_id,
                    timeout_ms = state.invocation_timeout.as_millis(),
                    "Invocation deadline exceeded"
                );
                return Err((
                    StatusCode::GATEWAY_TIMEOUT,
                    Json(ErrorResponse::timeout().with_request_id(request_id)),
                ));
            }
        };

    state.metrics.record_outcome(&outcome);

    let elapsed_ms = timing.elapsed_ms();
    if elapsed_ms > state.latency_budget_ms as u128 {
        warn!(
            request_id = %request_id,
            latency_ms = elapsed_ms,
            budget_ms = state.latency_budget_ms,
            "Invocation latency exceeded budget"
        );
    }

    match outcome {
        Ok(verdict) => {
            info!(
                request_id = %request_id,
                policy_version,
                results = verdict.len(),
                latency_ms = elapsed_ms,
                "Invocation authorized"
            );
            Ok(verdict)
        }
        Err(err) => {
            let (status, body) = ErrorResponse::from_trust_error(&err);
            // Full reason stays in the log; the body may redact it
            let detail = err
                .as_unauthorized()
                .map(|failure| failure.reason().to_string());
            warn!(
                request_id = %request_id,
                rule = body.rule.as_deref(),
                reason = detail.as_deref(),
                error = %err,
                "Invocation rejected"
            );
            Err((status, Json(body.with_request_id(request_id))))
        }
    }
}

/// Handle invocation requests.
async fn handle_trust(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TrustRequest>,
) -> axum::response::Response {
    let request_id = Uuid::new_v4();
    let active = state.policy_rx.borrow().clone();

    match evaluate(
        &state,
        &active.pipeline,
        active.version(),
        request_id,
        req.input,
        req.context,
    )
    .await
    {
        Ok(verdict) => (
            StatusCode::OK,
            Json(TrustResponse::new(
                request_id,
                active.version().to_string(),
                verdict,
            )),
        )
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Resource guarded by the authorization middleware.
async fn handle_resource(
    Path(resource): Path<String>,
    Extension(verdict): Extension<Verdict>,
) -> impl IntoResponse {
    Json(json!({
        "resource": resource,
        "grant": verdict.get("grant"),
    }))
}

/// List configured rules in evaluation order.
async fn handle_rules(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active = state.policy_rx.borrow().clone();

    Json(RulesResponse {
        policy_version: active.version().to_string(),
        rules: active.pipeline.rules().describe(),
    })
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active = state.policy_rx.borrow().clone();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        policy_version: active.version().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint.
async fn handle_ready(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let active = state.policy_rx.borrow().clone();

    if active.is_fallback() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("No policy loaded", "NOT_READY")),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(ReadyResponse {
            ready: true,
            policy_version: active.version().to_string(),
            rules: active.pipeline.rules().len(),
        }),
    )
        .into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = format!(
        r#"# HELP trustr_uptime_seconds Application uptime in seconds
# TYPE trustr_uptime_seconds counter
trustr_uptime_seconds {}

"#,
        state.start_time.elapsed().as_secs(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        uptime + &state.metrics.to_prometheus(),
    )
}
