//! REST API Handlers
//!
//! Admission webhook endpoint, bootstrap discovery endpoint and health checks.

use crate::admission::AdmissionGateway;
use crate::discovery::DiscoveryCoordinator;
use crate::metrics::OperatorMetrics;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use kube::core::admission::AdmissionReview;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

// =============================================================================
// Response Types
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    gateway: Arc<AdmissionGateway>,
    discovery: Arc<DiscoveryCoordinator>,
    metrics: Arc<OperatorMetrics>,
}

impl RestRouter {
    pub fn new(
        gateway: Arc<AdmissionGateway>,
        discovery: Arc<DiscoveryCoordinator>,
        metrics: Arc<OperatorMetrics>,
    ) -> Self {
        Self {
            gateway,
            discovery,
            metrics,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            gateway: self.gateway,
            discovery: self.discovery,
            metrics: self.metrics,
        };

        Router::new()
            .route("/admission/pods", post(admit_pods))
            .route("/new/:advertise_peer_url", get(discover))
            .route("/healthz", get(health_check))
            .route("/readyz", get(readiness_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    gateway: Arc<AdmissionGateway>,
    discovery: Arc<DiscoveryCoordinator>,
    metrics: Arc<OperatorMetrics>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn admit_pods(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    Json(state.gateway.review(review).await)
}

/// Bootstrap arguments for a starting placement-driver pod
async fn discover(
    State(state): State<AppState>,
    Path(advertise_peer_url): Path<String>,
) -> impl IntoResponse {
    match state.discovery.discover(&advertise_peer_url).await {
        Ok(args) => {
            let result = if args.starts_with("--initial-cluster=") {
                "initial"
            } else {
                "join"
            };
            state.metrics.record_discovery(result);
            (StatusCode::OK, args).into_response()
        }
        Err(e) => {
            state.metrics.record_discovery("error");
            warn!(address = %advertise_peer_url, error = %e, "discovery failed");

            let retryable = e.is_retryable();
            let (status, error) = if retryable {
                (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
            } else {
                (StatusCode::BAD_REQUEST, "invalid_peer")
            };
            (
                status,
                Json(ApiErrorResponse {
                    error: error.into(),
                    message: e.to_string(),
                    retryable,
                }),
            )
                .into_response()
        }
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}
