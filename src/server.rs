//! HTTP surface for liveness, the tenant rollup, and Prometheus metrics

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use crate::crd::TenantInfoSpec;
use crate::engine::TenantCatalog;
use crate::health::HealthPolicy;
use crate::metrics::TenantMetrics;
use crate::report::ClusterSummary;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: TenantCatalog,
    pub policy: HealthPolicy,
    pub metrics: TenantMetrics,
}

impl AppState {
    pub fn new(catalog: TenantCatalog, policy: HealthPolicy, metrics: TenantMetrics) -> Self {
        Self {
            catalog,
            policy,
            metrics,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantsResponse {
    pub summary: ClusterSummary,
    pub tenants: Vec<TenantInfoSpec>,
}

async fn healthz() -> &'static str {
    "OK"
}

async fn tenants(State(state): State<Arc<AppState>>) -> Json<TenantsResponse> {
    let tenants: Vec<TenantInfoSpec> = state.catalog.read().await.values().cloned().collect();
    let summary = ClusterSummary::from_records(&tenants, &state.policy);
    Json(TenantsResponse { summary, tenants })
}

async fn tenant(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> impl IntoResponse {
    match state.catalog.read().await.get(&name) {
        Some(spec) => (StatusCode::OK, Json(spec.clone())).into_response(),
        None => (StatusCode::NOT_FOUND, format!("tenant {} not found", name)).into_response(),
    }
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tenants", get(tenants))
        .route("/tenants/:tenant", get(tenant))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
