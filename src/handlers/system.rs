//! Service banner and health endpoints. Both are public.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - service banner with an endpoint map.
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Atrium Control Plane",
            "version": version,
            "description": "Multi-tenant provisioning and routing control plane built with Rust (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "register": "POST /applications/register (public)",
                "regenerate_key": "POST /applications/regenerate-master-key (public)",
                "retry_database": "POST /applications/:app_id/retry-database (protected)",
                "api_keys": "POST /applications/:app_id/api-keys, DELETE /applications/:app_id/api-keys/:key_id (protected)",
                "onboarding": "POST /onboarding/start, POST /onboarding/provision, GET /onboarding/status/:uuid, POST /onboarding/:uuid/complete (protected)",
                "tenant": "GET /tenant/info (routed by Host header)",
            },
        }
    }))
}

/// GET /health - liveness plus a registry reachability probe.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "registry": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "registry unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "registry_error": e.to_string()
                }
            })),
        ),
    }
}
