//! Tenant-facing endpoint, reached through Host-header routing.

use axum::extract::{Extension, State};
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant};
use crate::state::AppState;

/// GET /tenant/info - describe the tenant the Host header resolved to.
///
/// Runs inside `with_tenant` so the access is visible in `active_tenants`
/// for its duration and the pool handle is the routed tenant's own.
pub async fn info(
    State(state): State<AppState>,
    Extension(ResolvedTenant(route)): Extension<ResolvedTenant>,
) -> ApiResult<Value> {
    let body = state
        .router
        .with_tenant(&route, |ctx| async move {
            json!({
                "subdomain": ctx.subdomain(),
                "database_name": ctx.database_name(),
                "status": ctx.route().status,
                "pool_connections": ctx.pool().size(),
            })
        })
        .await?;

    Ok(ApiResponse::success(body))
}
