use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::models::TenantRoute;
use crate::state::AppState;

/// Route resolved from the request Host, injected for tenant-scoped handlers.
#[derive(Clone, Debug)]
pub struct ResolvedTenant(pub TenantRoute);

/// Resolves the `Host` header through the [`ConnectionRouter`] and injects
/// the matching route. Unknown or unroutable subdomains are a plain 404, so
/// probing a suspended tenant looks the same as probing a missing one.
///
/// [`ConnectionRouter`]: crate::router::ConnectionRouter
pub async fn resolve_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Host header"))?;

    let route = state
        .router
        .resolve(host)
        .await?
        .ok_or_else(|| ApiError::not_found("Unknown tenant"))?;

    request.extensions_mut().insert(ResolvedTenant(route));
    Ok(next.run(request).await)
}
