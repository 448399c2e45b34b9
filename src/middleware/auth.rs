use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

pub const MASTER_KEY_HEADER: &str = "x-master-key";

/// Master key authentication middleware.
///
/// Validates `X-Master-Key` against the registry and injects the
/// authenticated [`Application`](crate::models::Application) as a request
/// extension. All failures are a uniform 401; the header value itself is
/// never logged.
pub async fn master_key_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = headers
        .get(MASTER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing X-Master-Key header"))?;

    let app = state.registry.validate_master_key(presented).await?;
    request.extensions_mut().insert(app);
    Ok(next.run(request).await)
}
