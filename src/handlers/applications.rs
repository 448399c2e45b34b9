//! Application registry endpoints: registration, database retry, master key
//! regeneration, and API key management.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ClientIp};
use crate::models::Application;
use crate::services::provisioner::connection_string;
use crate::services::{NewApplicationRequest, ProvisionedOutput};
use crate::state::AppState;

/// POST /applications/register - register an application and provision its
/// database in one call.
///
/// `201` when both steps succeed. When registration succeeds but database
/// provisioning fails the response is `207` and carries the credentials that
/// did get created plus a pointer to the retry endpoint; the master key is
/// disclosed either way because it will never be shown again.
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(request): Json<NewApplicationRequest>,
) -> Result<Response, ApiError> {
    let decision = state.limits.check_global(&ip).await?;
    if !decision.allowed {
        return Err(ApiError::rate_limited(decision));
    }

    let (app, master_key) = state.registry.register(request).await?;

    match state.provisioner.provision(&app).await {
        Ok(output) => {
            let body = json!({
                "application": app.to_public_json(),
                "master_key": master_key,
                "database": database_json(&output),
            });
            Ok(ApiResponse::created(body).into_response())
        }
        Err(e) => {
            let api_error = ApiError::from(e);
            let body = json!({
                "success": false,
                "application": app.to_public_json(),
                "master_key": master_key,
                "error": {
                    "message": api_error.message(),
                    "code": api_error.error_code(),
                },
                "retry": format!("/applications/{}/retry-database", app.app_id),
            });
            Ok((StatusCode::MULTI_STATUS, Json(body)).into_response())
        }
    }
}

/// POST /applications/:app_id/retry-database - provision the database for an
/// application whose registration succeeded but whose DDL failed.
pub async fn retry_database(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    Path(app_id): Path<String>,
) -> Result<Response, ApiError> {
    require_own_application(&app, &app_id)?;

    let output = state.provisioner.retry(&app).await?;
    let body = json!({ "database": database_json(&output) });
    Ok(ApiResponse::created(body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RegenerateKeyRequest {
    pub app_name: String,
    pub contact_email: String,
}

/// POST /applications/regenerate-master-key - replace a lost master key.
///
/// Unknown names and mismatched emails get the same 404.
pub async fn regenerate_master_key(
    State(state): State<AppState>,
    Json(request): Json<RegenerateKeyRequest>,
) -> ApiResult<Value> {
    let master_key = state
        .registry
        .regenerate_master_key(&request.app_name, &request.contact_email)
        .await?;
    Ok(ApiResponse::success(json!({ "master_key": master_key })))
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueApiKeyRequest {
    pub label: Option<String>,
}

/// POST /applications/:app_id/api-keys - issue an API key. The secret in the
/// response body is the single disclosure.
pub async fn issue_api_key(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    Path(app_id): Path<String>,
    body: Option<Json<IssueApiKeyRequest>>,
) -> ApiResult<Value> {
    require_own_application(&app, &app_id)?;

    let request = body.map(|Json(b)| b).unwrap_or_default();
    let (key, secret) = state.registry.issue_api_key(&app, request.label).await?;
    Ok(ApiResponse::created(json!({
        "api_key": key,
        "secret": secret,
    })))
}

/// DELETE /applications/:app_id/api-keys/:key_id - deactivate an API key.
/// Repeat calls succeed; keys owned by another application are a 404.
pub async fn deactivate_api_key(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    Path((app_id, key_id)): Path<(String, Uuid)>,
) -> ApiResult<Value> {
    require_own_application(&app, &app_id)?;

    let key = state.registry.deactivate_api_key(&app, key_id).await?;
    Ok(ApiResponse::success(json!({ "api_key": key })))
}

fn require_own_application(app: &Application, app_id: &str) -> Result<(), ApiError> {
    if app.app_id != app_id {
        return Err(ApiError::forbidden(
            "Master key does not belong to this application",
        ));
    }
    Ok(())
}

/// Database payload for provisioning responses. The plaintext password and
/// connection string appear here and nowhere else.
fn database_json(output: &ProvisionedOutput) -> Value {
    let record = &output.record;
    json!({
        "database_name": record.database_name,
        "db_username": record.db_username,
        "db_password": output.password,
        "host": record.host,
        "port": record.port,
        "connection_string": connection_string(record, &output.password),
    })
}
