//! Onboarding endpoints: start, provision, status, complete.
//!
//! All four sit behind master key auth; the limited ones attach
//! `X-RateLimit-*` headers to allowed responses as well as rejections.

use axum::{
    extract::{Extension, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{rate_limit_headers, ApiError};
use crate::middleware::{ApiResponse, ApiResult, ClientIp};
use crate::models::{Application, OnboardingRegistration, RegistrationStatus};
use crate::rate_limit::{Decision, Endpoint};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub email: String,
    pub organization_name: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// POST /onboarding/start - open a registration for the calling application.
pub async fn start(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    ClientIp(ip): ClientIp,
    Json(request): Json<StartRequest>,
) -> Result<Response, ApiError> {
    let decision = state
        .limits
        .check(Endpoint::Start, &app.app_id, &ip)
        .await?;
    if !decision.allowed {
        return Err(ApiError::rate_limited(decision));
    }

    let registration = state
        .onboarding
        .start(&app, &request.email, request.organization_name, request.metadata)
        .await?;

    let full_domain = state.onboarding.full_domain(&registration.subdomain);
    let body = json!({
        "uuid": registration.uuid,
        "subdomain": registration.subdomain,
        "full_domain": full_domain,
        "url": format!("https://{}", full_domain),
        "onboarding_status": registration.status,
        "organization_name": registration.organization_name,
        "metadata": registration.metadata,
    });
    Ok((rate_limit_headers(&decision), ApiResponse::created(body)).into_response())
}

fn default_generate_api_key() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub uuid: Uuid,
    #[serde(default = "default_generate_api_key")]
    pub generate_api_key: bool,
}

/// POST /onboarding/provision - run DNS/SSL configuration and activate.
///
/// The per-registration counter only meters the side-effect path. A call
/// that lands on an already-activated registration is a read, so it bypasses
/// that counter (the global IP ceiling still applies) and reports the
/// current budget in its headers.
pub async fn provision(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    ClientIp(ip): ClientIp,
    Json(request): Json<ProvisionRequest>,
) -> Result<Response, ApiError> {
    let current = state.onboarding.status(&app, request.uuid).await?;
    let dimension = request.uuid.to_string();

    let decision: Decision = if is_idempotent_read(&current) {
        let global = state.limits.check_global(&ip).await?;
        if !global.allowed {
            return Err(ApiError::rate_limited(global));
        }
        state.limits.headers(Endpoint::Provision, &dimension).await?
    } else {
        let decision = state
            .limits
            .check(Endpoint::Provision, &dimension, &ip)
            .await?;
        if !decision.allowed {
            return Err(ApiError::rate_limited(decision));
        }
        decision
    };

    let outcome = state
        .onboarding
        .provision(&app, request.uuid, request.generate_api_key)
        .await?;

    let registration = &outcome.registration;
    let mut body = json!({
        "uuid": registration.uuid,
        "subdomain": registration.subdomain,
        "full_domain": state.onboarding.full_domain(&registration.subdomain),
        "onboarding_status": registration.status,
        "dns_configured": registration.dns_configured,
        "ssl_configured": registration.ssl_configured,
        "metadata": { "is_idempotent": outcome.idempotent },
    });
    if let Some(api_key) = &outcome.api_key {
        body["api_key"] = json!(api_key);
    }
    if let Some(api_secret) = &outcome.api_secret {
        body["api_secret"] = json!(api_secret);
    }

    Ok((rate_limit_headers(&decision), ApiResponse::success(body)).into_response())
}

fn is_idempotent_read(registration: &OnboardingRegistration) -> bool {
    match registration.status {
        RegistrationStatus::Completed => true,
        RegistrationStatus::Activated => registration.is_fully_configured(),
        _ => false,
    }
}

/// GET /onboarding/status/:uuid - poll a registration.
pub async fn status(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    ClientIp(ip): ClientIp,
    Path(uuid): Path<Uuid>,
) -> Result<Response, ApiError> {
    let decision = state
        .limits
        .check(Endpoint::Status, &app.app_id, &ip)
        .await?;
    if !decision.allowed {
        return Err(ApiError::rate_limited(decision));
    }

    let registration = state.onboarding.status(&app, uuid).await?;
    let body = registration_json(&state, &registration);
    Ok((rate_limit_headers(&decision), ApiResponse::success(body)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    pub tenant_id: Option<String>,
    pub client_metadata: Option<Map<String, Value>>,
}

/// POST /onboarding/:uuid/complete - close out an activated registration.
pub async fn complete(
    State(state): State<AppState>,
    Extension(app): Extension<Application>,
    Path(uuid): Path<Uuid>,
    body: Option<Json<CompleteRequest>>,
) -> ApiResult<Value> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let registration = state
        .onboarding
        .complete(&app, uuid, request.tenant_id, request.client_metadata)
        .await?;

    Ok(ApiResponse::success(registration_json(&state, &registration)))
}

fn registration_json(state: &AppState, registration: &OnboardingRegistration) -> Value {
    json!({
        "uuid": registration.uuid,
        "subdomain": registration.subdomain,
        "full_domain": state.onboarding.full_domain(&registration.subdomain),
        "onboarding_status": registration.status,
        "organization_name": registration.organization_name,
        "email": registration.email,
        "dns_configured": registration.dns_configured,
        "ssl_configured": registration.ssl_configured,
        "provisioning_attempts": registration.provisioning_attempts,
        "metadata": registration.metadata,
        "completed_at": registration.completed_at,
        "created_at": registration.created_at,
        "updated_at": registration.updated_at,
    })
}
