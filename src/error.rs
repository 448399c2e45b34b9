// HTTP API error types
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::rate_limit::Decision;

/// HTTP API error with appropriate status codes and client-safe messages.
/// Secret material never reaches these messages; internal causes are logged
/// at the conversion site and replaced with generic text.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 412 Precondition Failed
    PreconditionFailed(String),

    // 422 Unprocessable Entity
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidState(String),

    // 429 Too Many Requests, carries the limiter decision for headers
    RateLimited(Decision),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (DNS/SSL/DDL provider failures)
    Provisioning(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::PreconditionFailed(_) => 412,
            ApiError::Validation { .. } => 422,
            ApiError::InvalidState(_) => 422,
            ApiError::RateLimited(_) => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::Provisioning(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::PreconditionFailed(msg) => msg,
            ApiError::Validation { message, .. } => message,
            ApiError::InvalidState(msg) => msg,
            ApiError::RateLimited(_) => "Rate limit exceeded",
            ApiError::InternalServerError(msg) => msg,
            ApiError::Provisioning(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Stable code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PreconditionFailed(_) => "PRECONDITION_FAILED",
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::InvalidState(_) => "INVALID_STATE",
            ApiError::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::Provisioning(_) => "PROVISIONING_FAILED",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::Validation {
                message,
                field_errors,
            } => {
                let mut response = json!({
                    "success": false,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });
                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }
                response
            }
            ApiError::RateLimited(decision) => {
                let retry_after_minutes = (decision.retry_after_secs + 59) / 60;
                json!({
                    "success": false,
                    "error": "rate_limit_exceeded",
                    "message": self.message(),
                    "code": self.error_code(),
                    "retry_after_minutes": retry_after_minutes.max(1),
                    "scope": decision.exceeded_scope.map(|s| s.as_str()),
                })
            }
            _ => {
                json!({
                    "success": false,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        ApiError::PreconditionFailed(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors: None,
        }
    }

    pub fn validation_fields(
        message: impl Into<String>,
        field_errors: HashMap<String, String>,
    ) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors: Some(field_errors),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ApiError::InvalidState(message.into())
    }

    pub fn rate_limited(decision: Decision) -> Self {
        ApiError::RateLimited(decision)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        ApiError::Provisioning(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

/// Build `X-RateLimit-*` headers from a limiter decision. Used for both
/// allowed responses and 429 rejections.
pub fn rate_limit_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in decision.header_pairs() {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

// Convert component error types into ApiError
impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Conflict(field) => {
                ApiError::conflict(format!("{} already exists", field))
            }
            crate::store::StoreError::NotFound => ApiError::not_found("Not found"),
            crate::store::StoreError::Corrupt(msg) => {
                tracing::error!("Corrupt registry row: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            crate::store::StoreError::Database(e) => {
                tracing::error!("Registry database error: {}", e);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::services::RegistryError> for ApiError {
    fn from(err: crate::services::RegistryError) -> Self {
        use crate::services::RegistryError;
        match err {
            RegistryError::Validation(msg) => ApiError::validation(msg),
            RegistryError::NameTaken(name) => {
                ApiError::conflict(format!("Application name '{}' is already registered", name))
            }
            RegistryError::Auth => ApiError::unauthorized("Invalid master key"),
            RegistryError::NotFound => ApiError::not_found("Application not found"),
            RegistryError::GenerationExhausted => {
                tracing::error!("Credential generation exhausted its retry budget");
                ApiError::internal_server_error("Could not generate unique credentials")
            }
            RegistryError::Secret(_) => {
                tracing::error!("Secret hashing failed during registry operation");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            RegistryError::Store(e) => e.into(),
        }
    }
}

impl From<crate::services::ProvisionError> for ApiError {
    fn from(err: crate::services::ProvisionError) -> Self {
        use crate::services::ProvisionError;
        match err {
            // The retry endpoint contract pins 400 here, not 409.
            ProvisionError::AlreadyProvisioned => {
                ApiError::bad_request("Application already has a provisioned database")
            }
            ProvisionError::NameExhausted(seed) => {
                tracing::error!("Database name allocation exhausted for seed {:?}", seed);
                ApiError::internal_server_error("Could not allocate a unique database name")
            }
            ProvisionError::Ddl(msg) => {
                tracing::error!("Database DDL failed: {}", msg);
                ApiError::provisioning("Database provisioning failed")
            }
            ProvisionError::Secret(_) => {
                tracing::error!("Secret hashing failed during database provisioning");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            ProvisionError::Store(e) => e.into(),
        }
    }
}

impl From<crate::services::SubdomainError> for ApiError {
    fn from(err: crate::services::SubdomainError) -> Self {
        use crate::services::SubdomainError;
        match err {
            SubdomainError::Unusable(seed) => {
                ApiError::validation(format!("Cannot derive a subdomain from {:?}", seed))
            }
            SubdomainError::Exhausted(seed) => {
                ApiError::conflict(format!("No free subdomain could be derived from {:?}", seed))
            }
            SubdomainError::Timeout(secs) => {
                tracing::error!("Infrastructure configuration timed out after {}s", secs);
                ApiError::provisioning("Infrastructure configuration timed out")
            }
            SubdomainError::Infra(e) => {
                tracing::error!("Infrastructure provider error: {}", e);
                ApiError::provisioning("Infrastructure configuration failed")
            }
            SubdomainError::Store(e) => e.into(),
        }
    }
}

impl From<crate::services::OnboardingError> for ApiError {
    fn from(err: crate::services::OnboardingError) -> Self {
        use crate::services::OnboardingError;
        match err {
            OnboardingError::Validation(msg) => ApiError::validation(msg),
            OnboardingError::MissingDatabase => ApiError::precondition_failed(
                "A provisioned database is required before onboarding can start",
            ),
            OnboardingError::NotFound => ApiError::not_found("Registration not found"),
            OnboardingError::InvalidState(status) => ApiError::invalid_state(format!(
                "Registration is {} and cannot be modified",
                status
            )),
            OnboardingError::Subdomain(e) => e.into(),
            OnboardingError::Secret(_) => {
                tracing::error!("Secret hashing failed during onboarding");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            OnboardingError::Store(e) => e.into(),
            OnboardingError::Router(e) => e.into(),
        }
    }
}

impl From<crate::router::RouterError> for ApiError {
    fn from(err: crate::router::RouterError) -> Self {
        use crate::router::RouterError;
        match err {
            RouterError::NoRoute(subdomain) => {
                ApiError::not_found(format!("No active tenant at '{}'", subdomain))
            }
            RouterError::Pool(e) => {
                tracing::error!("Tenant pool error: {}", e);
                ApiError::internal_server_error("Tenant database unavailable")
            }
            RouterError::Store(e) => e.into(),
        }
    }
}

impl From<crate::rate_limit::CounterError> for ApiError {
    fn from(err: crate::rate_limit::CounterError) -> Self {
        tracing::error!("Rate limit counter error: {}", err);
        ApiError::internal_server_error("An error occurred while processing your request")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.to_json();

        if let ApiError::RateLimited(decision) = &self {
            let mut headers = rate_limit_headers(decision);
            if let Ok(value) = HeaderValue::from_str(&decision.retry_after_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, value);
            }
            return (status, headers, Json(body)).into_response();
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::LimitScope;

    #[test]
    fn rate_limited_body_carries_retry_minutes_and_scope() {
        let decision = Decision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_epoch: 1_900_000_000,
            retry_after_secs: 90,
            exceeded_scope: Some(LimitScope::GlobalIp),
        };
        let err = ApiError::rate_limited(decision);
        assert_eq!(err.status_code(), 429);

        let body = err.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "rate_limit_exceeded");
        assert_eq!(body["retry_after_minutes"], 2);
        assert_eq!(body["scope"], "global_ip");
    }

    #[test]
    fn validation_body_includes_field_errors_when_present() {
        let mut fields = HashMap::new();
        fields.insert("app_name".to_string(), "too short".to_string());
        let err = ApiError::validation_fields("Invalid input", fields);

        assert_eq!(err.status_code(), 422);
        let body = err.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["app_name"], "too short");
    }

    #[test]
    fn conversions_preserve_status_semantics() {
        let err: ApiError = crate::services::OnboardingError::MissingDatabase.into();
        assert_eq!(err.status_code(), 412);

        let err: ApiError = crate::services::ProvisionError::AlreadyProvisioned.into();
        assert_eq!(err.status_code(), 400);

        let err: ApiError = crate::services::RegistryError::Auth.into();
        assert_eq!(err.status_code(), 401);

        let err: ApiError = crate::store::StoreError::Conflict("app_name").into();
        assert_eq!(err.status_code(), 409);
    }
}
