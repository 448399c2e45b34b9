use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod infra;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod rate_limit;
pub mod router;
pub mod secrets;
pub mod services;
pub mod state;
pub mod store;

use state::AppState;

/// Build the full router. Handed to `axum::serve` in the binary and to
/// in-process listeners in integration tests.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::system::root))
        .route("/health", get(handlers::system::health))
        .merge(application_routes(&state))
        .merge(onboarding_routes(&state))
        .merge(tenant_routes(&state))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn application_routes(state: &AppState) -> Router<AppState> {
    use axum::routing::{delete, post};
    use handlers::applications;

    // Key management requires the caller to present its master key.
    let keyed = Router::new()
        .route(
            "/applications/:app_id/retry-database",
            post(applications::retry_database),
        )
        .route(
            "/applications/:app_id/api-keys",
            post(applications::issue_api_key),
        )
        .route(
            "/applications/:app_id/api-keys/:key_id",
            delete(applications::deactivate_api_key),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::master_key_auth,
        ));

    Router::new()
        .route("/applications/register", post(applications::register))
        .route(
            "/applications/regenerate-master-key",
            post(applications::regenerate_master_key),
        )
        .merge(keyed)
}

fn onboarding_routes(state: &AppState) -> Router<AppState> {
    use axum::routing::post;
    use handlers::onboarding;

    Router::new()
        .route("/onboarding/start", post(onboarding::start))
        .route("/onboarding/provision", post(onboarding::provision))
        .route("/onboarding/status/:uuid", get(onboarding::status))
        .route("/onboarding/:uuid/complete", post(onboarding::complete))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::master_key_auth,
        ))
}

fn tenant_routes(state: &AppState) -> Router<AppState> {
    use handlers::tenant;

    Router::new()
        .route("/tenant/info", get(tenant::info))
        .route_layer(from_fn_with_state(state.clone(), middleware::resolve_tenant))
}
