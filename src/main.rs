use std::net::SocketAddr;

use atrium_api::{app, config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the first config access so cargo run picks up
    // DATABASE_URL and the ATRIUM_* overrides.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::config().clone();
    tracing::info!("starting atrium-api in {:?} mode", config.environment);

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let state = AppState::new(config).await?;
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("🚀 Atrium API listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
