#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

use atrium_api::config::AppConfig;
use atrium_api::state::AppState;

/// In-process server on a free port, backed by the in-memory registry.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
    /// Same handle the router holds; lets tests reach behind the HTTP
    /// surface for setup and deep assertions.
    pub state: AppState,
}

/// Development defaults: in-memory backend, rate limiting off.
pub fn test_config() -> AppConfig {
    AppConfig::development()
}

pub async fn spawn_app() -> Result<TestServer> {
    spawn_with(test_config()).await
}

pub async fn spawn_with(mut config: AppConfig) -> Result<TestServer> {
    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    config.server.port = port;

    let state = AppState::new(config).await?;
    let app = atrium_api::app(state.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind 127.0.0.1:{port}"))?;
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });

    let server = TestServer {
        port,
        base_url: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        state,
    };
    server.wait_ready(Duration::from_secs(5)).await?;
    Ok(server)
}

impl TestServer {
    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = self.client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        anyhow::bail!(
            "server did not become ready on {} within {:?}",
            self.base_url,
            timeout
        )
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Register an application and provision its database; returns the full
/// `data` payload (application, master_key, database).
pub async fn register_app(server: &TestServer, app_name: &str, email: &str) -> Result<Value> {
    let res = server
        .client
        .post(server.url("/applications/register"))
        .json(&json!({
            "app_name": app_name,
            "display_name": format!("{} (test)", app_name),
            "contact_email": email,
        }))
        .send()
        .await?;
    let status = res.status();
    let body = res.json::<Value>().await?;
    anyhow::ensure!(
        status == StatusCode::CREATED,
        "register {app_name} returned {status}: {body}"
    );
    Ok(body["data"].clone())
}

/// Start a registration for an already-registered application; returns the
/// `data` payload (uuid, subdomain, full_domain, ...).
pub async fn start_registration(
    server: &TestServer,
    master_key: &str,
    email: &str,
    organization_name: &str,
) -> Result<Value> {
    let res = server
        .client
        .post(server.url("/onboarding/start"))
        .header("x-master-key", master_key)
        .json(&json!({
            "email": email,
            "organization_name": organization_name,
        }))
        .send()
        .await?;
    let status = res.status();
    let body = res.json::<Value>().await?;
    anyhow::ensure!(
        status == StatusCode::CREATED,
        "start for {organization_name} returned {status}: {body}"
    );
    Ok(body["data"].clone())
}

pub fn as_str(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string at {pointer}: {value}"))
        .to_string()
}
