mod common;

use std::collections::HashSet;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

use atrium_api::services::NewApplicationRequest;

/// End-to-end walk of the documented flow: a clinic SaaS registers, gets its
/// database, onboards a customer, provisions, and completes.
#[tokio::test]
async fn full_onboarding_lifecycle() -> Result<()> {
    let server = common::spawn_app().await?;

    let data = common::register_app(&server, "clinic-app", "ops@clinic.example").await?;
    let key = common::as_str(&data, "/master_key");
    assert_eq!(data["database"]["database_name"], "app_clinic_app_db");

    // Start: subdomain is derived from the organization name.
    let started = common::start_registration(
        &server,
        &key,
        "owner@cliniquedulac.example",
        "Clinique du Lac",
    )
    .await?;
    let uuid = common::as_str(&started, "/uuid");
    assert_eq!(started["subdomain"], "clinique-du-lac");
    assert_eq!(started["full_domain"], "clinique-du-lac.atrium.localtest.me");
    assert_eq!(started["url"], "https://clinique-du-lac.atrium.localtest.me");
    assert_eq!(started["onboarding_status"], "pending");

    // Poll before provisioning.
    let res = server
        .client
        .get(server.url(&format!("/onboarding/status/{}", uuid)))
        .header("x-master-key", &key)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["onboarding_status"], "pending");
    assert_eq!(body["data"]["dns_configured"], false);
    assert_eq!(body["data"]["provisioning_attempts"], 0);

    // Provision: activates and mints the tenant API key.
    let res = server
        .client
        .post(server.url("/onboarding/provision"))
        .header("x-master-key", &key)
        .json(&json!({"uuid": uuid}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    let provisioned = &body["data"];
    assert_eq!(provisioned["onboarding_status"], "activated");
    assert_eq!(provisioned["dns_configured"], true);
    assert_eq!(provisioned["ssl_configured"], true);
    assert_eq!(provisioned["metadata"]["is_idempotent"], false);

    let api_key = common::as_str(provisioned, "/api_key");
    let api_secret = common::as_str(provisioned, "/api_secret");
    assert_eq!(
        api_key,
        atrium_api::secrets::fingerprint(&api_secret),
        "api_key should be the fingerprint of the secret"
    );

    // Second provision is a readback: no new secret, no new attempt.
    let res = server
        .client
        .post(server.url("/onboarding/provision"))
        .header("x-master-key", &key)
        .json(&json!({"uuid": uuid}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["metadata"]["is_idempotent"], true);
    assert_eq!(body["data"]["api_key"], api_key);
    assert!(
        body["data"].get("api_secret").is_none(),
        "secret disclosed twice: {}",
        body
    );

    // Only the first call consumed an attempt.
    let res = server
        .client
        .get(server.url(&format!("/onboarding/status/{}", uuid)))
        .header("x-master-key", &key)
        .send()
        .await?;
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["onboarding_status"], "activated");
    assert_eq!(body["data"]["provisioning_attempts"], 1);

    // Complete with a typed tenant handle and a client blob.
    let res = server
        .client
        .post(server.url(&format!("/onboarding/{}/complete", uuid)))
        .header("x-master-key", &key)
        .json(&json!({
            "tenant_id": "clinique-du-lac-prod",
            "client_metadata": {"plan": "starter"},
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["onboarding_status"], "completed");
    assert_eq!(body["data"]["metadata"]["tenant_id"], "clinique-du-lac-prod");
    assert_eq!(body["data"]["metadata"]["client_metadata"]["plan"], "starter");
    let completed_at = common::as_str(&body["data"], "/completed_at");

    // Completing again is a no-op with the same timestamp.
    let res = server
        .client
        .post(server.url(&format!("/onboarding/{}/complete", uuid)))
        .header("x-master-key", &key)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(common::as_str(&body["data"], "/completed_at"), completed_at);
    Ok(())
}

#[tokio::test]
async fn colliding_organization_names_get_numbered_subdomains() -> Result<()> {
    let server = common::spawn_app().await?;
    let data = common::register_app(&server, "crm-app", "ops@crm.example").await?;
    let key = common::as_str(&data, "/master_key");

    let first =
        common::start_registration(&server, &key, "one@acme.example", "Acme Health").await?;
    let second =
        common::start_registration(&server, &key, "two@acme.example", "Acme Health").await?;

    assert_eq!(first["subdomain"], "acme-health");
    assert_eq!(second["subdomain"], "acme-health-2");
    Ok(())
}

#[tokio::test]
async fn concurrent_starts_never_share_a_subdomain() -> Result<()> {
    let server = common::spawn_app().await?;
    let data = common::register_app(&server, "burst-app", "ops@burst.example").await?;
    let key = common::as_str(&data, "/master_key");

    let starts = (0..8).map(|i| {
        let client = server.client.clone();
        let url = server.url("/onboarding/start");
        let key = key.clone();
        async move {
            let res = client
                .post(&url)
                .header("x-master-key", &key)
                .json(&json!({
                    "email": format!("user{i}@burst.example"),
                    "organization_name": "Burst Clinic",
                }))
                .send()
                .await?;
            anyhow::ensure!(res.status() == StatusCode::CREATED, "start {i} failed");
            let body = res.json::<Value>().await?;
            Ok::<String, anyhow::Error>(common::as_str(&body["data"], "/subdomain"))
        }
    });

    let subdomains = futures::future::try_join_all(starts).await?;
    let distinct: HashSet<&String> = subdomains.iter().collect();
    assert_eq!(
        distinct.len(),
        subdomains.len(),
        "duplicate subdomains issued: {subdomains:?}"
    );
    Ok(())
}

#[tokio::test]
async fn start_requires_a_provisioned_database() -> Result<()> {
    let server = common::spawn_app().await?;

    // Register through the service directly so no database run happens.
    let (app, master_key) = server
        .state
        .registry
        .register(NewApplicationRequest {
            app_name: "dbless-app".to_string(),
            display_name: None,
            contact_email: "ops@dbless.example".to_string(),
            website: None,
        })
        .await?;
    assert!(app.is_active);

    let res = server
        .client
        .post(server.url("/onboarding/start"))
        .header("x-master-key", master_key)
        .json(&json!({"email": "owner@dbless.example"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
    let body = res.json::<Value>().await?;
    assert_eq!(body["code"], "PRECONDITION_FAILED");
    Ok(())
}

#[tokio::test]
async fn registrations_are_invisible_across_applications() -> Result<()> {
    let server = common::spawn_app().await?;
    let a = common::register_app(&server, "iso-a", "a@iso.example").await?;
    let b = common::register_app(&server, "iso-b", "b@iso.example").await?;
    let key_a = common::as_str(&a, "/master_key");
    let key_b = common::as_str(&b, "/master_key");

    let started = common::start_registration(&server, &key_a, "x@iso.example", "Iso Org").await?;
    let uuid = common::as_str(&started, "/uuid");

    let res = server
        .client
        .get(server.url(&format!("/onboarding/status/{}", uuid)))
        .header("x-master-key", &key_b)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = server
        .client
        .post(server.url("/onboarding/provision"))
        .header("x-master-key", &key_b)
        .json(&json!({"uuid": uuid}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // The owner still sees it.
    let res = server
        .client
        .get(server.url(&format!("/onboarding/status/{}", uuid)))
        .header("x-master-key", &key_a)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn complete_before_activation_is_an_invalid_state() -> Result<()> {
    let server = common::spawn_app().await?;
    let data = common::register_app(&server, "early-app", "ops@early.example").await?;
    let key = common::as_str(&data, "/master_key");

    let started = common::start_registration(&server, &key, "x@early.example", "Early Org").await?;
    let uuid = common::as_str(&started, "/uuid");

    let res = server
        .client
        .post(server.url(&format!("/onboarding/{}/complete", uuid)))
        .header("x-master-key", &key)
        .json(&json!({"tenant_id": "early"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json::<Value>().await?;
    assert_eq!(body["code"], "INVALID_STATE");
    Ok(())
}

#[tokio::test]
async fn start_rejects_a_malformed_email() -> Result<()> {
    let server = common::spawn_app().await?;
    let data = common::register_app(&server, "mail-app", "ops@mail.example").await?;
    let key = common::as_str(&data, "/master_key");

    let res = server
        .client
        .post(server.url("/onboarding/start"))
        .header("x-master-key", &key)
        .json(&json!({"email": "not an address"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}
