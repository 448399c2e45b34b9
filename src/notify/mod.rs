//! Fire-and-forget notifications for registration lifecycle events.
//!
//! Delivery is best-effort with no retry; failures are logged and forgotten.
//! Events never carry secret material.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Application, OnboardingRegistration, RegistrationStatus};

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationEvent {
    pub event: &'static str,
    pub registration_uuid: Uuid,
    pub app_id: String,
    pub subdomain: String,
    pub status: RegistrationStatus,
    pub occurred_at: DateTime<Utc>,
}

impl RegistrationEvent {
    fn new(
        event: &'static str,
        registration: &OnboardingRegistration,
        app: &Application,
    ) -> Self {
        Self {
            event,
            registration_uuid: registration.uuid,
            app_id: app.app_id.clone(),
            subdomain: registration.subdomain.clone(),
            status: registration.status,
            occurred_at: Utc::now(),
        }
    }

    pub fn created(registration: &OnboardingRegistration, app: &Application) -> Self {
        Self::new("registration.created", registration, app)
    }

    pub fn activated(registration: &OnboardingRegistration, app: &Application) -> Self {
        Self::new("registration.activated", registration, app)
    }

    pub fn cancelled(registration: &OnboardingRegistration, app: &Application) -> Self {
        Self::new("registration.cancelled", registration, app)
    }

    pub fn completed(registration: &OnboardingRegistration, app: &Application) -> Self {
        Self::new("registration.completed", registration, app)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: RegistrationEvent);
}

/// Default sink: events land in the log stream only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: RegistrationEvent) {
        info!(
            event = event.event,
            registration = %event.registration_uuid,
            subdomain = %event.subdomain,
            "registration event"
        );
    }
}

/// Posts events as JSON to a configured webhook endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: RegistrationEvent) {
        let result = self.client.post(&self.url).json(&event).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    event = event.event,
                    status = %response.status(),
                    "webhook notification rejected"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(event = event.event, "webhook notification failed: {}", e);
            }
        }
    }
}
