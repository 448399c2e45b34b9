//! Registered application (platform customer) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered application. One application owns at most one provisioned
/// database and any number of onboarding registrations.
///
/// The master key is never stored: only its argon2 hash plus the first 12
/// characters of the key body (`master_key_prefix`), which is unique and
/// serves as the O(1) lookup index during authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    /// Public identifier, `app_` + 10 random lowercase alphanumerics.
    pub app_id: String,
    /// Unique slug, also the seed for the provisioned database name.
    pub app_name: String,
    pub display_name: String,
    pub contact_email: String,
    pub website: Option<String>,
    #[serde(skip_serializing)]
    pub master_key_prefix: String,
    #[serde(skip_serializing)]
    pub master_key_hash: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-application API key. Keys are deactivated rather than deleted so the
/// fingerprint remains auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub application_id: Uuid,
    pub label: Option<String>,
    /// Truncated sha256 of the plaintext secret; safe to display and log.
    pub fingerprint: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Public JSON shape used in registration and status responses.
    pub fn to_public_json(&self) -> serde_json::Value {
        serde_json::json!({
            "app_id": self.app_id,
            "app_name": self.app_name,
            "display_name": self.display_name,
            "contact_email": self.contact_email,
            "website": self.website,
            "is_active": self.is_active,
            "created_at": self.created_at,
        })
    }
}
