//! Application registry: registration, master-key authentication, key
//! regeneration, and per-application API keys.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ApiKey, Application};
use crate::secrets::{self, SecretError};
use crate::store::{RegistryStore, StoreError};

use super::subdomains::RESERVED_NAMES;

/// Retries for the vanishingly rare random-collision cases (key prefix,
/// app id, fingerprint).
const MAX_GENERATION_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Application name already registered: {0}")]
    NameTaken(String),
    #[error("Authentication failed")]
    Auth,
    #[error("Not found")]
    NotFound,
    #[error("Could not allocate a unique identifier")]
    GenerationExhausted,
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApplicationRequest {
    pub app_name: String,
    pub display_name: Option<String>,
    pub contact_email: String,
    pub website: Option<String>,
}

pub struct ApplicationRegistry {
    store: Arc<dyn RegistryStore>,
}

impl ApplicationRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Register an application and mint its master key. The plaintext key
    /// exists only in the returned tuple.
    pub async fn register(
        &self,
        request: NewApplicationRequest,
    ) -> Result<(Application, String), RegistryError> {
        validate_app_name(&request.app_name)?;
        validate_email(&request.contact_email)?;

        let display_name = match request.display_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => request.app_name.clone(),
        };

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let master_key = secrets::generate_master_key();
            // Shape is guaranteed by the generator.
            let prefix = secrets::master_key_prefix(&master_key)
                .ok_or(RegistryError::GenerationExhausted)?;
            let now = Utc::now();
            let app = Application {
                id: Uuid::new_v4(),
                app_id: secrets::generate_app_id(),
                app_name: request.app_name.clone(),
                display_name: display_name.clone(),
                contact_email: request.contact_email.trim().to_string(),
                website: request.website.clone(),
                master_key_prefix: prefix.to_string(),
                master_key_hash: secrets::hash_secret(&master_key)?,
                is_active: true,
                last_used_at: None,
                created_at: now,
                updated_at: now,
            };

            match self.store.insert_application(&app).await {
                Ok(()) => {
                    info!("Registered application: {} ({})", app.app_name, app.app_id);
                    return Ok((app, master_key));
                }
                Err(StoreError::Conflict("app_name")) => {
                    return Err(RegistryError::NameTaken(request.app_name));
                }
                // Random collision on prefix or app_id: roll fresh values.
                Err(StoreError::Conflict("master_key_prefix"))
                | Err(StoreError::Conflict("app_id")) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RegistryError::GenerationExhausted)
    }

    /// Authenticate a presented master key. The unique prefix selects the
    /// single candidate row; exactly one argon2 verification runs per call.
    /// Every failure mode returns the same [`RegistryError::Auth`].
    pub async fn validate_master_key(&self, presented: &str) -> Result<Application, RegistryError> {
        let prefix = secrets::master_key_prefix(presented).ok_or(RegistryError::Auth)?;
        let app = self
            .store
            .application_by_key_prefix(prefix)
            .await?
            .ok_or(RegistryError::Auth)?;
        if !secrets::verify_secret(presented, &app.master_key_hash) {
            return Err(RegistryError::Auth);
        }
        if !app.is_active {
            return Err(RegistryError::Auth);
        }
        if let Err(e) = self.store.touch_last_used(app.id).await {
            warn!("Failed to record key usage for {}: {}", app.app_id, e);
        }
        Ok(app)
    }

    /// Rotate the master key. The contact email must match; an unknown name
    /// and a wrong email are indistinguishable to the caller.
    pub async fn regenerate_master_key(
        &self,
        app_name: &str,
        contact_email: &str,
    ) -> Result<String, RegistryError> {
        let app = self
            .store
            .application_by_name(app_name)
            .await?
            .ok_or(RegistryError::NotFound)?;
        if !app.contact_email.eq_ignore_ascii_case(contact_email.trim()) {
            return Err(RegistryError::NotFound);
        }

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let master_key = secrets::generate_master_key();
            let prefix = secrets::master_key_prefix(&master_key)
                .ok_or(RegistryError::GenerationExhausted)?;
            let hash = secrets::hash_secret(&master_key)?;
            match self.store.update_master_key(app.id, prefix, &hash).await {
                Ok(()) => {
                    info!("Regenerated master key for application: {}", app.app_id);
                    return Ok(master_key);
                }
                Err(StoreError::Conflict("master_key_prefix")) => continue,
                Err(StoreError::NotFound) => return Err(RegistryError::NotFound),
                Err(e) => return Err(e.into()),
            }
        }
        Err(RegistryError::GenerationExhausted)
    }

    /// Mint an API key for an application. The plaintext secret appears only
    /// in the returned tuple.
    pub async fn issue_api_key(
        &self,
        app: &Application,
        label: Option<String>,
    ) -> Result<(ApiKey, String), RegistryError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let secret = secrets::generate_api_secret();
            let key = ApiKey {
                id: Uuid::new_v4(),
                application_id: app.id,
                label: label.clone(),
                fingerprint: secrets::fingerprint(&secret),
                secret_hash: secrets::hash_secret(&secret)?,
                is_active: true,
                created_at: Utc::now(),
                deactivated_at: None,
            };
            match self.store.insert_api_key(&key).await {
                Ok(()) => {
                    info!(
                        "Issued API key {} for application {}",
                        key.fingerprint, app.app_id
                    );
                    return Ok((key, secret));
                }
                Err(StoreError::Conflict("fingerprint")) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RegistryError::GenerationExhausted)
    }

    /// Deactivate an API key. Repeat calls succeed; keys of other
    /// applications are indistinguishable from unknown ids.
    pub async fn deactivate_api_key(
        &self,
        app: &Application,
        key_id: Uuid,
    ) -> Result<ApiKey, RegistryError> {
        self.store
            .deactivate_api_key(app.id, key_id)
            .await?
            .ok_or(RegistryError::NotFound)
    }

    pub async fn find_by_app_id(&self, app_id: &str) -> Result<Option<Application>, RegistryError> {
        Ok(self.store.application_by_app_id(app_id).await?)
    }
}

fn validate_app_name(name: &str) -> Result<(), RegistryError> {
    if name.len() < 3 || name.len() > 50 {
        return Err(RegistryError::Validation(
            "app_name must be 3-50 characters".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(RegistryError::Validation(
            "app_name may only contain lowercase letters, digits, and hyphens".to_string(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(RegistryError::Validation(
            "app_name may not start or end with a hyphen".to_string(),
        ));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(RegistryError::Validation(format!(
            "app_name '{name}' is reserved"
        )));
    }
    Ok(())
}

/// Shared shape check, also used for onboarding contact addresses.
pub(crate) fn email_shape_ok(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn validate_email(email: &str) -> Result<(), RegistryError> {
    if email_shape_ok(email) {
        Ok(())
    } else {
        Err(RegistryError::Validation(
            "contact_email is not a valid address".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> ApplicationRegistry {
        ApplicationRegistry::new(Arc::new(MemoryStore::new()))
    }

    fn request(name: &str) -> NewApplicationRequest {
        NewApplicationRequest {
            app_name: name.to_string(),
            display_name: None,
            contact_email: "owner@clinic.example".to_string(),
            website: None,
        }
    }

    #[tokio::test]
    async fn register_mints_a_well_formed_key() {
        let registry = registry();
        let (app, key) = registry.register(request("clinic-app")).await.unwrap();

        assert!(key.starts_with("mk_"));
        assert_eq!(key.len(), 43);
        assert_eq!(app.master_key_prefix, &key[3..15]);
        assert!(app.app_id.starts_with("app_"));
        assert_eq!(app.display_name, "clinic-app");
    }

    #[tokio::test]
    async fn reserved_and_malformed_names_are_rejected() {
        let registry = registry();
        for bad in ["admin", "postgres", "atrium", "ab", "Clinic-App", "-edge-", "has space"] {
            let err = registry.register(request(bad)).await.unwrap_err();
            assert!(
                matches!(err, RegistryError::Validation(_)),
                "{bad} should fail validation"
            );
        }
    }

    #[tokio::test]
    async fn bad_email_is_rejected() {
        let registry = registry();
        for bad in ["", "no-at-sign", "a@", "@b.com", "a@nodot", "a b@c.com"] {
            let mut req = request("clinic-app");
            req.contact_email = bad.to_string();
            assert!(matches!(
                registry.register(req).await.unwrap_err(),
                RegistryError::Validation(_)
            ));
        }
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let registry = registry();
        registry.register(request("clinic-app")).await.unwrap();
        let err = registry.register(request("clinic-app")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NameTaken(_)));
    }

    #[tokio::test]
    async fn master_key_validation_is_uniform_on_failure() {
        let registry = registry();
        let (_, key) = registry.register(request("clinic-app")).await.unwrap();

        assert!(registry.validate_master_key(&key).await.is_ok());
        for bad in [
            "mk_000000000000000000000000000000000000000a",
            "not-a-key",
            "",
        ] {
            assert!(matches!(
                registry.validate_master_key(bad).await.unwrap_err(),
                RegistryError::Auth
            ));
        }
    }

    #[tokio::test]
    async fn validation_records_last_use() {
        let registry = registry();
        let (app, key) = registry.register(request("clinic-app")).await.unwrap();
        assert!(app.last_used_at.is_none());

        let seen = registry.validate_master_key(&key).await.unwrap();
        let refreshed = registry.find_by_app_id(&seen.app_id).await.unwrap().unwrap();
        assert!(refreshed.last_used_at.is_some());
    }

    #[tokio::test]
    async fn regenerate_swaps_the_key_atomically() {
        let registry = registry();
        let (_, old_key) = registry.register(request("clinic-app")).await.unwrap();

        let new_key = registry
            .regenerate_master_key("clinic-app", "OWNER@clinic.example")
            .await
            .unwrap();
        assert_ne!(old_key, new_key);
        assert!(registry.validate_master_key(&new_key).await.is_ok());
        assert!(matches!(
            registry.validate_master_key(&old_key).await.unwrap_err(),
            RegistryError::Auth
        ));
    }

    #[tokio::test]
    async fn regenerate_hides_existence_on_mismatch() {
        let registry = registry();
        registry.register(request("clinic-app")).await.unwrap();

        let wrong_email = registry
            .regenerate_master_key("clinic-app", "stranger@evil.example")
            .await
            .unwrap_err();
        let unknown_name = registry
            .regenerate_master_key("no-such-app", "owner@clinic.example")
            .await
            .unwrap_err();
        assert!(matches!(wrong_email, RegistryError::NotFound));
        assert!(matches!(unknown_name, RegistryError::NotFound));
    }

    #[tokio::test]
    async fn api_keys_issue_and_deactivate() {
        let registry = registry();
        let (app, _) = registry.register(request("clinic-app")).await.unwrap();

        let (key, secret) = registry
            .issue_api_key(&app, Some("ci".to_string()))
            .await
            .unwrap();
        assert!(secret.starts_with("ak_"));
        assert_eq!(key.fingerprint.len(), 16);
        assert_eq!(key.fingerprint, secrets::fingerprint(&secret));

        let deactivated = registry.deactivate_api_key(&app, key.id).await.unwrap();
        assert!(!deactivated.is_active);
        // Idempotent.
        assert!(registry.deactivate_api_key(&app, key.id).await.is_ok());

        // A different application cannot see the key.
        let (other, _) = registry.register(request("other-app")).await.unwrap();
        assert!(matches!(
            registry.deactivate_api_key(&other, key.id).await.unwrap_err(),
            RegistryError::NotFound
        ));
    }
}
