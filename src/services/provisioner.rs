//! Database provisioning: name derivation, credential minting, DDL, and
//! rollback on partial failure.
//!
//! The registry insert reserves the name before any DDL runs; a unique
//! conflict there just moves on to the next candidate. After a DDL failure
//! the reservation is rolled back so the owner can retry cleanly.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::database::{AdminError, DatabaseAdmin};
use crate::models::{Application, DatabaseStatus, ProvisionedDatabase};
use crate::secrets::{self, SecretError};
use crate::store::{RegistryStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Application already has a provisioned database")]
    AlreadyProvisioned,
    #[error("Could not find a free database name for {0:?}")]
    NameExhausted(String),
    #[error("Database provisioning failed: {0}")]
    Ddl(String),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly provisioned database plus its plaintext role password. The
/// password is not stored anywhere; this value is the single disclosure.
#[derive(Debug)]
pub struct ProvisionedOutput {
    pub record: ProvisionedDatabase,
    pub password: String,
}

pub struct DatabaseProvisioner {
    store: Arc<dyn RegistryStore>,
    admin: Arc<dyn DatabaseAdmin>,
    db_host: String,
    db_port: u16,
    max_name_attempts: u32,
}

impl DatabaseProvisioner {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        admin: Arc<dyn DatabaseAdmin>,
        db_host: String,
        db_port: u16,
        max_name_attempts: u32,
    ) -> Self {
        Self {
            store,
            admin,
            db_host,
            db_port,
            max_name_attempts,
        }
    }

    /// Create the dedicated database for an application.
    pub async fn provision(
        &self,
        owner: &Application,
    ) -> Result<ProvisionedOutput, ProvisionError> {
        if self.store.database_by_owner(owner.id).await?.is_some() {
            return Err(ProvisionError::AlreadyProvisioned);
        }

        let slug = db_slug(&owner.app_name);
        let password = secrets::generate_db_password();
        let password_hash = secrets::hash_secret(&password)?;
        let record = self.reserve_name(owner, &slug, password_hash).await?;

        if let Err(e) = self.run_ddl(&record, &password).await {
            self.rollback(&record).await;
            return Err(ProvisionError::Ddl(e.to_string()));
        }

        info!(
            "Provisioned database {} for application {}",
            record.database_name, owner.app_id
        );
        Ok(ProvisionedOutput { record, password })
    }

    /// Endpoint alias for re-running a failed provision.
    pub async fn retry(&self, owner: &Application) -> Result<ProvisionedOutput, ProvisionError> {
        self.provision(owner).await
    }

    pub async fn database_for(
        &self,
        owner: &Application,
    ) -> Result<Option<ProvisionedDatabase>, ProvisionError> {
        Ok(self.store.database_by_owner(owner.id).await?)
    }

    /// Walk name candidates and reserve the first free one by inserting its
    /// registry row. Probes (registry + live server) are an optimization; the
    /// insert conflict is what decides.
    async fn reserve_name(
        &self,
        owner: &Application,
        slug: &str,
        password_hash: String,
    ) -> Result<ProvisionedDatabase, ProvisionError> {
        let base = format!("app_{slug}_db");
        let mut candidates: Vec<String> = vec![base.clone()];
        for n in 2..=self.max_name_attempts {
            candidates.push(format!("{base}_{n}"));
        }
        candidates.push(format!("{base}_{}", Utc::now().timestamp()));

        for candidate in candidates {
            if self.store.database_name_taken(&candidate).await? {
                continue;
            }
            match self.admin.database_exists(&candidate).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => return Err(ProvisionError::Ddl(e.to_string())),
            }

            let record = ProvisionedDatabase {
                id: Uuid::new_v4(),
                owner_id: owner.id,
                database_name: candidate,
                db_username: secrets::generate_db_username(),
                db_password_hash: password_hash.clone(),
                host: self.db_host.clone(),
                port: self.db_port,
                status: DatabaseStatus::Active,
                created_at: Utc::now(),
            };
            match self.store.insert_database(&record).await {
                Ok(()) => return Ok(record),
                Err(StoreError::Conflict("database_name")) => continue,
                Err(StoreError::Conflict("owner_id")) => {
                    return Err(ProvisionError::AlreadyProvisioned)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ProvisionError::NameExhausted(base))
    }

    async fn run_ddl(
        &self,
        record: &ProvisionedDatabase,
        password: &str,
    ) -> Result<(), AdminError> {
        self.admin.create_database(&record.database_name).await?;
        self.admin.create_role(&record.db_username, password).await?;
        self.admin
            .grant_privileges(&record.database_name, &record.db_username)
            .await
    }

    /// Best-effort cleanup after failed DDL; never masks the original error.
    async fn rollback(&self, record: &ProvisionedDatabase) {
        if let Err(e) = self.admin.drop_database(&record.database_name).await {
            error!(
                "Rollback could not drop database {}: {}",
                record.database_name, e
            );
        }
        if let Err(e) = self.admin.drop_role(&record.db_username).await {
            error!("Rollback could not drop role {}: {}", record.db_username, e);
        }
        if let Err(e) = self.store.delete_database(record.id).await {
            error!(
                "Rollback could not release name {}: {}",
                record.database_name, e
            );
        }
    }
}

/// Pure connection-string formatter. The result contains the plaintext
/// password; callers hand it to the client and never log or persist it.
pub fn connection_string(record: &ProvisionedDatabase, password: &str) -> String {
    format!(
        "postgres://{}:{}@{}:{}/{}",
        record.db_username, password, record.host, record.port, record.database_name
    )
}

/// Database-name slug: `[a-z0-9_]`, separator runs collapsed to one
/// underscore.
fn db_slug(app_name: &str) -> String {
    let mut slug = String::with_capacity(app_name.len());
    let mut last_sep = true;
    for c in app_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            slug.push('_');
            last_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryAdmin;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    fn owner(name: &str) -> Application {
        Application {
            id: Uuid::new_v4(),
            app_id: secrets::generate_app_id(),
            app_name: name.to_string(),
            display_name: name.to_string(),
            contact_email: format!("{name}@example.com"),
            website: None,
            master_key_prefix: Uuid::new_v4().to_string()[..12].to_string(),
            master_key_hash: "hash".to_string(),
            is_active: true,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn provisioner(
        store: Arc<MemoryStore>,
        admin: Arc<dyn DatabaseAdmin>,
    ) -> DatabaseProvisioner {
        DatabaseProvisioner::new(store, admin, "localhost".to_string(), 5432, 5)
    }

    #[test]
    fn db_slug_flattens_app_names() {
        assert_eq!(db_slug("clinic-app"), "clinic_app");
        assert_eq!(db_slug("a--b"), "a_b");
        assert_eq!(db_slug("plain"), "plain");
    }

    #[tokio::test]
    async fn provision_creates_database_role_and_record() {
        let store = Arc::new(MemoryStore::new());
        let admin = Arc::new(MemoryAdmin::new());
        let provisioner = provisioner(store.clone(), admin.clone());
        let app = owner("clinic-app");

        let output = provisioner.provision(&app).await.unwrap();
        assert_eq!(output.record.database_name, "app_clinic_app_db");
        assert!(output.record.db_username.starts_with("u_"));
        assert_eq!(admin.created_databases(), vec!["app_clinic_app_db"]);

        let stored = store.database_by_owner(app.id).await.unwrap().unwrap();
        assert!(secrets::verify_secret(
            &output.password,
            &stored.db_password_hash
        ));
    }

    #[tokio::test]
    async fn second_provision_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = provisioner(store, Arc::new(MemoryAdmin::new()));
        let app = owner("clinic-app");

        provisioner.provision(&app).await.unwrap();
        assert!(matches!(
            provisioner.provision(&app).await.unwrap_err(),
            ProvisionError::AlreadyProvisioned
        ));
    }

    #[tokio::test]
    async fn registry_collision_moves_to_numbered_name() {
        let store = Arc::new(MemoryStore::new());
        let admin = Arc::new(MemoryAdmin::new());
        let provisioner = provisioner(store.clone(), admin.clone());

        provisioner.provision(&owner("clinic-app")).await.unwrap();
        // A different app whose name flattens to the same slug.
        let output = provisioner.provision(&owner("clinic--app")).await.unwrap();
        assert_eq!(output.record.database_name, "app_clinic_app_db_2");
    }

    #[tokio::test]
    async fn live_server_collision_is_also_skipped() {
        let store = Arc::new(MemoryStore::new());
        let admin = Arc::new(MemoryAdmin::new());
        // Exists on the server, unknown to the registry.
        admin.create_database("app_clinic_app_db").await.unwrap();

        let provisioner = provisioner(store, admin);
        let output = provisioner.provision(&owner("clinic-app")).await.unwrap();
        assert_eq!(output.record.database_name, "app_clinic_app_db_2");
    }

    struct RoleFails {
        inner: MemoryAdmin,
    }

    #[async_trait]
    impl DatabaseAdmin for RoleFails {
        async fn database_exists(&self, name: &str) -> Result<bool, AdminError> {
            self.inner.database_exists(name).await
        }

        async fn create_database(&self, name: &str) -> Result<(), AdminError> {
            self.inner.create_database(name).await
        }

        async fn create_role(&self, _u: &str, _p: &str) -> Result<(), AdminError> {
            Err(AdminError::Ddl("role creation refused".to_string()))
        }

        async fn grant_privileges(&self, d: &str, u: &str) -> Result<(), AdminError> {
            self.inner.grant_privileges(d, u).await
        }

        async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
            self.inner.drop_database(name).await
        }

        async fn drop_role(&self, u: &str) -> Result<(), AdminError> {
            self.inner.drop_role(u).await
        }
    }

    #[tokio::test]
    async fn ddl_failure_rolls_back_the_reservation() {
        let store = Arc::new(MemoryStore::new());
        let admin = Arc::new(RoleFails {
            inner: MemoryAdmin::new(),
        });
        let provisioner = provisioner(store.clone(), admin.clone());
        let app = owner("clinic-app");

        let err = provisioner.provision(&app).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Ddl(_)));

        // Name released and no dangling record.
        assert!(!store
            .database_name_taken("app_clinic_app_db")
            .await
            .unwrap());
        assert!(store.database_by_owner(app.id).await.unwrap().is_none());
        assert!(!admin.database_exists("app_clinic_app_db").await.unwrap());

        // A retry reaches DDL again rather than tripping on a stale
        // reservation.
        let retried = provisioner
            .provision(&app)
            .await
            .err()
            .map(|e| e.to_string());
        assert!(retried.unwrap().contains("role creation refused"));
    }

    #[tokio::test]
    async fn connection_string_has_documented_shape() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = provisioner(store, Arc::new(MemoryAdmin::new()));
        let output = provisioner.provision(&owner("clinic-app")).await.unwrap();

        let url = connection_string(&output.record, &output.password);
        assert!(url.starts_with(&format!(
            "postgres://{}:{}@localhost:5432/app_clinic_app_db",
            output.record.db_username, output.password
        )));
    }
}
