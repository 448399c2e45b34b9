//! Postgres-backed registry store.
//!
//! Runtime queries only; schema lives in `migrations/`. Row structs stay
//! private here so the domain models carry no sqlx derives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    ApiKey, Application, DatabaseStatus, OnboardingRegistration, ProvisionedDatabase,
    RegistrationStatus, RouteStatus, TenantRoute,
};

use super::{RegistryStore, StoreError};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Translates unique violations into the logical field they protect, so the
/// services can turn them into retries or 409s without parsing SQL state.
fn map_insert_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some("applications_app_name_key") => StoreError::Conflict("app_name"),
                Some("applications_master_key_prefix_key") => {
                    StoreError::Conflict("master_key_prefix")
                }
                Some("applications_app_id_key") => StoreError::Conflict("app_id"),
                Some("provisioned_databases_database_name_key") => {
                    StoreError::Conflict("database_name")
                }
                Some("provisioned_databases_owner_live") => StoreError::Conflict("owner_id"),
                Some("api_keys_fingerprint_key") => StoreError::Conflict("fingerprint"),
                Some("onboarding_registrations_subdomain_key") => {
                    StoreError::Conflict("subdomain")
                }
                Some("tenant_routes_pkey") => StoreError::Conflict("subdomain"),
                _ => StoreError::Conflict("unknown"),
            };
        }
    }
    StoreError::Database(e)
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: Uuid,
    app_id: String,
    app_name: String,
    display_name: String,
    contact_email: String,
    website: Option<String>,
    master_key_prefix: String,
    master_key_hash: String,
    is_active: bool,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Application {
            id: row.id,
            app_id: row.app_id,
            app_name: row.app_name,
            display_name: row.display_name,
            contact_email: row.contact_email,
            website: row.website,
            master_key_prefix: row.master_key_prefix,
            master_key_hash: row.master_key_hash,
            is_active: row.is_active,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DatabaseRow {
    id: Uuid,
    owner_id: Uuid,
    database_name: String,
    db_username: String,
    db_password_hash: String,
    host: String,
    port: i32,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DatabaseRow> for ProvisionedDatabase {
    type Error = StoreError;

    fn try_from(row: DatabaseRow) -> Result<Self, StoreError> {
        let status = DatabaseStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("database status {:?}", row.status)))?;
        let port = u16::try_from(row.port)
            .map_err(|_| StoreError::Corrupt(format!("database port {}", row.port)))?;
        Ok(ProvisionedDatabase {
            id: row.id,
            owner_id: row.owner_id,
            database_name: row.database_name,
            db_username: row.db_username,
            db_password_hash: row.db_password_hash,
            host: row.host,
            port,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: Uuid,
    application_id: Uuid,
    label: Option<String>,
    fingerprint: String,
    secret_hash: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(row: ApiKeyRow) -> Self {
        ApiKey {
            id: row.id,
            application_id: row.application_id,
            label: row.label,
            fingerprint: row.fingerprint,
            secret_hash: row.secret_hash,
            is_active: row.is_active,
            created_at: row.created_at,
            deactivated_at: row.deactivated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    uuid: Uuid,
    application_id: Uuid,
    database_id: Option<Uuid>,
    email: String,
    organization_name: String,
    subdomain: String,
    status: String,
    api_key_fingerprint: Option<String>,
    api_secret_hash: Option<String>,
    dns_configured: bool,
    ssl_configured: bool,
    provisioning_attempts: i32,
    metadata: Value,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRow> for OnboardingRegistration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, StoreError> {
        let status = RegistrationStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("registration status {:?}", row.status)))?;
        let attempts = u32::try_from(row.provisioning_attempts)
            .map_err(|_| StoreError::Corrupt("negative provisioning_attempts".to_string()))?;
        let metadata = match row.metadata {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "registration metadata is not an object: {other}"
                )))
            }
        };
        Ok(OnboardingRegistration {
            uuid: row.uuid,
            application_id: row.application_id,
            database_id: row.database_id,
            email: row.email,
            organization_name: row.organization_name,
            subdomain: row.subdomain,
            status,
            api_key_fingerprint: row.api_key_fingerprint,
            api_secret_hash: row.api_secret_hash,
            dns_configured: row.dns_configured,
            ssl_configured: row.ssl_configured,
            provisioning_attempts: attempts,
            metadata,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    subdomain: String,
    database_name: String,
    status: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RouteRow> for TenantRoute {
    type Error = StoreError;

    fn try_from(row: RouteRow) -> Result<Self, StoreError> {
        let status = RouteStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("route status {:?}", row.status)))?;
        Ok(TenantRoute {
            subdomain: row.subdomain,
            database_name: row.database_name,
            status,
            updated_at: row.updated_at,
        })
    }
}

const APPLICATION_COLUMNS: &str = "id, app_id, app_name, display_name, contact_email, website, \
     master_key_prefix, master_key_hash, is_active, last_used_at, created_at, updated_at";

const DATABASE_COLUMNS: &str =
    "id, owner_id, database_name, db_username, db_password_hash, host, port, status, created_at";

const API_KEY_COLUMNS: &str =
    "id, application_id, label, fingerprint, secret_hash, is_active, created_at, deactivated_at";

const REGISTRATION_COLUMNS: &str = "uuid, application_id, database_id, email, organization_name, \
     subdomain, status, api_key_fingerprint, api_secret_hash, dns_configured, ssl_configured, \
     provisioning_attempts, metadata, completed_at, created_at, updated_at";

#[async_trait]
impl RegistryStore for PostgresStore {
    async fn insert_application(&self, app: &Application) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO applications \
             (id, app_id, app_name, display_name, contact_email, website, master_key_prefix, \
              master_key_hash, is_active, last_used_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(app.id)
        .bind(&app.app_id)
        .bind(&app.app_name)
        .bind(&app.display_name)
        .bind(&app.contact_email)
        .bind(&app.website)
        .bind(&app.master_key_prefix)
        .bind(&app.master_key_hash)
        .bind(app.is_active)
        .bind(app.last_used_at)
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn application_by_app_id(&self, app_id: &str) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE app_id = $1"
        ))
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Application::from))
    }

    async fn application_by_name(&self, app_name: &str) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE app_name = $1"
        ))
        .bind(app_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Application::from))
    }

    async fn application_by_key_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE master_key_prefix = $1"
        ))
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Application::from))
    }

    async fn update_master_key(
        &self,
        id: Uuid,
        prefix: &str,
        hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE applications \
             SET master_key_prefix = $2, master_key_hash = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(prefix)
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE applications SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_database(&self, record: &ProvisionedDatabase) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO provisioned_databases \
             (id, owner_id, database_name, db_username, db_password_hash, host, port, status, \
              created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.database_name)
        .bind(&record.db_username)
        .bind(&record.db_password_hash)
        .bind(&record.host)
        .bind(record.port as i32)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn database_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<ProvisionedDatabase>, StoreError> {
        let row = sqlx::query_as::<_, DatabaseRow>(&format!(
            "SELECT {DATABASE_COLUMNS} FROM provisioned_databases \
             WHERE owner_id = $1 AND status <> 'deleted'"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProvisionedDatabase::try_from).transpose()
    }

    async fn database_name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM provisioned_databases WHERE database_name = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn delete_database(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM provisioned_databases WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO api_keys \
             (id, application_id, label, fingerprint, secret_hash, is_active, created_at, \
              deactivated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(key.id)
        .bind(key.application_id)
        .bind(&key.label)
        .bind(&key.fingerprint)
        .bind(&key.secret_hash)
        .bind(key.is_active)
        .bind(key.created_at)
        .bind(key.deactivated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn deactivate_api_key(
        &self,
        application_id: Uuid,
        key_id: Uuid,
    ) -> Result<Option<ApiKey>, StoreError> {
        // COALESCE keeps the original deactivation time on repeat calls.
        let row = sqlx::query_as::<_, ApiKeyRow>(&format!(
            "UPDATE api_keys \
             SET is_active = FALSE, deactivated_at = COALESCE(deactivated_at, now()) \
             WHERE application_id = $1 AND id = $2 \
             RETURNING {API_KEY_COLUMNS}"
        ))
        .bind(application_id)
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApiKey::from))
    }

    async fn insert_registration(
        &self,
        registration: &OnboardingRegistration,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO onboarding_registrations \
             (uuid, application_id, database_id, email, organization_name, subdomain, status, \
              api_key_fingerprint, api_secret_hash, dns_configured, ssl_configured, \
              provisioning_attempts, metadata, completed_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(registration.uuid)
        .bind(registration.application_id)
        .bind(registration.database_id)
        .bind(&registration.email)
        .bind(&registration.organization_name)
        .bind(&registration.subdomain)
        .bind(registration.status.as_str())
        .bind(&registration.api_key_fingerprint)
        .bind(&registration.api_secret_hash)
        .bind(registration.dns_configured)
        .bind(registration.ssl_configured)
        .bind(registration.provisioning_attempts as i32)
        .bind(Value::Object(registration.metadata.clone()))
        .bind(registration.completed_at)
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn registration(
        &self,
        application_id: Uuid,
        uuid: Uuid,
    ) -> Result<Option<OnboardingRegistration>, StoreError> {
        let row = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM onboarding_registrations \
             WHERE application_id = $1 AND uuid = $2"
        ))
        .bind(application_id)
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OnboardingRegistration::try_from).transpose()
    }

    async fn update_registration(
        &self,
        registration: &OnboardingRegistration,
    ) -> Result<(), StoreError> {
        // Subdomain is immutable after insert.
        let result = sqlx::query(
            "UPDATE onboarding_registrations \
             SET database_id = $2, email = $3, organization_name = $4, status = $5, \
                 api_key_fingerprint = $6, api_secret_hash = $7, dns_configured = $8, \
                 ssl_configured = $9, provisioning_attempts = $10, metadata = $11, \
                 completed_at = $12, updated_at = $13 \
             WHERE uuid = $1",
        )
        .bind(registration.uuid)
        .bind(registration.database_id)
        .bind(&registration.email)
        .bind(&registration.organization_name)
        .bind(registration.status.as_str())
        .bind(&registration.api_key_fingerprint)
        .bind(&registration.api_secret_hash)
        .bind(registration.dns_configured)
        .bind(registration.ssl_configured)
        .bind(registration.provisioning_attempts as i32)
        .bind(Value::Object(registration.metadata.clone()))
        .bind(registration.completed_at)
        .bind(registration.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn subdomain_taken(&self, subdomain: &str) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM onboarding_registrations WHERE subdomain = $1)",
        )
        .bind(subdomain)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn upsert_route(&self, route: &TenantRoute) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenant_routes (subdomain, database_name, status, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (subdomain) DO UPDATE \
             SET database_name = EXCLUDED.database_name, status = EXCLUDED.status, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&route.subdomain)
        .bind(&route.database_name)
        .bind(route.status.as_str())
        .bind(route.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn route_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantRoute>, StoreError> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT subdomain, database_name, status, updated_at FROM tenant_routes \
             WHERE subdomain = $1",
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TenantRoute::try_from).transpose()
    }

    async fn set_route_status(
        &self,
        subdomain: &str,
        status: RouteStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE tenant_routes SET status = $2, updated_at = now() WHERE subdomain = $1",
        )
        .bind(subdomain)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn active_routes(&self) -> Result<Vec<TenantRoute>, StoreError> {
        let rows = sqlx::query_as::<_, RouteRow>(
            "SELECT subdomain, database_name, status, updated_at FROM tenant_routes \
             WHERE status = 'active' ORDER BY subdomain",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TenantRoute::try_from).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
