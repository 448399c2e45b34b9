//! Registry storage: the system of record for applications, databases,
//! registrations, and routes.
//!
//! Uniqueness of subdomains and database names is enforced here, not in the
//! probe loops above. Callers treat [`StoreError::Conflict`] on insert as
//! "pick the next candidate", never as corruption.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApiKey, Application, OnboardingRegistration, ProvisionedDatabase, RouteStatus, TenantRoute,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; names the logical field.
    #[error("duplicate value for {0}")]
    Conflict(&'static str),
    #[error("record not found")]
    NotFound,
    /// A persisted value no longer parses (e.g. unknown status string).
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    // Applications
    async fn insert_application(&self, app: &Application) -> Result<(), StoreError>;
    async fn application_by_app_id(&self, app_id: &str) -> Result<Option<Application>, StoreError>;
    async fn application_by_name(&self, app_name: &str) -> Result<Option<Application>, StoreError>;
    /// The O(1) authentication lookup: at most one row can match a prefix.
    async fn application_by_key_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<Application>, StoreError>;
    /// Single atomic swap of prefix + hash; the old key stops validating the
    /// instant this returns.
    async fn update_master_key(
        &self,
        id: Uuid,
        prefix: &str,
        hash: &str,
    ) -> Result<(), StoreError>;
    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError>;

    // Provisioned databases
    async fn insert_database(&self, record: &ProvisionedDatabase) -> Result<(), StoreError>;
    async fn database_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<ProvisionedDatabase>, StoreError>;
    async fn database_name_taken(&self, name: &str) -> Result<bool, StoreError>;
    /// Rollback path: removes a reserved row after failed DDL.
    async fn delete_database(&self, id: Uuid) -> Result<(), StoreError>;

    // API keys
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError>;
    async fn deactivate_api_key(
        &self,
        application_id: Uuid,
        key_id: Uuid,
    ) -> Result<Option<ApiKey>, StoreError>;

    // Onboarding registrations
    async fn insert_registration(
        &self,
        registration: &OnboardingRegistration,
    ) -> Result<(), StoreError>;
    /// Reads are scoped to the owning application; a foreign uuid is simply
    /// absent from this view.
    async fn registration(
        &self,
        application_id: Uuid,
        uuid: Uuid,
    ) -> Result<Option<OnboardingRegistration>, StoreError>;
    async fn update_registration(
        &self,
        registration: &OnboardingRegistration,
    ) -> Result<(), StoreError>;
    async fn subdomain_taken(&self, subdomain: &str) -> Result<bool, StoreError>;

    // Tenant routes
    async fn upsert_route(&self, route: &TenantRoute) -> Result<(), StoreError>;
    async fn route_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantRoute>, StoreError>;
    async fn set_route_status(
        &self,
        subdomain: &str,
        status: RouteStatus,
    ) -> Result<(), StoreError>;
    async fn active_routes(&self) -> Result<Vec<TenantRoute>, StoreError>;

    /// Liveness probe for /health.
    async fn ping(&self) -> Result<(), StoreError>;
}
