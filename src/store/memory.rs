//! In-memory registry store.
//!
//! Backs development mode (no `DATABASE_URL`) and the test suites. Mirrors
//! the Postgres store's constraint behavior exactly, including which field a
//! conflict reports.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    ApiKey, Application, DatabaseStatus, OnboardingRegistration, ProvisionedDatabase, RouteStatus,
    TenantRoute,
};

use super::{RegistryStore, StoreError};

#[derive(Default)]
struct Inner {
    applications: Vec<Application>,
    databases: Vec<ProvisionedDatabase>,
    api_keys: Vec<ApiKey>,
    registrations: HashMap<Uuid, OnboardingRegistration>,
    routes: HashMap<String, TenantRoute>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn insert_application(&self, app: &Application) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.applications.iter().any(|a| a.app_name == app.app_name) {
            return Err(StoreError::Conflict("app_name"));
        }
        if inner
            .applications
            .iter()
            .any(|a| a.master_key_prefix == app.master_key_prefix)
        {
            return Err(StoreError::Conflict("master_key_prefix"));
        }
        if inner.applications.iter().any(|a| a.app_id == app.app_id) {
            return Err(StoreError::Conflict("app_id"));
        }
        inner.applications.push(app.clone());
        Ok(())
    }

    async fn application_by_app_id(&self, app_id: &str) -> Result<Option<Application>, StoreError> {
        Ok(self
            .read()
            .applications
            .iter()
            .find(|a| a.app_id == app_id)
            .cloned())
    }

    async fn application_by_name(&self, app_name: &str) -> Result<Option<Application>, StoreError> {
        Ok(self
            .read()
            .applications
            .iter()
            .find(|a| a.app_name == app_name)
            .cloned())
    }

    async fn application_by_key_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self
            .read()
            .applications
            .iter()
            .find(|a| a.master_key_prefix == prefix)
            .cloned())
    }

    async fn update_master_key(
        &self,
        id: Uuid,
        prefix: &str,
        hash: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner
            .applications
            .iter()
            .any(|a| a.id != id && a.master_key_prefix == prefix)
        {
            return Err(StoreError::Conflict("master_key_prefix"));
        }
        let app = inner
            .applications
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;
        app.master_key_prefix = prefix.to_string();
        app.master_key_hash = hash.to_string();
        app.updated_at = Utc::now();
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.write();
        if let Some(app) = inner.applications.iter_mut().find(|a| a.id == id) {
            app.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn insert_database(&self, record: &ProvisionedDatabase) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner
            .databases
            .iter()
            .any(|d| d.database_name == record.database_name)
        {
            return Err(StoreError::Conflict("database_name"));
        }
        if inner
            .databases
            .iter()
            .any(|d| d.owner_id == record.owner_id && d.status != DatabaseStatus::Deleted)
        {
            return Err(StoreError::Conflict("owner_id"));
        }
        inner.databases.push(record.clone());
        Ok(())
    }

    async fn database_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<ProvisionedDatabase>, StoreError> {
        Ok(self
            .read()
            .databases
            .iter()
            .find(|d| d.owner_id == owner_id && d.status != DatabaseStatus::Deleted)
            .cloned())
    }

    async fn database_name_taken(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.read().databases.iter().any(|d| d.database_name == name))
    }

    async fn delete_database(&self, id: Uuid) -> Result<(), StoreError> {
        self.write().databases.retain(|d| d.id != id);
        Ok(())
    }

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.api_keys.iter().any(|k| k.fingerprint == key.fingerprint) {
            return Err(StoreError::Conflict("fingerprint"));
        }
        inner.api_keys.push(key.clone());
        Ok(())
    }

    async fn deactivate_api_key(
        &self,
        application_id: Uuid,
        key_id: Uuid,
    ) -> Result<Option<ApiKey>, StoreError> {
        let mut inner = self.write();
        let Some(key) = inner
            .api_keys
            .iter_mut()
            .find(|k| k.id == key_id && k.application_id == application_id)
        else {
            return Ok(None);
        };
        if key.is_active {
            key.is_active = false;
            key.deactivated_at = Some(Utc::now());
        }
        Ok(Some(key.clone()))
    }

    async fn insert_registration(
        &self,
        registration: &OnboardingRegistration,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner
            .registrations
            .values()
            .any(|r| r.subdomain == registration.subdomain)
        {
            return Err(StoreError::Conflict("subdomain"));
        }
        inner
            .registrations
            .insert(registration.uuid, registration.clone());
        Ok(())
    }

    async fn registration(
        &self,
        application_id: Uuid,
        uuid: Uuid,
    ) -> Result<Option<OnboardingRegistration>, StoreError> {
        Ok(self
            .read()
            .registrations
            .get(&uuid)
            .filter(|r| r.application_id == application_id)
            .cloned())
    }

    async fn update_registration(
        &self,
        registration: &OnboardingRegistration,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.registrations.get_mut(&registration.uuid) {
            Some(existing) => {
                *existing = registration.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn subdomain_taken(&self, subdomain: &str) -> Result<bool, StoreError> {
        Ok(self
            .read()
            .registrations
            .values()
            .any(|r| r.subdomain == subdomain))
    }

    async fn upsert_route(&self, route: &TenantRoute) -> Result<(), StoreError> {
        self.write()
            .routes
            .insert(route.subdomain.clone(), route.clone());
        Ok(())
    }

    async fn route_by_subdomain(&self, subdomain: &str) -> Result<Option<TenantRoute>, StoreError> {
        Ok(self.read().routes.get(subdomain).cloned())
    }

    async fn set_route_status(
        &self,
        subdomain: &str,
        status: RouteStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let route = inner
            .routes
            .get_mut(subdomain)
            .ok_or(StoreError::NotFound)?;
        route.status = status;
        route.updated_at = Utc::now();
        Ok(())
    }

    async fn active_routes(&self) -> Result<Vec<TenantRoute>, StoreError> {
        let mut routes: Vec<TenantRoute> = self
            .read()
            .routes
            .values()
            .filter(|r| r.status == RouteStatus::Active)
            .cloned()
            .collect();
        routes.sort_by(|a, b| a.subdomain.cmp(&b.subdomain));
        Ok(routes)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
