//! Privileged DDL execution against the Postgres cluster.
//!
//! DDL statements cannot take bind parameters, so identifiers go through
//! [`quote_identifier`] and the role password through [`quote_literal`].
//! Grants take effect immediately on Postgres; there is no separate
//! privilege-flush step.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("ddl execution failed: {0}")]
    Ddl(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Consults the live server, not the registry.
    async fn database_exists(&self, name: &str) -> Result<bool, AdminError>;
    async fn create_database(&self, name: &str) -> Result<(), AdminError>;
    async fn create_role(&self, username: &str, password: &str) -> Result<(), AdminError>;
    async fn grant_privileges(&self, database: &str, username: &str) -> Result<(), AdminError>;
    /// Rollback path after a partial provision; must tolerate absence.
    async fn drop_database(&self, name: &str) -> Result<(), AdminError>;
    async fn drop_role(&self, username: &str) -> Result<(), AdminError>;
}

/// Quote a SQL identifier to prevent injection.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Executes DDL through a privileged pool connected to the `postgres`
/// maintenance database.
pub struct PgAdmin {
    pool: PgPool,
}

impl PgAdmin {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseAdmin for PgAdmin {
    async fn database_exists(&self, name: &str) -> Result<bool, AdminError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    async fn create_database(&self, name: &str) -> Result<(), AdminError> {
        let query = format!("CREATE DATABASE {}", quote_identifier(name));
        sqlx::query(&query).execute(&self.pool).await?;
        info!("Created database: {}", name);
        Ok(())
    }

    async fn create_role(&self, username: &str, password: &str) -> Result<(), AdminError> {
        let query = format!(
            "CREATE ROLE {} WITH LOGIN PASSWORD {}",
            quote_identifier(username),
            quote_literal(password)
        );
        sqlx::query(&query).execute(&self.pool).await?;
        info!("Created role: {}", username);
        Ok(())
    }

    async fn grant_privileges(&self, database: &str, username: &str) -> Result<(), AdminError> {
        let query = format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_identifier(database),
            quote_identifier(username)
        );
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
        let query = format!("DROP DATABASE IF EXISTS {}", quote_identifier(name));
        sqlx::query(&query).execute(&self.pool).await?;
        info!("Dropped database: {}", name);
        Ok(())
    }

    async fn drop_role(&self, username: &str) -> Result<(), AdminError> {
        let query = format!("DROP ROLE IF EXISTS {}", quote_identifier(username));
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

/// Tracks created databases and roles without touching a server. Backs
/// development mode alongside the in-memory registry store.
#[derive(Default)]
pub struct MemoryAdmin {
    databases: Mutex<HashSet<String>>,
    roles: Mutex<HashSet<String>>,
}

impl MemoryAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DatabaseAdmin for MemoryAdmin {
    async fn database_exists(&self, name: &str) -> Result<bool, AdminError> {
        Ok(self
            .databases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name))
    }

    async fn create_database(&self, name: &str) -> Result<(), AdminError> {
        let mut databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        if !databases.insert(name.to_string()) {
            return Err(AdminError::Ddl(format!("database {name} already exists")));
        }
        Ok(())
    }

    async fn create_role(&self, username: &str, _password: &str) -> Result<(), AdminError> {
        let mut roles = self.roles.lock().unwrap_or_else(|e| e.into_inner());
        if !roles.insert(username.to_string()) {
            return Err(AdminError::Ddl(format!("role {username} already exists")));
        }
        Ok(())
    }

    async fn grant_privileges(&self, database: &str, username: &str) -> Result<(), AdminError> {
        let databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        let roles = self.roles.lock().unwrap_or_else(|e| e.into_inner());
        if !databases.contains(database) || !roles.contains(username) {
            return Err(AdminError::Ddl(format!(
                "grant on missing database or role: {database}"
            )));
        }
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), AdminError> {
        self.databases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        Ok(())
    }

    async fn drop_role(&self, username: &str) -> Result<(), AdminError> {
        self.roles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_neutralizes_injection() {
        assert_eq!(quote_identifier("app_clinic_db"), "\"app_clinic_db\"");
        assert_eq!(
            quote_identifier("bad\"; DROP DATABASE x; --"),
            "\"bad\"\"; DROP DATABASE x; --\""
        );
        assert_eq!(quote_literal("p'w"), "'p''w'");
    }

    #[tokio::test]
    async fn memory_admin_tracks_lifecycle() {
        let admin = MemoryAdmin::new();
        assert!(!admin.database_exists("app_x_db").await.unwrap());

        admin.create_database("app_x_db").await.unwrap();
        admin.create_role("u_abc123def456", "pw").await.unwrap();
        admin
            .grant_privileges("app_x_db", "u_abc123def456")
            .await
            .unwrap();
        assert!(admin.database_exists("app_x_db").await.unwrap());

        // Duplicate creation mirrors server behavior.
        assert!(admin.create_database("app_x_db").await.is_err());

        admin.drop_database("app_x_db").await.unwrap();
        assert!(!admin.database_exists("app_x_db").await.unwrap());
        assert!(admin.created_databases().is_empty());
    }
}
