//! Provisioned tenant database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Active,
    Suspended,
    Deleted,
}

impl DatabaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseStatus::Active => "active",
            DatabaseStatus::Suspended => "suspended",
            DatabaseStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DatabaseStatus::Active),
            "suspended" => Some(DatabaseStatus::Suspended),
            "deleted" => Some(DatabaseStatus::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dedicated Postgres database created for one application. The plaintext
/// role password exists only in the creation response; this record keeps the
/// argon2 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedDatabase {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub database_name: String,
    pub db_username: String,
    #[serde(skip_serializing)]
    pub db_password_hash: String,
    pub host: String,
    pub port: u16,
    pub status: DatabaseStatus,
    pub created_at: DateTime<Utc>,
}
