//! Subdomain-to-database routing entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Active,
    Suspended,
    Inactive,
}

impl RouteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Active => "active",
            RouteStatus::Suspended => "suspended",
            RouteStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RouteStatus::Active),
            "suspended" => Some(RouteStatus::Suspended),
            "inactive" => Some(RouteStatus::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fast path consulted on every tenant request. Created inactive with
/// the registration, activated when provisioning succeeds, deactivated on
/// cancellation. Only active routes resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRoute {
    pub subdomain: String,
    pub database_name: String,
    pub status: RouteStatus,
    pub updated_at: DateTime<Utc>,
}

impl TenantRoute {
    pub fn is_routable(&self) -> bool {
        self.status == RouteStatus::Active
    }
}
