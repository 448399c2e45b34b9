//! Onboarding registration model and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Registration lifecycle. `pending` may move to `activated` or `cancelled`,
/// `activated` may move to `completed`; `completed` and `cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Activated,
    Cancelled,
    Completed,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Activated => "activated",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RegistrationStatus::Pending),
            "activated" => Some(RegistrationStatus::Activated),
            "cancelled" => Some(RegistrationStatus::Cancelled),
            "completed" => Some(RegistrationStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Completed | RegistrationStatus::Cancelled
        )
    }

    /// Legality of a single transition. Self-transitions are not legal here;
    /// idempotent re-reads are handled above this layer without transitioning.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, next),
            (Pending, Activated) | (Pending, Cancelled) | (Activated, Completed)
        )
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tenant onboarding flow. The `uuid` is the public handle clients poll
/// and provision against; rows are scoped to the owning application on every
/// read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingRegistration {
    pub uuid: Uuid,
    pub application_id: Uuid,
    pub database_id: Option<Uuid>,
    pub email: String,
    pub organization_name: String,
    pub subdomain: String,
    pub status: RegistrationStatus,
    /// Fingerprint of the API key minted during provisioning, if any.
    pub api_key_fingerprint: Option<String>,
    #[serde(skip_serializing)]
    pub api_secret_hash: Option<String>,
    pub dns_configured: bool,
    pub ssl_configured: bool,
    pub provisioning_attempts: u32,
    /// Free-form client extras. Fields with platform meaning are typed
    /// columns, never buried in here.
    pub metadata: Map<String, Value>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingRegistration {
    pub fn is_fully_configured(&self) -> bool {
        self.dns_configured && self.ssl_configured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_branches_to_activated_or_cancelled() {
        let pending = RegistrationStatus::Pending;
        assert!(pending.can_transition_to(RegistrationStatus::Activated));
        assert!(pending.can_transition_to(RegistrationStatus::Cancelled));
        assert!(!pending.can_transition_to(RegistrationStatus::Completed));
    }

    #[test]
    fn activated_only_completes() {
        let activated = RegistrationStatus::Activated;
        assert!(activated.can_transition_to(RegistrationStatus::Completed));
        assert!(!activated.can_transition_to(RegistrationStatus::Cancelled));
        assert!(!activated.can_transition_to(RegistrationStatus::Pending));
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for terminal in [RegistrationStatus::Completed, RegistrationStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                RegistrationStatus::Pending,
                RegistrationStatus::Activated,
                RegistrationStatus::Cancelled,
                RegistrationStatus::Completed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(RegistrationStatus::Activated).unwrap();
        assert_eq!(json, "activated");
        assert_eq!(RegistrationStatus::parse("completed"), Some(RegistrationStatus::Completed));
        assert_eq!(RegistrationStatus::parse("unknown"), None);
    }
}
