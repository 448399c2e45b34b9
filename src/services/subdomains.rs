//! Subdomain allocation: slug derivation, availability probing, and the
//! DNS/SSL configuration calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::infra::{DnsProbe, InfraError, InfraProvider};
use crate::store::{RegistryStore, StoreError};

/// DNS label limit.
const MAX_LABEL_LEN: usize = 63;

/// Labels that collide with platform surfaces. Shared with application name
/// validation; a tenant can never shadow `api.<base>` or `www.<base>`.
pub const RESERVED_NAMES: &[&str] = &[
    "admin", "api", "www", "app", "root", "system", "internal", "status", "mail", "billing",
    "support", "dashboard", "staging", "test", "demo", "security", "postgres", "atrium",
];

#[derive(Debug, thiserror::Error)]
pub enum SubdomainError {
    #[error("Cannot derive a subdomain from {0:?}")]
    Unusable(String),
    #[error("Subdomain allocation exhausted for {0:?}")]
    Exhausted(String),
    #[error("Infrastructure call timed out after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reduce arbitrary text to a DNS label: lowercase `[a-z0-9-]`, hyphens
/// collapsed and trimmed, at most 63 characters.
pub fn slugify(seed: &str) -> String {
    let mut slug = String::with_capacity(seed.len());
    let mut last_hyphen = true; // swallow leading separators
    for c in seed.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.len() > MAX_LABEL_LEN {
        slug.truncate(MAX_LABEL_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Format-level validity plus the reserved-name rule. Pure; shared by
/// allocation and by request validation at the HTTP layer.
pub fn is_valid_subdomain(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return false;
    }
    !RESERVED_NAMES.contains(&label)
}

pub struct SubdomainAllocator {
    store: Arc<dyn RegistryStore>,
    infra: Arc<dyn InfraProvider>,
    dns_probe: Option<Arc<dyn DnsProbe>>,
    base_domain: String,
    max_name_attempts: u32,
    infra_timeout: Duration,
}

impl SubdomainAllocator {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        infra: Arc<dyn InfraProvider>,
        dns_probe: Option<Arc<dyn DnsProbe>>,
        base_domain: String,
        max_name_attempts: u32,
        infra_timeout: Duration,
    ) -> Self {
        Self {
            store,
            infra,
            dns_probe,
            base_domain,
            max_name_attempts,
            infra_timeout,
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    pub fn full_domain(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.base_domain)
    }

    /// Derive a free subdomain from a seed. Numbered candidates first, then a
    /// timestamp fallback; fails closed when even the fallback is taken. The
    /// registration insert remains the final uniqueness arbiter.
    pub async fn allocate(&self, seed: &str) -> Result<String, SubdomainError> {
        let mut base = slugify(seed);
        if base.is_empty() {
            return Err(SubdomainError::Unusable(seed.to_string()));
        }
        if RESERVED_NAMES.contains(&base.as_str()) {
            base = with_suffix(&base, "app");
        }

        for attempt in 0..self.max_name_attempts {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base, &(attempt + 1).to_string())
            };
            if self.available(&candidate).await? {
                return Ok(candidate);
            }
        }

        let fallback = with_suffix(&base, &Utc::now().timestamp().to_string());
        if self.available(&fallback).await? {
            return Ok(fallback);
        }
        Err(SubdomainError::Exhausted(base))
    }

    /// The registry answer is authoritative. The optional live-DNS probe only
    /// surfaces drift to operators; it never vetoes a registry-free name.
    async fn available(&self, candidate: &str) -> Result<bool, SubdomainError> {
        if self.store.subdomain_taken(candidate).await? {
            return Ok(false);
        }
        if let Some(probe) = &self.dns_probe {
            let fqdn = self.full_domain(candidate);
            if probe.resolves(&fqdn).await {
                warn!(
                    "DNS already resolves {} but the registry has no owner; proceeding",
                    fqdn
                );
            }
        }
        Ok(true)
    }

    pub async fn configure_dns(&self, subdomain: &str) -> Result<bool, SubdomainError> {
        let call = self.infra.configure_dns(subdomain, &self.base_domain);
        match tokio::time::timeout(self.infra_timeout, call).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(SubdomainError::Timeout(self.infra_timeout.as_secs())),
        }
    }

    pub async fn configure_ssl(&self, subdomain: &str) -> Result<bool, SubdomainError> {
        let call = self.infra.configure_ssl(subdomain, &self.base_domain);
        match tokio::time::timeout(self.infra_timeout, call).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => Err(SubdomainError::Timeout(self.infra_timeout.as_secs())),
        }
    }
}

/// Append `-suffix`, shrinking the base so the label stays within bounds.
fn with_suffix(base: &str, suffix: &str) -> String {
    let budget = MAX_LABEL_LEN.saturating_sub(suffix.len() + 1);
    let mut head = base.to_string();
    if head.len() > budget {
        head.truncate(budget);
        while head.ends_with('-') {
            head.pop();
        }
    }
    format!("{head}-{suffix}")
}
