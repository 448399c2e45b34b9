//! External infrastructure seams: DNS record + TLS certificate provisioning,
//! and the optional live-DNS availability probe.
//!
//! Providers return `Ok(true)` on success and `Ok(false)` on a definitive
//! refusal; transport-level failures are errors. Timeouts are enforced by the
//! caller, not the provider.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("infrastructure provider error: {0}")]
    Provider(String),
    #[error("infrastructure call timed out after {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait InfraProvider: Send + Sync {
    async fn configure_dns(&self, subdomain: &str, base_domain: &str) -> Result<bool, InfraError>;
    async fn configure_ssl(&self, subdomain: &str, base_domain: &str) -> Result<bool, InfraError>;
}

/// Development provider: accepts every subdomain immediately. Wildcard DNS
/// and a local TLS terminator make real record pushes unnecessary.
pub struct StaticInfra;

#[async_trait]
impl InfraProvider for StaticInfra {
    async fn configure_dns(&self, subdomain: &str, base_domain: &str) -> Result<bool, InfraError> {
        tracing::debug!("static DNS accept for {}.{}", subdomain, base_domain);
        Ok(true)
    }

    async fn configure_ssl(&self, subdomain: &str, base_domain: &str) -> Result<bool, InfraError> {
        tracing::debug!("static SSL accept for {}.{}", subdomain, base_domain);
        Ok(true)
    }
}

/// Best-effort check whether a name already resolves outside the registry.
#[async_trait]
pub trait DnsProbe: Send + Sync {
    async fn resolves(&self, fqdn: &str) -> bool;
}

/// Probes through the operating system resolver.
pub struct SystemResolver;

#[async_trait]
impl DnsProbe for SystemResolver {
    async fn resolves(&self, fqdn: &str) -> bool {
        match tokio::net::lookup_host((fqdn, 443u16)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(_) => false,
        }
    }
}
