//! Control-plane services: application registry, database provisioner,
//! subdomain allocator, and the onboarding state machine.

pub mod onboarding;
pub mod provisioner;
pub mod registry;
pub mod subdomains;

pub use onboarding::{OnboardingError, OnboardingService, ProvisionOutcome};
pub use provisioner::{DatabaseProvisioner, ProvisionError, ProvisionedOutput};
pub use registry::{ApplicationRegistry, NewApplicationRequest, RegistryError};
pub use subdomains::{SubdomainAllocator, SubdomainError};
