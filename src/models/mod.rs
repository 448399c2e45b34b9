//! Domain models shared across services, stores, and handlers.
//!
//! These types are persistence-agnostic: the Postgres store maps them
//! to rows internally, the in-memory store holds them directly.

pub mod application;
pub mod database;
pub mod registration;
pub mod route;

pub use application::{ApiKey, Application};
pub use database::{DatabaseStatus, ProvisionedDatabase};
pub use registration::{OnboardingRegistration, RegistrationStatus};
pub use route::{RouteStatus, TenantRoute};
