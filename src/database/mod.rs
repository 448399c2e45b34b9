//! Physical database plumbing: privileged DDL execution and the per-tenant
//! connection pool map.

pub mod admin;
pub mod pools;

pub use admin::{AdminError, DatabaseAdmin, MemoryAdmin, PgAdmin};
pub use pools::{PoolError, TenantPools};
