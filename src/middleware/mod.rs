pub mod auth;
pub mod client_ip;
pub mod response;
pub mod tenant;

pub use auth::{master_key_auth, MASTER_KEY_HEADER};
pub use client_ip::ClientIp;
pub use response::{ApiResponse, ApiResult};
pub use tenant::{resolve_tenant, ResolvedTenant};
