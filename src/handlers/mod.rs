//! HTTP handlers for tenant administration and tenant-scoped workspace reads.

pub mod tenants;
pub mod workspace;
pub use tenants::*;
pub use workspace::*;
