//! TenantService: provisioning, activation, removal and startup replay.

mod tenants;
pub use tenants::{Provisioned, ReplaySummary, TenantService, TenantSummary};
