//! Descriptor validation. Runs before any pool is built or DDL is issued.

use crate::error::DescriptorError;
use crate::tenant::TenantDescriptor;
use crate::url::ConnectionUrl;
use regex::Regex;
use std::sync::OnceLock;

fn tenant_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.-]{0,127}$").expect("static pattern"))
}

fn database_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_$-]{0,63}$").expect("static pattern"))
}

/// Validate a descriptor and return its parsed connection URL.
/// Database names are checked only for engines that interpolate them into DDL.
pub fn validate_descriptor(descriptor: &TenantDescriptor) -> Result<ConnectionUrl, DescriptorError> {
    if !tenant_name_pattern().is_match(&descriptor.name) {
        return Err(DescriptorError::Invalid(format!(
            "tenant name '{}' must be 1-128 characters of letters, digits, space, '_', '.', '-'",
            descriptor.name
        )));
    }
    let url = descriptor.connection_url()?;
    if descriptor.engine().issues_ddl() && !database_name_pattern().is_match(url.database()) {
        return Err(DescriptorError::Invalid(format!(
            "database name '{}' is not a valid identifier",
            url.database()
        )));
    }
    Ok(url)
}
