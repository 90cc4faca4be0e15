// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tenant-qualified names.
//!
//! Virtual networks and routers are named `tenant|name`. Router interfaces
//! are identified globally as `tenant|router|interface`.

use crate::errors::VRouterError;

pub const SEPARATOR: char = '|';

/// Tenant owning the virtual infrastructure
pub const SYSTEM_TENANT: &str = "system";
/// Tenant for infrastructure outside of the controller's domain
pub const EXTERNAL_TENANT: &str = "external";

/// The tenant part of a qualified name. A name without separator is its own tenant.
#[must_use]
pub fn tenant_of(name: &str) -> &str {
    name.split_once(SEPARATOR).map_or(name, |(tenant, _)| tenant)
}

#[must_use]
pub fn qualify(tenant: &str, name: &str) -> String {
    format!("{tenant}{SEPARATOR}{name}")
}

/// Split `tenant|name`
///
/// # Errors
///
/// Fails if the name has no tenant part or any part is empty.
pub fn split_qualified(name: &str) -> Result<(&str, &str), VRouterError> {
    match name.split_once(SEPARATOR) {
        Some((tenant, local)) if !tenant.is_empty() && !local.is_empty() => Ok((tenant, local)),
        _ => Err(VRouterError::InvalidName(name.to_string())),
    }
}

/// Check a single name component
///
/// # Errors
///
/// Fails if the name is empty or contains the separator.
pub fn validate_component(name: &str) -> Result<(), VRouterError> {
    if name.is_empty() || name.contains(SEPARATOR) {
        return Err(VRouterError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Tenants whose routers act as the default exit of other tenants
#[must_use]
pub fn is_provider_tenant(tenant: &str) -> bool {
    tenant == SYSTEM_TENANT || tenant == EXTERNAL_TENANT
}
