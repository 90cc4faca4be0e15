// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use lpm::PrefixError;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VRouterError {
    #[error("A tenant named '{0}' already exists")]
    TenantExists(String),

    #[error("No tenant named '{0}'")]
    NoSuchTenant(String),

    #[error("A virtual network named '{0}' already exists")]
    NetVirtExists(String),

    #[error("No virtual network named '{0}'")]
    NoSuchNetVirt(String),

    #[error("A virtual router named '{0}' already exists")]
    RouterExists(String),

    #[error("No virtual router named '{0}'")]
    NoSuchRouter(String),

    #[error("An interface named '{0}' already exists")]
    InterfaceExists(String),

    #[error("No interface named '{0}'")]
    NoSuchInterface(String),

    #[error("Interface '{0}' must attach to exactly one virtual network or router")]
    InvalidAttachment(String),

    #[error("'{0}' is already attached to an interface of router '{1}'")]
    AlreadyAttached(String, String),

    #[error("'{0}' and '{1}' belong to different tenants")]
    TenantMismatch(String, String),

    #[error("A gateway pool named '{0}' already exists")]
    GatewayPoolExists(String),

    #[error("No gateway pool named '{0}'")]
    NoSuchGatewayPool(String),

    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] PrefixError),

    #[error("Invalid routing rule: {0}")]
    InvalidRule(&'static str),
}
