// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration model of the virtual routing layer.
//!
//! A [`VirtualRoutingConfig`] is usually read from YAML and applied to a
//! [`RoutingTableWriter`] in one batch: either all of it is committed, or the
//! published table is left untouched.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracectl::{TraceCtlError, get_trace_ctl};
use tracing::{debug, info};

use crate::arp::ARP_CACHE_DEFAULT_TIMEOUT_MS;
use crate::errors::VRouterError;
use crate::mac::Mac;
use crate::netvirt::NetVirt;
use crate::rules::{RoutingRule, RuleSpec};
use crate::table::{RoutingTable, RoutingTableWriter};
use crate::vrouter::VirtualRouter;

/// Default time during which a device that cannot be reached is not flooded for
pub const ARP_SUPPRESSION_DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] VRouterError),
    #[error("Invalid tracing configuration: {0}")]
    Tracing(#[from] TraceCtlError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArpConfig {
    pub cache_timeout_ms: u64,
    pub suppression_timeout_ms: u64,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            cache_timeout_ms: ARP_CACHE_DEFAULT_TIMEOUT_MS,
            suppression_timeout_ms: ARP_SUPPRESSION_DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ArpConfig {
    #[must_use]
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
    #[must_use]
    pub fn suppression_timeout(&self) -> Duration {
        Duration::from_millis(self.suppression_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressConfig {
    pub ip: Ipv4Addr,
    pub wildcard: Ipv4Addr,
}

fn active() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netvirt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_router: Option<String>,
    #[serde(default = "active")]
    pub active: bool,
    #[serde(default)]
    pub addresses: Vec<AddressConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayPoolConfig {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Ipv4Addr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    pub tenant: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmac: Option<Mac>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub gateway_pools: Vec<GatewayPoolConfig>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualRoutingConfig {
    /// log levels as comma-separated `tag=level` items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<String>,
    #[serde(default)]
    pub arp: ArpConfig,
    #[serde(default)]
    pub tenants: Vec<String>,
    #[serde(default)]
    pub netvirts: Vec<NetVirt>,
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
}

impl VirtualRoutingConfig {
    /// # Errors
    ///
    /// Fails if the YAML does not describe a configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// # Errors
    ///
    /// Fails if the configuration cannot be serialized.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Commit the configuration as one update of the routing table
    ///
    /// # Errors
    ///
    /// Fails on the first invalid object. The published table is then unchanged.
    pub fn apply(&self, writer: &mut RoutingTableWriter) -> Result<(), ConfigError> {
        if let Some(levels) = &self.tracing {
            get_trace_ctl().setup_from_string(levels)?;
        }
        writer.update(|table| self.apply_to(table))?;
        info!(
            "Applied configuration: {} tenants, {} networks, {} routers",
            self.tenants.len(),
            self.netvirts.len(),
            self.routers.len()
        );
        Ok(())
    }

    /// Replay the configuration on a table. Routers are all created before
    /// their interfaces so that interfaces may refer to any peer.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid object, leaving `table` partially updated.
    pub fn apply_to(&self, table: &mut RoutingTable) -> Result<(), ConfigError> {
        for tenant in &self.tenants {
            table.create_tenant(tenant)?;
        }
        for netvirt in &self.netvirts {
            table.add_netvirt(netvirt.clone())?;
        }
        let mut names = Vec::with_capacity(self.routers.len());
        for rtr in &self.routers {
            let mut router = VirtualRouter::new(&rtr.tenant, &rtr.name)?;
            if let Some(vmac) = rtr.vmac {
                router = router.with_vmac(vmac);
            }
            names.push(table.create_router_with(router)?);
        }
        for (rtr, name) in self.routers.iter().zip(&names) {
            Self::apply_router(table, name, rtr)?;
        }
        Ok(())
    }

    fn apply_router(table: &mut RoutingTable, name: &str, rtr: &RouterConfig) -> Result<(), VRouterError> {
        for iface in &rtr.interfaces {
            table.create_interface(
                name,
                &iface.name,
                iface.netvirt.as_deref(),
                iface.peer_router.as_deref(),
                iface.active,
            )?;
            for addr in &iface.addresses {
                table.assign_interface_addr(name, &iface.name, addr.ip, addr.wildcard)?;
            }
        }
        for pool in &rtr.gateway_pools {
            table.create_gateway_pool(name, &pool.name)?;
            for node in &pool.nodes {
                table.add_gateway_pool_node(name, &pool.name, *node)?;
            }
        }
        for spec in &rtr.rules {
            table.add_routing_rule(name, RoutingRule::try_from(spec)?)?;
        }
        debug!("Configured router {name}");
        Ok(())
    }
}
