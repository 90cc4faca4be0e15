// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The set of tenants, virtual networks and virtual routers, and route
//! computation across chains of routers.
//!
//! The table is published through a [`RoutingTableWriter`]. Packet workers
//! hold a [`RoutingTableReader`] and always see a complete version of the
//! table: an update is applied to a private copy and swapped in at once.

use arc_swap::ArcSwap;
use lpm::{Ipv4Prefix, PrefixTrie};
use ordermap::OrderMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

use crate::decision::{DropReason, ForwardingAction};
use crate::errors::VRouterError;
use crate::gwpool::{FlowKey, GatewayNode, GatewaySelector};
use crate::interfaces::Attachment;
use crate::mac::Mac;
use crate::names::{split_qualified, tenant_of, validate_component};
use crate::netvirt::NetVirt;
use crate::rules::RoutingRule;
use crate::services::SubnetOwnerResolver;
use crate::vrouter::{RouteRequest, VirtualRouter};

trace_target!("routing-table", tracectl::LevelFilter::INFO, &["virtual-routing"]);

/// Upper bound on the number of routers a packet may cross
pub const MAX_HOPS: usize = 256;

/// Registry of which router owns each interface subnet
#[derive(Clone, Debug, Default)]
pub struct SubnetOwners(PrefixTrie<String>);

impl SubnetOwners {
    pub fn iter(&self) -> impl Iterator<Item = (&Ipv4Prefix, &String)> {
        self.0.iter()
    }
}

impl SubnetOwnerResolver for SubnetOwners {
    fn find_subnet_owner(&self, subnet: &Ipv4Prefix) -> Option<String> {
        self.0
            .matches(subnet.network())
            .find(|(prefix, _)| prefix.covers(subnet))
            .map(|(_, owner)| owner.clone())
    }

    fn add_subnet_owner(&mut self, subnet: Ipv4Prefix, router: &str) {
        if let Some(prev) = self.0.insert(subnet, router.to_string())
            && prev != router
        {
            warn!("Subnet {subnet} moved from {prev} to {router}");
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tenant {
    pub name: String,
    pub netvirts: Vec<String>,
    pub routers: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    tenants: OrderMap<String, Tenant>,
    netvirts: OrderMap<String, NetVirt>,
    routers: OrderMap<String, VirtualRouter>,
    /// virtual network to the router it is attached to
    netvirt_routers: OrderMap<String, String>,
    owners: SubnetOwners,
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Fails if the tenant exists or the name is invalid.
    pub fn create_tenant(&mut self, name: &str) -> Result<(), VRouterError> {
        validate_component(name)?;
        if self.tenants.contains_key(name) {
            return Err(VRouterError::TenantExists(name.to_string()));
        }
        self.tenants.insert(
            name.to_string(),
            Tenant {
                name: name.to_string(),
                ..Default::default()
            },
        );
        info!("Created tenant {name}");
        Ok(())
    }

    fn tenant_mut(&mut self, name: &str) -> Result<&mut Tenant, VRouterError> {
        self.tenants
            .get_mut(name)
            .ok_or_else(|| VRouterError::NoSuchTenant(name.to_string()))
    }

    /// Register a virtual network. Its tenant must exist.
    ///
    /// # Errors
    ///
    /// Fails if the name is not qualified, the tenant is unknown or the
    /// network exists.
    pub fn add_netvirt(&mut self, netvirt: NetVirt) -> Result<(), VRouterError> {
        let (tenant, _) = split_qualified(&netvirt.name)?;
        let tenant = tenant.to_string();
        if self.netvirts.contains_key(&netvirt.name) {
            return Err(VRouterError::NetVirtExists(netvirt.name));
        }
        self.tenant_mut(&tenant)?.netvirts.push(netvirt.name.clone());
        info!("Created virtual network {}", netvirt.name);
        self.netvirts.insert(netvirt.name.clone(), netvirt);
        Ok(())
    }

    /// Create router `name` in `tenant`. Returns its qualified name.
    ///
    /// # Errors
    ///
    /// Fails if the tenant is unknown or the router exists.
    pub fn create_router(&mut self, tenant: &str, name: &str) -> Result<String, VRouterError> {
        self.create_router_with(VirtualRouter::new(tenant, name)?)
    }

    /// Add a router built by the caller, e.g. with a custom virtual MAC
    ///
    /// # Errors
    ///
    /// Fails if the tenant is unknown or the router exists.
    pub fn create_router_with(&mut self, router: VirtualRouter) -> Result<String, VRouterError> {
        let name = router.name().to_string();
        if self.routers.contains_key(&name) {
            return Err(VRouterError::RouterExists(name));
        }
        self.tenant_mut(router.tenant())?.routers.push(name.clone());
        info!("Created virtual router {name}");
        self.routers.insert(name.clone(), router);
        Ok(name)
    }

    fn router_mut(&mut self, name: &str) -> Result<&mut VirtualRouter, VRouterError> {
        self.routers
            .get_mut(name)
            .ok_or_else(|| VRouterError::NoSuchRouter(name.to_string()))
    }

    /// Create an interface on `router`, attached to either a virtual network
    /// of the same tenant or another router
    ///
    /// # Errors
    ///
    /// Fails if the router or the attached entity is unknown, the network
    /// belongs to another tenant or is already attached to a router, or the
    /// interface itself is invalid.
    pub fn create_interface(
        &mut self,
        router: &str,
        iface: &str,
        netvirt: Option<&str>,
        peer_router: Option<&str>,
        active: bool,
    ) -> Result<(), VRouterError> {
        let rtr = self
            .routers
            .get(router)
            .ok_or_else(|| VRouterError::NoSuchRouter(router.to_string()))?;
        let attachment = rtr.check_new_interface(iface, netvirt, peer_router)?;
        match &attachment {
            Attachment::NetVirt(nv) => {
                if !self.netvirts.contains_key(nv) {
                    return Err(VRouterError::NoSuchNetVirt(nv.clone()));
                }
                if tenant_of(nv) != rtr.tenant() {
                    return Err(VRouterError::TenantMismatch(nv.clone(), router.to_string()));
                }
                if let Some(other) = self.netvirt_routers.get(nv) {
                    return Err(VRouterError::AlreadyAttached(nv.clone(), other.clone()));
                }
            }
            Attachment::Router(peer) => {
                split_qualified(peer)?;
                if peer == router {
                    return Err(VRouterError::InvalidAttachment(iface.to_string()));
                }
                if !self.routers.contains_key(peer) {
                    return Err(VRouterError::NoSuchRouter(peer.clone()));
                }
            }
        }
        self.router_mut(router)?
            .create_interface(iface, netvirt, peer_router, active)?;
        if let Attachment::NetVirt(nv) = attachment {
            self.netvirt_routers.insert(nv, router.to_string());
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the router or interface does not exist.
    pub fn set_interface_active(
        &mut self,
        router: &str,
        iface: &str,
        active: bool,
    ) -> Result<(), VRouterError> {
        self.router_mut(router)?.set_interface_active(iface, active)
    }

    /// Assign an address to an interface and record the router as the owner
    /// of the interface subnet
    ///
    /// # Errors
    ///
    /// Fails if the router or interface does not exist or the wildcard mask
    /// is not contiguous.
    pub fn assign_interface_addr(
        &mut self,
        router: &str,
        iface: &str,
        ip: Ipv4Addr,
        wildcard: Ipv4Addr,
    ) -> Result<Ipv4Prefix, VRouterError> {
        let subnet = self
            .router_mut(router)?
            .assign_interface_addr(iface, ip, wildcard)?;
        self.owners.add_subnet_owner(subnet, router);
        Ok(subnet)
    }

    /// # Errors
    ///
    /// Fails if the router does not exist or the rule is invalid for it.
    pub fn add_routing_rule(&mut self, router: &str, rule: RoutingRule) -> Result<(), VRouterError> {
        self.router_mut(router)?.add_routing_rule(rule)
    }

    /// # Errors
    ///
    /// Fails if the router does not exist or the pool exists.
    pub fn create_gateway_pool(&mut self, router: &str, pool: &str) -> Result<(), VRouterError> {
        self.router_mut(router)?.create_gateway_pool(pool)
    }

    /// # Errors
    ///
    /// Fails if the router or the pool does not exist.
    pub fn add_gateway_pool_node(
        &mut self,
        router: &str,
        pool: &str,
        ip: Ipv4Addr,
    ) -> Result<(), VRouterError> {
        self.router_mut(router)?.add_gateway_pool_node(pool, ip)
    }

    /// # Errors
    ///
    /// Fails if the router or the pool does not exist.
    pub fn remove_gateway_pool_node(
        &mut self,
        router: &str,
        pool: &str,
        ip: Ipv4Addr,
    ) -> Result<(), VRouterError> {
        self.router_mut(router)?.remove_gateway_pool_node(pool, ip)
    }

    /// # Errors
    ///
    /// Fails if the router or the pool does not exist.
    pub fn set_gateway_pool_selector(
        &mut self,
        router: &str,
        pool: &str,
        selector: Arc<dyn GatewaySelector>,
    ) -> Result<(), VRouterError> {
        self.router_mut(router)?.set_gateway_pool_selector(pool, selector)
    }

    /// # Errors
    ///
    /// Fails if the router or the pool does not exist.
    pub fn optimal_gateway_node(
        &self,
        router: &str,
        pool: &str,
        flow: &FlowKey,
        tag: u16,
    ) -> Result<Option<GatewayNode>, VRouterError> {
        self.get_router(router)
            .ok_or_else(|| VRouterError::NoSuchRouter(router.to_string()))?
            .optimal_gateway_node(pool, flow, tag)
    }

    #[must_use]
    pub fn get_tenant(&self, name: &str) -> Option<&Tenant> {
        self.tenants.get(name)
    }
    #[must_use]
    pub fn get_netvirt(&self, name: &str) -> Option<&NetVirt> {
        self.netvirts.get(name)
    }
    #[must_use]
    pub fn get_router(&self, name: &str) -> Option<&VirtualRouter> {
        self.routers.get(name)
    }
    pub fn routers(&self) -> impl Iterator<Item = &VirtualRouter> {
        self.routers.values()
    }
    #[must_use]
    pub fn subnet_owners(&self) -> &SubnetOwners {
        &self.owners
    }

    /// The router a virtual network is attached to
    #[must_use]
    pub fn router_of(&self, netvirt: &str) -> Option<&VirtualRouter> {
        self.netvirt_routers
            .get(netvirt)
            .and_then(|name| self.routers.get(name))
    }

    /// Route a packet from a virtual network through the chain of routers
    /// until it leaves into a virtual network or is dropped.
    #[must_use]
    pub fn find_route(
        &self,
        src_netvirt: &str,
        src_ip: Ipv4Addr,
        dst_netvirt: Option<&str>,
        dst_ip: Ipv4Addr,
    ) -> ForwardingAction {
        let Some(mut router) = self.router_of(src_netvirt) else {
            debug!("{src_netvirt} is not attached to any router");
            return ForwardingAction::drop(DropReason::UnknownSrcRouter, src_netvirt);
        };
        let mut ingress = src_netvirt.to_string();
        for hop in 0..MAX_HOPS {
            let req = RouteRequest {
                ingress: &ingress,
                src_netvirt,
                src_ip,
                dst_netvirt,
                dst_ip,
            };
            let action = router.get_forwarding_action(&req, &self.owners);
            trace!("hop {hop} at {}: {:?}", router.name(), action.action);
            if !action.is_forward() {
                return action;
            }
            let Some(next) = action.next_rtr_name.clone() else {
                return action;
            };
            let Some(next_router) = self.routers.get(&next) else {
                debug!("{} forwards to unknown router {next}", router.name());
                return ForwardingAction::drop(DropReason::UnknownSrcRouter, next);
            };
            ingress = router.name().to_string();
            router = next_router;
        }
        warn!("Route from {src_netvirt} {src_ip} to {dst_ip} exceeds {MAX_HOPS} hops");
        ForwardingAction::drop(DropReason::RouteLoop, format!("{src_ip} -> {dst_ip}"))
    }

    /// Whether traffic from one network may reach the other: same network,
    /// or a route is found between them
    #[must_use]
    pub fn connected(
        &self,
        src_netvirt: &str,
        src_ip: Ipv4Addr,
        dst_netvirt: &str,
        dst_ip: Ipv4Addr,
    ) -> bool {
        src_netvirt == dst_netvirt
            || self
                .find_route(src_netvirt, src_ip, Some(dst_netvirt), dst_ip)
                .is_forward()
    }

    /// The virtual MAC to answer with when a host of `src_netvirt` looks for
    /// router address `rtr_ip`. The address must belong to an active router
    /// interface that the host can reach and that can reach back.
    #[must_use]
    pub fn get_rtr_vmac(&self, src_netvirt: &str, src_ip: Ipv4Addr, rtr_ip: Ipv4Addr) -> Option<Mac> {
        let src_router = self.router_of(src_netvirt)?;
        if src_router.owns_ip(src_netvirt, rtr_ip) {
            return Some(src_router.vmac());
        }
        // an address of an interface on another network
        let owner_netvirt = self.routers.values().find_map(|rtr| {
            rtr.interfaces()
                .find(|iface| iface.active && iface.owns_ip(rtr_ip))
                .and_then(|iface| match &iface.attachment {
                    Attachment::NetVirt(nv) => Some(nv.as_str()),
                    Attachment::Router(_) => None,
                })
        })?;
        let reachable = self
            .find_route(src_netvirt, src_ip, Some(owner_netvirt), rtr_ip)
            .is_forward()
            && self
                .find_route(owner_netvirt, rtr_ip, Some(src_netvirt), src_ip)
                .is_forward();
        reachable.then(|| src_router.vmac())
    }

    /// The address of the router interface serving `ip` on `src_netvirt`
    #[must_use]
    pub fn get_rtr_ip(&self, src_netvirt: &str, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        self.router_of(src_netvirt)?.get_rtr_ip(src_netvirt, ip)
    }
}

/// Owner of the routing table. Updates are applied to a copy of the current
/// table, which replaces it only if the update succeeds.
#[derive(Debug)]
pub struct RoutingTableWriter(Arc<ArcSwap<RoutingTable>>);

impl RoutingTableWriter {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(ArcSwap::from_pointee(RoutingTable::new())))
    }

    #[must_use]
    pub fn get_reader(&self) -> RoutingTableReader {
        RoutingTableReader(self.0.clone())
    }

    /// Apply a batch of changes atomically
    ///
    /// # Errors
    ///
    /// Returns the error of the update, in which case the published table is unchanged.
    pub fn update<T, E>(
        &mut self,
        update: impl FnOnce(&mut RoutingTable) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut table = RoutingTable::clone(&self.0.load());
        let out = update(&mut table)?;
        self.0.store(Arc::new(table));
        debug!("Published new routing table");
        Ok(out)
    }
}

impl Default for RoutingTableWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct RoutingTableReader(Arc<ArcSwap<RoutingTable>>);

impl RoutingTableReader {
    /// The current version of the table
    #[must_use]
    pub fn get(&self) -> Arc<RoutingTable> {
        self.0.load_full()
    }
}
