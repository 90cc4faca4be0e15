// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual router: interfaces, routing rules, gateway pools and the
//! computation of forwarding actions.


use lpm::{Ipv4Prefix, PrefixTrie};
use ordermap::OrderMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, info, trace, warn};

use crate::decision::{DropReason, ForwardingAction};
use crate::errors::VRouterError;
use crate::gwpool::{FlowKey, GatewayNode, GatewayPool, GatewaySelector};
use crate::interfaces::{Attachment, InterfaceAddress, VRouterInterface};
use crate::mac::{Mac, VIRTUAL_ROUTING_MAC};
use crate::names::{is_provider_tenant, qualify, tenant_of, validate_component};
use crate::rules::{Destination, RoutingRule, RuleIndex, Source};
use crate::services::SubnetOwnerResolver;

trace_target!("vrouter", tracectl::LevelFilter::INFO, &["virtual-routing"]);

/// A packet to route, as seen by one router
#[derive(Clone, Copy, Debug)]
pub struct RouteRequest<'a> {
    /// ingress interface name, or the name of the entity attached to it
    pub ingress: &'a str,
    pub src_netvirt: &'a str,
    pub src_ip: Ipv4Addr,
    /// `None` for silent hosts
    pub dst_netvirt: Option<&'a str>,
    pub dst_ip: Ipv4Addr,
}

#[derive(Clone, Debug)]
pub struct VirtualRouter {
    name: String,
    tenant: String,
    vmac: Mac,
    interfaces: OrderMap<String, VRouterInterface>,
    /// attached entity (virtual network or peer router) to interface name
    entity_ifaces: OrderMap<String, String>,
    /// tenant of a peer router to interface name
    tenant_ifaces: OrderMap<String, String>,
    default_iface: Option<String>,
    /// subnets of the interfaces of this router
    local_subnets: PrefixTrie<String>,
    rules: RuleIndex,
    gateway_pools: OrderMap<String, GatewayPool>,
}

impl VirtualRouter {
    /// Create router `name` in `tenant`
    ///
    /// # Errors
    ///
    /// Fails if either name is not a valid name component.
    pub fn new(tenant: &str, name: &str) -> Result<Self, VRouterError> {
        validate_component(tenant)?;
        validate_component(name)?;
        Ok(Self {
            name: qualify(tenant, name),
            tenant: tenant.to_string(),
            vmac: VIRTUAL_ROUTING_MAC,
            interfaces: OrderMap::new(),
            entity_ifaces: OrderMap::new(),
            tenant_ifaces: OrderMap::new(),
            default_iface: None,
            local_subnets: PrefixTrie::new(),
            rules: RuleIndex::new(),
            gateway_pools: OrderMap::new(),
        })
    }

    #[must_use]
    pub fn with_vmac(mut self, vmac: Mac) -> Self {
        self.vmac = vmac;
        self
    }

    /// Qualified name, `tenant|router`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }
    #[must_use]
    pub fn vmac(&self) -> Mac {
        self.vmac
    }
    #[must_use]
    pub fn rules(&self) -> &RuleIndex {
        &self.rules
    }
    #[must_use]
    pub fn get_interface(&self, name: &str) -> Option<&VRouterInterface> {
        self.interfaces.get(name)
    }
    pub fn interfaces(&self) -> impl Iterator<Item = &VRouterInterface> {
        self.interfaces.values()
    }
    #[must_use]
    pub fn default_interface(&self) -> Option<&VRouterInterface> {
        self.default_iface
            .as_ref()
            .and_then(|name| self.interfaces.get(name))
    }

    /// The interface attached to an entity, or carrying that name
    #[must_use]
    pub fn lookup_interface(&self, name_or_entity: &str) -> Option<&VRouterInterface> {
        self.interfaces.get(name_or_entity).or_else(|| {
            self.entity_ifaces
                .get(name_or_entity)
                .and_then(|name| self.interfaces.get(name))
        })
    }

    /// Check that an interface could be created, without creating it
    ///
    /// # Errors
    ///
    /// Fails if the name is taken, the attachment is not exactly one of a
    /// virtual network or a router, or the entity is already attached.
    pub fn check_new_interface(
        &self,
        name: &str,
        netvirt: Option<&str>,
        peer_router: Option<&str>,
    ) -> Result<Attachment, VRouterError> {
        validate_component(name)?;
        if self.interfaces.contains_key(name) {
            return Err(VRouterError::InterfaceExists(name.to_string()));
        }
        let attachment = Attachment::new(name, netvirt, peer_router)?;
        if self.entity_ifaces.contains_key(attachment.entity()) {
            return Err(VRouterError::AlreadyAttached(
                attachment.entity().to_string(),
                self.name.clone(),
            ));
        }
        Ok(attachment)
    }

    /// Create an interface attached to either a virtual network or a peer router
    ///
    /// # Errors
    ///
    /// See [`VirtualRouter::check_new_interface`].
    pub fn create_interface(
        &mut self,
        name: &str,
        netvirt: Option<&str>,
        peer_router: Option<&str>,
        active: bool,
    ) -> Result<(), VRouterError> {
        let attachment = self.check_new_interface(name, netvirt, peer_router)?;
        let entity = attachment.entity().to_string();
        if let Attachment::Router(peer) = &attachment {
            let peer_tenant = tenant_of(peer);
            if is_provider_tenant(peer_tenant) {
                self.default_iface = Some(name.to_string());
            }
            self.tenant_ifaces
                .insert(peer_tenant.to_string(), name.to_string());
        }
        self.entity_ifaces.insert(entity, name.to_string());
        let iface = VRouterInterface::new(name, attachment, active);
        debug!("{}: created interface {iface}", self.name);
        self.interfaces.insert(name.to_string(), iface);
        Ok(())
    }

    /// Bring an interface up or down
    ///
    /// # Errors
    ///
    /// Fails if the interface does not exist.
    pub fn set_interface_active(&mut self, name: &str, active: bool) -> Result<(), VRouterError> {
        let iface = self
            .interfaces
            .get_mut(name)
            .ok_or_else(|| VRouterError::NoSuchInterface(name.to_string()))?;
        iface.active = active;
        info!("{}: interface {name} is now {}", self.name, if active { "up" } else { "down" });
        Ok(())
    }

    /// Whether the interface attached to `entity` exists and is down
    #[must_use]
    pub fn is_iface_down(&self, entity: &str) -> bool {
        self.lookup_interface(entity).is_some_and(|i| !i.active)
    }

    /// Assign an address to an interface. The subnet it serves is given by the
    /// wildcard mask. An interface may serve several subnets.
    ///
    /// # Errors
    ///
    /// Fails if the interface does not exist or the wildcard is not contiguous.
    pub fn assign_interface_addr(
        &mut self,
        iface: &str,
        ip: Ipv4Addr,
        wildcard: Ipv4Addr,
    ) -> Result<Ipv4Prefix, VRouterError> {
        let subnet = Ipv4Prefix::from_wildcard(ip, wildcard)?;
        let entry = self
            .interfaces
            .get_mut(iface)
            .ok_or_else(|| VRouterError::NoSuchInterface(iface.to_string()))?;
        entry.add_address(InterfaceAddress { ip, subnet });
        self.local_subnets.insert(subnet, iface.to_string());
        debug!("{}: assigned {ip} ({subnet}) to {iface}", self.name);
        Ok(subnet)
    }

    /// Check that a rule could be added, without adding it
    ///
    /// # Errors
    ///
    /// Fails if the rule names an unknown egress interface or gateway pool.
    pub fn check_rule(&self, rule: &RoutingRule) -> Result<(), VRouterError> {
        rule.validate()?;
        if let Some(iface) = &rule.out_iface
            && !self.interfaces.contains_key(iface)
        {
            return Err(VRouterError::NoSuchInterface(iface.clone()));
        }
        if let Some(pool) = &rule.next_hop_gateway_pool
            && !self.gateway_pools.contains_key(pool)
        {
            return Err(VRouterError::NoSuchGatewayPool(pool.clone()));
        }
        Ok(())
    }

    /// Add a routing rule. Adding an identical rule again has no effect.
    ///
    /// # Errors
    ///
    /// See [`VirtualRouter::check_rule`].
    pub fn add_routing_rule(&mut self, rule: RoutingRule) -> Result<(), VRouterError> {
        self.check_rule(&rule)?;
        debug!("{}: adding rule {rule}", self.name);
        if !self.rules.insert(rule) {
            debug!("{}: rule was already present", self.name);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if a pool with that name exists.
    pub fn create_gateway_pool(&mut self, name: &str) -> Result<(), VRouterError> {
        validate_component(name)?;
        if self.gateway_pools.contains_key(name) {
            return Err(VRouterError::GatewayPoolExists(name.to_string()));
        }
        self.gateway_pools
            .insert(name.to_string(), GatewayPool::new(name));
        Ok(())
    }

    fn pool_mut(&mut self, name: &str) -> Result<&mut GatewayPool, VRouterError> {
        self.gateway_pools
            .get_mut(name)
            .ok_or_else(|| VRouterError::NoSuchGatewayPool(name.to_string()))
    }

    /// # Errors
    ///
    /// Fails if the pool does not exist.
    pub fn get_gateway_pool(&self, name: &str) -> Result<&GatewayPool, VRouterError> {
        self.gateway_pools
            .get(name)
            .ok_or_else(|| VRouterError::NoSuchGatewayPool(name.to_string()))
    }

    /// # Errors
    ///
    /// Fails if the pool does not exist.
    pub fn set_gateway_pool_selector(
        &mut self,
        pool: &str,
        selector: Arc<dyn GatewaySelector>,
    ) -> Result<(), VRouterError> {
        self.pool_mut(pool)?.set_selector(selector);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the pool does not exist.
    pub fn add_gateway_pool_node(&mut self, pool: &str, ip: Ipv4Addr) -> Result<(), VRouterError> {
        self.pool_mut(pool)?.add_node(ip);
        Ok(())
    }

    /// # Errors
    ///
    /// Fails if the pool does not exist.
    pub fn remove_gateway_pool_node(&mut self, pool: &str, ip: Ipv4Addr) -> Result<(), VRouterError> {
        if !self.pool_mut(pool)?.remove_node(ip) {
            debug!("{}: {ip} was not in gateway pool {pool}", self.name);
        }
        Ok(())
    }

    /// The gateway a flow should use, `None` if the pool has no usable node
    ///
    /// # Errors
    ///
    /// Fails if the pool does not exist.
    pub fn optimal_gateway_node(
        &self,
        pool: &str,
        flow: &FlowKey,
        tag: u16,
    ) -> Result<Option<GatewayNode>, VRouterError> {
        Ok(self.get_gateway_pool(pool)?.optimal_node(flow, tag))
    }

    /// The virtual MAC of this router if `ip` is in a subnet of the active
    /// interface bound to `entity`
    #[must_use]
    pub fn get_vmac(&self, entity: &str, ip: Ipv4Addr) -> Option<Mac> {
        self.lookup_interface(entity)
            .filter(|iface| iface.active && iface.serves(ip))
            .map(|_| self.vmac)
    }

    /// The address of the interface bound to `entity` in the subnet containing `ip`
    #[must_use]
    pub fn get_rtr_ip(&self, entity: &str, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        self.lookup_interface(entity)
            .and_then(|iface| iface.address_for(ip))
            .map(|addr| addr.ip)
    }

    /// Whether `ip` is the address of the interface bound to `entity`
    #[must_use]
    pub fn owns_ip(&self, entity: &str, ip: Ipv4Addr) -> bool {
        self.lookup_interface(entity)
            .is_some_and(|iface| iface.active && iface.owns_ip(ip))
    }

    fn peer_tenant_iface(&self, tenant: &str) -> Option<&VRouterInterface> {
        self.tenant_ifaces
            .get(tenant)
            .and_then(|name| self.interfaces.get(name))
    }

    fn local_iface_for(&self, ip: Ipv4Addr) -> Option<&VRouterInterface> {
        self.local_subnets
            .lookup(ip)
            .and_then(|(_, name)| self.interfaces.get(name))
    }

    /// Interface towards the owner of the subnet of `ip`, per the resolver
    fn owner_iface(
        &self,
        ip: Ipv4Addr,
        resolver: &dyn SubnetOwnerResolver,
    ) -> Result<Option<&VRouterInterface>, DropReason> {
        let owner = resolver
            .find_subnet_owner(&Ipv4Prefix::host(ip))
            .ok_or(DropReason::NoSubnetOwner)?;
        trace!("{}: subnet of {ip} is owned by {owner}", self.name);
        Ok(self
            .lookup_interface(&owner)
            .or_else(|| self.peer_tenant_iface(tenant_of(&owner)))
            .or_else(|| self.default_interface()))
    }

    /// Pick the egress interface for a permitted packet
    fn egress_iface(
        &self,
        rule: &RoutingRule,
        req: &RouteRequest,
        resolver: &dyn SubnetOwnerResolver,
    ) -> Result<&VRouterInterface, DropReason> {
        if let Some(name) = &rule.out_iface {
            return self
                .interfaces
                .get(name)
                .ok_or(DropReason::DstInterfaceNotFound);
        }
        if let Some(nh) = rule.next_hop_ip {
            if let Some(iface) = self.local_iface_for(nh) {
                return Ok(iface);
            }
            return match self.owner_iface(nh, resolver) {
                Ok(Some(iface)) => Ok(iface),
                _ => Err(DropReason::NextHopUnknown),
            };
        }
        if let Some(dst_netvirt) = req.dst_netvirt {
            return self
                .lookup_interface(dst_netvirt)
                .or_else(|| self.peer_tenant_iface(tenant_of(dst_netvirt)))
                .or_else(|| self.default_interface())
                .ok_or(DropReason::DstInterfaceNotFound);
        }
        if let Some(iface) = self.local_iface_for(req.dst_ip) {
            return Ok(iface);
        }
        self.owner_iface(req.dst_ip, resolver)?
            .ok_or(DropReason::DstInterfaceNotFound)
    }

    /// Compute the forwarding action for a packet entering this router.
    ///
    /// Rules are evaluated by source tier, then destination precedence. No
    /// matching rule means drop. A permitted packet leaves through the
    /// interface chosen from the rule's egress, next hop, destination network
    /// or subnet ownership, and is never sent back through its ingress.
    #[must_use]
    pub fn get_forwarding_action(
        &self,
        req: &RouteRequest,
        resolver: &dyn SubnetOwnerResolver,
    ) -> ForwardingAction {
        let drop = |reason: DropReason, info: String| {
            debug!("{}: dropping {} -> {}: {reason} ({info})", self.name, req.src_ip, req.dst_ip);
            ForwardingAction::drop(reason, info)
        };

        let Some(ingress) = self.lookup_interface(req.ingress) else {
            return drop(
                DropReason::SrcInterfaceNotFound,
                format!("{} {}", self.name, req.ingress),
            );
        };
        if !ingress.active {
            return drop(
                DropReason::InterfaceDown,
                format!("{} {}", self.name, ingress.name),
            );
        }

        // silent hosts get their tenant from the owner of their subnet
        let owner = if req.dst_netvirt.is_none() {
            resolver.find_subnet_owner(&Ipv4Prefix::host(req.dst_ip))
        } else {
            None
        };
        let dst = Destination {
            netvirt: req.dst_netvirt,
            tenant: req.dst_netvirt.or(owner.as_deref()).map(tenant_of),
            ip: req.dst_ip,
        };
        let src = Source {
            netvirt: req.src_netvirt,
            ip: req.src_ip,
        };

        let Some(rule) = self.rules.find(&src, &dst) else {
            return drop(DropReason::DropRule, format!("{}: no matching rule", self.name));
        };
        trace!("{}: {} -> {} matches rule {rule}", self.name, req.src_ip, req.dst_ip);
        if !rule.is_permit() {
            return drop(DropReason::DropRule, format!("{}: {rule}", self.name));
        }

        let egress = match self.egress_iface(rule, req, resolver) {
            Ok(iface) => iface,
            Err(reason) => return drop(reason, format!("{}: {rule}", self.name)),
        };
        if !egress.active {
            return drop(
                DropReason::InterfaceDown,
                format!("{} {}", self.name, egress.name),
            );
        }
        if egress.name == ingress.name {
            return drop(
                DropReason::RouteError,
                format!("{} {} is both ingress and egress", self.name, egress.name),
            );
        }

        let mut action = ForwardingAction::forward();
        action.egress_iface = Some(egress.name.clone());
        match &egress.attachment {
            Attachment::Router(peer) => action.next_rtr_name = Some(peer.clone()),
            Attachment::NetVirt(netvirt) => {
                action.dst_netvirt_name = Some(netvirt.clone());
                // routed rather than bridged: the source is outside the egress subnets
                if !egress.addresses.is_empty() && !egress.serves(req.src_ip) {
                    action.new_src_mac = Some(self.vmac);
                }
            }
        }
        if let Some(nh) = rule.next_hop_ip {
            action.next_hop_ip = Some(nh);
        } else if let Some(pool) = &rule.next_hop_gateway_pool {
            action.next_hop_gateway_pool = Some(pool.clone());
            action.next_hop_gateway_pool_router = Some(self.name.clone());
        } else {
            action.next_hop_ip = Some(req.dst_ip);
        }
        trace!("{}: forwarding through {}: {action:?}", self.name, egress.name);
        action
    }
}
