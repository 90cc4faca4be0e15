// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routing decisions handed to the flow-installation layer

use crate::mac::Mac;
use crate::services::{DeviceKey, PortId, SwitchId};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// Hard timeout (seconds) of flows installed for ARP-triggered decisions
pub const ARP_FLOWMOD_HARD_TIMEOUT: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoutingAction {
    /// Nothing to install: the frame is consumed or dropped without a flow
    None,
    Drop,
    Forward,
    ForwardOrFlood,
    Multicast,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    UnknownSrcRouter,
    InterfaceDown,
    SrcInterfaceNotFound,
    DropRule,
    DstInterfaceNotFound,
    RouteError,
    NextHopUnknown,
    NoSubnetOwner,
    RouteLoop,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            DropReason::UnknownSrcRouter => "source is not attached to a router",
            DropReason::InterfaceDown => "interface is down",
            DropReason::SrcInterfaceNotFound => "ingress interface not found",
            DropReason::DropRule => "dropped by rule",
            DropReason::DstInterfaceNotFound => "egress interface not found",
            DropReason::RouteError => "egress equals ingress",
            DropReason::NextHopUnknown => "next hop is not reachable",
            DropReason::NoSubnetOwner => "destination subnet has no owner",
            DropReason::RouteLoop => "route loop",
        };
        f.write_str(reason)
    }
}

/// Result of evaluating routing rules on one or more virtual routers
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardingAction {
    pub action: RoutingAction,
    pub drop_reason: Option<DropReason>,
    pub drop_info: Option<String>,
    /// interface of the router the packet leaves through
    pub egress_iface: Option<String>,
    pub next_hop_ip: Option<Ipv4Addr>,
    pub next_rtr_name: Option<String>,
    pub dst_netvirt_name: Option<String>,
    /// set when the packet is routed into a virtual network
    pub new_src_mac: Option<Mac>,
    pub next_hop_gateway_pool: Option<String>,
    pub next_hop_gateway_pool_router: Option<String>,
}

impl ForwardingAction {
    #[must_use]
    pub fn drop(reason: DropReason, info: impl Into<String>) -> Self {
        Self {
            action: RoutingAction::Drop,
            drop_reason: Some(reason),
            drop_info: Some(info.into()),
            ..Self::forward()
        }
    }
    #[must_use]
    pub fn forward() -> Self {
        Self {
            action: RoutingAction::Forward,
            drop_reason: None,
            drop_info: None,
            egress_iface: None,
            next_hop_ip: None,
            next_rtr_name: None,
            dst_netvirt_name: None,
            new_src_mac: None,
            next_hop_gateway_pool: None,
            next_hop_gateway_pool_router: None,
        }
    }
    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.action == RoutingAction::Forward
    }
    #[must_use]
    pub fn is_drop(&self) -> bool {
        self.action == RoutingAction::Drop
    }
}

/// The decision attached to a packet context
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingDecision {
    pub switch: SwitchId,
    pub in_port: PortId,
    pub src_device: Option<DeviceKey>,
    pub dst_device: Option<DeviceKey>,
    pub action: RoutingAction,
    pub hard_timeout: Option<u16>,
    pub drop_reason: Option<DropReason>,
    pub next_hop_ip: Option<Ipv4Addr>,
    pub next_rtr_name: Option<String>,
    pub new_src_mac: Option<Mac>,
    pub gateway_pool: Option<String>,
    pub gateway_pool_router: Option<String>,
}

impl RoutingDecision {
    #[must_use]
    pub fn new(switch: SwitchId, in_port: PortId, action: RoutingAction) -> Self {
        Self {
            switch,
            in_port,
            src_device: None,
            dst_device: None,
            action,
            hard_timeout: None,
            drop_reason: None,
            next_hop_ip: None,
            next_rtr_name: None,
            new_src_mac: None,
            gateway_pool: None,
            gateway_pool_router: None,
        }
    }
    #[must_use]
    pub fn with_hard_timeout(mut self, timeout: u16) -> Self {
        self.hard_timeout = Some(timeout);
        self
    }
    #[must_use]
    pub fn with_devices(mut self, src: Option<DeviceKey>, dst: Option<DeviceKey>) -> Self {
        self.src_device = src;
        self.dst_device = dst;
        self
    }
    /// Fill the routing part of the decision from a forwarding action
    #[must_use]
    pub fn with_forwarding(mut self, fa: &ForwardingAction) -> Self {
        self.action = fa.action;
        self.drop_reason = fa.drop_reason;
        self.next_hop_ip = fa.next_hop_ip;
        self.next_rtr_name.clone_from(&fa.next_rtr_name);
        self.new_src_mac = fa.new_src_mac;
        self.gateway_pool.clone_from(&fa.next_hop_gateway_pool);
        self.gateway_pool_router
            .clone_from(&fa.next_hop_gateway_pool_router);
        self
    }
}
