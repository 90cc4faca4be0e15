// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Contracts of the collaborators the decision logic depends on: device
//! tracking, physical topology, tunnels, subnet ownership and packet injection.

use crate::frame::EthernetFrame;
use crate::mac::Mac;
use crate::netvirt::NetVirt;
use lpm::Ipv4Prefix;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::Instant;

pub type SwitchId = u64;
pub type PortId = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchPort {
    pub switch: SwitchId,
    pub port: PortId,
}

impl SwitchPort {
    #[must_use]
    pub fn new(switch: SwitchId, port: PortId) -> Self {
        Self { switch, port }
    }
}

impl Display for SwitchPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}/{}", self.switch, self.port)
    }
}

/// Identity of a tracked device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey(pub u64);

impl Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dev-{}", self.0)
    }
}

/// A device as known by the device service
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub key: DeviceKey,
    pub mac: Mac,
    pub ipv4: Vec<Ipv4Addr>,
    pub attachment_points: Vec<SwitchPort>,
    pub last_seen: Option<Instant>,
}

impl Device {
    #[must_use]
    pub fn has_ip(&self, ip: Ipv4Addr) -> bool {
        self.ipv4.contains(&ip)
    }
}

pub trait DeviceService: Send + Sync {
    /// Find the device with the given MAC and IP
    fn find_device(&self, mac: Mac, ip: Ipv4Addr) -> Option<Device>;
    /// Find the device owning an IP address
    fn find_device_by_ip(&self, ip: Ipv4Addr) -> Option<Device>;
    /// The virtual networks a device belongs to
    fn netvirts_of(&self, device: DeviceKey) -> Vec<NetVirt>;
}

/// Facts about the physical topology. `tunnel_enabled` tells whether paths
/// may go through tunnels.
pub trait TopologyService: Send + Sync {
    fn is_attachment_point_port(&self, sp: SwitchPort, tunnel_enabled: bool) -> bool;
    fn in_same_l2_domain(&self, a: SwitchId, b: SwitchId, tunnel_enabled: bool) -> bool;
    /// Whether a packet seen at `seen` is consistent with a device attached at `ap`
    fn is_consistent(&self, ap: SwitchPort, seen: SwitchPort, tunnel_enabled: bool) -> bool;
    /// The port through which traffic from `from` towards `to` enters the fabric
    fn incoming_switch_port(
        &self,
        from: SwitchPort,
        to: SwitchPort,
        tunnel_enabled: bool,
    ) -> Option<SwitchPort>;
}

pub trait TunnelService: Send + Sync {
    fn is_tunnel_endpoint(&self, device: &Device) -> bool;
}

/// Which virtual router owns a subnet
pub trait SubnetOwnerResolver {
    /// Owner of the longest registered subnet covering `subnet`
    fn find_subnet_owner(&self, subnet: &Ipv4Prefix) -> Option<String>;
    fn add_subnet_owner(&mut self, subnet: Ipv4Prefix, router: &str);
}

/// Access to switches. Injection is fire-and-forget and only reports
/// whether the frame could be handed over.
pub trait PacketInjector: Send + Sync {
    /// Feed a frame back into the controller as if received on `at`
    fn inject_event(&self, at: SwitchPort, frame: EthernetFrame) -> bool;
}
