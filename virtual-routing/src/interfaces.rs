// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual router interfaces

use lpm::Ipv4Prefix;
use std::fmt::Display;
use std::net::Ipv4Addr;

use crate::errors::VRouterError;
use crate::names::tenant_of;

/// What a router interface connects to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// an access interface on a virtual network
    NetVirt(String),
    /// a link to another virtual router, by qualified name
    Router(String),
}

impl Attachment {
    /// Build an attachment from the optional names given at configuration time
    ///
    /// # Errors
    ///
    /// Fails unless exactly one of `netvirt` and `peer_router` is given.
    pub fn new(
        iface: &str,
        netvirt: Option<&str>,
        peer_router: Option<&str>,
    ) -> Result<Self, VRouterError> {
        match (netvirt, peer_router) {
            (Some(nv), None) => Ok(Attachment::NetVirt(nv.to_string())),
            (None, Some(rtr)) => Ok(Attachment::Router(rtr.to_string())),
            _ => Err(VRouterError::InvalidAttachment(iface.to_string())),
        }
    }
    /// The name of the attached entity
    #[must_use]
    pub fn entity(&self) -> &str {
        match self {
            Attachment::NetVirt(name) | Attachment::Router(name) => name,
        }
    }
    #[must_use]
    pub fn tenant(&self) -> &str {
        tenant_of(self.entity())
    }
    #[must_use]
    pub fn is_netvirt(&self) -> bool {
        matches!(self, Attachment::NetVirt(_))
    }
}

/// An address assigned to an interface, and the subnet it serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Prefix,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VRouterInterface {
    pub name: String,
    pub attachment: Attachment,
    pub active: bool,
    pub addresses: Vec<InterfaceAddress>,
}

impl VRouterInterface {
    #[must_use]
    pub fn new(name: &str, attachment: Attachment, active: bool) -> Self {
        Self {
            name: name.to_string(),
            attachment,
            active,
            addresses: vec![],
        }
    }

    /// Assign an address. Assigning the same address twice is a no-op.
    pub fn add_address(&mut self, address: InterfaceAddress) {
        if !self.addresses.contains(&address) {
            self.addresses.push(address);
        }
    }

    /// The address whose subnet contains `ip`
    #[must_use]
    pub fn address_for(&self, ip: Ipv4Addr) -> Option<&InterfaceAddress> {
        self.addresses.iter().find(|a| a.subnet.contains(ip))
    }

    #[must_use]
    pub fn serves(&self, ip: Ipv4Addr) -> bool {
        self.address_for(ip).is_some()
    }

    #[must_use]
    pub fn owns_ip(&self, ip: Ipv4Addr) -> bool {
        self.addresses.iter().any(|a| a.ip == ip)
    }
}

impl Display for VRouterInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.attachment.is_netvirt() {
            "netvirt"
        } else {
            "router"
        };
        write!(
            f,
            "{} ({kind} {}, {})",
            self.name,
            self.attachment.entity(),
            if self.active { "up" } else { "down" }
        )?;
        for addr in &self.addresses {
            write!(f, " {}/{}", addr.ip, addr.subnet.len())?;
        }
        Ok(())
    }
}
