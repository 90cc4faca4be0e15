// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual networks (NetVirts) and their flooding policies

use crate::names::tenant_of;
use serde::{Deserialize, Serialize};

/// How ARP requests for unknown targets are handled.
/// Variants are ordered from the strictest to the loosest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArpMode {
    DropIfUnknown,
    #[default]
    FloodIfUnknown,
    AlwaysFlood,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastMode {
    Drop,
    #[default]
    ForwardToKnown,
    AlwaysFlood,
}

/// A tenant-scoped L2 broadcast domain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetVirt {
    pub name: String,
    #[serde(default)]
    pub arp_mode: ArpMode,
    #[serde(default)]
    pub broadcast_mode: BroadcastMode,
}

impl NetVirt {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arp_mode: ArpMode::default(),
            broadcast_mode: BroadcastMode::default(),
        }
    }
    #[must_use]
    pub fn with_arp_mode(mut self, mode: ArpMode) -> Self {
        self.arp_mode = mode;
        self
    }
    #[must_use]
    pub fn with_broadcast_mode(mut self, mode: BroadcastMode) -> Self {
        self.broadcast_mode = mode;
        self
    }
    #[must_use]
    pub fn tenant(&self) -> &str {
        tenant_of(&self.name)
    }
}
