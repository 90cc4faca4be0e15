// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-frame processing context

use crate::decision::RoutingDecision;
use crate::frame::EthernetFrame;
use crate::netvirt::NetVirt;
use crate::services::{Device, PortId, SwitchId, SwitchPort};

/// Outcome of a processing stage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// let the next stage look at the frame
    Continue,
    /// processing of the frame is over
    Stop,
}

/// A frame received from a switch together with the identities resolved
/// for it by the device service, and the decision taken so far.
#[derive(Clone, Debug)]
pub struct PacketContext {
    pub switch: SwitchId,
    pub in_port: PortId,
    pub frame: EthernetFrame,
    pub src_device: Option<Device>,
    pub dst_device: Option<Device>,
    pub src_netvirts: Vec<NetVirt>,
    pub dst_netvirts: Vec<NetVirt>,
    decision: Option<RoutingDecision>,
}

impl PacketContext {
    #[must_use]
    pub fn new(switch: SwitchId, in_port: PortId, frame: EthernetFrame) -> Self {
        Self {
            switch,
            in_port,
            frame,
            src_device: None,
            dst_device: None,
            src_netvirts: vec![],
            dst_netvirts: vec![],
            decision: None,
        }
    }
    #[must_use]
    pub fn with_src(mut self, device: Device, netvirts: Vec<NetVirt>) -> Self {
        self.src_device = Some(device);
        self.src_netvirts = netvirts;
        self
    }
    #[must_use]
    pub fn with_dst(mut self, device: Device, netvirts: Vec<NetVirt>) -> Self {
        self.dst_device = Some(device);
        self.dst_netvirts = netvirts;
        self
    }
    #[must_use]
    pub fn ingress(&self) -> SwitchPort {
        SwitchPort::new(self.switch, self.in_port)
    }
    pub fn set_decision(&mut self, decision: RoutingDecision) {
        self.decision = Some(decision);
    }
    #[must_use]
    pub fn decision(&self) -> Option<&RoutingDecision> {
        self.decision.as_ref()
    }
    pub fn take_decision(&mut self) -> Option<RoutingDecision> {
        self.decision.take()
    }
}
