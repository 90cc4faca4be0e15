// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Gateway pools: named sets of candidate next hops for external egress

use ahash::RandomState;
use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GatewayNode {
    pub ip: Ipv4Addr,
}

/// Fields of a flow used to pick a gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
}

/// Policy choosing one node of a pool for a flow
pub trait GatewaySelector: Debug + Send + Sync {
    /// `nodes` is sorted by address and never contains 0.0.0.0
    fn select<'a>(&self, nodes: &'a [GatewayNode], flow: &FlowKey, tag: u16) -> Option<&'a GatewayNode>;
}

/// Always the lowest address: every flow uses the same gateway
#[derive(Debug, Default)]
pub struct LowestIpSelector;

impl GatewaySelector for LowestIpSelector {
    fn select<'a>(&self, nodes: &'a [GatewayNode], _: &FlowKey, _: u16) -> Option<&'a GatewayNode> {
        nodes.first()
    }
}

/// Spread flows over the nodes by hashing the flow key and the tag.
/// A given flow keeps its gateway as long as the pool is unchanged.
#[derive(Debug)]
pub struct FlowHashSelector {
    state: RandomState,
}

impl Default for FlowHashSelector {
    fn default() -> Self {
        Self {
            state: RandomState::with_seeds(0, 0, 0, 0),
        }
    }
}

impl GatewaySelector for FlowHashSelector {
    fn select<'a>(&self, nodes: &'a [GatewayNode], flow: &FlowKey, tag: u16) -> Option<&'a GatewayNode> {
        if nodes.is_empty() {
            return None;
        }
        let hash = self.state.hash_one((flow, tag));
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash % nodes.len() as u64) as usize;
        nodes.get(index)
    }
}

#[derive(Clone, Debug)]
pub struct GatewayPool {
    name: String,
    nodes: Vec<GatewayNode>,
    selector: Arc<dyn GatewaySelector>,
}

impl GatewayPool {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_selector(name, Arc::new(LowestIpSelector))
    }

    #[must_use]
    pub fn with_selector(name: &str, selector: Arc<dyn GatewaySelector>) -> Self {
        Self {
            name: name.to_string(),
            nodes: vec![],
            selector,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_selector(&mut self, selector: Arc<dyn GatewaySelector>) {
        self.selector = selector;
    }

    /// Add a node. Adding an address twice keeps a single node.
    pub fn add_node(&mut self, ip: Ipv4Addr) {
        let node = GatewayNode { ip };
        if let Err(pos) = self.nodes.binary_search(&node) {
            self.nodes.insert(pos, node);
        }
    }

    /// Returns true if the node was present
    pub fn remove_node(&mut self, ip: Ipv4Addr) -> bool {
        let len = self.nodes.len();
        self.nodes.retain(|n| n.ip != ip);
        self.nodes.len() != len
    }

    #[must_use]
    pub fn nodes(&self) -> &[GatewayNode] {
        &self.nodes
    }

    /// The node to use for a flow, if the pool has any usable node
    #[must_use]
    pub fn optimal_node(&self, flow: &FlowKey, tag: u16) -> Option<GatewayNode> {
        let usable = match self.nodes.first() {
            Some(n) if n.ip.is_unspecified() => &self.nodes[1..],
            _ => &self.nodes[..],
        };
        self.selector.select(usable, flow, tag).copied()
    }
}
