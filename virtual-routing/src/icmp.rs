// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ordered chain of ICMP echo handlers

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracectl::trace_target;
use tracing::{debug, trace};

use crate::context::{Command, PacketContext};
use crate::decision::{RoutingAction, RoutingDecision};
use crate::frame::{ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, IcmpPacket};

trace_target!("icmp", tracectl::LevelFilter::INFO, &["virtual-routing"]);

/// A handler of ICMP echo traffic. Returning [`Command::Stop`] consumes the frame.
#[allow(unused_variables)]
pub trait IcmpListener: Send + Sync {
    fn name(&self) -> &str;
    fn handle_request(&self, icmp: &IcmpPacket, ctx: &PacketContext) -> Command {
        Command::Continue
    }
    fn handle_reply(&self, icmp: &IcmpPacket, ctx: &PacketContext) -> Command {
        Command::Continue
    }
}

#[derive(Default)]
pub struct IcmpDispatcher {
    listeners: ArcSwap<Vec<Arc<dyn IcmpListener>>>,
}

impl IcmpDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Listeners are not de-duplicated.
    pub fn add_listener(&self, listener: Arc<dyn IcmpListener>) {
        debug!("Adding ICMP listener {}", listener.name());
        self.listeners.rcu(|current| {
            let mut list = Vec::clone(current);
            list.push(listener.clone());
            list
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the listeners on an echo request or reply, in registration order,
    /// until one of them stops the frame
    pub fn dispatch(&self, ctx: &mut PacketContext) -> Command {
        let Some(icmp) = ctx.frame.icmp().copied() else {
            return Command::Continue;
        };
        if icmp.icmp_type != ICMP_ECHO_REQUEST && icmp.icmp_type != ICMP_ECHO_REPLY {
            trace!("Ignoring ICMP type {}", icmp.icmp_type);
            return Command::Continue;
        }
        let listeners = self.listeners.load();
        for listener in listeners.iter() {
            let verdict = if icmp.icmp_type == ICMP_ECHO_REQUEST {
                listener.handle_request(&icmp, ctx)
            } else {
                listener.handle_reply(&icmp, ctx)
            };
            if verdict == Command::Stop {
                debug!("ICMP listener {} consumed the frame", listener.name());
                let decision = RoutingDecision::new(ctx.switch, ctx.in_port, RoutingAction::None);
                ctx.set_decision(decision);
                return Command::Stop;
            }
        }
        Command::Continue
    }
}
