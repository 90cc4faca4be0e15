// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-frame composition of ARP mediation, ICMP handlers and virtual routing

use std::net::Ipv4Addr;
use tracectl::trace_target;
use tracing::{debug, trace};

use crate::arp::ArpManager;
use crate::context::{Command, PacketContext};
use crate::decision::{ForwardingAction, RoutingAction, RoutingDecision};
use crate::icmp::IcmpDispatcher;
use crate::table::{RoutingTable, RoutingTableReader};

trace_target!("dispatch", tracectl::LevelFilter::INFO, &["virtual-routing"]);

/// Runs the ARP manager, then the ICMP handlers, then routes IPv4 traffic
/// (and unicast ARP) between the virtual networks of its endpoints.
pub struct PacketDispatcher {
    arp: ArpManager,
    icmp: IcmpDispatcher,
    routing: RoutingTableReader,
}

impl PacketDispatcher {
    #[must_use]
    pub fn new(arp: ArpManager, icmp: IcmpDispatcher, routing: RoutingTableReader) -> Self {
        Self { arp, icmp, routing }
    }

    #[must_use]
    pub fn arp(&self) -> &ArpManager {
        &self.arp
    }

    #[must_use]
    pub fn icmp(&self) -> &IcmpDispatcher {
        &self.icmp
    }

    /// Process one frame. The decision, if any, is left in `ctx`.
    /// Malformed frames are passed through without a decision.
    pub fn process(&self, ctx: &mut PacketContext) -> Command {
        if ctx.frame.is_malformed() {
            trace!("Passing through malformed frame from {}", ctx.frame.src);
            return Command::Continue;
        }
        if self.arp.process(ctx) == Command::Stop {
            return Command::Stop;
        }
        if self.icmp.dispatch(ctx) == Command::Stop {
            return Command::Stop;
        }
        self.route(ctx)
    }

    fn route(&self, ctx: &mut PacketContext) -> Command {
        let Some((src_ip, dst_ip)) = ctx.frame.l3_endpoints() else {
            return Command::Continue;
        };
        if ctx.src_netvirts.is_empty() {
            trace!("No virtual network for {src_ip}, not routing");
            return Command::Continue;
        }
        let fa = if ctx
            .src_netvirts
            .iter()
            .any(|snv| ctx.dst_netvirts.iter().any(|dnv| dnv.name == snv.name))
        {
            ForwardingAction::forward()
        } else {
            Self::find_route(&self.routing.get(), ctx, src_ip, dst_ip)
        };
        debug!("{src_ip} -> {dst_ip}: {:?}", fa.action);

        let src = ctx.src_device.as_ref().map(|d| d.key);
        let dst = ctx.dst_device.as_ref().map(|d| d.key);
        let hard_timeout = ctx.decision().and_then(|d| d.hard_timeout);
        let mut decision = RoutingDecision::new(ctx.switch, ctx.in_port, RoutingAction::Forward)
            .with_devices(src, dst)
            .with_forwarding(&fa);
        decision.hard_timeout = hard_timeout;
        ctx.set_decision(decision);
        Command::Stop
    }

    /// Try every pair of source and destination networks. The first
    /// forwarding route wins; otherwise the last drop is reported.
    fn find_route(
        table: &RoutingTable,
        ctx: &PacketContext,
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
    ) -> ForwardingAction {
        let dst_netvirts: Vec<Option<&str>> = if ctx.dst_netvirts.is_empty() {
            vec![None]
        } else {
            ctx.dst_netvirts.iter().map(|nv| Some(nv.name.as_str())).collect()
        };
        let mut last = None;
        for snv in &ctx.src_netvirts {
            for dnv in &dst_netvirts {
                let fa = table.find_route(&snv.name, src_ip, *dnv, dst_ip);
                if fa.is_forward() {
                    return fa;
                }
                last = Some(fa);
            }
        }
        // src_netvirts is never empty here
        last.unwrap_or_else(ForwardingAction::forward)
    }
}
