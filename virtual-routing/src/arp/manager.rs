// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! ARP processing

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracectl::trace_target;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

use super::cache::{ArpCache, ArpCacheKey};
use super::stats::ArpStats;
use crate::config::ArpConfig;
use crate::context::{Command, PacketContext};
use crate::decision::{ARP_FLOWMOD_HARD_TIMEOUT, RoutingAction, RoutingDecision};
use crate::frame::{ArpOp, ArpPacket, ETHERTYPE_IPV4};
use crate::netvirt::{ArpMode, BroadcastMode};
use crate::services::{
    Device, DeviceKey, DeviceService, PacketInjector, SwitchPort, TopologyService, TunnelService,
};
use crate::table::RoutingTableReader;

trace_target!("arp", tracectl::LevelFilter::INFO, &["virtual-routing"]);

/// Verdict of an ARP listener
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpCommand {
    /// run the next listener
    Continue,
    /// skip the remaining listeners, the manager still processes the frame
    Skip,
    /// the frame was handled and must not be forwarded
    Stop,
}

/// A handler of ARP frames, run before the manager's own processing
#[allow(unused_variables)]
pub trait ArpListener: Send + Sync {
    fn name(&self) -> &str;
    fn handle_request(&self, arp: &ArpPacket, ctx: &PacketContext) -> ArpCommand {
        ArpCommand::Continue
    }
    fn handle_reply(&self, arp: &ArpPacket, ctx: &PacketContext) -> ArpCommand {
        ArpCommand::Continue
    }
    fn handle_rarp_request(&self, arp: &ArpPacket, ctx: &PacketContext) -> ArpCommand {
        ArpCommand::Continue
    }
    fn handle_rarp_reply(&self, arp: &ArpPacket, ctx: &PacketContext) -> ArpCommand {
        ArpCommand::Continue
    }
}

/// The collaborators the manager relies on
#[derive(Clone)]
pub struct ArpServices {
    pub devices: Arc<dyn DeviceService>,
    pub topology: Arc<dyn TopologyService>,
    pub tunnels: Arc<dyn TunnelService>,
    pub injector: Arc<dyn PacketInjector>,
}

pub struct ArpManager {
    services: ArpServices,
    cache: ArpCache,
    suppression: Duration,
    tunnel_enabled: bool,
    routing: Option<RoutingTableReader>,
    listeners: ArcSwap<Vec<Arc<dyn ArpListener>>>,
    stats: ArpStats,
}

impl ArpManager {
    #[must_use]
    pub fn new(config: &ArpConfig, services: ArpServices) -> Self {
        Self {
            services,
            cache: ArpCache::new(config.cache_timeout()),
            suppression: config.suppression_timeout(),
            tunnel_enabled: false,
            routing: None,
            listeners: ArcSwap::from_pointee(vec![]),
            stats: ArpStats::register(),
        }
    }

    /// Use the routing table to suppress requests across unconnected networks
    #[must_use]
    pub fn with_routing(mut self, reader: RoutingTableReader) -> Self {
        self.routing = Some(reader);
        self
    }

    /// Whether paths through tunnels are acceptable for unicast delivery
    #[must_use]
    pub fn with_tunnels(mut self, enabled: bool) -> Self {
        self.tunnel_enabled = enabled;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ArpCache {
        &self.cache
    }

    /// Append a listener. Frames being processed keep the list they started with.
    pub fn add_listener(&self, listener: Arc<dyn ArpListener>) {
        debug!("Adding ARP listener {}", listener.name());
        self.listeners.rcu(|current| {
            let mut list = Vec::clone(current);
            list.push(listener.clone());
            list
        });
    }

    pub fn device_removed(&self, device: DeviceKey) {
        self.cache.invalidate_device(device);
    }
    pub fn device_moved(&self, device: DeviceKey) {
        self.cache.invalidate_device(device);
    }
    pub fn device_ip_changed(&self, device: DeviceKey) {
        self.cache.invalidate_device(device);
    }

    /// Remove expired cache entries
    pub fn sweep(&self, now: Instant) -> usize {
        self.cache.sweep(now)
    }

    /// Process a frame. Non-ARP frames are left alone.
    pub fn process(&self, ctx: &mut PacketContext) -> Command {
        self.process_at(ctx, Instant::now())
    }

    /// Process a frame as if received at `now`
    pub fn process_at(&self, ctx: &mut PacketContext, now: Instant) -> Command {
        let Some(arp) = ctx.frame.arp().cloned() else {
            return Command::Continue;
        };
        if arp.protocol != ETHERTYPE_IPV4 {
            trace!("Ignoring ARP for protocol {:#06x}", arp.protocol);
            return Command::Continue;
        }
        let Some(src) = ctx.src_device.clone() else {
            trace!("Ignoring ARP from unknown device {}", arp.sender_mac);
            return Command::Continue;
        };

        if self.run_listeners(&arp, ctx) == ArpCommand::Stop {
            Self::decide(ctx, RoutingAction::None, None);
            return Command::Stop;
        }

        match arp.op {
            ArpOp::Reply => self.handle_announcement(ctx, &arp),
            ArpOp::Request if arp.is_gratuitous() => self.handle_announcement(ctx, &arp),
            ArpOp::Request => self.handle_request(ctx, &arp, &src, now),
            ArpOp::RarpRequest | ArpOp::RarpReply | ArpOp::Other(_) => Command::Continue,
        }
    }

    fn run_listeners(&self, arp: &ArpPacket, ctx: &PacketContext) -> ArpCommand {
        let listeners = self.listeners.load();
        for listener in listeners.iter() {
            let verdict = match arp.op {
                ArpOp::Request => listener.handle_request(arp, ctx),
                ArpOp::Reply => listener.handle_reply(arp, ctx),
                ArpOp::RarpRequest => listener.handle_rarp_request(arp, ctx),
                ArpOp::RarpReply => listener.handle_rarp_reply(arp, ctx),
                ArpOp::Other(_) => ArpCommand::Continue,
            };
            match verdict {
                ArpCommand::Continue => {}
                ArpCommand::Skip => {
                    debug!("ARP listener {} skips the remaining listeners", listener.name());
                    return ArpCommand::Skip;
                }
                ArpCommand::Stop => {
                    debug!("ARP listener {} consumed the frame", listener.name());
                    return ArpCommand::Stop;
                }
            }
        }
        ArpCommand::Continue
    }

    fn decide(ctx: &mut PacketContext, action: RoutingAction, dst: Option<DeviceKey>) {
        let src = ctx.src_device.as_ref().map(|d| d.key);
        let decision = RoutingDecision::new(ctx.switch, ctx.in_port, action)
            .with_hard_timeout(ARP_FLOWMOD_HARD_TIMEOUT)
            .with_devices(src, dst);
        ctx.set_decision(decision);
    }

    /// The loosest ARP mode among the source networks
    fn arp_mode(ctx: &PacketContext) -> ArpMode {
        ctx.src_netvirts
            .iter()
            .map(|nv| nv.arp_mode)
            .max()
            .unwrap_or(ArpMode::DropIfUnknown)
    }

    fn broadcast_mode(ctx: &PacketContext) -> BroadcastMode {
        ctx.src_netvirts
            .first()
            .map(|nv| nv.broadcast_mode)
            .unwrap_or_default()
    }

    /// Let the frame be delivered by the forwarding layer. Only a known
    /// destination may narrow a broadcast down to multicast.
    fn flood(&self, ctx: &mut PacketContext, dst: Option<DeviceKey>) -> Command {
        let action = match Self::broadcast_mode(ctx) {
            BroadcastMode::ForwardToKnown if ctx.frame.is_broadcast() && dst.is_some() => {
                RoutingAction::Multicast
            }
            _ => RoutingAction::ForwardOrFlood,
        };
        self.stats.record_flood();
        Self::decide(ctx, action, dst);
        Command::Stop
    }

    fn discard(&self, ctx: &mut PacketContext, dst: Option<DeviceKey>) -> Command {
        self.stats.record_drop();
        Self::decide(ctx, RoutingAction::None, dst);
        Command::Stop
    }

    /// Replies and gratuitous requests tell where the sender is: previous
    /// conversions towards it may be stale. The sender is the device owning
    /// the ARP sender address, which differs from the Ethernet source for
    /// VRRP replies.
    fn handle_announcement(&self, ctx: &mut PacketContext, arp: &ArpPacket) -> Command {
        if let Some(sender) = self.services.devices.find_device(arp.sender_mac, arp.sender_ip) {
            self.cache.invalidate_dst(sender.key);
        } else {
            trace!("ARP sender {} is not a known device", arp.sender_mac);
        }
        let dst = ctx.dst_device.as_ref().map(|d| d.key);
        self.flood(ctx, dst)
    }

    fn handle_request(
        &self,
        ctx: &mut PacketContext,
        arp: &ArpPacket,
        src: &Device,
        now: Instant,
    ) -> Command {
        if !ctx.frame.is_broadcast() {
            // already unicast, possibly one of ours: routing may refine this
            let dst = ctx.dst_device.as_ref().map(|d| d.key);
            Self::decide(ctx, RoutingAction::ForwardOrFlood, dst);
            return Command::Continue;
        }

        let mode = Self::arp_mode(ctx);
        let target = self.services.devices.find_device_by_ip(arp.target_ip);
        if mode == ArpMode::AlwaysFlood {
            return self.flood(ctx, target.map(|d| d.key));
        }
        let Some(dst) = target else {
            debug!("ARP target {} is unknown", arp.target_ip);
            return self.unknown_target(ctx, mode);
        };

        if self.is_suppressed(ctx, src, &dst, now) {
            debug!(
                "Suppressing ARP from {} for {}: networks are not connected",
                arp.sender_ip, arp.target_ip
            );
            return self.discard(ctx, Some(dst.key));
        }

        let key = ArpCacheKey::new(src.key, dst.key);
        if let Some(inject_at) = self.cache.lookup_fresh(&key, now) {
            trace!("ARP cache hit {} -> {}", src.key, dst.key);
            self.stats.record_cache_hit();
            self.inject(ctx, &dst, inject_at);
            Self::decide(ctx, RoutingAction::None, Some(dst.key));
            return Command::Stop;
        }

        let Some(inject_at) = self.injection_point(ctx, src, &dst) else {
            debug!(
                "ARP target {} is not eligible for unicast delivery",
                arp.target_ip
            );
            return self.unknown_target(ctx, mode);
        };
        if self.inject(ctx, &dst, inject_at) {
            self.cache.record(key, now, inject_at);
            self.stats.record_conversion();
        }
        Self::decide(ctx, RoutingAction::None, Some(dst.key));
        Command::Stop
    }

    /// Targets that cannot be reached by unicast are handled as unknown ones.
    /// A broadcast flood is never programmed towards a specific device.
    fn unknown_target(&self, ctx: &mut PacketContext, mode: ArpMode) -> Command {
        match mode {
            ArpMode::DropIfUnknown => self.discard(ctx, None),
            ArpMode::FloodIfUnknown | ArpMode::AlwaysFlood => self.flood(ctx, None),
        }
    }

    /// A recently seen target that the source cannot reach is not worth flooding for
    fn is_suppressed(&self, ctx: &PacketContext, src: &Device, dst: &Device, now: Instant) -> bool {
        let Some(reader) = &self.routing else {
            return false;
        };
        let recent = dst
            .last_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) < self.suppression);
        if !recent || ctx.src_netvirts.is_empty() {
            return false;
        }
        let dst_netvirts = self.services.devices.netvirts_of(dst.key);
        if dst_netvirts.is_empty() {
            return false;
        }
        let (Some(src_ip), Some(dst_ip)) = (src.ipv4.first(), dst.ipv4.first()) else {
            return false;
        };
        let table = reader.get();
        let connected = ctx.src_netvirts.iter().any(|snv| {
            dst_netvirts
                .iter()
                .any(|dnv| table.connected(&snv.name, *src_ip, &dnv.name, *dst_ip))
        });
        !connected
    }

    /// Where a unicast request for `dst` must be injected, if the topology
    /// allows converting the broadcast
    fn injection_point(&self, ctx: &PacketContext, src: &Device, dst: &Device) -> Option<SwitchPort> {
        let te = self.tunnel_enabled;
        let topology = &self.services.topology;
        if self.services.tunnels.is_tunnel_endpoint(src)
            || self.services.tunnels.is_tunnel_endpoint(dst)
        {
            trace!("Tunnel endpoint involved, no unicast conversion");
            return None;
        }
        let ingress = ctx.ingress();
        let in_domain = |ap: &&SwitchPort| topology.in_same_l2_domain(ap.switch, ingress.switch, te);
        let src_ap = *src.attachment_points.iter().find(in_domain)?;
        let dst_ap = *dst.attachment_points.iter().find(in_domain)?;
        if !topology.is_attachment_point_port(src_ap, te)
            || !topology.is_attachment_point_port(dst_ap, te)
        {
            trace!("{src_ap} or {dst_ap} is not an attachment point port");
            return None;
        }
        if !topology.is_consistent(src_ap, ingress, te) {
            trace!("Frame seen at {ingress} is inconsistent with {src_ap}");
            return None;
        }
        topology.incoming_switch_port(ingress, dst_ap, te)
    }

    /// Inject the unicast version of the request. Failures are reported, not retried.
    fn inject(&self, ctx: &PacketContext, dst: &Device, at: SwitchPort) -> bool {
        let Some(frame) = ctx.frame.to_unicast_arp_request(dst.mac) else {
            return false;
        };
        if self.services.injector.inject_event(at, frame) {
            debug!("Injected unicast ARP request for {} at {at}", dst.mac);
            return true;
        }
        warn!("Failed to inject unicast ARP request for {} at {at}", dst.mac);
        self.stats.record_injection_failure();
        false
    }
}
