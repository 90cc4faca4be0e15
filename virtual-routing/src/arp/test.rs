// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use pretty_assertions::assert_eq;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing_test::traced_test;

use super::*;
use crate::config::ArpConfig;
use crate::context::{Command, PacketContext};
use crate::decision::{ARP_FLOWMOD_HARD_TIMEOUT, RoutingAction};
use crate::frame::{ArpPacket, EthernetFrame, Payload};
use crate::netvirt::{ArpMode, BroadcastMode, NetVirt};
use crate::services::{Device, DeviceKey, SwitchPort};
use crate::table::RoutingTableWriter;
use crate::testutils::{CountingRecorder, Fakes, device};

const SRC_AP: SwitchPort = SwitchPort { switch: 1, port: 1 };
const DST_AP: SwitchPort = SwitchPort { switch: 2, port: 7 };

struct Setup {
    fakes: Fakes,
    metrics: CountingRecorder,
    manager: ArpManager,
    src: Device,
    dst: Device,
    netvirt: NetVirt,
}

fn setup(netvirt: NetVirt) -> Setup {
    let fakes = Fakes::default();
    let src = device(1, "10.0.0.1", SRC_AP);
    let dst = device(2, "10.0.0.2", DST_AP);
    fakes.devices.add(src.clone(), vec![netvirt.clone()]);
    fakes.devices.add(dst.clone(), vec![netvirt.clone()]);
    let recorder = CountingRecorder::default();
    let manager = metrics::with_local_recorder(&recorder, || {
        ArpManager::new(&ArpConfig::default(), fakes.services())
    });
    Setup {
        fakes,
        metrics: recorder,
        manager,
        src,
        dst,
        netvirt,
    }
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

impl Setup {
    fn request_for(&self, target: &str) -> PacketContext {
        let frame = EthernetFrame::arp_request(self.src.mac, self.src.ipv4[0], ip(target));
        PacketContext::new(SRC_AP.switch, SRC_AP.port, frame)
            .with_src(self.src.clone(), vec![self.netvirt.clone()])
    }
    fn request(&self) -> PacketContext {
        self.request_for("10.0.0.2")
    }
    fn key(&self) -> ArpCacheKey {
        ArpCacheKey::new(self.src.key, self.dst.key)
    }
}

fn action(ctx: &PacketContext) -> RoutingAction {
    ctx.decision().unwrap().action
}

#[test]
fn test_non_arp_frames_are_ignored() {
    let s = setup(NetVirt::new("coke|eng"));
    let frame = EthernetFrame::icmp_echo(s.src.mac, s.dst.mac, ip("10.0.0.1"), ip("10.0.0.2"), 8);
    let mut ctx = PacketContext::new(1, 1, frame).with_src(s.src.clone(), vec![]);
    assert_eq!(s.manager.process(&mut ctx), Command::Continue);
    assert!(ctx.decision().is_none());

    // unknown sender
    let frame = EthernetFrame::arp_request(s.src.mac, ip("10.0.0.1"), ip("10.0.0.2"));
    let mut ctx = PacketContext::new(1, 1, frame);
    assert_eq!(s.manager.process(&mut ctx), Command::Continue);
    assert!(ctx.decision().is_none());

    // not resolving IPv4
    let mut ctx = s.request();
    if let Payload::Arp(arp) = &mut ctx.frame.payload {
        arp.protocol = 0x86dd;
    }
    assert_eq!(s.manager.process(&mut ctx), Command::Continue);
    assert!(ctx.decision().is_none());
    assert!(s.fakes.injector.injected().is_empty());
}

#[traced_test]
#[test]
fn test_broadcast_to_unicast() {
    let s = setup(NetVirt::new("coke|eng").with_arp_mode(ArpMode::DropIfUnknown));
    let now = Instant::now();
    let mut ctx = s.request();
    assert_eq!(s.manager.process_at(&mut ctx, now), Command::Stop);

    let decision = ctx.decision().unwrap();
    assert_eq!(decision.action, RoutingAction::None);
    assert_eq!(decision.hard_timeout, Some(ARP_FLOWMOD_HARD_TIMEOUT));
    assert_eq!(decision.src_device, Some(s.src.key));
    assert_eq!(decision.dst_device, Some(s.dst.key));

    let injected = s.fakes.injector.injected();
    assert_eq!(injected.len(), 1);
    let (at, frame) = &injected[0];
    assert_eq!(*at, DST_AP);
    assert_eq!(frame.dst, s.dst.mac);
    assert_eq!(frame.src, s.src.mac);
    assert_eq!(frame.arp().map(|a| a.target_ip), Some(ip("10.0.0.2")));

    let entry = s.manager.cache().get(&s.key()).unwrap();
    assert_eq!(entry.inject_at, DST_AP);
    assert_eq!(entry.converted_at, now);
    assert_eq!(s.metrics.count(ARP_CONVERSIONS), 1);
    assert!(logs_contain("Injected unicast ARP request"));
}

#[test]
fn test_unknown_target_policy() {
    let s = setup(NetVirt::new("coke|eng").with_arp_mode(ArpMode::DropIfUnknown));
    let mut ctx = s.request_for("10.0.0.99");
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    let decision = ctx.decision().unwrap();
    assert_eq!(decision.action, RoutingAction::None);
    assert_eq!(decision.hard_timeout, Some(ARP_FLOWMOD_HARD_TIMEOUT));
    assert_eq!(decision.dst_device, None);
    assert_eq!(s.metrics.count(ARP_DROPS), 1);

    let s = setup(NetVirt::new("coke|eng").with_arp_mode(ArpMode::FloodIfUnknown));
    let mut ctx = s.request_for("10.0.0.99");
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(s.metrics.count(ARP_FLOODS), 1);
    assert!(s.fakes.injector.injected().is_empty());
}

#[test]
fn test_loosest_mode_wins() {
    let s = setup(NetVirt::new("coke|eng").with_arp_mode(ArpMode::DropIfUnknown));
    let mut ctx = s.request_for("10.0.0.99");
    ctx.src_netvirts
        .push(NetVirt::new("coke|mkt").with_arp_mode(ArpMode::FloodIfUnknown));
    s.manager.process(&mut ctx);
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
}

#[test]
fn test_always_flood() {
    let s = setup(NetVirt::new("coke|eng").with_arp_mode(ArpMode::AlwaysFlood));
    let mut ctx = s.request();
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert_eq!(action(&ctx), RoutingAction::Multicast);
    assert_eq!(ctx.decision().unwrap().dst_device, Some(s.dst.key));
    assert!(s.fakes.injector.injected().is_empty());
    assert!(s.manager.cache().is_empty());

    let s = setup(
        NetVirt::new("coke|eng")
            .with_arp_mode(ArpMode::AlwaysFlood)
            .with_broadcast_mode(BroadcastMode::AlwaysFlood),
    );
    let mut ctx = s.request();
    s.manager.process(&mut ctx);
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
}

#[test]
fn test_cache_ttl() {
    let s = setup(NetVirt::new("coke|eng"));
    let ttl = s.manager.cache().ttl();
    let now = Instant::now();
    s.manager.process_at(&mut s.request(), now);
    assert_eq!(s.fakes.injector.injected().len(), 1);

    // the cached conversion is used even though the topology changed
    s.fakes.topology.set_inconsistent(true);
    let mut ctx = s.request();
    assert_eq!(s.manager.process_at(&mut ctx, now + ttl / 2), Command::Stop);
    assert_eq!(action(&ctx), RoutingAction::None);
    assert_eq!(s.fakes.injector.injected().len(), 2);
    assert_eq!(s.fakes.injector.injected()[1].0, DST_AP);
    assert_eq!(s.metrics.count(ARP_CACHE_HITS), 1);
    assert_eq!(s.metrics.count(ARP_CONVERSIONS), 1);
    // hits do not extend the lifetime of the entry
    assert_eq!(s.manager.cache().get(&s.key()).unwrap().converted_at, now);

    // once expired, the request is evaluated again and cannot be converted
    let mut ctx = s.request();
    s.manager
        .process_at(&mut ctx, now + ttl + Duration::from_millis(1));
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(ctx.decision().unwrap().dst_device, None);
    assert_eq!(s.fakes.injector.injected().len(), 2);
    assert!(s.manager.cache().get(&s.key()).is_none());
}

#[test]
fn test_reply_invalidates_conversions() {
    let s = setup(NetVirt::new("coke|eng"));
    s.manager.process(&mut s.request());
    assert_eq!(s.manager.cache().len(), 1);

    let frame = EthernetFrame::arp_reply(s.dst.mac, s.dst.ipv4[0], s.src.mac, s.src.ipv4[0]);
    let mut ctx = PacketContext::new(DST_AP.switch, DST_AP.port, frame)
        .with_src(s.dst.clone(), vec![s.netvirt.clone()])
        .with_dst(s.src.clone(), vec![s.netvirt.clone()]);
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert!(s.manager.cache().is_empty());
    // unicast reply to a known device
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(ctx.decision().unwrap().dst_device, Some(s.src.key));
}

#[test]
fn test_gratuitous_arp_invalidates_conversions() {
    let s = setup(NetVirt::new("coke|eng"));
    s.manager.process(&mut s.request());
    assert_eq!(s.manager.cache().len(), 1);

    let frame = EthernetFrame::arp_request(s.dst.mac, s.dst.ipv4[0], s.dst.ipv4[0]);
    assert!(frame.arp().is_some_and(ArpPacket::is_gratuitous));
    let mut ctx = PacketContext::new(DST_AP.switch, DST_AP.port, frame)
        .with_src(s.dst.clone(), vec![s.netvirt.clone()]);
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert!(s.manager.cache().is_empty());
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(s.fakes.injector.injected().len(), 1);
}

#[test]
fn test_reply_relayed_by_another_device_invalidates_the_sender() {
    let s = setup(NetVirt::new("coke|eng"));
    s.manager.process(&mut s.request());
    assert_eq!(s.manager.cache().len(), 1);

    // a VRRP router answers for the target: the Ethernet source is the router
    let vrrp = device(3, "10.0.0.254", DST_AP);
    s.fakes.devices.add(vrrp.clone(), vec![s.netvirt.clone()]);
    let mut frame = EthernetFrame::arp_reply(s.dst.mac, s.dst.ipv4[0], s.src.mac, s.src.ipv4[0]);
    frame.src = vrrp.mac;
    let mut ctx = PacketContext::new(DST_AP.switch, DST_AP.port, frame)
        .with_src(vrrp.clone(), vec![s.netvirt.clone()]);
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert!(s.manager.cache().is_empty());

    // a reply whose sender is not a known device leaves conversions alone
    s.manager.process(&mut s.request());
    assert_eq!(s.manager.cache().len(), 1);
    let stranger = device(4, "10.0.0.2", DST_AP);
    let frame = EthernetFrame::arp_reply(stranger.mac, stranger.ipv4[0], s.src.mac, s.src.ipv4[0]);
    let mut ctx = PacketContext::new(DST_AP.switch, DST_AP.port, frame)
        .with_src(s.dst.clone(), vec![s.netvirt.clone()]);
    s.manager.process(&mut ctx);
    assert_eq!(s.manager.cache().len(), 1);
}

#[test]
fn test_unicast_request_is_left_to_routing() {
    let s = setup(NetVirt::new("coke|eng"));
    let mut ctx = s.request();
    ctx.frame.dst = s.dst.mac;
    assert_eq!(s.manager.process(&mut ctx), Command::Continue);
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(ctx.decision().unwrap().hard_timeout, Some(ARP_FLOWMOD_HARD_TIMEOUT));
    assert!(s.fakes.injector.injected().is_empty());
}

#[traced_test]
#[test]
fn test_injection_failure() {
    let s = setup(NetVirt::new("coke|eng"));
    s.fakes.injector.set_failing(true);
    let mut ctx = s.request();
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert_eq!(action(&ctx), RoutingAction::None);
    assert!(logs_contain("Failed to inject unicast ARP request"));
    assert_eq!(s.metrics.count(ARP_INJECTION_FAILURES), 1);
    assert_eq!(s.metrics.count(ARP_CONVERSIONS), 0);
    assert!(s.manager.cache().is_empty());
}

#[test]
fn test_ineligible_targets() {
    let drop_if_unknown = || NetVirt::new("coke|eng").with_arp_mode(ArpMode::DropIfUnknown);

    let s = setup(drop_if_unknown());
    s.fakes.tunnels.add_endpoint(s.dst.key);
    let mut ctx = s.request();
    s.manager.process(&mut ctx);
    assert_eq!(action(&ctx), RoutingAction::None);
    assert_eq!(ctx.decision().unwrap().dst_device, None);
    assert_eq!(s.metrics.count(ARP_DROPS), 1);

    let s = setup(drop_if_unknown());
    s.fakes.topology.set_domain(DST_AP.switch, 1);
    s.manager.process(&mut s.request());
    assert_eq!(s.metrics.count(ARP_DROPS), 1);

    let s = setup(drop_if_unknown());
    s.fakes.topology.set_internal_port(SRC_AP);
    s.manager.process(&mut s.request());
    assert_eq!(s.metrics.count(ARP_DROPS), 1);

    let s = setup(NetVirt::new("coke|eng"));
    s.fakes.topology.set_inconsistent(true);
    let mut ctx = s.request();
    s.manager.process(&mut ctx);
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(s.metrics.count(ARP_FLOODS), 1);
    assert!(s.fakes.injector.injected().is_empty());
    assert!(s.manager.cache().is_empty());
}

#[test]
fn test_ineligible_known_target_is_flooded_like_an_unknown_one() {
    let s = setup(
        NetVirt::new("coke|eng")
            .with_arp_mode(ArpMode::FloodIfUnknown)
            .with_broadcast_mode(BroadcastMode::ForwardToKnown),
    );
    s.fakes.topology.set_inconsistent(true);
    let mut ctx = s.request();
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    let decision = ctx.decision().unwrap();
    assert_eq!(decision.action, RoutingAction::ForwardOrFlood);
    assert_eq!(decision.dst_device, None);
    assert_eq!(decision.src_device, Some(s.src.key));
    assert_eq!(decision.hard_timeout, Some(ARP_FLOWMOD_HARD_TIMEOUT));

    // same outcome as a target nobody knows
    let mut unknown = s.request_for("10.0.0.99");
    s.manager.process(&mut unknown);
    assert_eq!(unknown.decision(), ctx.decision());
    assert_eq!(s.metrics.count(ARP_FLOODS), 2);
}

struct Verdict {
    name: &'static str,
    verdict: ArpCommand,
    calls: AtomicUsize,
}

impl Verdict {
    fn new(name: &'static str, verdict: ArpCommand) -> Arc<Self> {
        Arc::new(Self {
            name,
            verdict,
            calls: AtomicUsize::new(0),
        })
    }
    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ArpListener for Verdict {
    fn name(&self) -> &str {
        self.name
    }
    fn handle_request(&self, _: &ArpPacket, _: &PacketContext) -> ArpCommand {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.verdict
    }
}

#[test]
fn test_listener_stop() {
    let s = setup(NetVirt::new("coke|eng"));
    let first = Verdict::new("first", ArpCommand::Continue);
    let stop = Verdict::new("stop", ArpCommand::Stop);
    let last = Verdict::new("last", ArpCommand::Continue);
    s.manager.add_listener(first.clone());
    s.manager.add_listener(stop.clone());
    s.manager.add_listener(last.clone());

    let mut ctx = s.request();
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert_eq!((first.calls(), stop.calls(), last.calls()), (1, 1, 0));
    let decision = ctx.decision().unwrap();
    assert_eq!(decision.action, RoutingAction::None);
    assert_eq!(decision.hard_timeout, Some(ARP_FLOWMOD_HARD_TIMEOUT));
    assert!(s.fakes.injector.injected().is_empty());
}

#[test]
fn test_listener_skip() {
    let s = setup(NetVirt::new("coke|eng"));
    let skip = Verdict::new("skip", ArpCommand::Skip);
    let last = Verdict::new("last", ArpCommand::Stop);
    s.manager.add_listener(skip.clone());
    s.manager.add_listener(last.clone());

    let mut ctx = s.request();
    assert_eq!(s.manager.process(&mut ctx), Command::Stop);
    assert_eq!((skip.calls(), last.calls()), (1, 0));
    // the manager still converted the request
    assert_eq!(s.fakes.injector.injected().len(), 1);
}

#[test]
fn test_suppression_across_unconnected_networks() {
    let coke = NetVirt::new("coke|eng");
    let pepsi = NetVirt::new("pepsi|eng");
    let mut writer = RoutingTableWriter::new();
    writer
        .update(|table| {
            table.create_tenant("coke")?;
            table.create_tenant("pepsi")?;
            table.add_netvirt(coke.clone())?;
            table.add_netvirt(pepsi.clone())
        })
        .unwrap();

    let now = Instant::now();
    let fakes = Fakes::default();
    let src = device(1, "10.0.0.1", SRC_AP);
    let mut dst = device(2, "10.0.0.2", DST_AP);
    dst.last_seen = Some(now);
    fakes.devices.add(src.clone(), vec![coke.clone()]);
    fakes.devices.add(dst.clone(), vec![pepsi]);
    let recorder = CountingRecorder::default();
    let manager = metrics::with_local_recorder(&recorder, || {
        ArpManager::new(&ArpConfig::default(), fakes.services())
    })
    .with_routing(writer.get_reader());

    let frame = EthernetFrame::arp_request(src.mac, src.ipv4[0], dst.ipv4[0]);
    let mut ctx = PacketContext::new(1, 1, frame.clone()).with_src(src.clone(), vec![coke.clone()]);
    assert_eq!(
        manager.process_at(&mut ctx, now + Duration::from_secs(1)),
        Command::Stop
    );
    assert_eq!(action(&ctx), RoutingAction::None);
    assert_eq!(recorder.count(ARP_DROPS), 1);
    assert!(fakes.injector.injected().is_empty());

    // not seen for a while: try delivering it
    let mut ctx = PacketContext::new(1, 1, frame).with_src(src, vec![coke]);
    manager.process_at(&mut ctx, now + Duration::from_secs(60));
    assert_eq!(fakes.injector.injected().len(), 1);
    assert_eq!(recorder.count(ARP_CONVERSIONS), 1);
}

#[test]
fn test_device_events_and_sweep() {
    let s = setup(NetVirt::new("coke|eng"));
    let now = Instant::now();
    s.manager.process_at(&mut s.request(), now);
    assert_eq!(s.manager.cache().len(), 1);
    s.manager.device_moved(s.dst.key);
    assert!(s.manager.cache().is_empty());

    s.manager.process_at(&mut s.request(), now);
    s.manager.device_removed(DeviceKey(42));
    assert_eq!(s.manager.cache().len(), 1);
    s.manager.device_ip_changed(s.src.key);
    assert!(s.manager.cache().is_empty());

    s.manager.process_at(&mut s.request(), now);
    assert_eq!(s.manager.sweep(now), 0);
    assert_eq!(s.manager.sweep(now + s.manager.cache().ttl()), 1);
    assert!(s.manager.cache().is_empty());

    // a removed target is unknown again
    s.manager.process_at(&mut s.request(), now);
    s.fakes.devices.remove(s.dst.key);
    s.manager.device_removed(s.dst.key);
    assert!(s.manager.cache().is_empty());
    let mut ctx = s.request();
    s.manager.process_at(&mut ctx, now);
    assert_eq!(action(&ctx), RoutingAction::ForwardOrFlood);
    assert_eq!(ctx.decision().unwrap().dst_device, None);
}
