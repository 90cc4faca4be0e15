// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory collaborators for tests

use metrics::{
    Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::arp::ArpServices;
use crate::frame::EthernetFrame;
use crate::mac::Mac;
use crate::netvirt::NetVirt;
use crate::services::{
    Device, DeviceKey, DeviceService, PacketInjector, SwitchId, SwitchPort, TopologyService,
    TunnelService,
};

pub fn device(key: u64, ip: &str, ap: SwitchPort) -> Device {
    Device {
        key: DeviceKey(key),
        mac: Mac([0x02, 0, 0, 0, 0, u8::try_from(key).unwrap()]),
        ipv4: vec![ip.parse().unwrap()],
        attachment_points: vec![ap],
        last_seen: None,
    }
}

#[derive(Default)]
pub struct FakeDevices {
    devices: Mutex<Vec<(Device, Vec<NetVirt>)>>,
}

impl FakeDevices {
    pub fn add(&self, device: Device, netvirts: Vec<NetVirt>) {
        let mut devices = self.devices.lock().unwrap();
        devices.retain(|(d, _)| d.key != device.key);
        devices.push((device, netvirts));
    }
    pub fn remove(&self, key: DeviceKey) {
        self.devices.lock().unwrap().retain(|(d, _)| d.key != key);
    }
}

impl DeviceService for FakeDevices {
    fn find_device(&self, mac: Mac, ip: Ipv4Addr) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|(d, _)| d.mac == mac && d.has_ip(ip))
            .map(|(d, _)| d.clone())
    }
    fn find_device_by_ip(&self, ip: Ipv4Addr) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|(d, _)| d.has_ip(ip))
            .map(|(d, _)| d.clone())
    }
    fn netvirts_of(&self, device: DeviceKey) -> Vec<NetVirt> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|(d, _)| d.key == device)
            .map(|(_, nvs)| nvs.clone())
            .unwrap_or_default()
    }
}

/// All switches are in L2 domain 0 unless placed elsewhere. Traffic enters
/// the fabric at the attachment point of its destination.
#[derive(Default)]
pub struct FakeTopology {
    domains: Mutex<HashMap<SwitchId, u32>>,
    non_ap_ports: Mutex<HashSet<SwitchPort>>,
    inconsistent: AtomicBool,
}

impl FakeTopology {
    pub fn set_domain(&self, switch: SwitchId, domain: u32) {
        self.domains.lock().unwrap().insert(switch, domain);
    }
    pub fn set_internal_port(&self, sp: SwitchPort) {
        self.non_ap_ports.lock().unwrap().insert(sp);
    }
    pub fn set_inconsistent(&self, inconsistent: bool) {
        self.inconsistent.store(inconsistent, Ordering::Relaxed);
    }
    fn domain(&self, switch: SwitchId) -> u32 {
        self.domains
            .lock()
            .unwrap()
            .get(&switch)
            .copied()
            .unwrap_or_default()
    }
}

impl TopologyService for FakeTopology {
    fn is_attachment_point_port(&self, sp: SwitchPort, _: bool) -> bool {
        !self.non_ap_ports.lock().unwrap().contains(&sp)
    }
    fn in_same_l2_domain(&self, a: SwitchId, b: SwitchId, _: bool) -> bool {
        self.domain(a) == self.domain(b)
    }
    fn is_consistent(&self, _: SwitchPort, _: SwitchPort, _: bool) -> bool {
        !self.inconsistent.load(Ordering::Relaxed)
    }
    fn incoming_switch_port(&self, from: SwitchPort, to: SwitchPort, te: bool) -> Option<SwitchPort> {
        self.in_same_l2_domain(from.switch, to.switch, te)
            .then_some(to)
    }
}

#[derive(Default)]
pub struct FakeTunnels {
    endpoints: Mutex<HashSet<DeviceKey>>,
}

impl FakeTunnels {
    pub fn add_endpoint(&self, key: DeviceKey) {
        self.endpoints.lock().unwrap().insert(key);
    }
}

impl TunnelService for FakeTunnels {
    fn is_tunnel_endpoint(&self, device: &Device) -> bool {
        self.endpoints.lock().unwrap().contains(&device.key)
    }
}

#[derive(Default)]
pub struct FakeInjector {
    fail: AtomicBool,
    injected: Mutex<Vec<(SwitchPort, EthernetFrame)>>,
}

impl FakeInjector {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
    pub fn injected(&self) -> Vec<(SwitchPort, EthernetFrame)> {
        self.injected.lock().unwrap().clone()
    }
}

impl PacketInjector for FakeInjector {
    fn inject_event(&self, at: SwitchPort, frame: EthernetFrame) -> bool {
        if self.fail.load(Ordering::Relaxed) {
            return false;
        }
        self.injected.lock().unwrap().push((at, frame));
        true
    }
}

/// Fakes shared between a test and the component under test
#[derive(Clone, Default)]
pub struct Fakes {
    pub devices: Arc<FakeDevices>,
    pub topology: Arc<FakeTopology>,
    pub tunnels: Arc<FakeTunnels>,
    pub injector: Arc<FakeInjector>,
}

impl Fakes {
    pub fn services(&self) -> ArpServices {
        ArpServices {
            devices: self.devices.clone(),
            topology: self.topology.clone(),
            tunnels: self.tunnels.clone(),
            injector: self.injector.clone(),
        }
    }
}

#[derive(Default)]
struct TestCounter(AtomicU64);

impl CounterFn for TestCounter {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }
    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

/// A `metrics` recorder keeping counter values by name. Components register
/// their handles on construction, so build them under
/// [`metrics::with_local_recorder`].
#[derive(Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<TestCounter>>>,
}

impl CountingRecorder {
    pub fn count(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |c| c.0.load(Ordering::Relaxed))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let counter = self
            .counters
            .lock()
            .unwrap()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Counter::from_arc(counter)
    }
    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }
    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
