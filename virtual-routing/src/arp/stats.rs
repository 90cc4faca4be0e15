// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use metrics::{Counter, Unit, counter, describe_counter};

/// Metric name constants
pub const ARP_CONVERSIONS: &str = "arp_unicast_conversions";
pub const ARP_CACHE_HITS: &str = "arp_cache_hits";
pub const ARP_FLOODS: &str = "arp_floods";
pub const ARP_DROPS: &str = "arp_drops";
pub const ARP_INJECTION_FAILURES: &str = "arp_injection_failures";

/// Counters of the ARP manager, registered with the installed `metrics` recorder
#[derive(Clone)]
pub struct ArpStats {
    conversions: Counter,
    cache_hits: Counter,
    floods: Counter,
    drops: Counter,
    injection_failures: Counter,
}

impl ArpStats {
    pub(crate) fn register() -> Self {
        describe_counter!(
            ARP_CONVERSIONS,
            Unit::Count,
            "Broadcast ARP requests converted to unicast after a full evaluation"
        );
        describe_counter!(
            ARP_CACHE_HITS,
            Unit::Count,
            "Broadcast ARP requests converted from the cache"
        );
        describe_counter!(ARP_FLOODS, Unit::Count, "ARP frames left to flooding");
        describe_counter!(ARP_DROPS, Unit::Count, "ARP requests dropped");
        describe_counter!(
            ARP_INJECTION_FAILURES,
            Unit::Count,
            "Unicast ARP requests that could not be injected"
        );
        Self {
            conversions: counter!(ARP_CONVERSIONS),
            cache_hits: counter!(ARP_CACHE_HITS),
            floods: counter!(ARP_FLOODS),
            drops: counter!(ARP_DROPS),
            injection_failures: counter!(ARP_INJECTION_FAILURES),
        }
    }

    pub(crate) fn record_conversion(&self) {
        self.conversions.increment(1);
    }
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.increment(1);
    }
    pub(crate) fn record_flood(&self) {
        self.floods.increment(1);
    }
    pub(crate) fn record_drop(&self) {
        self.drops.increment(1);
    }
    pub(crate) fn record_injection_failure(&self) {
        self.injection_failures.increment(1);
    }
}
