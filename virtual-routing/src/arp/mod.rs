// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! ARP mediation: broadcast requests for known, reachable targets are turned
//! into unicast requests injected close to the target.

mod cache;
mod manager;
mod stats;

#[cfg(test)]
mod test;

pub use cache::{ARP_CACHE_DEFAULT_TIMEOUT_MS, ArpCache, ArpCacheEntry, ArpCacheKey};
pub use manager::{ArpCommand, ArpListener, ArpManager, ArpServices};
pub use stats::{
    ARP_CACHE_HITS, ARP_CONVERSIONS, ARP_DROPS, ARP_FLOODS, ARP_INJECTION_FAILURES, ArpStats,
};
