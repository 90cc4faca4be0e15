// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cache of broadcast ARP requests converted to unicast

use ahash::RandomState;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::services::{DeviceKey, SwitchPort};

/// Default lifetime of a cache entry
pub const ARP_CACHE_DEFAULT_TIMEOUT_MS: u64 = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArpCacheKey {
    pub src: DeviceKey,
    pub dst: DeviceKey,
}

impl ArpCacheKey {
    #[must_use]
    pub fn new(src: DeviceKey, dst: DeviceKey) -> Self {
        Self { src, dst }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpCacheEntry {
    /// when the request was last converted
    pub converted_at: Instant,
    /// where the unicast request was injected
    pub inject_at: SwitchPort,
}

type Table = DashMap<ArpCacheKey, ArpCacheEntry, RandomState>;

/// Concurrent map of conversions. Entries are updated individually, and
/// expire when older than the cache TTL.
#[derive(Debug)]
pub struct ArpCache {
    table: Table,
    ttl: Duration,
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(Duration::from_millis(ARP_CACHE_DEFAULT_TIMEOUT_MS))
    }
}

impl ArpCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            table: Table::with_hasher(RandomState::with_seeds(0, 0, 0, 0)),
            ttl,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &ArpCacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.converted_at) < self.ttl
    }

    /// Record or refresh a conversion
    pub fn record(&self, key: ArpCacheKey, now: Instant, inject_at: SwitchPort) {
        trace!("Recording conversion {} -> {} at {inject_at}", key.src, key.dst);
        self.table.insert(
            key,
            ArpCacheEntry {
                converted_at: now,
                inject_at,
            },
        );
    }

    /// The injection port of a conversion younger than the TTL. An expired
    /// entry is removed.
    #[must_use]
    pub fn lookup_fresh(&self, key: &ArpCacheKey, now: Instant) -> Option<SwitchPort> {
        let entry = *self.table.get(key)?;
        if self.is_fresh(&entry, now) {
            return Some(entry.inject_at);
        }
        self.table
            .remove_if(key, |_, e| !self.is_fresh(e, now));
        None
    }

    #[must_use]
    pub fn get(&self, key: &ArpCacheKey) -> Option<ArpCacheEntry> {
        self.table.get(key).map(|e| *e)
    }

    pub fn remove(&self, key: &ArpCacheKey) -> Option<ArpCacheEntry> {
        self.table.remove(key).map(|(_, e)| e)
    }

    /// Remove the entries matching `stale`, counting what this call removed
    fn evict(&self, mut stale: impl FnMut(&ArpCacheKey, &ArpCacheEntry) -> bool) -> usize {
        let mut removed = 0;
        self.table.retain(|key, entry| {
            let evict = stale(key, entry);
            removed += usize::from(evict);
            !evict
        });
        removed
    }

    /// Forget the conversions towards `dst`. Returns the number of entries removed.
    pub fn invalidate_dst(&self, dst: DeviceKey) -> usize {
        let removed = self.evict(|key, _| key.dst == dst);
        if removed > 0 {
            debug!("Invalidated {removed} ARP cache entries towards {dst}");
        }
        removed
    }

    /// Forget the conversions from or towards `device`
    pub fn invalidate_device(&self, device: DeviceKey) -> usize {
        let removed = self.evict(|key, _| key.src == device || key.dst == device);
        if removed > 0 {
            debug!("Invalidated {removed} ARP cache entries of {device}");
        }
        removed
    }

    /// Drop expired entries
    pub fn sweep(&self, now: Instant) -> usize {
        let removed = self.evict(|_, entry| !self.is_fresh(entry, now));
        trace!("ARP cache sweep removed {removed} entries");
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
