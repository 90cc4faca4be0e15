// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Two-level rule index: source key to bucket, bucket to destination rules.

use lpm::{Ipv4Prefix, PrefixTrie};
use ordermap::OrderMap;
use std::net::Ipv4Addr;

use super::{Destination, RoutingRule, RuleEntity};
use crate::names::tenant_of;

/// Rules sharing the same source key.
///
/// Rules on a named destination or on a destination host are kept in
/// insertion order. Rules on a destination subnet live in a trie; the
/// match-any destination is its /0 entry.
#[derive(Clone, Debug, Default)]
pub struct RuleBucket {
    named: Vec<RoutingRule>,
    subnets: PrefixTrie<Vec<RoutingRule>>,
}

impl RuleBucket {
    /// Add a rule. Returns false if an identical rule is already present.
    fn insert(&mut self, rule: RoutingRule) -> bool {
        let bucket = match rule.dst.prefix() {
            Some(prefix) => self.subnets.get_or_insert_with(prefix, Vec::new),
            None => &mut self.named,
        };
        if bucket.contains(&rule) {
            return false;
        }
        bucket.push(rule);
        true
    }

    /// The highest-precedence rule matching `dst`: named virtual network,
    /// then tenant, then host, then the longest destination prefix.
    /// Within one class the earliest inserted rule wins.
    #[must_use]
    pub fn find(&self, dst: &Destination) -> Option<&RoutingRule> {
        self.named
            .iter()
            .filter(|rule| rule.dst.matches_dst(dst))
            .min_by_key(|rule| rule.dst.dst_precedence())
            .or_else(|| {
                self.subnets
                    .lookup(dst.ip)
                    .and_then(|(_, rules)| rules.first())
            })
    }

    fn len(&self) -> usize {
        self.named.len() + self.subnets.iter().map(|(_, r)| r.len()).sum::<usize>()
    }
}

/// Source of a packet as seen by rule matching
#[derive(Clone, Copy, Debug)]
pub struct Source<'a> {
    pub netvirt: &'a str,
    pub ip: Ipv4Addr,
}

/// Per-router rule index, with one tier per kind of source key. Tiers are
/// evaluated from the most specific one and the first tier with a matching
/// rule decides.
#[derive(Clone, Debug, Default)]
pub struct RuleIndex {
    hosts: OrderMap<Ipv4Addr, RuleBucket>,
    netvirts: OrderMap<String, RuleBucket>,
    tenants: OrderMap<String, RuleBucket>,
    subnets: PrefixTrie<RuleBucket>,
}

impl RuleIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Returns false if an identical rule is already present.
    pub fn insert(&mut self, rule: RoutingRule) -> bool {
        let bucket = match &rule.src {
            RuleEntity::Host(ip) => self.hosts.entry(*ip).or_default(),
            RuleEntity::NetVirt(name) => self.netvirts.entry(name.clone()).or_default(),
            RuleEntity::Tenant(name) => self.tenants.entry(name.clone()).or_default(),
            RuleEntity::Subnet(prefix) => self.subnets.get_or_insert_with(*prefix, RuleBucket::default),
            RuleEntity::All => self
                .subnets
                .get_or_insert_with(Ipv4Prefix::any(), RuleBucket::default),
        };
        bucket.insert(rule)
    }

    /// Find the rule deciding the fate of a packet from `src` to `dst`
    #[must_use]
    pub fn find(&self, src: &Source, dst: &Destination) -> Option<&RoutingRule> {
        if let Some(rule) = self.hosts.get(&src.ip).and_then(|b| b.find(dst)) {
            return Some(rule);
        }
        if let Some(rule) = self.netvirts.get(src.netvirt).and_then(|b| b.find(dst)) {
            return Some(rule);
        }
        if let Some(rule) = self
            .tenants
            .get(tenant_of(src.netvirt))
            .and_then(|b| b.find(dst))
        {
            return Some(rule);
        }
        self.subnets
            .matches(src.ip)
            .find_map(|(_, bucket)| bucket.find(dst))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.values().map(RuleBucket::len).sum::<usize>()
            + self.netvirts.values().map(RuleBucket::len).sum::<usize>()
            + self.tenants.values().map(RuleBucket::len).sum::<usize>()
            + self.subnets.iter().map(|(_, b)| b.len()).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
