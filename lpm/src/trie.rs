// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Longest-prefix-match trie over [`Ipv4Prefix`]es

use crate::prefix::Ipv4Prefix;
use prefix_trie::PrefixMap;
use std::fmt::Debug;
use std::net::Ipv4Addr;
use tracectl::trace_target;
use tracing::trace;

trace_target!("lpm", tracectl::LevelFilter::INFO, &[]);

#[derive(Clone)]
pub struct PrefixTrie<V>(PrefixMap<Ipv4Prefix, V>);

impl<V> Default for PrefixTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PrefixTrie<V> {
    #[must_use]
    pub fn new() -> Self {
        Self(PrefixMap::new())
    }

    /// Insert a value, returning the one previously stored for the exact same prefix
    pub fn insert(&mut self, prefix: Ipv4Prefix, value: V) -> Option<V> {
        self.0.insert(prefix, value)
    }

    /// This function gets the prefix, with exact match, it does not do LPM
    #[must_use]
    pub fn get(&self, prefix: &Ipv4Prefix) -> Option<&V> {
        self.0.get(prefix)
    }

    /// This function gets the prefix, with exact match, it does not do LPM
    pub fn get_mut(&mut self, prefix: &Ipv4Prefix) -> Option<&mut V> {
        self.0.get_mut(prefix)
    }

    /// Get the value at `prefix`, inserting one built by `make` if there is none
    pub fn get_or_insert_with(&mut self, prefix: Ipv4Prefix, make: impl FnOnce() -> V) -> &mut V {
        self.0.entry(prefix).or_insert_with(make)
    }

    pub fn remove(&mut self, prefix: &Ipv4Prefix) -> Option<V> {
        self.0.remove(prefix)
    }

    /// Longest prefix match for an address
    #[must_use]
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<(&Ipv4Prefix, &V)> {
        self.0.get_lpm(&Ipv4Prefix::host(addr))
    }

    /// All the prefixes containing `addr`, from the longest to the shortest
    pub fn matches(&self, addr: Ipv4Addr) -> Matches<'_, V> {
        Matches {
            trie: self,
            next: Some(Ipv4Prefix::host(addr)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ipv4Prefix, &V)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Debug> Debug for PrefixTrie<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Iterator over the prefixes matching an address, longest first
pub struct Matches<'a, V> {
    trie: &'a PrefixTrie<V>,
    next: Option<Ipv4Prefix>,
}

impl<'a, V> Iterator for Matches<'a, V> {
    type Item = (&'a Ipv4Prefix, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.next.take()?;
        let (prefix, value) = self.trie.0.get_lpm(&addr)?;
        trace!("lpm match for {addr}: {prefix}");
        self.next = prefix.supernet();
        Some((prefix, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix(s: &str) -> Ipv4Prefix {
        s.parse().expect("valid prefix")
    }
    fn addr(s: &str) -> Ipv4Addr {
        s.parse().expect("valid address")
    }

    fn build() -> PrefixTrie<&'static str> {
        let mut trie = PrefixTrie::new();
        trie.insert(prefix("0.0.0.0/0"), "default");
        trie.insert(prefix("10.0.0.0/8"), "ten");
        trie.insert(prefix("10.1.0.0/16"), "ten-one");
        trie.insert(prefix("10.1.1.0/24"), "ten-one-one");
        trie.insert(prefix("10.1.1.7/32"), "host");
        trie
    }

    #[test]
    fn test_lookup() {
        let trie = build();
        assert_eq!(trie.len(), 5);
        assert_eq!(trie.lookup(addr("10.1.1.7")).map(|(_, v)| *v), Some("host"));
        assert_eq!(
            trie.lookup(addr("10.1.1.8")).map(|(_, v)| *v),
            Some("ten-one-one")
        );
        assert_eq!(trie.lookup(addr("10.1.2.8")).map(|(_, v)| *v), Some("ten-one"));
        assert_eq!(trie.lookup(addr("10.200.0.1")).map(|(_, v)| *v), Some("ten"));
        assert_eq!(trie.lookup(addr("11.0.0.1")).map(|(_, v)| *v), Some("default"));
    }

    #[test]
    fn test_lookup_without_default() {
        let mut trie = build();
        assert_eq!(trie.remove(&prefix("0.0.0.0/0")), Some("default"));
        assert!(trie.lookup(addr("11.0.0.1")).is_none());
        assert_eq!(trie.get(&prefix("10.1.0.0/16")), Some(&"ten-one"));
        assert_eq!(trie.get(&prefix("10.1.0.0/17")), None);
    }

    #[test]
    fn test_matches_longest_first() {
        let trie = build();
        let found: Vec<_> = trie.matches(addr("10.1.1.7")).map(|(_, v)| *v).collect();
        assert_eq!(found, vec!["host", "ten-one-one", "ten-one", "ten", "default"]);

        let found: Vec<_> = trie.matches(addr("10.9.9.9")).map(|(p, _)| *p).collect();
        assert_eq!(found, vec![prefix("10.0.0.0/8"), prefix("0.0.0.0/0")]);
    }

    #[test]
    fn test_get_or_insert_with() {
        let mut trie: PrefixTrie<Vec<u32>> = PrefixTrie::new();
        trie.get_or_insert_with(prefix("10.0.0.0/8"), Vec::new).push(1);
        trie.get_or_insert_with(prefix("10.0.0.0/8"), Vec::new).push(2);
        assert_eq!(trie.get(&prefix("10.0.0.0/8")), Some(&vec![1, 2]));
    }

    #[test]
    fn test_lpm_against_linear_scan() {
        bolero::check!()
            .with_type::<(Vec<(u32, u8)>, u32)>()
            .for_each(|(entries, target)| {
                let mut trie = PrefixTrie::new();
                let mut linear = vec![];
                for (net, len) in entries.iter().take(32) {
                    let p = Ipv4Prefix::new(Ipv4Addr::from(*net), len % 33).unwrap();
                    trie.insert(p, p);
                    linear.push(p);
                }
                let target = Ipv4Addr::from(*target);
                let expected = linear
                    .iter()
                    .filter(|p| p.contains(target))
                    .max_by_key(|p| p.len())
                    .copied();
                assert_eq!(trie.lookup(target).map(|(p, _)| *p), expected);
            });
    }
}
