// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv4 prefixes expressed with ACL-style wildcard masks, and a
//! longest-prefix-match trie keyed by them.

#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod prefix;
pub mod trie;

pub use prefix::{Ipv4Prefix, PrefixError};
pub use trie::PrefixTrie;
