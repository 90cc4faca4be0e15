// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv4 prefixes

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefixError {
    #[error("Invalid prefix length {0}")]
    InvalidLength(u8),
    #[error("Wildcard mask {0} is not contiguous")]
    NonContiguousWildcard(Ipv4Addr),
    #[error("Invalid prefix '{0}'")]
    Invalid(String),
}

/// An IPv4 prefix. Host bits are always cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Ipv4Net", into = "Ipv4Net")]
pub struct Ipv4Prefix(Ipv4Net);

#[allow(clippy::len_without_is_empty)]
impl Ipv4Prefix {
    pub const MAX_LEN: u8 = 32;

    /// Build a prefix from an address and a length. The address is truncated.
    ///
    /// # Errors
    ///
    /// Fails if `len` is larger than 32.
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, PrefixError> {
        Ipv4Net::new(addr, len)
            .map(|net| Self(net.trunc()))
            .map_err(|_| PrefixError::InvalidLength(len))
    }

    /// Build a prefix from an address and an ACL-style wildcard mask, where
    /// a 1 bit means "don't care". `0.0.0.0` is a host and `255.255.255.255` matches any address.
    ///
    /// # Errors
    ///
    /// Fails if the inverted wildcard is not a contiguous netmask.
    pub fn from_wildcard(addr: Ipv4Addr, wildcard: Ipv4Addr) -> Result<Self, PrefixError> {
        let len = wildcard_to_len(wildcard)?;
        Self::new(addr, len)
    }

    /// The /32 prefix of a single address
    #[must_use]
    pub fn host(addr: Ipv4Addr) -> Self {
        Self(Ipv4Net::new_assert(addr, Self::MAX_LEN))
    }

    /// The /0 prefix
    #[must_use]
    pub fn any() -> Self {
        Self(Ipv4Net::default())
    }

    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }
    #[must_use]
    pub fn len(&self) -> u8 {
        self.0.prefix_len()
    }
    #[must_use]
    pub fn netmask(&self) -> Ipv4Addr {
        self.0.netmask()
    }
    #[must_use]
    pub fn wildcard(&self) -> Ipv4Addr {
        self.0.hostmask()
    }
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.len() == Self::MAX_LEN
    }
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.len() == 0
    }
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.0.contains(&addr)
    }
    #[must_use]
    pub fn covers(&self, other: &Ipv4Prefix) -> bool {
        self.0.contains(&other.0)
    }

    /// The prefix one bit shorter than this one, if any
    #[must_use]
    pub fn supernet(&self) -> Option<Ipv4Prefix> {
        self.0.supernet().map(Self)
    }
}

/// Convert an ACL wildcard mask into a prefix length
///
/// # Errors
///
/// Fails if the inverted wildcard is not a contiguous netmask.
pub fn wildcard_to_len(wildcard: Ipv4Addr) -> Result<u8, PrefixError> {
    let mask = !u32::from(wildcard);
    let ones = mask.leading_ones();
    if ones + mask.trailing_zeros() != 32 {
        return Err(PrefixError::NonContiguousWildcard(wildcard));
    }
    u8::try_from(ones).map_err(|_| PrefixError::NonContiguousWildcard(wildcard))
}

impl Default for Ipv4Prefix {
    fn default() -> Self {
        Self::any()
    }
}

impl From<Ipv4Addr> for Ipv4Prefix {
    fn from(addr: Ipv4Addr) -> Self {
        Self::host(addr)
    }
}

impl TryFrom<Ipv4Net> for Ipv4Prefix {
    type Error = PrefixError;
    fn try_from(net: Ipv4Net) -> Result<Self, Self::Error> {
        Ok(Self(net.trunc()))
    }
}

impl From<Ipv4Prefix> for Ipv4Net {
    fn from(prefix: Ipv4Prefix) -> Self {
        prefix.0
    }
}

impl FromStr for Ipv4Prefix {
    type Err = PrefixError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(net) = Ipv4Net::from_str(s) {
            return Ok(Self(net.trunc()));
        }
        Ipv4Addr::from_str(s)
            .map(Self::host)
            .map_err(|_| PrefixError::Invalid(s.to_string()))
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network(), self.len())
    }
}

impl prefix_trie::Prefix for Ipv4Prefix {
    type R = u32;

    fn repr(&self) -> u32 {
        u32::from(self.network())
    }

    fn prefix_len(&self) -> u8 {
        self.len()
    }

    fn from_repr_len(repr: u32, len: u8) -> Self {
        let addr = Ipv4Addr::from(repr);
        Self::new(addr, len.min(Self::MAX_LEN)).unwrap_or_default()
    }
}
