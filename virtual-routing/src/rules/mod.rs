// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routing rules.
//!
//! Each side of a rule matches one [`RuleEntity`]: a host, a named virtual
//! network, a named tenant, a subnet or anything. The entity is derived from
//! the raw match fields of a [`RuleEndpoint`], where addresses come with an
//! ACL-style wildcard mask.

mod index;

pub use index::{RuleBucket, RuleIndex, Source};

use lpm::Ipv4Prefix;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::Ipv4Addr;

use crate::errors::VRouterError;
use crate::names::{split_qualified, validate_component};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Permit,
    Deny,
}

/// Raw match fields of one side of a rule
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netvirt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<Ipv4Addr>,
}

/// What one side of a rule matches
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleEntity {
    Host(Ipv4Addr),
    NetVirt(String),
    Tenant(String),
    Subnet(Ipv4Prefix),
    All,
}

/// The destination of a packet as seen by rule matching. `netvirt` is not
/// known for silent hosts; `tenant` may then come from subnet ownership.
#[derive(Clone, Copy, Debug)]
pub struct Destination<'a> {
    pub netvirt: Option<&'a str>,
    pub tenant: Option<&'a str>,
    pub ip: Ipv4Addr,
}

impl RuleEntity {
    /// Rank among destination matches, lower wins
    #[must_use]
    pub(crate) fn dst_precedence(&self) -> u8 {
        match self {
            RuleEntity::NetVirt(_) => 0,
            RuleEntity::Tenant(_) => 1,
            RuleEntity::Host(_) => 2,
            RuleEntity::Subnet(_) => 3,
            RuleEntity::All => 4,
        }
    }

    #[must_use]
    pub fn matches(&self, netvirt: Option<&str>, tenant: Option<&str>, ip: Ipv4Addr) -> bool {
        match self {
            RuleEntity::Host(host) => *host == ip,
            RuleEntity::NetVirt(name) => netvirt == Some(name.as_str()),
            RuleEntity::Tenant(name) => tenant == Some(name.as_str()),
            RuleEntity::Subnet(prefix) => prefix.contains(ip),
            RuleEntity::All => true,
        }
    }

    #[must_use]
    pub fn matches_dst(&self, dst: &Destination) -> bool {
        self.matches(dst.netvirt, dst.tenant, dst.ip)
    }

    /// The prefix under which a destination of this kind is stored in a trie
    #[must_use]
    pub(crate) fn prefix(&self) -> Option<Ipv4Prefix> {
        match self {
            RuleEntity::Subnet(prefix) => Some(*prefix),
            RuleEntity::All => Some(Ipv4Prefix::any()),
            _ => None,
        }
    }
}

impl TryFrom<&RuleEndpoint> for RuleEntity {
    type Error = VRouterError;

    fn try_from(ep: &RuleEndpoint) -> Result<Self, Self::Error> {
        let named = ep.netvirt.is_some() || ep.tenant.is_some();
        // an exact host takes precedence over names
        let exact = match ep.wildcard {
            Some(wildcard) => wildcard.is_unspecified(),
            None => !named,
        };
        if let (Some(ip), true) = (ep.ip, exact) {
            return Ok(RuleEntity::Host(ip));
        }
        if let Some(netvirt) = &ep.netvirt {
            split_qualified(netvirt)?;
            return Ok(RuleEntity::NetVirt(netvirt.clone()));
        }
        if let Some(tenant) = &ep.tenant {
            validate_component(tenant)?;
            return Ok(RuleEntity::Tenant(tenant.clone()));
        }
        match (ep.ip, ep.wildcard) {
            (_, Some(wildcard)) if wildcard.is_broadcast() => Ok(RuleEntity::All),
            (None, None) => Ok(RuleEntity::All),
            (Some(ip), Some(wildcard)) => {
                let prefix = Ipv4Prefix::from_wildcard(ip, wildcard)?;
                Ok(if prefix.is_any() {
                    RuleEntity::All
                } else {
                    RuleEntity::Subnet(prefix)
                })
            }
            (_, _) => Err(VRouterError::InvalidRule("wildcard mask without address")),
        }
    }
}

impl Display for RuleEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleEntity::Host(ip) => write!(f, "host {ip}"),
            RuleEntity::NetVirt(name) => write!(f, "netvirt {name}"),
            RuleEntity::Tenant(name) => write!(f, "tenant {name}"),
            RuleEntity::Subnet(prefix) => write!(f, "subnet {prefix}"),
            RuleEntity::All => write!(f, "any"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    pub src: RuleEntity,
    pub dst: RuleEntity,
    pub action: RuleAction,
    pub out_iface: Option<String>,
    pub next_hop_ip: Option<Ipv4Addr>,
    pub next_hop_gateway_pool: Option<String>,
}

impl RoutingRule {
    #[must_use]
    pub fn permit(src: RuleEntity, dst: RuleEntity) -> Self {
        Self {
            src,
            dst,
            action: RuleAction::Permit,
            out_iface: None,
            next_hop_ip: None,
            next_hop_gateway_pool: None,
        }
    }
    #[must_use]
    pub fn deny(src: RuleEntity, dst: RuleEntity) -> Self {
        Self {
            action: RuleAction::Deny,
            ..Self::permit(src, dst)
        }
    }
    #[must_use]
    pub fn with_out_iface(mut self, iface: &str) -> Self {
        self.out_iface = Some(iface.to_string());
        self
    }
    #[must_use]
    pub fn with_next_hop(mut self, ip: Ipv4Addr) -> Self {
        self.next_hop_ip = Some(ip);
        self
    }
    #[must_use]
    pub fn with_gateway_pool(mut self, pool: &str) -> Self {
        self.next_hop_gateway_pool = Some(pool.to_string());
        self
    }
    #[must_use]
    pub fn is_permit(&self) -> bool {
        self.action == RuleAction::Permit
    }

    /// # Errors
    ///
    /// A rule cannot have both an explicit next hop and a gateway pool.
    pub fn validate(&self) -> Result<(), VRouterError> {
        if self.next_hop_ip.is_some() && self.next_hop_gateway_pool.is_some() {
            return Err(VRouterError::InvalidRule(
                "both a next hop and a gateway pool are set",
            ));
        }
        Ok(())
    }
}

impl Display for RoutingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let action = match self.action {
            RuleAction::Permit => "permit",
            RuleAction::Deny => "deny",
        };
        write!(f, "{action} from {} to {}", self.src, self.dst)?;
        if let Some(iface) = &self.out_iface {
            write!(f, " via {iface}")?;
        }
        if let Some(nh) = &self.next_hop_ip {
            write!(f, " next-hop {nh}")?;
        }
        if let Some(pool) = &self.next_hop_gateway_pool {
            write!(f, " gateway-pool {pool}")?;
        }
        Ok(())
    }
}

/// A routing rule as found in configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default)]
    pub src: RuleEndpoint,
    #[serde(default)]
    pub dst: RuleEndpoint,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_iface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_pool: Option<String>,
}

impl TryFrom<&RuleSpec> for RoutingRule {
    type Error = VRouterError;

    fn try_from(spec: &RuleSpec) -> Result<Self, Self::Error> {
        let rule = RoutingRule {
            src: RuleEntity::try_from(&spec.src)?,
            dst: RuleEntity::try_from(&spec.dst)?,
            action: spec.action,
            out_iface: spec.out_iface.clone(),
            next_hop_ip: spec.next_hop,
            next_hop_gateway_pool: spec.gateway_pool.clone(),
        };
        rule.validate()?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ep(tenant: Option<&str>, netvirt: Option<&str>, ip: Option<&str>, wc: Option<&str>) -> RuleEndpoint {
        RuleEndpoint {
            tenant: tenant.map(str::to_string),
            netvirt: netvirt.map(str::to_string),
            ip: ip.map(|s| s.parse().unwrap()),
            wildcard: wc.map(|s| s.parse().unwrap()),
        }
    }

    #[test]
    fn test_entity_typing() {
        let host = ep(None, Some("t1|nv1"), Some("10.0.0.1"), Some("0.0.0.0"));
        assert_eq!(
            RuleEntity::try_from(&host),
            Ok(RuleEntity::Host("10.0.0.1".parse().unwrap()))
        );

        let netvirt = ep(Some("t1"), Some("t1|nv1"), None, None);
        assert_eq!(
            RuleEntity::try_from(&netvirt),
            Ok(RuleEntity::NetVirt("t1|nv1".to_string()))
        );

        let tenant = ep(Some("t1"), None, None, None);
        assert_eq!(
            RuleEntity::try_from(&tenant),
            Ok(RuleEntity::Tenant("t1".to_string()))
        );

        let all = ep(None, None, Some("10.0.0.0"), Some("255.255.255.255"));
        assert_eq!(RuleEntity::try_from(&all), Ok(RuleEntity::All));
        assert_eq!(RuleEntity::try_from(&RuleEndpoint::default()), Ok(RuleEntity::All));

        let subnet = ep(None, None, Some("10.1.2.3"), Some("0.0.255.255"));
        assert_eq!(
            RuleEntity::try_from(&subnet),
            Ok(RuleEntity::Subnet("10.1.0.0/16".parse().unwrap()))
        );

        let bare_ip = ep(None, None, Some("10.1.2.3"), None);
        assert_eq!(
            RuleEntity::try_from(&bare_ip),
            Ok(RuleEntity::Host("10.1.2.3".parse().unwrap()))
        );
    }

    #[test]
    fn test_entity_typing_errors() {
        let bad_mask = ep(None, None, Some("10.1.2.3"), Some("0.255.0.255"));
        assert!(matches!(
            RuleEntity::try_from(&bad_mask),
            Err(VRouterError::InvalidAddress(_))
        ));
        let mask_only = ep(None, None, None, Some("0.0.0.255"));
        assert!(RuleEntity::try_from(&mask_only).is_err());
        let unqualified = ep(None, Some("nv1"), None, None);
        assert_eq!(
            RuleEntity::try_from(&unqualified),
            Err(VRouterError::InvalidName("nv1".to_string()))
        );
    }

    #[test]
    fn test_entity_matching() {
        let ip: Ipv4Addr = "10.1.1.1".parse().unwrap();
        assert!(RuleEntity::NetVirt("t|a".into()).matches(Some("t|a"), Some("t"), ip));
        assert!(!RuleEntity::NetVirt("t|a".into()).matches(None, Some("t"), ip));
        assert!(RuleEntity::Tenant("t".into()).matches(None, Some("t"), ip));
        assert!(RuleEntity::Subnet("10.1.0.0/16".parse().unwrap()).matches(None, None, ip));
        assert!(RuleEntity::Host(ip).matches(None, None, ip));
        assert!(RuleEntity::All.matches(None, None, ip));
    }

    #[test]
    fn test_rule_spec() {
        let spec = RuleSpec {
            src: ep(Some("t1"), None, None, None),
            dst: ep(None, None, Some("0.0.0.0"), Some("255.255.255.255")),
            next_hop: Some("1.1.1.1".parse().unwrap()),
            gateway_pool: Some("gw".to_string()),
            ..Default::default()
        };
        assert!(RoutingRule::try_from(&spec).is_err());

        let spec = RuleSpec {
            gateway_pool: None,
            ..spec
        };
        let rule = RoutingRule::try_from(&spec).unwrap();
        assert_eq!(rule.to_string(), "permit from tenant t1 to any next-hop 1.1.1.1");
    }
}
