// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Virtual routing decisions for an SDN controller.
//!
//! For every frame surfaced by the data plane this crate decides whether to
//! forward, flood, rewrite or drop it:
//!
//! * [`arp::ArpManager`] converts broadcast ARP requests into unicast ones
//!   when the target is known and the topology allows it.
//! * [`vrouter::VirtualRouter`] resolves tiered routing rules with longest
//!   prefix match and computes the egress, next hop and MAC rewrite.
//! * [`icmp::IcmpDispatcher`] runs an ordered chain of ICMP handlers.
//!
//! Routers live in a [`table::RoutingTable`] that is updated through a
//! [`table::RoutingTableWriter`] and read lock-free by packet workers.

#![deny(unsafe_code, clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
#![allow(clippy::module_name_repetitions)]

pub mod arp;
pub mod config;
pub mod context;
pub mod decision;
pub mod dispatch;
pub mod errors;
pub mod frame;
pub mod gwpool;
pub mod icmp;
pub mod interfaces;
pub mod mac;
pub mod names;
pub mod netvirt;
pub mod rules;
pub mod services;
pub mod table;
pub mod vrouter;

#[cfg(test)]
mod testutils;

pub use errors::VRouterError;
