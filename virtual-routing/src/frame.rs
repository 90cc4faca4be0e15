// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Decoded view of the frames handed over by the data plane.
//! Wire parsing happens upstream; a frame that could not be decoded
//! is carried as [`Payload::Malformed`].

use crate::mac::Mac;
use std::net::Ipv4Addr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const IPPROTO_ICMP: u8 = 1;
pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
    RarpRequest,
    RarpReply,
    Other(u16),
}

impl From<u16> for ArpOp {
    fn from(op: u16) -> Self {
        match op {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            3 => ArpOp::RarpRequest,
            4 => ArpOp::RarpReply,
            other => ArpOp::Other(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArpPacket {
    pub op: ArpOp,
    /// protocol address type, [`ETHERTYPE_IPV4`] for IPv4
    pub protocol: u16,
    pub sender_mac: Mac,
    pub sender_ip: Ipv4Addr,
    pub target_mac: Mac,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// An announcement of the sender's own address
    #[must_use]
    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IcmpPacket {
    pub icmp_type: u8,
    pub code: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Ipv4Payload {
    Icmp(IcmpPacket),
    Other(u8),
    /// a header of the given protocol that could not be decoded
    Malformed(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ipv4Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Ipv4Payload,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Arp(ArpPacket),
    Ipv4(Ipv4Packet),
    Other(u16),
    Malformed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EthernetFrame {
    pub src: Mac,
    pub dst: Mac,
    pub vlan: Option<u16>,
    pub payload: Payload,
}

impl EthernetFrame {
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.dst.is_broadcast()
    }

    #[must_use]
    pub fn arp(&self) -> Option<&ArpPacket> {
        match &self.payload {
            Payload::Arp(arp) => Some(arp),
            _ => None,
        }
    }

    #[must_use]
    pub fn ipv4(&self) -> Option<&Ipv4Packet> {
        match &self.payload {
            Payload::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    #[must_use]
    pub fn icmp(&self) -> Option<&IcmpPacket> {
        match self.ipv4()?.payload {
            Ipv4Payload::Icmp(ref icmp) => Some(icmp),
            Ipv4Payload::Other(_) | Ipv4Payload::Malformed(_) => None,
        }
    }

    /// Whether some header of the frame could not be decoded
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        match &self.payload {
            Payload::Malformed => true,
            Payload::Ipv4(ip) => matches!(ip.payload, Ipv4Payload::Malformed(_)),
            Payload::Arp(_) | Payload::Other(_) => false,
        }
    }

    /// The IPv4 source and destination of the frame: the IP header, or the
    /// sender and target of an ARP packet. None for malformed frames.
    #[must_use]
    pub fn l3_endpoints(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        if self.is_malformed() {
            return None;
        }
        match &self.payload {
            Payload::Ipv4(ip) => Some((ip.src, ip.dst)),
            Payload::Arp(arp) if arp.protocol == ETHERTYPE_IPV4 => {
                Some((arp.sender_ip, arp.target_ip))
            }
            _ => None,
        }
    }

    /// A broadcast ARP request from `sender`
    #[must_use]
    pub fn arp_request(sender_mac: Mac, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            src: sender_mac,
            dst: Mac::BROADCAST,
            vlan: None,
            payload: Payload::Arp(ArpPacket {
                op: ArpOp::Request,
                protocol: ETHERTYPE_IPV4,
                sender_mac,
                sender_ip,
                target_mac: Mac::ZERO,
                target_ip,
            }),
        }
    }

    /// An ARP reply from `sender` to `target`
    #[must_use]
    pub fn arp_reply(
        sender_mac: Mac,
        sender_ip: Ipv4Addr,
        target_mac: Mac,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            src: sender_mac,
            dst: target_mac,
            vlan: None,
            payload: Payload::Arp(ArpPacket {
                op: ArpOp::Reply,
                protocol: ETHERTYPE_IPV4,
                sender_mac,
                sender_ip,
                target_mac,
                target_ip,
            }),
        }
    }

    #[must_use]
    pub fn icmp_echo(src_mac: Mac, dst_mac: Mac, src: Ipv4Addr, dst: Ipv4Addr, icmp_type: u8) -> Self {
        Self {
            src: src_mac,
            dst: dst_mac,
            vlan: None,
            payload: Payload::Ipv4(Ipv4Packet {
                src,
                dst,
                payload: Ipv4Payload::Icmp(IcmpPacket { icmp_type, code: 0 }),
            }),
        }
    }

    /// The unicast version of an ARP request, addressed to `dst_mac`. The
    /// source MAC, VLAN and ARP sender/target fields are kept.
    #[must_use]
    pub fn to_unicast_arp_request(&self, dst_mac: Mac) -> Option<Self> {
        let arp = self.arp()?;
        Some(Self {
            src: self.src,
            dst: dst_mac,
            vlan: self.vlan,
            payload: Payload::Arp(ArpPacket {
                op: ArpOp::Request,
                ..arp.clone()
            }),
        })
    }
}
