// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The flow record: one value per recognized header field.
//!
//! The same record describes a packet (a "key") or a wildcard ("mask"), where every bit set
//! means "this bit must match".  A few fields are shared between protocols which can never be
//! present at the same time:
//!
//! * ARP keeps its opcode in `nw_proto` and its protocol addresses in `nw_src` / `nw_dst`;
//! * ICMP and ICMPv6 keep type and code in `tp_src` / `tp_dst`;
//! * neighbor discovery keeps its link layer addresses in `arp_sha` / `arp_tha`;
//! * IPv6 keeps its traffic class in `nw_tos` and its hop limit in `nw_ttl`.

mod extract;
mod mpls;

pub use extract::flow_extract;

use crate::ODPP_NONE;
use ahash::AHasher;
use arrayvec::ArrayVec;
use bitflags::bitflags;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::mpls::Lse;
use net::packet::BaseLayer;
use net::vlan::Tci;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Number of MPLS label stack entries a flow can describe.
pub const FLOW_MAX_MPLS_LABELS: usize = 3;

/// Longest Geneve option block a tunnel key can carry.
pub const TUN_GENEVE_OPTS_MAX: usize = 252;

bitflags! {
    /// Tunnel flags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TnlFlags: u16 {
        /// Don't fragment the outer header.
        const DONT_FRAGMENT = 1 << 0;
        /// Checksum the outer header.
        const CSUM = 1 << 1;
        /// The tunnel id is meaningful.
        const KEY = 1 << 2;
        /// Operations and management frame.
        const OAM = 1 << 3;
    }
}

impl TnlFlags {
    const NAMES: [(TnlFlags, &'static str); 4] = [
        (TnlFlags::DONT_FRAGMENT, "df"),
        (TnlFlags::CSUM, "csum"),
        (TnlFlags::KEY, "key"),
        (TnlFlags::OAM, "oam"),
    ];

    /// Text name of a single flag bit.
    #[must_use]
    pub fn bit_name(bit: u32) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(flag, _)| u32::from(flag.bits()) == bit)
            .map(|(_, name)| *name)
    }
}

bitflags! {
    /// Fragmentation class of an IP flow.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FragFlags: u8 {
        /// The packet is a fragment.
        const ANY = 1 << 0;
        /// The packet is a fragment with a non zero offset.
        const LATER = 1 << 1;
    }
}

bitflags! {
    /// TCP control bits (the low 12 bits of the TCP offset/flags word).
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u16 {
        /// FIN
        const FIN = 0x001;
        /// SYN
        const SYN = 0x002;
        /// RST
        const RST = 0x004;
        /// PSH
        const PSH = 0x008;
        /// ACK
        const ACK = 0x010;
        /// URG
        const URG = 0x020;
        /// ECE
        const ECE = 0x040;
        /// CWR
        const CWR = 0x080;
        /// NS
        const NS = 0x100;
    }
}

impl TcpFlags {
    /// The bits of the flags word that carry control bits.
    pub const MASK: u16 = 0x0fff;

    const NAMES: [(TcpFlags, &'static str); 9] = [
        (TcpFlags::FIN, "fin"),
        (TcpFlags::SYN, "syn"),
        (TcpFlags::RST, "rst"),
        (TcpFlags::PSH, "psh"),
        (TcpFlags::ACK, "ack"),
        (TcpFlags::URG, "urg"),
        (TcpFlags::ECE, "ece"),
        (TcpFlags::CWR, "cwr"),
        (TcpFlags::NS, "ns"),
    ];

    /// Text name of a single flag bit.
    #[must_use]
    pub fn bit_name(bit: u32) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(flag, _)| u32::from(flag.bits()) == bit)
            .map(|(_, name)| *name)
    }
}

/// Tunnel metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowTnl {
    /// Tunnel id (VNI, GRE key).
    pub tun_id: u64,
    /// Outer source address.
    pub ip_src: Ipv4Addr,
    /// Outer destination address.  A zero destination means "no tunnel".
    pub ip_dst: Ipv4Addr,
    /// Tunnel flags.
    pub flags: TnlFlags,
    /// Outer TOS.
    pub ip_tos: u8,
    /// Outer TTL.
    pub ip_ttl: u8,
    /// Outer transport source port.
    pub tp_src: u16,
    /// Outer transport destination port.
    pub tp_dst: u16,
    /// Raw Geneve options, kept so they can be echoed back.
    pub geneve: ArrayVec<u8, TUN_GENEVE_OPTS_MAX>,
}

impl Default for FlowTnl {
    fn default() -> Self {
        FlowTnl {
            tun_id: 0,
            ip_src: Ipv4Addr::UNSPECIFIED,
            ip_dst: Ipv4Addr::UNSPECIFIED,
            flags: TnlFlags::empty(),
            ip_tos: 0,
            ip_ttl: 0,
            tp_src: 0,
            tp_dst: 0,
            geneve: ArrayVec::new(),
        }
    }
}

/// Packet header state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // field names are the documentation, see the module docs for sharing
pub struct Flow {
    pub tunnel: FlowTnl,
    pub skb_priority: u32,
    pub pkt_mark: u32,
    pub recirc_id: u32,
    pub dp_hash: u32,
    pub in_port: u32,

    pub base_layer: BaseLayer,
    pub dl_src: Mac,
    pub dl_dst: Mac,
    pub dl_type: EthType,
    /// 802.1Q TCI with [`Tci::CFI`] set when a tag is present; zero when untagged.
    pub vlan_tci: Tci,

    /// Outermost entry first.
    pub mpls_lse: [Lse; FLOW_MAX_MPLS_LABELS],

    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub ipv6_src: Ipv6Addr,
    pub ipv6_dst: Ipv6Addr,
    pub ipv6_label: u32,
    pub nd_target: Ipv6Addr,
    pub nw_frag: FragFlags,
    pub nw_tos: u8,
    pub nw_ttl: u8,
    pub nw_proto: u8,

    pub arp_sha: Mac,
    pub arp_tha: Mac,

    pub tp_src: u16,
    pub tp_dst: u16,
    pub tcp_flags: TcpFlags,
}

impl Default for Flow {
    fn default() -> Self {
        Flow {
            tunnel: FlowTnl::default(),
            skb_priority: 0,
            pkt_mark: 0,
            recirc_id: 0,
            dp_hash: 0,
            in_port: 0,
            base_layer: BaseLayer::L2,
            dl_src: Mac::ZERO,
            dl_dst: Mac::ZERO,
            dl_type: EthType::ZERO,
            vlan_tci: Tci(0),
            mpls_lse: [Lse(0); FLOW_MAX_MPLS_LABELS],
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            ipv6_src: Ipv6Addr::UNSPECIFIED,
            ipv6_dst: Ipv6Addr::UNSPECIFIED,
            ipv6_label: 0,
            nd_target: Ipv6Addr::UNSPECIFIED,
            nw_frag: FragFlags::empty(),
            nw_tos: 0,
            nw_ttl: 0,
            nw_proto: 0,
            arp_sha: Mac::ZERO,
            arp_tha: Mac::ZERO,
            tp_src: 0,
            tp_dst: 0,
            tcp_flags: TcpFlags::empty(),
        }
    }
}

impl Flow {
    /// True if the flow has no Ethernet header.
    #[must_use]
    pub fn is_l3(&self) -> bool {
        self.base_layer == BaseLayer::L3
    }

    /// True for IPv4 and IPv6 flows.
    #[must_use]
    pub fn is_ip_any(&self) -> bool {
        self.dl_type.is_ip_any()
    }

    /// Hash of protocol, addresses and ports, seeded with `basis`.
    #[must_use]
    pub fn hash_5tuple(&self, basis: u32) -> u32 {
        let mut hasher = AHasher::default();
        basis.hash(&mut hasher);
        if self.dl_type == EthType::IPV6 {
            self.ipv6_src.hash(&mut hasher);
            self.ipv6_dst.hash(&mut hasher);
        } else {
            self.nw_src.hash(&mut hasher);
            self.nw_dst.hash(&mut hasher);
        }
        self.nw_proto.hash(&mut hasher);
        self.tp_src.hash(&mut hasher);
        self.tp_dst.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)] // we want the low 32 bits
        let hash = hasher.finish() as u32;
        hash
    }
}

/// Metadata that travels with a packet through the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PktMetadata {
    /// QoS priority.
    pub skb_priority: u32,
    /// Packet mark.
    pub pkt_mark: u32,
    /// Tunnel the packet was received on, if any.
    pub tunnel: FlowTnl,
    /// Datapath input port.
    pub in_port: u32,
    /// Recirculation id.
    pub recirc_id: u32,
    /// Datapath hash.
    pub dp_hash: u32,
    /// Whether the packet starts with an Ethernet header.
    pub base_layer: BaseLayer,
    /// Out of band ethertype of an L3 packet.
    pub packet_ethertype: EthType,
}

impl Default for PktMetadata {
    fn default() -> Self {
        PktMetadata {
            skb_priority: 0,
            pkt_mark: 0,
            tunnel: FlowTnl::default(),
            in_port: ODPP_NONE,
            recirc_id: 0,
            dp_hash: 0,
            base_layer: BaseLayer::L2,
            packet_ethertype: EthType::ZERO,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;

    #[test]
    fn five_tuple_hash_depends_on_the_tuple() {
        let mut flow = Flow {
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(10, 0, 0, 1),
            nw_dst: Ipv4Addr::new(10, 0, 0, 2),
            nw_proto: 6,
            tp_src: 1000,
            tp_dst: 80,
            ..Flow::default()
        };
        let h = flow.hash_5tuple(0);
        assert_eq!(h, flow.hash_5tuple(0));
        assert_ne!(h, flow.hash_5tuple(1));
        // fields outside the tuple do not matter
        flow.dl_src = Mac([1, 2, 3, 4, 5, 6]);
        flow.nw_ttl = 3;
        assert_eq!(h, flow.hash_5tuple(0));
        flow.tp_dst = 81;
        assert_ne!(h, flow.hash_5tuple(0));
    }

    #[test]
    fn flag_names() {
        assert_eq!(TnlFlags::bit_name(1), Some("df"));
        assert_eq!(TnlFlags::bit_name(8), Some("oam"));
        assert_eq!(TnlFlags::bit_name(16), None);
        assert_eq!(TcpFlags::bit_name(0x10), Some("ack"));
        assert_eq!(TcpFlags::bit_name(0x200), None);
        assert_eq!(TcpFlags::bit_name(0x1_0000), None);
    }
}
