// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow keys and masks in attribute form.
//!
//! A key is a sequence of attributes, one per header group, in the order produced by
//! [`odp_flow_key_from_flow`].  A mask is the same sequence carrying wildcard bits, and can only
//! be read back with the key it belongs to (the key says which protocols the mask bits refer
//! to).
//!
//! Fixed size payloads are described by the `Key*` structs below.  Every multi-byte integer in a
//! payload is big endian.

mod decode;
mod encode;
mod exact;
mod fields;
mod format;
mod meta;
mod parse;
mod tunnel;

pub use decode::{odp_flow_key_to_flow, odp_flow_key_to_mask};
pub use encode::{EncodeOptions, EncodeOptionsBuilder, odp_flow_key_from_flow, odp_flow_key_from_mask};
pub use exact::{is_all_zeros, odp_mask_attr_is_exact, odp_mask_is_exact};
pub use format::{format_key_attr, odp_flow_format, odp_flow_key_format};
pub use meta::{odp_flow_key_hash, odp_key_from_pkt_metadata, odp_key_to_pkt_metadata};
pub use parse::{KeyError, odp_flow_from_string};
pub use tunnel::{odp_tun_key_from_attr, tun_key_to_attr};

pub(crate) use format::format_vlan_tci;
pub(crate) use parse::parse_key_attr;

use net::eth::mac::Mac;
use net::parse::{LengthError, Reader};
use std::borrow::Cow;
use std::fmt::Debug;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Key attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum OvsKeyAttr {
    Unspec = 0,
    /// Nested attributes of the frame behind an 802.1Q tag.
    Encap = 1,
    Priority = 2,
    InPort = 3,
    Ethernet = 4,
    Vlan = 5,
    Ethertype = 6,
    Ipv4 = 7,
    Ipv6 = 8,
    Tcp = 9,
    Udp = 10,
    Icmp = 11,
    Icmpv6 = 12,
    Arp = 13,
    Nd = 14,
    SkbMark = 15,
    /// Nested [`OvsTunnelKeyAttr`] attributes.
    Tunnel = 16,
    Sctp = 17,
    TcpFlags = 18,
    DpHash = 19,
    RecircId = 20,
    Mpls = 21,
    /// Ethertype of a packet without an Ethernet header.
    PacketEthertype = 22,
}

/// Expected payload length of an attribute type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrLen {
    /// Exactly this many bytes.
    Fixed(usize),
    /// Any length (nested or variable sized).
    Variable,
    /// The type is not a valid key attribute.
    Invalid,
}

impl OvsKeyAttr {
    /// Highest known type.
    pub const MAX: u16 = OvsKeyAttr::PacketEthertype as u16;

    const ALL: [OvsKeyAttr; 23] = [
        OvsKeyAttr::Unspec,
        OvsKeyAttr::Encap,
        OvsKeyAttr::Priority,
        OvsKeyAttr::InPort,
        OvsKeyAttr::Ethernet,
        OvsKeyAttr::Vlan,
        OvsKeyAttr::Ethertype,
        OvsKeyAttr::Ipv4,
        OvsKeyAttr::Ipv6,
        OvsKeyAttr::Tcp,
        OvsKeyAttr::Udp,
        OvsKeyAttr::Icmp,
        OvsKeyAttr::Icmpv6,
        OvsKeyAttr::Arp,
        OvsKeyAttr::Nd,
        OvsKeyAttr::SkbMark,
        OvsKeyAttr::Tunnel,
        OvsKeyAttr::Sctp,
        OvsKeyAttr::TcpFlags,
        OvsKeyAttr::DpHash,
        OvsKeyAttr::RecircId,
        OvsKeyAttr::Mpls,
        OvsKeyAttr::PacketEthertype,
    ];

    /// The attribute type for a wire value, if known.
    #[must_use]
    pub fn from_u16(ty: u16) -> Option<OvsKeyAttr> {
        OvsKeyAttr::ALL.get(usize::from(ty)).copied()
    }

    /// The wire value.
    #[must_use]
    pub const fn ty(self) -> u16 {
        self as u16
    }

    /// Name used in the text form.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OvsKeyAttr::Unspec => "unspec",
            OvsKeyAttr::Encap => "encap",
            OvsKeyAttr::Priority => "skb_priority",
            OvsKeyAttr::InPort => "in_port",
            OvsKeyAttr::Ethernet => "eth",
            OvsKeyAttr::Vlan => "vlan",
            OvsKeyAttr::Ethertype => "eth_type",
            OvsKeyAttr::Ipv4 => "ipv4",
            OvsKeyAttr::Ipv6 => "ipv6",
            OvsKeyAttr::Tcp => "tcp",
            OvsKeyAttr::Udp => "udp",
            OvsKeyAttr::Icmp => "icmp",
            OvsKeyAttr::Icmpv6 => "icmpv6",
            OvsKeyAttr::Arp => "arp",
            OvsKeyAttr::Nd => "nd",
            OvsKeyAttr::SkbMark => "skb_mark",
            OvsKeyAttr::Tunnel => "tunnel",
            OvsKeyAttr::Sctp => "sctp",
            OvsKeyAttr::TcpFlags => "tcp_flags",
            OvsKeyAttr::DpHash => "dp_hash",
            OvsKeyAttr::RecircId => "recirc_id",
            OvsKeyAttr::Mpls => "mpls",
            OvsKeyAttr::PacketEthertype => "packet_eth_type",
        }
    }

    /// Payload length this type must have.
    #[must_use]
    pub const fn expected_len(self) -> AttrLen {
        match self {
            OvsKeyAttr::Unspec => AttrLen::Invalid,
            OvsKeyAttr::Encap | OvsKeyAttr::Tunnel | OvsKeyAttr::Mpls => AttrLen::Variable,
            OvsKeyAttr::Priority
            | OvsKeyAttr::SkbMark
            | OvsKeyAttr::DpHash
            | OvsKeyAttr::RecircId
            | OvsKeyAttr::InPort => AttrLen::Fixed(4),
            OvsKeyAttr::Ethernet => AttrLen::Fixed(KeyEthernet::LEN),
            OvsKeyAttr::Vlan
            | OvsKeyAttr::Ethertype
            | OvsKeyAttr::TcpFlags
            | OvsKeyAttr::PacketEthertype => AttrLen::Fixed(2),
            OvsKeyAttr::Ipv4 => AttrLen::Fixed(KeyIpv4::LEN),
            OvsKeyAttr::Ipv6 => AttrLen::Fixed(KeyIpv6::LEN),
            OvsKeyAttr::Tcp | OvsKeyAttr::Udp | OvsKeyAttr::Sctp => AttrLen::Fixed(KeyPorts::LEN),
            OvsKeyAttr::Icmp | OvsKeyAttr::Icmpv6 => AttrLen::Fixed(KeyIcmp::LEN),
            OvsKeyAttr::Arp => AttrLen::Fixed(KeyArp::LEN),
            OvsKeyAttr::Nd => AttrLen::Fixed(KeyNd::LEN),
        }
    }
}

/// Expected payload length of a raw attribute type.
#[must_use]
pub fn odp_flow_key_attr_len(ty: u16) -> AttrLen {
    OvsKeyAttr::from_u16(ty).map_or(AttrLen::Invalid, OvsKeyAttr::expected_len)
}

/// Text name of a raw attribute type.
#[must_use]
pub fn ovs_key_attr_to_string(ty: u16) -> Cow<'static, str> {
    match OvsKeyAttr::from_u16(ty) {
        Some(attr) => Cow::Borrowed(attr.name()),
        None => Cow::Owned(format!("key{ty}")),
    }
}

/// Nested tunnel attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum OvsTunnelKeyAttr {
    Id = 0,
    Ipv4Src = 1,
    Ipv4Dst = 2,
    Tos = 3,
    Ttl = 4,
    DontFragment = 5,
    Csum = 6,
    Oam = 7,
    GeneveOpts = 8,
    TpSrc = 9,
    TpDst = 10,
}

impl OvsTunnelKeyAttr {
    /// The attribute type for a wire value, if known.
    #[must_use]
    pub fn from_u16(ty: u16) -> Option<OvsTunnelKeyAttr> {
        Some(match ty {
            0 => OvsTunnelKeyAttr::Id,
            1 => OvsTunnelKeyAttr::Ipv4Src,
            2 => OvsTunnelKeyAttr::Ipv4Dst,
            3 => OvsTunnelKeyAttr::Tos,
            4 => OvsTunnelKeyAttr::Ttl,
            5 => OvsTunnelKeyAttr::DontFragment,
            6 => OvsTunnelKeyAttr::Csum,
            7 => OvsTunnelKeyAttr::Oam,
            8 => OvsTunnelKeyAttr::GeneveOpts,
            9 => OvsTunnelKeyAttr::TpSrc,
            10 => OvsTunnelKeyAttr::TpDst,
            _ => return None,
        })
    }

    /// The wire value.
    #[must_use]
    pub const fn ty(self) -> u16 {
        self as u16
    }

    /// Payload length this type must have.
    #[must_use]
    pub const fn expected_len(self) -> AttrLen {
        match self {
            OvsTunnelKeyAttr::Id => AttrLen::Fixed(8),
            OvsTunnelKeyAttr::Ipv4Src | OvsTunnelKeyAttr::Ipv4Dst => AttrLen::Fixed(4),
            OvsTunnelKeyAttr::Tos | OvsTunnelKeyAttr::Ttl => AttrLen::Fixed(1),
            OvsTunnelKeyAttr::DontFragment | OvsTunnelKeyAttr::Csum | OvsTunnelKeyAttr::Oam => {
                AttrLen::Fixed(0)
            }
            OvsTunnelKeyAttr::GeneveOpts => AttrLen::Variable,
            OvsTunnelKeyAttr::TpSrc | OvsTunnelKeyAttr::TpDst => AttrLen::Fixed(2),
        }
    }
}

/// A fixed size key payload.
pub trait KeyPayload: Sized + Copy + PartialEq + Debug + Default {
    /// Size on the wire.
    const LEN: usize;

    /// Append the wire form.
    fn write(&self, out: &mut Vec<u8>);

    /// Read the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if the input is too short.
    fn read(reader: &mut Reader<'_>) -> Result<Self, LengthError>;

    /// The wire form.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        self.write(&mut out);
        out
    }

    /// Read a payload which must be exactly [`KeyPayload::LEN`] bytes long.
    fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() != Self::LEN {
            return None;
        }
        Self::read(&mut Reader::new(payload)).ok()
    }
}

/// `key & mask`, field by field.
#[must_use]
pub fn payload_and<P: KeyPayload>(key: &P, mask: &P) -> P {
    let (key, mask) = (key.to_bytes(), mask.to_bytes());
    let out: Vec<u8> = key.iter().zip(&mask).map(|(k, m)| k & m).collect();
    P::from_payload(&out).unwrap_or_default()
}

/// `key | (old & !mask)`, field by field: the bits of `key` selected by `mask` written over
/// `old`.
#[must_use]
pub fn payload_masked_set<P: KeyPayload>(old: &P, key: &P, mask: &P) -> P {
    let (old, key, mask) = (old.to_bytes(), key.to_bytes(), mask.to_bytes());
    let out: Vec<u8> = old
        .iter()
        .zip(&key)
        .zip(&mask)
        .map(|((o, k), m)| k | (o & !m))
        .collect();
    P::from_payload(&out).unwrap_or_default()
}

fn read_ipv4(r: &mut Reader<'_>) -> Result<Ipv4Addr, LengthError> {
    r.read_array::<4>().map(Ipv4Addr::from)
}

fn read_ipv6(r: &mut Reader<'_>) -> Result<Ipv6Addr, LengthError> {
    r.read_array::<16>().map(Ipv6Addr::from)
}

fn read_mac(r: &mut Reader<'_>) -> Result<Mac, LengthError> {
    r.read_array::<6>().map(Mac)
}

/// Ethernet addresses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyEthernet {
    /// source
    pub src: Mac,
    /// destination
    pub dst: Mac,
}

impl KeyPayload for KeyEthernet {
    const LEN: usize = 12;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src.0);
        out.extend_from_slice(&self.dst.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        Ok(KeyEthernet {
            src: read_mac(r)?,
            dst: read_mac(r)?,
        })
    }
}

/// Odp encoding of the fragment class.
pub mod frag {
    /// Not a fragment.
    pub const NONE: u8 = 0;
    /// First fragment.
    pub const FIRST: u8 = 1;
    /// Later fragment.
    pub const LATER: u8 = 2;
}

/// IPv4 header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct KeyIpv4 {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub proto: u8,
    pub tos: u8,
    pub ttl: u8,
    /// One of the [`frag`] values (or a mask byte).
    pub frag: u8,
}

impl Default for KeyIpv4 {
    fn default() -> Self {
        KeyIpv4 {
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            proto: 0,
            tos: 0,
            ttl: 0,
            frag: 0,
        }
    }
}

impl KeyPayload for KeyIpv4 {
    const LEN: usize = 12;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src.octets());
        out.extend_from_slice(&self.dst.octets());
        out.extend_from_slice(&[self.proto, self.tos, self.ttl, self.frag]);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        let src = read_ipv4(r)?;
        let dst = read_ipv4(r)?;
        let [proto, tos, ttl, frag] = r.read_array()?;
        Ok(KeyIpv4 {
            src,
            dst,
            proto,
            tos,
            ttl,
            frag,
        })
    }
}

/// IPv6 header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct KeyIpv6 {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    /// Flow label, low 20 bits.
    pub label: u32,
    pub proto: u8,
    pub tclass: u8,
    pub hlimit: u8,
    pub frag: u8,
}

impl Default for KeyIpv6 {
    fn default() -> Self {
        KeyIpv6 {
            src: Ipv6Addr::UNSPECIFIED,
            dst: Ipv6Addr::UNSPECIFIED,
            label: 0,
            proto: 0,
            tclass: 0,
            hlimit: 0,
            frag: 0,
        }
    }
}

impl KeyPayload for KeyIpv6 {
    const LEN: usize = 40;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src.octets());
        out.extend_from_slice(&self.dst.octets());
        out.extend_from_slice(&self.label.to_be_bytes());
        out.extend_from_slice(&[self.proto, self.tclass, self.hlimit, self.frag]);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        let src = read_ipv6(r)?;
        let dst = read_ipv6(r)?;
        let label = r.read_be32()?;
        let [proto, tclass, hlimit, frag] = r.read_array()?;
        Ok(KeyIpv6 {
            src,
            dst,
            label,
            proto,
            tclass,
            hlimit,
            frag,
        })
    }
}

/// Transport ports (TCP, UDP and SCTP).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyPorts {
    /// source port
    pub src: u16,
    /// destination port
    pub dst: u16,
}

impl KeyPayload for KeyPorts {
    const LEN: usize = 4;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src.to_be_bytes());
        out.extend_from_slice(&self.dst.to_be_bytes());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        Ok(KeyPorts {
            src: r.read_be16()?,
            dst: r.read_be16()?,
        })
    }
}

/// Priority, mark and the other 32 bit metadata keys.
impl KeyPayload for u32 {
    const LEN: usize = 4;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        r.read_be32()
    }
}

/// ICMP type and code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyIcmp {
    /// type
    pub ty: u8,
    /// code
    pub code: u8,
}

impl KeyPayload for KeyIcmp {
    const LEN: usize = 2;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[self.ty, self.code]);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        let [ty, code] = r.read_array()?;
        Ok(KeyIcmp { ty, code })
    }
}

/// ARP fields.  The wire form ends with two bytes of padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct KeyArp {
    pub sip: Ipv4Addr,
    pub tip: Ipv4Addr,
    pub op: u16,
    pub sha: Mac,
    pub tha: Mac,
}

impl KeyArp {
    /// Bytes of the payload that carry fields.
    pub const FIELDS_LEN: usize = 22;
}

impl Default for KeyArp {
    fn default() -> Self {
        KeyArp {
            sip: Ipv4Addr::UNSPECIFIED,
            tip: Ipv4Addr::UNSPECIFIED,
            op: 0,
            sha: Mac::ZERO,
            tha: Mac::ZERO,
        }
    }
}

impl KeyPayload for KeyArp {
    const LEN: usize = 24;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sip.octets());
        out.extend_from_slice(&self.tip.octets());
        out.extend_from_slice(&self.op.to_be_bytes());
        out.extend_from_slice(&self.sha.0);
        out.extend_from_slice(&self.tha.0);
        out.extend_from_slice(&[0, 0]);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        let arp = KeyArp {
            sip: read_ipv4(r)?,
            tip: read_ipv4(r)?,
            op: r.read_be16()?,
            sha: read_mac(r)?,
            tha: read_mac(r)?,
        };
        r.skip(2)?;
        Ok(arp)
    }
}

/// Neighbor discovery fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyNd {
    /// target address
    pub target: Ipv6Addr,
    /// source link layer address option
    pub sll: Mac,
    /// target link layer address option
    pub tll: Mac,
}

impl Default for KeyNd {
    fn default() -> Self {
        KeyNd {
            target: Ipv6Addr::UNSPECIFIED,
            sll: Mac::ZERO,
            tll: Mac::ZERO,
        }
    }
}

impl KeyPayload for KeyNd {
    const LEN: usize = 28;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.target.octets());
        out.extend_from_slice(&self.sll.0);
        out.extend_from_slice(&self.tll.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, LengthError> {
        Ok(KeyNd {
            target: read_ipv6(r)?,
            sll: read_mac(r)?,
            tll: read_mac(r)?,
        })
    }
}
