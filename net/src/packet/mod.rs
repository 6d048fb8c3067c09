// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet struct and methods

mod mutate;

pub use mutate::{ArpFields, Ipv4Fields, Ipv6Fields};

#[cfg(any(doc, test, feature = "test_buffer"))]
pub mod test_utils;

use crate::buffer::PacketBufferMut;
use crate::eth::Eth;
use crate::eth::ethtype::EthType;
use crate::ip::{IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP, ipv4, ipv6};
use crate::mpls::Lse;
use crate::parse::{LengthError, Reader};
use crate::vlan::Tci;
use tracing::trace;

/// The outermost header of a frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseLayer {
    /// The frame starts with an Ethernet header.
    #[default]
    L2,
    /// The frame starts with a network layer header; its ethertype is carried out of band.
    L3,
}

/// Fragmentation state of an IP packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fragment {
    /// Not a fragment.
    #[default]
    No,
    /// The fragment at offset zero.
    First,
    /// Any fragment after the first.
    Later,
}

/// Byte offsets of the layers found in a frame, plus the protocol selectors that led there.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
    /// Offset of the (single) 802.1Q tag, i.e. of its TPID.
    pub vlan: Option<usize>,
    /// Offset of the outermost MPLS label stack entry.
    pub l2_5: Option<usize>,
    /// Offset of the network header.
    pub l3: Option<usize>,
    /// Offset of the transport header.
    pub l4: Option<usize>,
    /// Effective ethertype (after any VLAN tag), [`EthType::NONE`] for 802.3 frames.
    pub dl_type: EthType,
    /// IP protocol of the transport header (after IPv6 extension headers).
    pub nw_proto: u8,
    /// IP fragmentation state.
    pub frag: Fragment,
    /// True if an IPv6 routing header precedes the transport header.
    pub ipv6_routing: bool,
}

/// A frame together with the offsets of its layers.
///
/// Offsets are recomputed from the frame contents after every structural change, so they never
/// go stale.
#[derive(Debug, Clone)]
pub struct Packet<Buf: PacketBufferMut> {
    buf: Buf,
    base_layer: BaseLayer,
    packet_type: EthType,
    layers: Layers,
}

const LLC_SNAP: [u8; 6] = [0xaa, 0xaa, 0x03, 0x00, 0x00, 0x00];

impl<Buf: PacketBufferMut> Packet<Buf> {
    /// Wrap an Ethernet frame.
    #[must_use]
    pub fn new(buf: Buf) -> Packet<Buf> {
        let mut packet = Packet {
            buf,
            base_layer: BaseLayer::L2,
            packet_type: EthType::ZERO,
            layers: Layers::default(),
        };
        packet.reparse();
        packet
    }

    /// Wrap a frame which starts at the network header, with the given ethertype.
    #[must_use]
    pub fn new_l3(buf: Buf, packet_type: EthType) -> Packet<Buf> {
        let mut packet = Packet {
            buf,
            base_layer: BaseLayer::L3,
            packet_type,
            layers: Layers::default(),
        };
        packet.reparse();
        packet
    }

    /// The outermost header kind.
    #[must_use]
    pub fn base_layer(&self) -> BaseLayer {
        self.base_layer
    }

    /// The out of band ethertype of an L3 packet ([`EthType::ZERO`] for Ethernet frames).
    #[must_use]
    pub fn packet_type(&self) -> EthType {
        self.packet_type
    }

    /// The offsets found by the last parse.
    #[must_use]
    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    /// The frame bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.buf.as_ref()
    }

    /// The underlying buffer.
    #[must_use]
    pub fn buf(&self) -> &Buf {
        &self.buf
    }

    /// Give the buffer back.
    #[must_use]
    pub fn into_buf(self) -> Buf {
        self.buf
    }

    /// The bytes from the network header on.
    #[must_use]
    pub fn l3(&self) -> Option<&[u8]> {
        self.data().get(self.layers.l3?..)
    }

    /// The bytes from the transport header on.
    #[must_use]
    pub fn l4(&self) -> Option<&[u8]> {
        self.data().get(self.layers.l4?..)
    }

    /// The Ethernet header, if the frame has one.
    #[must_use]
    pub fn eth(&self) -> Option<&[u8]> {
        match self.base_layer {
            BaseLayer::L2 => self.data().get(..Eth::HEADER_LEN),
            BaseLayer::L3 => None,
        }
    }

    /// The tag control information of the VLAN tag, if any.
    #[must_use]
    pub fn vlan_tci(&self) -> Option<Tci> {
        let off = self.layers.vlan? + 2;
        let bytes = self.data().get(off..off + 2)?;
        Some(Tci(u16::from_be_bytes([bytes[0], bytes[1]])))
    }

    /// The MPLS label stack, outermost first, up to and including the bottom of stack entry.
    pub fn mpls_stack(&self) -> impl Iterator<Item = Lse> + '_ {
        let start = self.layers.l2_5.unwrap_or(0);
        let end = match self.layers.l2_5 {
            Some(_) => self.layers.l3.unwrap_or(start),
            None => start,
        };
        self.data()
            .get(start..end)
            .unwrap_or_default()
            .chunks_exact(Lse::LEN)
            .map(|c| Lse::from_be_bytes([c[0], c[1], c[2], c[3]]))
    }

    /// True if the packet carries an MPLS label stack.
    #[must_use]
    pub fn is_mpls(&self) -> bool {
        self.layers.l2_5.is_some()
    }

    /// Recompute all offsets from the frame contents.
    pub fn reparse(&mut self) {
        self.layers = parse_layers(self.buf.as_ref(), self.base_layer, self.packet_type)
            .unwrap_or_else(|partial| partial);
        trace!("parsed layers: {:?}", self.layers);
    }
}

/// Walk a frame and record where its layers are.
///
/// On a truncated header the layers found so far are returned in the `Err` variant.
fn parse_layers(data: &[u8], base: BaseLayer, packet_type: EthType) -> Result<Layers, Layers> {
    let mut layers = Layers::default();
    let mut reader = Reader::new(data);

    match base {
        BaseLayer::L2 => {
            guard(reader.skip(Eth::ADDRS_LEN), &layers)?;
            let mut dl_type = read_type(&mut reader, &layers)?;
            if dl_type == EthType::VLAN {
                layers.vlan = Some(Eth::TYPE_OFFSET);
                guard(reader.skip(2), &layers)?;
                dl_type = read_type(&mut reader, &layers)?;
            }
            if !dl_type.is_ethernet_ii() {
                let snap: Option<[u8; 6]> = reader.read_array().ok();
                dl_type = match snap {
                    Some(LLC_SNAP) => {
                        let inner = read_type(&mut reader, &layers)?;
                        if inner.is_ethernet_ii() { inner } else { EthType::NONE }
                    }
                    _ => EthType::NONE,
                };
                if dl_type == EthType::NONE {
                    layers.dl_type = dl_type;
                    return Ok(layers);
                }
            }
            layers.dl_type = dl_type;
        }
        BaseLayer::L3 => layers.dl_type = packet_type,
    }

    if layers.dl_type.is_mpls() {
        layers.l2_5 = Some(reader.position());
        loop {
            let lse = Lse(reader.read_be32().map_err(|_| layers)?);
            if lse.bos() {
                break;
            }
        }
        layers.l3 = Some(reader.position());
        return Ok(layers);
    }

    let l3 = reader.position();
    layers.l3 = Some(l3);
    match layers.dl_type {
        EthType::IPV4 => parse_ipv4(&data[l3..], l3, &mut layers),
        EthType::IPV6 => parse_ipv6(&data[l3..], l3, &mut layers),
        _ => {}
    }
    Ok(layers)
}

fn guard(res: Result<(), LengthError>, layers: &Layers) -> Result<(), Layers> {
    res.map_err(|_| *layers)
}

fn read_type(reader: &mut Reader<'_>, layers: &Layers) -> Result<EthType, Layers> {
    reader.read_be16().map(EthType::new).map_err(|_| *layers)
}

fn parse_ipv4(ip: &[u8], l3: usize, layers: &mut Layers) {
    let mut reader = Reader::new(ip);
    let Ok(ver_ihl) = reader.read_u8() else {
        return;
    };
    let ihl = usize::from(ver_ihl & 0x0f) * 4;
    if ver_ihl >> 4 != 4 || ihl < ipv4::HEADER_LEN || ip.len() < ihl {
        return;
    }
    let frag = u16::from_be_bytes([ip[ipv4::FRAG_OFFSET], ip[ipv4::FRAG_OFFSET + 1]]);
    layers.nw_proto = ip[ipv4::PROTO_OFFSET];
    if frag & (ipv4::MORE_FRAGMENTS | ipv4::FRAG_OFFSET_MASK) != 0 {
        if frag & ipv4::FRAG_OFFSET_MASK != 0 {
            layers.frag = Fragment::Later;
            return;
        }
        layers.frag = Fragment::First;
    }
    layers.l4 = Some(l3 + ihl);
}

fn parse_ipv6(ip: &[u8], l3: usize, layers: &mut Layers) {
    if ip.len() < ipv6::HEADER_LEN || ip[0] >> 4 != 6 {
        return;
    }
    let mut next = ip[ipv6::NEXT_HEADER_OFFSET];
    let mut reader = Reader::new(&ip[ipv6::HEADER_LEN..]);
    loop {
        let start = reader.position();
        let ext_len = match next {
            ipv6::HOP_BY_HOP | ipv6::ROUTING | ipv6::DEST_OPTIONS => {
                let Ok([_, len]) = reader.read_array::<2>() else {
                    return;
                };
                (usize::from(len) + 1) * 8
            }
            ipv6::AUTH => {
                let Ok([_, len]) = reader.read_array::<2>() else {
                    return;
                };
                (usize::from(len) + 2) * 4
            }
            ipv6::FRAGMENT => {
                let Ok([_, _, hi, lo]) = reader.read_array::<4>() else {
                    return;
                };
                let offset = u16::from_be_bytes([hi, lo]) & 0xfff8;
                layers.frag = if offset == 0 {
                    Fragment::First
                } else {
                    Fragment::Later
                };
                8
            }
            _ => break,
        };
        if next == ipv6::ROUTING {
            layers.ipv6_routing = true;
        }
        let header_next = ip[ipv6::HEADER_LEN + start];
        if reader.skip(ext_len - (reader.position() - start)).is_err() {
            return;
        }
        next = header_next;
        if layers.frag == Fragment::Later {
            layers.nw_proto = next;
            return;
        }
    }
    layers.nw_proto = next;
    layers.l4 = Some(l3 + ipv6::HEADER_LEN + reader.position());
}

/// True if `proto` is a transport protocol whose ports this crate can rewrite.
#[must_use]
pub fn has_ports(proto: u8) -> bool {
    matches!(proto, IPPROTO_TCP | IPPROTO_UDP | IPPROTO_SCTP)
}

/// True if `proto` is ICMP for either IP version.
#[must_use]
pub fn is_icmp_any(proto: u8) -> bool {
    matches!(proto, IPPROTO_ICMP | IPPROTO_ICMPV6)
}
