// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-place header rewrites.
//!
//! Every rewrite is a silent no-op when the packet lacks the header it targets.
//! Structural changes (push / pop) report buffer exhaustion, since that is the only way they
//! can fail.

use crate::buffer::{PacketBufferMut, Splice, SpliceError};
use crate::checksum::{crc32c, recalc_csum16, recalc_csum32, recalc_csum128};
use crate::eth::Eth;
use crate::eth::ethtype::EthType;
use crate::eth::mac::Mac;
use crate::ip::{IPPROTO_ICMPV6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP, ipv4, ipv6, l4};
use crate::mpls::Lse;
use crate::packet::{BaseLayer, Packet};
use crate::vlan::Tci;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::trace;

/// The rewritable fields of an IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Fields {
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
    /// Type of service.
    pub tos: u8,
    /// Time to live.
    pub ttl: u8,
}

/// The rewritable fields of an IPv6 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Fields {
    /// Source address.
    pub src: Ipv6Addr,
    /// Destination address.
    pub dst: Ipv6Addr,
    /// Traffic class.
    pub tclass: u8,
    /// Flow label (20 bits).
    pub label: u32,
    /// Hop limit.
    pub hlimit: u8,
}

/// The fields of an Ethernet / IPv4 ARP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpFields {
    /// Operation.
    pub op: u16,
    /// Sender hardware address.
    pub sha: Mac,
    /// Sender protocol address.
    pub spa: Ipv4Addr,
    /// Target hardware address.
    pub tha: Mac,
    /// Target protocol address.
    pub tpa: Ipv4Addr,
}

const ARP_LEN: usize = 28;

#[derive(Debug, Clone, Copy)]
enum L4Csum {
    /// Checksum at this offset, always maintained.
    Always(usize),
    /// UDP checksum at this offset, where zero means "no checksum".
    Udp(usize),
}

fn get<const N: usize>(data: &[u8], off: usize) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(&data[off..off + N]);
    out
}

fn be16(data: &[u8], off: usize) -> u16 {
    u16::from_be_bytes(get(data, off))
}

fn be32(data: &[u8], off: usize) -> u32 {
    u32::from_be_bytes(get(data, off))
}

fn put(data: &mut [u8], off: usize, bytes: &[u8]) {
    data[off..off + bytes.len()].copy_from_slice(bytes);
}

fn update_l4_csum(data: &mut [u8], csum: Option<L4Csum>, f: impl FnOnce(u16) -> u16) {
    match csum {
        Some(L4Csum::Always(off)) => {
            let new = f(be16(data, off));
            put(data, off, &new.to_be_bytes());
        }
        Some(L4Csum::Udp(off)) => {
            let old = be16(data, off);
            if old != 0 {
                let new = match f(old) {
                    0 => 0xffff,
                    new => new,
                };
                put(data, off, &new.to_be_bytes());
            }
        }
        None => {}
    }
}

impl<Buf: PacketBufferMut> Packet<Buf> {
    /// Offset of the network header if it is of type `ty` and at least `len` bytes long.
    fn l3_offset(&self, ty: EthType, len: usize) -> Option<usize> {
        let l3 = self.layers.l3?;
        (self.layers.dl_type == ty && self.data().len() >= l3 + len).then_some(l3)
    }

    /// Offset of the transport header if it is `proto` and at least `len` bytes long.
    fn l4_offset(&self, proto: u8, len: usize) -> Option<usize> {
        let l4 = self.layers.l4?;
        (self.layers.nw_proto == proto && self.data().len() >= l4 + len).then_some(l4)
    }

    fn l4_csum(&self, proto: u8) -> Option<L4Csum> {
        let l4 = self.layers.l4?;
        let avail = self.data().len().checked_sub(l4)?;
        match proto {
            IPPROTO_TCP if avail >= l4::TCP_HEADER_LEN => {
                Some(L4Csum::Always(l4 + l4::TCP_CSUM_OFFSET))
            }
            IPPROTO_UDP if avail >= l4::UDP_HEADER_LEN => Some(L4Csum::Udp(l4 + l4::UDP_CSUM_OFFSET)),
            IPPROTO_ICMPV6 if avail >= l4::ICMP_HEADER_LEN => {
                Some(L4Csum::Always(l4 + l4::ICMPV6_CSUM_OFFSET))
            }
            _ => None,
        }
    }

    /// The Ethernet source and destination addresses.
    #[must_use]
    pub fn eth_addrs(&self) -> Option<(Mac, Mac)> {
        let eth = self.eth()?;
        Some((
            Mac(get(eth, Eth::SRC_OFFSET)),
            Mac(get(eth, Eth::DST_OFFSET)),
        ))
    }

    /// Rewrite the Ethernet addresses.
    pub fn set_eth_addrs(&mut self, src: Mac, dst: Mac) {
        if self.eth().is_none() {
            return;
        }
        let data = self.buf.as_mut();
        put(data, Eth::SRC_OFFSET, &src.0);
        put(data, Eth::DST_OFFSET, &dst.0);
    }

    /// Write the effective ethertype: after the VLAN tag if there is one, out of band for L3
    /// packets.
    fn set_ethertype(&mut self, ty: EthType) {
        match self.base_layer {
            BaseLayer::L3 => self.packet_type = ty,
            BaseLayer::L2 => {
                let off = self.layers.vlan.map_or(Eth::TYPE_OFFSET, |vlan| vlan + Tci::TAG_LEN);
                if self.data().len() >= off + 2 {
                    put(self.buf.as_mut(), off, &ty.to_be_bytes());
                }
            }
        }
    }

    /// Insert an 802.1Q tag right after the Ethernet addresses.
    ///
    /// The CFI bit of `tci` is cleared on the wire.
    ///
    /// # Errors
    ///
    /// Fails if the buffer has no room for the tag.
    pub fn push_vlan(&mut self, tpid: EthType, tci: Tci) -> Result<(), SpliceError> {
        if self.eth().is_none() {
            return Ok(());
        }
        let tag = self.buf.insert_gap(Eth::TYPE_OFFSET, 4)?;
        tag[..2].copy_from_slice(&tpid.to_be_bytes());
        tag[2..].copy_from_slice(&(tci.0 & !Tci::CFI).to_be_bytes());
        self.reparse();
        Ok(())
    }

    /// Remove the outermost 802.1Q / 802.1ad tag, if any.
    ///
    /// # Errors
    ///
    /// Fails if the buffer cannot be shrunk.
    pub fn pop_vlan(&mut self) -> Result<(), SpliceError> {
        let Some(eth) = self.eth() else {
            return Ok(());
        };
        if self.data().len() < Eth::HEADER_LEN + Tci::TAG_LEN
            || !EthType::new(be16(eth, Eth::TYPE_OFFSET)).is_vlan()
        {
            return Ok(());
        }
        self.buf.remove_range(Eth::TYPE_OFFSET, 4)?;
        self.reparse();
        Ok(())
    }

    /// The outermost MPLS label stack entry.
    #[must_use]
    pub fn mpls_top(&self) -> Option<Lse> {
        self.mpls_stack().next()
    }

    /// Push an MPLS label stack entry and set the ethertype to `ethertype`.
    ///
    /// Non-MPLS ethertypes are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the buffer has no room for the label.
    pub fn push_mpls(&mut self, ethertype: EthType, lse: Lse) -> Result<(), SpliceError> {
        if !ethertype.is_mpls() {
            return Ok(());
        }
        let Some(at) = self.layers.l2_5.or(self.layers.l3) else {
            return Ok(());
        };
        self.set_ethertype(ethertype);
        let label = self.buf.insert_gap(at, 4)?;
        label.copy_from_slice(&lse.to_be_bytes());
        self.reparse();
        Ok(())
    }

    /// Pop the outermost MPLS label and set the ethertype to `ethertype`.
    ///
    /// # Errors
    ///
    /// Fails if the buffer cannot be shrunk.
    pub fn pop_mpls(&mut self, ethertype: EthType) -> Result<(), SpliceError> {
        let Some(at) = self.layers.l2_5 else {
            return Ok(());
        };
        if self.data().len() < at + Lse::LEN {
            return Ok(());
        }
        self.set_ethertype(ethertype);
        self.buf.remove_range(at, 4)?;
        self.reparse();
        Ok(())
    }

    /// Overwrite the outermost MPLS label stack entry.
    pub fn set_mpls_lse(&mut self, lse: Lse) {
        if let Some(at) = self.layers.l2_5 {
            if self.data().len() >= at + Lse::LEN {
                put(self.buf.as_mut(), at, &lse.to_be_bytes());
            }
        }
    }

    /// Prepend an Ethernet header.  The packet becomes an Ethernet frame.
    ///
    /// # Errors
    ///
    /// Fails if the buffer has no room for the header.
    pub fn push_eth(&mut self, dst: Mac, src: Mac, ethertype: EthType) -> Result<(), SpliceError> {
        #[allow(clippy::cast_possible_truncation)] // constant 14
        let eth = self.buf.insert_gap(0, Eth::HEADER_LEN as u16)?;
        eth[Eth::DST_OFFSET..Eth::SRC_OFFSET].copy_from_slice(&dst.0);
        eth[Eth::SRC_OFFSET..Eth::TYPE_OFFSET].copy_from_slice(&src.0);
        eth[Eth::TYPE_OFFSET..].copy_from_slice(&ethertype.to_be_bytes());
        self.base_layer = BaseLayer::L2;
        self.packet_type = EthType::ZERO;
        self.reparse();
        Ok(())
    }

    /// Strip the Ethernet header (including a VLAN tag).  The packet becomes an L3 packet whose
    /// out of band ethertype is the former effective ethertype.
    ///
    /// # Errors
    ///
    /// Fails if the buffer cannot be shrunk.
    pub fn pop_eth(&mut self) -> Result<(), SpliceError> {
        if self.eth().is_none() {
            return Ok(());
        }
        let end = self
            .layers
            .l2_5
            .or(self.layers.l3)
            .unwrap_or(Eth::HEADER_LEN);
        let Ok(len) = u16::try_from(end) else {
            return Ok(());
        };
        self.buf.remove_range(0, len)?;
        self.packet_type = self.layers.dl_type;
        self.base_layer = BaseLayer::L3;
        self.reparse();
        trace!("popped {end} bytes of l2 header");
        Ok(())
    }

    /// The rewritable IPv4 fields.
    #[must_use]
    pub fn ipv4_fields(&self) -> Option<Ipv4Fields> {
        let l3 = self.l3_offset(EthType::IPV4, ipv4::HEADER_LEN)?;
        let data = self.data();
        Some(Ipv4Fields {
            src: Ipv4Addr::from(be32(data, l3 + ipv4::SRC_OFFSET)),
            dst: Ipv4Addr::from(be32(data, l3 + ipv4::DST_OFFSET)),
            tos: data[l3 + ipv4::TOS_OFFSET],
            ttl: data[l3 + ipv4::TTL_OFFSET],
        })
    }

    /// Rewrite the IPv4 header, fixing the header checksum and the TCP / UDP pseudo header
    /// checksum.
    pub fn set_ipv4(&mut self, src: Ipv4Addr, dst: Ipv4Addr, tos: u8, ttl: u8) {
        let Some(l3) = self.l3_offset(EthType::IPV4, ipv4::HEADER_LEN) else {
            return;
        };
        let l4csum = self.l4_csum(self.layers.nw_proto);
        let data = self.buf.as_mut();
        let mut ip_csum = be16(data, l3 + ipv4::CSUM_OFFSET);
        for (off, new) in [(ipv4::SRC_OFFSET, src), (ipv4::DST_OFFSET, dst)] {
            let old = be32(data, l3 + off);
            let new = u32::from(new);
            if old != new {
                update_l4_csum(data, l4csum, |c| recalc_csum32(c, old, new));
                ip_csum = recalc_csum32(ip_csum, old, new);
                put(data, l3 + off, &new.to_be_bytes());
            }
        }
        let old_tos = data[l3 + ipv4::TOS_OFFSET];
        if old_tos != tos {
            ip_csum = recalc_csum16(ip_csum, u16::from(old_tos), u16::from(tos));
            data[l3 + ipv4::TOS_OFFSET] = tos;
        }
        let old_ttl = data[l3 + ipv4::TTL_OFFSET];
        if old_ttl != ttl {
            ip_csum = recalc_csum16(ip_csum, u16::from(old_ttl) << 8, u16::from(ttl) << 8);
            data[l3 + ipv4::TTL_OFFSET] = ttl;
        }
        put(data, l3 + ipv4::CSUM_OFFSET, &ip_csum.to_be_bytes());
    }

    /// The rewritable IPv6 fields.
    #[must_use]
    pub fn ipv6_fields(&self) -> Option<Ipv6Fields> {
        let l3 = self.l3_offset(EthType::IPV6, ipv6::HEADER_LEN)?;
        let data = self.data();
        let word = be32(data, l3);
        #[allow(clippy::cast_possible_truncation)] // 8 bits
        let tclass = (word >> 20) as u8;
        Some(Ipv6Fields {
            src: Ipv6Addr::from(get::<16>(data, l3 + ipv6::SRC_OFFSET)),
            dst: Ipv6Addr::from(get::<16>(data, l3 + ipv6::DST_OFFSET)),
            tclass,
            label: word & ipv6::LABEL_MASK,
            hlimit: data[l3 + ipv6::HOP_LIMIT_OFFSET],
        })
    }

    /// Rewrite the IPv6 header, fixing the L4 checksum of `proto` (TCP, UDP or ICMPv6).
    ///
    /// The destination address does not take part in the checksum update when a routing
    /// header is present, since the final destination is elsewhere.
    pub fn set_ipv6(
        &mut self,
        proto: u8,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        tclass: u8,
        label: u32,
        hlimit: u8,
    ) {
        let Some(l3) = self.l3_offset(EthType::IPV6, ipv6::HEADER_LEN) else {
            return;
        };
        let l4csum = self.l4_csum(proto);
        let routing = self.layers.ipv6_routing;
        let data = self.buf.as_mut();
        for (off, new, fix_csum) in [
            (ipv6::SRC_OFFSET, src, true),
            (ipv6::DST_OFFSET, dst, !routing),
        ] {
            let old: [u8; 16] = get(data, l3 + off);
            let new = new.octets();
            if old != new {
                if fix_csum {
                    update_l4_csum(data, l4csum, |c| recalc_csum128(c, &old, &new));
                }
                put(data, l3 + off, &new);
            }
        }
        let mut word = be32(data, l3);
        word = (word & !0x0ff0_0000) | (u32::from(tclass) << 20);
        word = (word & !ipv6::LABEL_MASK) | (label & ipv6::LABEL_MASK);
        put(data, l3, &word.to_be_bytes());
        data[l3 + ipv6::HOP_LIMIT_OFFSET] = hlimit;
    }

    /// The transport source and destination ports (TCP, UDP or SCTP).
    #[must_use]
    pub fn ports(&self) -> Option<(u16, u16)> {
        let l4 = self.l4_offset(self.layers.nw_proto, 4)?;
        if !super::has_ports(self.layers.nw_proto) {
            return None;
        }
        Some((be16(self.data(), l4), be16(self.data(), l4 + 2)))
    }

    /// Rewrite the TCP ports, fixing the checksum.
    pub fn set_tcp_ports(&mut self, src: u16, dst: u16) {
        let Some(l4) = self.l4_offset(IPPROTO_TCP, l4::TCP_HEADER_LEN) else {
            return;
        };
        self.set_ports(l4, src, dst, Some(L4Csum::Always(l4 + l4::TCP_CSUM_OFFSET)));
    }

    /// Rewrite the UDP ports, fixing the checksum unless it is zero.
    pub fn set_udp_ports(&mut self, src: u16, dst: u16) {
        let Some(l4) = self.l4_offset(IPPROTO_UDP, l4::UDP_HEADER_LEN) else {
            return;
        };
        self.set_ports(l4, src, dst, Some(L4Csum::Udp(l4 + l4::UDP_CSUM_OFFSET)));
    }

    fn set_ports(&mut self, l4: usize, src: u16, dst: u16, csum: Option<L4Csum>) {
        let data = self.buf.as_mut();
        for (off, new) in [(l4, src), (l4 + 2, dst)] {
            let old = be16(data, off);
            if old != new {
                update_l4_csum(data, csum, |c| recalc_csum16(c, old, new));
                put(data, off, &new.to_be_bytes());
            }
        }
    }

    /// Rewrite the SCTP ports.
    ///
    /// The CRC32c is recomputed such that a packet which arrived with a bad checksum keeps a
    /// bad checksum.
    pub fn set_sctp_ports(&mut self, src: u16, dst: u16) {
        let Some(l4) = self.l4_offset(IPPROTO_SCTP, l4::SCTP_HEADER_LEN) else {
            return;
        };
        let csum_off = l4 + l4::SCTP_CSUM_OFFSET;
        let data = self.buf.as_mut();
        let old_csum = u32::from_le_bytes(get(data, csum_off));
        put(data, csum_off, &[0; 4]);
        let old_correct = crc32c(&data[l4..]);
        put(data, l4, &src.to_be_bytes());
        put(data, l4 + 2, &dst.to_be_bytes());
        let new_correct = crc32c(&data[l4..]);
        put(data, csum_off, &(old_csum ^ old_correct ^ new_correct).to_le_bytes());
    }

    /// The ARP header fields.
    #[must_use]
    pub fn arp_fields(&self) -> Option<ArpFields> {
        let l3 = self
            .l3_offset(EthType::ARP, ARP_LEN)
            .or_else(|| self.l3_offset(EthType::RARP, ARP_LEN))?;
        let data = self.data();
        Some(ArpFields {
            op: be16(data, l3 + 6),
            sha: Mac(get(data, l3 + 8)),
            spa: Ipv4Addr::from(be32(data, l3 + 14)),
            tha: Mac(get(data, l3 + 18)),
            tpa: Ipv4Addr::from(be32(data, l3 + 24)),
        })
    }

    /// Rewrite the ARP header.
    pub fn set_arp(&mut self, fields: &ArpFields) {
        let Some(l3) = self
            .l3_offset(EthType::ARP, ARP_LEN)
            .or_else(|| self.l3_offset(EthType::RARP, ARP_LEN))
        else {
            return;
        };
        let data = self.buf.as_mut();
        put(data, l3 + 6, &fields.op.to_be_bytes());
        put(data, l3 + 8, &fields.sha.0);
        put(data, l3 + 14, &fields.spa.octets());
        put(data, l3 + 18, &fields.tha.0);
        put(data, l3 + 24, &fields.tpa.octets());
    }
}
