// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Text form of keys and masks.
//!
//! Every attribute prints as `name(fields)`.  A field whose mask is all zeros is left out unless
//! the output is verbose, and a partially masked field prints as `value/mask`.

use crate::attr::{Attr, AttrWriter, Attrs, attr_find};
use crate::flow::{FlowTnl, TcpFlags, TnlFlags};
use crate::key::exact::{is_all_zeros, odp_mask_attr_is_exact};
use crate::key::tunnel::odp_tun_key_from_attr;
use crate::key::{
    AttrLen, KeyArp, KeyEthernet, KeyIcmp, KeyIpv4, KeyIpv6, KeyNd, KeyPayload, KeyPorts,
    OvsKeyAttr, frag, odp_flow_key_attr_len, ovs_key_attr_to_string,
};
use crate::text::{chomp, format_flags, format_flags_masked, push_hex, push_hex_spaced};
use net::eth::mac::Mac;
use net::ip::ipv6::LABEL_MASK;
use net::mpls::Lse;
use net::vlan::Tci;
use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A field value with its text form, as a key and as a mask.
trait Field: Copy {
    fn is_wildcard(self) -> bool;
    fn is_exact(self) -> bool;
    fn write_key(self, out: &mut String);
    fn write_mask(self, out: &mut String) {
        self.write_key(out);
    }
}

/// Decimal `u8`.
#[derive(Clone, Copy)]
struct Dec8(u8);
/// Hexadecimal `u8`.
#[derive(Clone, Copy)]
struct Hex8(u8);
/// Decimal `u16` (ports, ARP opcode).
#[derive(Clone, Copy)]
struct Dec16(u16);
/// Hexadecimal `u64` (tunnel id).
#[derive(Clone, Copy)]
struct Hex64(u64);
/// IPv6 flow label.
#[derive(Clone, Copy)]
struct Label(u32);

impl Field for Dec8 {
    fn is_wildcard(self) -> bool {
        self.0 == 0
    }
    fn is_exact(self) -> bool {
        self.0 == u8::MAX
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{}", self.0);
    }
    fn write_mask(self, out: &mut String) {
        let _ = write!(out, "{:#x}", self.0);
    }
}

impl Field for Hex8 {
    fn is_wildcard(self) -> bool {
        self.0 == 0
    }
    fn is_exact(self) -> bool {
        self.0 == u8::MAX
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{:#x}", self.0);
    }
}

impl Field for Dec16 {
    fn is_wildcard(self) -> bool {
        self.0 == 0
    }
    fn is_exact(self) -> bool {
        self.0 == u16::MAX
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{}", self.0);
    }
    fn write_mask(self, out: &mut String) {
        let _ = write!(out, "{:#x}", self.0);
    }
}

impl Field for Hex64 {
    fn is_wildcard(self) -> bool {
        self.0 == 0
    }
    fn is_exact(self) -> bool {
        self.0 == u64::MAX
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{:#x}", self.0);
    }
}

impl Field for Label {
    fn is_wildcard(self) -> bool {
        self.0 == 0
    }
    fn is_exact(self) -> bool {
        self.0 & LABEL_MASK == LABEL_MASK
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{:#x}", self.0);
    }
}

impl Field for Ipv4Addr {
    fn is_wildcard(self) -> bool {
        self.is_unspecified()
    }
    fn is_exact(self) -> bool {
        self.is_broadcast()
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{self}");
    }
}

impl Field for Ipv6Addr {
    fn is_wildcard(self) -> bool {
        self.is_unspecified()
    }
    fn is_exact(self) -> bool {
        self.to_bits() == u128::MAX
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{self}");
    }
}

impl Field for Mac {
    fn is_wildcard(self) -> bool {
        self.is_zero()
    }
    fn is_exact(self) -> bool {
        self.is_broadcast()
    }
    fn write_key(self, out: &mut String) {
        let _ = write!(out, "{self}");
    }
}

fn frag_name(value: u8) -> &'static str {
    match value {
        frag::NONE => "no",
        frag::FIRST => "first",
        frag::LATER => "later",
        _ => "<error>",
    }
}

/// Writes the `name=value` list of one attribute.  A `None` mask means "exact".
struct Fields<'a> {
    out: &'a mut String,
    verbose: bool,
}

impl Fields<'_> {
    fn field<F: Field>(&mut self, name: &str, key: F, mask: Option<F>) {
        if !self.verbose && mask.is_some_and(F::is_wildcard) {
            return;
        }
        self.out.push_str(name);
        self.out.push('=');
        key.write_key(self.out);
        if let Some(mask) = mask.filter(|m| !m.is_exact()) {
            self.out.push('/');
            mask.write_mask(self.out);
        }
        self.out.push(',');
    }

    /// The fragment class is an enumeration, so only an empty or a full mask makes sense.
    fn frag(&mut self, key: u8, mask: Option<u8>) {
        if !self.verbose && mask == Some(0) {
            return;
        }
        match mask {
            Some(mask) if mask != u8::MAX => {
                let _ = write!(self.out, "error: partial mask not supported for frag ({mask:#x}),");
            }
            _ => {
                let _ = write!(self.out, "frag={},", frag_name(key));
            }
        }
    }

    fn tun_flags(&mut self, key: TnlFlags, mask: Option<TnlFlags>) {
        if !self.verbose && mask.is_some_and(|m| m.is_empty()) {
            return;
        }
        self.out.push_str("flags(");
        match mask.filter(|m| !m.contains(TnlFlags::all())) {
            Some(mask) => format_flags_masked(
                self.out,
                TnlFlags::bit_name,
                u32::from(key.bits()),
                u32::from(mask.bits()),
            ),
            None => format_flags(self.out, TnlFlags::bit_name, u32::from(key.bits()), ','),
        }
        self.out.push_str("),");
    }

    fn finish(self) {
        chomp(self.out, ',');
    }
}

fn payloads<P: KeyPayload>(a: &Attr<'_>, ma: Option<&Attr<'_>>) -> (P, Option<P>) {
    (
        P::from_payload(a.payload()).unwrap_or_default(),
        ma.map(|m| P::from_payload(m.payload()).unwrap_or_default()),
    )
}

fn be16_of(a: &Attr<'_>) -> u16 {
    a.get_be16().unwrap_or_default()
}

fn be32_of(a: &Attr<'_>) -> u32 {
    a.get_be32().unwrap_or_default()
}

fn format_tunnel(out: &mut String, a: &Attr<'_>, ma: Option<&Attr<'_>>, verbose: bool) {
    let (key, fitness) = odp_tun_key_from_attr(a);
    if fitness == crate::Fitness::Error {
        out.push_str("error");
        return;
    }
    let mask: Option<FlowTnl> = ma.map(|m| odp_tun_key_from_attr(m).0);
    let mask = mask.as_ref();
    let mut f = Fields { out, verbose };
    f.field("tun_id", Hex64(key.tun_id), mask.map(|m| Hex64(m.tun_id)));
    f.field("src", key.ip_src, mask.map(|m| m.ip_src));
    f.field("dst", key.ip_dst, mask.map(|m| m.ip_dst));
    f.field("tos", Hex8(key.ip_tos), mask.map(|m| Hex8(m.ip_tos)));
    f.field("ttl", Dec8(key.ip_ttl), mask.map(|m| Dec8(m.ip_ttl)));
    f.field("tp_src", Dec16(key.tp_src), mask.map(|m| Dec16(m.tp_src)));
    f.field("tp_dst", Dec16(key.tp_dst), mask.map(|m| Dec16(m.tp_dst)));
    f.tun_flags(key.flags, mask.map(|m| m.flags));
    if !key.geneve.is_empty() {
        f.out.push_str("geneve(");
        push_hex(f.out, &key.geneve);
        f.out.push_str("),");
    }
    f.finish();
}

pub(crate) fn format_vlan_tci(out: &mut String, tci: Tci, mask: Tci, verbose: bool) {
    if verbose || tci.vid() != 0 || mask.vid() != 0 {
        let _ = write!(out, "vid={}", tci.vid());
        if mask.vid() != Tci::VID_MASK {
            let _ = write!(out, "/{:#x}", mask.vid());
        }
        out.push(',');
    }
    if verbose || tci.pcp() != 0 || mask.pcp() != 0 {
        let _ = write!(out, "pcp={}", tci.pcp());
        if mask.pcp() != Tci::EXACT.pcp() {
            let _ = write!(out, "/{:#x}", mask.pcp());
        }
        out.push(',');
    }
    if !tci.cfi() {
        out.push_str("cfi=0,");
    }
    chomp(out, ',');
}

fn lse_stack(payload: &[u8]) -> Vec<Lse> {
    payload
        .chunks_exact(Lse::LEN)
        .map(|c| Lse::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn format_mpls(out: &mut String, a: &Attr<'_>, ma: Option<&Attr<'_>>) {
    if a.is_empty() || a.len() % Lse::LEN != 0 {
        let _ = write!(out, "bad key length {}", a.len());
        return;
    }
    if let Some(m) = ma.filter(|m| m.len() != a.len()) {
        let _ = write!(out, "key length {} != mask length {}", a.len(), m.len());
        return;
    }
    let key = lse_stack(a.payload());
    let mask = ma.map(|m| lse_stack(m.payload()));
    match (key.as_slice(), mask.as_deref()) {
        ([k], None) => {
            let _ = write!(
                out,
                "label={},tc={},ttl={},bos={}",
                k.label(),
                k.tc(),
                k.ttl(),
                u8::from(k.bos())
            );
        }
        ([k], Some([m])) => {
            let _ = write!(
                out,
                "label={}/{:#x},tc={}/{:#x},ttl={}/{:#x},bos={}/{:#x}",
                k.label(),
                m.label(),
                k.tc(),
                m.tc(),
                k.ttl(),
                m.ttl(),
                u8::from(k.bos()),
                u8::from(m.bos())
            );
        }
        _ => {
            for (i, k) in key.iter().enumerate() {
                let _ = write!(out, "lse{i}={:#x}", k.0);
                if let Some(m) = mask.as_ref().and_then(|m| m.get(i)) {
                    let _ = write!(out, "/{:#x}", m.0);
                }
                out.push(',');
            }
            chomp(out, ',');
        }
    }
}

fn format_bad_length(out: &mut String, a: &Attr<'_>, ma: Option<&Attr<'_>>, expected: usize) {
    if a.len() != expected {
        let _ = write!(out, "(bad key length {}, expected {expected})", a.len());
    }
    out.push('(');
    push_hex_spaced(out, a.payload());
    if let Some(m) = ma {
        out.push('/');
        if m.len() != expected {
            let _ = write!(out, "(bad mask length {}, expected {expected})", m.len());
        }
        push_hex_spaced(out, m.payload());
    }
    out.push(')');
}

/// Append the text form of key attribute `a`, masked by `ma` if given.
pub fn format_key_attr(out: &mut String, a: &Attr<'_>, ma: Option<&Attr<'_>>, verbose: bool) {
    let is_exact = ma.is_none_or(odp_mask_attr_is_exact);
    out.push_str(&ovs_key_attr_to_string(a.ty()));

    let kind = match odp_flow_key_attr_len(a.ty()) {
        AttrLen::Fixed(expected) => {
            if a.len() != expected || ma.is_some_and(|m| m.len() != expected) {
                format_bad_length(out, a, ma, expected);
                return;
            }
            OvsKeyAttr::from_u16(a.ty())
        }
        AttrLen::Variable => OvsKeyAttr::from_u16(a.ty()),
        AttrLen::Invalid => None,
    };

    out.push('(');
    match kind {
        Some(OvsKeyAttr::Encap) => {
            if !a.is_empty() {
                let mask = ma.map(Attr::payload).filter(|m| !m.is_empty());
                format_flow(out, a.payload(), mask, verbose);
            }
        }
        Some(
            OvsKeyAttr::Priority
            | OvsKeyAttr::SkbMark
            | OvsKeyAttr::DpHash
            | OvsKeyAttr::RecircId,
        ) => {
            let _ = write!(out, "{:#x}", be32_of(a));
            if let Some(m) = ma.filter(|_| !is_exact) {
                let _ = write!(out, "/{:#x}", be32_of(m));
            }
        }
        Some(OvsKeyAttr::Tunnel) => format_tunnel(out, a, ma, verbose),
        Some(OvsKeyAttr::InPort) => {
            let _ = write!(out, "{}", be32_of(a));
            if let Some(m) = ma.filter(|_| !is_exact) {
                let _ = write!(out, "/{:#x}", be32_of(m));
            }
        }
        Some(OvsKeyAttr::Ethernet) => {
            let (key, mask) = payloads::<KeyEthernet>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("src", key.src, mask.map(|m| m.src));
            f.field("dst", key.dst, mask.map(|m| m.dst));
            f.finish();
        }
        Some(OvsKeyAttr::Vlan) => {
            let mask = ma.map_or(Tci::EXACT, |m| Tci(be16_of(m)));
            format_vlan_tci(out, Tci(be16_of(a)), mask, verbose);
        }
        Some(OvsKeyAttr::Mpls) => format_mpls(out, a, ma.filter(|_| !is_exact)),
        Some(OvsKeyAttr::Ethertype | OvsKeyAttr::PacketEthertype) => {
            let _ = write!(out, "0x{:04x}", be16_of(a));
            if let Some(m) = ma.filter(|_| !is_exact) {
                let _ = write!(out, "/0x{:04x}", be16_of(m));
            }
        }
        Some(OvsKeyAttr::Ipv4) => {
            let (key, mask) = payloads::<KeyIpv4>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("src", key.src, mask.map(|m| m.src));
            f.field("dst", key.dst, mask.map(|m| m.dst));
            f.field("proto", Dec8(key.proto), mask.map(|m| Dec8(m.proto)));
            f.field("tos", Hex8(key.tos), mask.map(|m| Hex8(m.tos)));
            f.field("ttl", Dec8(key.ttl), mask.map(|m| Dec8(m.ttl)));
            f.frag(key.frag, mask.map(|m| m.frag));
            f.finish();
        }
        Some(OvsKeyAttr::Ipv6) => {
            let (key, mask) = payloads::<KeyIpv6>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("src", key.src, mask.map(|m| m.src));
            f.field("dst", key.dst, mask.map(|m| m.dst));
            f.field("label", Label(key.label), mask.map(|m| Label(m.label)));
            f.field("proto", Dec8(key.proto), mask.map(|m| Dec8(m.proto)));
            f.field("tclass", Hex8(key.tclass), mask.map(|m| Hex8(m.tclass)));
            f.field("hlimit", Dec8(key.hlimit), mask.map(|m| Dec8(m.hlimit)));
            f.frag(key.frag, mask.map(|m| m.frag));
            f.finish();
        }
        Some(OvsKeyAttr::Tcp | OvsKeyAttr::Udp | OvsKeyAttr::Sctp) => {
            let (key, mask) = payloads::<KeyPorts>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("src", Dec16(key.src), mask.map(|m| Dec16(m.src)));
            f.field("dst", Dec16(key.dst), mask.map(|m| Dec16(m.dst)));
            f.finish();
        }
        Some(OvsKeyAttr::TcpFlags) => {
            let key = u32::from(be16_of(a));
            match ma.filter(|_| !is_exact) {
                Some(m) => {
                    format_flags_masked(out, TcpFlags::bit_name, key, u32::from(be16_of(m)));
                }
                None => format_flags(out, TcpFlags::bit_name, key, ','),
            }
        }
        Some(OvsKeyAttr::Icmp | OvsKeyAttr::Icmpv6) => {
            let (key, mask) = payloads::<KeyIcmp>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("type", Dec8(key.ty), mask.map(|m| Dec8(m.ty)));
            f.field("code", Dec8(key.code), mask.map(|m| Dec8(m.code)));
            f.finish();
        }
        Some(OvsKeyAttr::Arp) => {
            let (key, mask) = payloads::<KeyArp>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("sip", key.sip, mask.map(|m| m.sip));
            f.field("tip", key.tip, mask.map(|m| m.tip));
            f.field("op", Dec16(key.op), mask.map(|m| Dec16(m.op)));
            f.field("sha", key.sha, mask.map(|m| m.sha));
            f.field("tha", key.tha, mask.map(|m| m.tha));
            f.finish();
        }
        Some(OvsKeyAttr::Nd) => {
            let (key, mask) = payloads::<KeyNd>(a, ma);
            let mut f = Fields { out, verbose };
            f.field("target", key.target, mask.map(|m| m.target));
            f.field("sll", key.sll, mask.map(|m| m.sll));
            f.field("tll", key.tll, mask.map(|m| m.tll));
            f.finish();
        }
        Some(OvsKeyAttr::Unspec) | None => {
            push_hex_spaced(out, a.payload());
            if let Some(m) = ma.filter(|_| !is_exact) {
                out.push('/');
                push_hex_spaced(out, m.payload());
            }
        }
    }
    out.push(')');
}

/// A mask payload that wildcards every bit of `a`.
fn wildcard_payload(a: &Attr<'_>) -> Vec<u8> {
    if a.ty() != OvsKeyAttr::Encap.ty() {
        return vec![0; a.len()];
    }
    let mut w = AttrWriter::new();
    for inner in a.nested().map_while(Result::ok) {
        if w.put_unspec(inner.ty(), &wildcard_payload(&inner)).is_err() {
            break;
        }
    }
    w.into_bytes()
}

fn format_flow(out: &mut String, key: &[u8], mask: Option<&[u8]>, verbose: bool) {
    if key.is_empty() {
        out.push_str("<empty>");
        return;
    }
    let mut attrs = Attrs::new(key);
    let mut first = true;
    let mut has_ethertype = false;
    for a in attrs.by_ref().map_while(Result::ok) {
        if a.ty() == OvsKeyAttr::Ethertype.ty() {
            has_ethertype = true;
        }
        let is_nested = odp_flow_key_attr_len(a.ty()) == AttrLen::Variable;
        let mut ma = mask.and_then(|m| attr_find(m, a.ty()));
        let is_wildcard = mask.is_some() && ma.is_none_or(|m| is_all_zeros(m.payload()));
        if !verbose && is_wildcard && !is_nested {
            continue;
        }
        let generated;
        if is_wildcard && ma.is_none() {
            generated = wildcard_payload(&a);
            ma = Some(Attr::new(a.ty(), &generated));
        }
        if !first {
            out.push(',');
        }
        format_key_attr(out, &a, ma.as_ref(), verbose);
        first = false;
    }

    let left = attrs.rest();
    if !left.is_empty() {
        if left.len() == key.len() {
            out.push_str("<empty>");
        }
        let _ = write!(out, ",***{} leftover bytes*** (", left.len());
        push_hex(out, left);
        out.push(')');
    }
    if !has_ethertype {
        if let Some(m) = mask.and_then(|m| attr_find(m, OvsKeyAttr::Ethertype.ty())) {
            let _ = write!(out, ",eth_type(0/0x{:04x})", be16_of(&m));
        }
    }
}

/// Text form of `key`, masked by `mask` if given.
///
/// Without `verbose`, attributes and fields that the mask wildcards entirely are left out.
#[must_use]
pub fn odp_flow_format(key: &[u8], mask: Option<&[u8]>, verbose: bool) -> String {
    let mut out = String::new();
    format_flow(&mut out, key, mask, verbose);
    out
}

/// Text form of an unmasked key, every field included.
#[must_use]
pub fn odp_flow_key_format(key: &[u8]) -> String {
    odp_flow_format(key, None, true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::flow::{Flow, FragFlags};
    use crate::key::{EncodeOptions, odp_flow_key_from_flow, odp_flow_key_from_mask};
    use net::eth::ethtype::EthType;
    use net::ip::{IPPROTO_ICMPV6, IPPROTO_TCP};
    use pretty_assertions::assert_eq;

    fn key_of(flow: &Flow) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, flow, &EncodeOptions::default()).unwrap();
        w.into_bytes()
    }

    fn tcp_flow() -> Flow {
        Flow {
            in_port: 1,
            dl_src: Mac([0, 1, 2, 3, 4, 5]),
            dl_dst: Mac([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(10, 0, 0, 1),
            nw_dst: Ipv4Addr::new(10, 0, 0, 2),
            nw_proto: IPPROTO_TCP,
            nw_tos: 0x10,
            nw_ttl: 64,
            tp_src: 80,
            tp_dst: 8080,
            tcp_flags: TcpFlags::SYN | TcpFlags::ACK,
            ..Flow::default()
        }
    }

    #[test]
    fn tcp_key() {
        assert_eq!(
            odp_flow_key_format(&key_of(&tcp_flow())),
            "skb_priority(0x0),skb_mark(0x0),in_port(1),\
             eth(src=00:01:02:03:04:05,dst=11:22:33:44:55:66),eth_type(0x0800),\
             ipv4(src=10.0.0.1,dst=10.0.0.2,proto=6,tos=0x10,ttl=64,frag=no),\
             tcp(src=80,dst=8080),tcp_flags(syn,ack)"
        );
    }

    #[test]
    fn masked_key_leaves_out_wildcards() {
        let flow = tcp_flow();
        let mask = Flow {
            in_port: u32::MAX,
            dl_type: EthType::EXACT,
            nw_src: Ipv4Addr::new(255, 255, 255, 0),
            nw_proto: u8::MAX,
            nw_frag: FragFlags::all(),
            tp_dst: u16::MAX,
            ..Flow::default()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_mask(&mut w, &mask, &flow, &EncodeOptions::default()).unwrap();
        let text = odp_flow_format(&key_of(&flow), Some(w.as_bytes()), false);
        assert_eq!(
            text,
            "in_port(1),eth_type(0x0800),ipv4(src=10.0.0.1/255.255.255.0,proto=6,frag=no),\
             tcp(dst=8080)"
        );
    }

    #[test]
    fn verbose_mask_spells_out_wildcards() {
        let flow = tcp_flow();
        let mask = Flow {
            dl_type: EthType::EXACT,
            nw_proto: u8::MAX,
            ..Flow::default()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_mask(&mut w, &mask, &flow, &EncodeOptions::default()).unwrap();
        let text = odp_flow_format(&key_of(&flow), Some(w.as_bytes()), true);
        assert!(text.contains("tcp(src=80/0x0,dst=8080/0x0)"), "{text}");
        assert!(text.contains("skb_priority(0x0/0x0)"), "{text}");
    }

    #[test]
    fn vlan_and_encap() {
        let flow = Flow {
            dl_type: EthType::IPV6,
            vlan_tci: Tci::from_parts(10, 3, true),
            ipv6_src: "fe80::1".parse().unwrap(),
            ipv6_dst: "ff02::1".parse().unwrap(),
            ipv6_label: 0x12345,
            nw_proto: IPPROTO_ICMPV6,
            nw_ttl: 255,
            tp_src: 135,
            nd_target: "fe80::2".parse().unwrap(),
            arp_sha: Mac([2, 0, 0, 0, 0, 1]),
            in_port: crate::ODPP_NONE,
            ..Flow::default()
        };
        let text = odp_flow_key_format(&key_of(&flow));
        assert!(text.contains("eth_type(0x8100),vlan(vid=10,pcp=3),encap(eth_type(0x86dd),"), "{text}");
        assert!(text.contains("ipv6(src=fe80::1,dst=ff02::1,label=0x12345,proto=58,tclass=0x0,hlimit=255,frag=no)"), "{text}");
        assert!(text.contains("icmpv6(type=135,code=0),nd(target=fe80::2,sll=02:00:00:00:00:01,tll=00:00:00:00:00:00))"), "{text}");
        assert!(!text.contains("in_port"));
    }

    #[test]
    fn vlan_tci_fields() {
        let mut out = String::new();
        format_vlan_tci(&mut out, Tci(0x0005), Tci(0x0fff), false);
        assert_eq!(out, "vid=5,cfi=0");
        out.clear();
        format_vlan_tci(&mut out, Tci::from_parts(5, 0, true), Tci(0x10ff), true);
        assert_eq!(out, "vid=5/0xff,pcp=0/0x0");
    }

    #[test]
    fn mpls_forms() {
        let one = Lse::from_parts(100, 1, true, 64).to_be_bytes();
        let mut out = String::new();
        format_key_attr(&mut out, &Attr::new(OvsKeyAttr::Mpls.ty(), &one), None, false);
        assert_eq!(out, "mpls(label=100,tc=1,ttl=64,bos=1)");

        let two: Vec<u8> = [Lse::from_parts(1, 0, false, 1), Lse::from_parts(2, 0, true, 2)]
            .iter()
            .flat_map(|l| l.to_be_bytes())
            .collect();
        out.clear();
        format_key_attr(&mut out, &Attr::new(OvsKeyAttr::Mpls.ty(), &two), None, false);
        assert_eq!(out, "mpls(lse0=0x1001,lse1=0x2102)");

        out.clear();
        format_key_attr(&mut out, &Attr::new(OvsKeyAttr::Mpls.ty(), &[1, 2]), None, false);
        assert_eq!(out, "mpls(bad key length 2)");
    }

    #[test]
    fn bad_lengths_print_as_hex() {
        let mut out = String::new();
        format_key_attr(&mut out, &Attr::new(OvsKeyAttr::Priority.ty(), &[1, 2]), None, false);
        assert_eq!(out, "skb_priority(bad key length 2, expected 4)(01 02)");

        out.clear();
        format_key_attr(&mut out, &Attr::new(40, &[0xab]), None, false);
        assert_eq!(out, "key40(ab)");
    }

    #[test]
    fn leftovers_and_empty() {
        assert_eq!(odp_flow_key_format(&[]), "<empty>");
        assert_eq!(odp_flow_key_format(&[1, 2, 3]), "<empty>,***3 leftover bytes*** (010203)");
    }

    #[test]
    fn tunnel_and_metadata() {
        let mut flow = tcp_flow();
        flow.tunnel = FlowTnl {
            tun_id: 0x2a,
            ip_src: Ipv4Addr::new(1, 1, 1, 1),
            ip_dst: Ipv4Addr::new(2, 2, 2, 2),
            flags: TnlFlags::KEY | TnlFlags::DONT_FRAGMENT,
            ip_ttl: 64,
            ..FlowTnl::default()
        };
        flow.skb_priority = 7;
        let text = odp_flow_key_format(&key_of(&flow));
        assert!(text.starts_with(
            "skb_priority(0x7),tunnel(tun_id=0x2a,src=1.1.1.1,dst=2.2.2.2,tos=0x0,ttl=64,\
             tp_src=0,tp_dst=0,flags(df,key)),skb_mark(0x0)"
        ), "{text}");
    }
}
