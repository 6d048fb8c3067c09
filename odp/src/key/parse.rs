// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Keys and masks from their text form.

use crate::attr::{AttrError, AttrWriter};
use crate::flow::{FLOW_MAX_MPLS_LABELS, FlowTnl, TcpFlags, TnlFlags};
use crate::key::exact::is_all_zeros;
use crate::key::tunnel::tun_key_to_attr;
use crate::key::{
    KeyArp, KeyEthernet, KeyIcmp, KeyIpv4, KeyIpv6, KeyNd, KeyPayload, KeyPorts, OvsKeyAttr, frag,
};
use crate::text::{Expected, Scanner, excerpt, parse_flags};
use arrayvec::ArrayVec;
use net::eth::mac::Mac;
use net::ip::ipv6::LABEL_MASK;
use net::mpls::Lse;
use net::vlan::Tci;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Errors while reading a key from text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The text does not follow the key grammar.
    #[error("expected {expected} at \"{at}\"")]
    Syntax {
        /// what the parser was looking for
        expected: &'static str,
        /// the text where parsing stopped
        at: String,
    },
    /// The key does not fit the output.
    #[error(transparent)]
    Attr(#[from] AttrError),
}

enum Failure {
    Syntax(Expected),
    Attr(AttrError),
}

impl From<Expected> for Failure {
    fn from(e: Expected) -> Self {
        Failure::Syntax(e)
    }
}

impl From<AttrError> for Failure {
    fn from(e: AttrError) -> Self {
        Failure::Attr(e)
    }
}

/// `name=value,...)`: calls `field` until the closing parenthesis.  `field` returns false if it
/// does not know the field name at the cursor.
fn scan_fields<'a>(
    sc: &mut Scanner<'a>,
    mut field: impl FnMut(&mut Scanner<'a>) -> Result<bool, Expected>,
) -> Result<(), Expected> {
    loop {
        if sc.eat(")") {
            return Ok(());
        }
        if !field(sc)? {
            return Err(Expected("a field name"));
        }
        if !sc.eat(",") {
            return sc.expect(")");
        }
    }
}

fn put_pair(
    key: &mut AttrWriter,
    mask: Option<&mut AttrWriter>,
    attr: OvsKeyAttr,
    k: &[u8],
    m: &[u8],
) -> Result<(), AttrError> {
    match mask {
        // a field group wildcarded entirely is not worth an attribute
        Some(_) if is_all_zeros(m) => Ok(()),
        Some(mask) => {
            key.put_unspec(attr.ty(), k)?;
            mask.put_unspec(attr.ty(), m)
        }
        None => key.put_unspec(attr.ty(), k),
    }
}

fn put_payloads<P: KeyPayload>(
    key: &mut AttrWriter,
    mask: Option<&mut AttrWriter>,
    attr: OvsKeyAttr,
    k: &P,
    m: &P,
) -> Result<(), AttrError> {
    put_pair(key, mask, attr, &k.to_bytes(), &m.to_bytes())
}

fn scan_frag(sc: &mut Scanner<'_>) -> Result<u8, Expected> {
    let mut probe = *sc;
    let value = match probe.take_while(|c| c.is_ascii_alphabetic()) {
        "no" => frag::NONE,
        "first" => frag::FIRST,
        "later" => frag::LATER,
        _ => return Err(Expected("no, first or later")),
    };
    *sc = probe;
    Ok(value)
}

/// Store `value` in the `bits` wide field at `shift` of `target`.
fn set_bits(target: &mut u32, bits: u32, shift: u32, value: u32) -> Result<(), Expected> {
    let field = (1u32 << bits) - 1;
    if value & !field != 0 {
        return Err(Expected("a value that fits the field"));
    }
    *target = (*target & !(field << shift)) | (value << shift);
    Ok(())
}

/// A bit field of a 16 or 32 bit word.  Without an explicit mask, the field becomes exact.
fn scan_bits(
    sc: &mut Scanner<'_>,
    key: &mut u32,
    mask: &mut u32,
    bits: u32,
    shift: u32,
) -> Result<(), Expected> {
    set_bits(key, bits, shift, sc.uint()?)?;
    if sc.eat("/") {
        set_bits(mask, bits, shift, sc.uint()?)
    } else {
        *mask |= ((1u32 << bits) - 1) << shift;
        Ok(())
    }
}

fn scan_u32_single(sc: &mut Scanner<'_>, masked: bool) -> Result<(u32, u32), Expected> {
    let value = if masked {
        sc.masked(u32::MAX, Scanner::uint)?
    } else {
        (sc.uint()?, u32::MAX)
    };
    sc.expect(")")?;
    Ok(value)
}

fn scan_be16_single(sc: &mut Scanner<'_>) -> Result<(u16, u16), Expected> {
    let value = sc.masked(u16::MAX, Scanner::uint)?;
    sc.expect(")")?;
    Ok(value)
}

fn scan_tunnel(sc: &mut Scanner<'_>) -> Result<(FlowTnl, FlowTnl), Expected> {
    let mut k = FlowTnl::default();
    let mut m = FlowTnl::default();
    scan_fields(sc, |sc| {
        if sc.eat("tun_id=") {
            (k.tun_id, m.tun_id) = sc.masked(u64::MAX, Scanner::uint)?;
        } else if sc.eat("src=") {
            (k.ip_src, m.ip_src) = sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4)?;
        } else if sc.eat("dst=") {
            (k.ip_dst, m.ip_dst) = sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4)?;
        } else if sc.eat("tos=") {
            (k.ip_tos, m.ip_tos) = sc.masked(u8::MAX, Scanner::uint)?;
        } else if sc.eat("ttl=") {
            (k.ip_ttl, m.ip_ttl) = sc.masked(u8::MAX, Scanner::uint)?;
        } else if sc.eat("tp_src=") {
            (k.tp_src, m.tp_src) = sc.masked(u16::MAX, Scanner::uint)?;
        } else if sc.eat("tp_dst=") {
            (k.tp_dst, m.tp_dst) = sc.masked(u16::MAX, Scanner::uint)?;
        } else if sc.eat("flags(") {
            let allowed = u32::from(TnlFlags::all().bits());
            let (flags, mask) = parse_flags(sc, TnlFlags::bit_name, allowed, true)?;
            sc.expect(")")?;
            k.flags = TnlFlags::from_bits_truncate(u16::try_from(flags & allowed).unwrap_or(0));
            m.flags = TnlFlags::from_bits_truncate(u16::try_from(mask & allowed).unwrap_or(0));
        } else if sc.eat("geneve(") {
            let opts = sc.hex_bytes()?;
            sc.expect(")")?;
            k.geneve = ArrayVec::try_from(opts.as_slice())
                .map_err(|_| Expected("at most 252 bytes of geneve options"))?;
            // options are matched as a whole, so the mask carries them as they are
            m.geneve = k.geneve.clone();
        } else {
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok((k, m))
}

fn scan_mpls(sc: &mut Scanner<'_>) -> Result<(Vec<u8>, Vec<u8>), Expected> {
    let mut k = [0u32; FLOW_MAX_MPLS_LABELS];
    let mut m = [0u32; FLOW_MAX_MPLS_LABELS];
    let mut depth = 1;
    scan_fields(sc, |sc| {
        if sc.eat("label=") {
            scan_bits(sc, &mut k[0], &mut m[0], 20, Lse::LABEL_SHIFT)?;
        } else if sc.eat("tc=") {
            scan_bits(sc, &mut k[0], &mut m[0], 3, Lse::TC_SHIFT)?;
        } else if sc.eat("ttl=") {
            scan_bits(sc, &mut k[0], &mut m[0], 8, 0)?;
        } else if sc.eat("bos=") {
            scan_bits(sc, &mut k[0], &mut m[0], 1, Lse::BOS_MASK.trailing_zeros())?;
        } else if sc.eat("lse") {
            let i: usize = sc.uint()?;
            if i >= FLOW_MAX_MPLS_LABELS {
                return Err(Expected("a label stack index below 3"));
            }
            sc.expect("=")?;
            (k[i], m[i]) = sc.masked(u32::MAX, Scanner::uint)?;
            depth = depth.max(i + 1);
        } else {
            return Ok(false);
        }
        Ok(true)
    })?;
    let bytes = |stack: &[u32]| -> Vec<u8> {
        stack[..depth].iter().flat_map(|lse| lse.to_be_bytes()).collect()
    };
    Ok((bytes(&k), bytes(&m)))
}

fn scan_attr(
    sc: &mut Scanner<'_>,
    key: &mut AttrWriter,
    mut mask: Option<&mut AttrWriter>,
) -> Result<(), Failure> {
    let masked = mask.is_some();

    for (name, attr) in [
        ("skb_priority(", OvsKeyAttr::Priority),
        ("skb_mark(", OvsKeyAttr::SkbMark),
        ("dp_hash(", OvsKeyAttr::DpHash),
        ("in_port(", OvsKeyAttr::InPort),
        ("recirc_id(", OvsKeyAttr::RecircId),
    ] {
        if sc.eat(name) {
            // the recirculation id is always matched exactly
            let (k, m) = scan_u32_single(sc, masked && attr != OvsKeyAttr::RecircId)?;
            return Ok(put_pair(key, mask, attr, &k.to_be_bytes(), &m.to_be_bytes())?);
        }
    }

    for (name, attr) in [
        ("eth_type(", OvsKeyAttr::Ethertype),
        ("packet_eth_type(", OvsKeyAttr::PacketEthertype),
    ] {
        if sc.eat(name) {
            let (k, m) = scan_be16_single(sc)?;
            return Ok(put_pair(key, mask, attr, &k.to_be_bytes(), &m.to_be_bytes())?);
        }
    }

    if sc.eat("tunnel(") {
        let (k, m) = scan_tunnel(sc)?;
        match mask {
            Some(_) if m == FlowTnl::default() => {}
            Some(mask) => {
                tun_key_to_attr(key, &k)?;
                tun_key_to_attr(mask, &m)?;
            }
            None => tun_key_to_attr(key, &k)?,
        }
        return Ok(());
    }

    if sc.eat("eth(") {
        let (mut k, mut m) = (KeyEthernet::default(), KeyEthernet::default());
        scan_fields(sc, |sc| {
            if sc.eat("src=") {
                (k.src, m.src) = sc.masked(Mac::BROADCAST, Scanner::mac)?;
            } else if sc.eat("dst=") {
                (k.dst, m.dst) = sc.masked(Mac::BROADCAST, Scanner::mac)?;
            } else {
                return Ok(false);
            }
            Ok(true)
        })?;
        return Ok(put_payloads(key, mask, OvsKeyAttr::Ethernet, &k, &m)?);
    }

    if sc.eat("vlan(") {
        let mut k = u32::from(Tci::CFI);
        let mut m = u32::from(Tci::CFI);
        scan_fields(sc, |sc| {
            if sc.eat("vid=") {
                scan_bits(sc, &mut k, &mut m, 12, 0)?;
            } else if sc.eat("pcp=") {
                scan_bits(sc, &mut k, &mut m, 3, u32::from(Tci::PCP_SHIFT))?;
            } else if sc.eat("cfi=") {
                scan_bits(sc, &mut k, &mut m, 1, Tci::CFI.trailing_zeros())?;
            } else {
                return Ok(false);
            }
            Ok(true)
        })?;
        let k = u16::try_from(k).map_err(|_| Expected("a 16 bit tag"))?;
        let m = u16::try_from(m).map_err(|_| Expected("a 16 bit tag"))?;
        return Ok(put_pair(key, mask, OvsKeyAttr::Vlan, &k.to_be_bytes(), &m.to_be_bytes())?);
    }

    if sc.eat("mpls(") {
        let (k, m) = scan_mpls(sc)?;
        return Ok(put_pair(key, mask, OvsKeyAttr::Mpls, &k, &m)?);
    }

    if sc.eat("ipv4(") {
        let (mut k, mut m) = (KeyIpv4::default(), KeyIpv4::default());
        scan_fields(sc, |sc| {
            if sc.eat("src=") {
                (k.src, m.src) = sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4)?;
            } else if sc.eat("dst=") {
                (k.dst, m.dst) = sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4)?;
            } else if sc.eat("proto=") {
                (k.proto, m.proto) = sc.masked(u8::MAX, Scanner::uint)?;
            } else if sc.eat("tos=") {
                (k.tos, m.tos) = sc.masked(u8::MAX, Scanner::uint)?;
            } else if sc.eat("ttl=") {
                (k.ttl, m.ttl) = sc.masked(u8::MAX, Scanner::uint)?;
            } else if sc.eat("frag=") {
                (k.frag, m.frag) = (scan_frag(sc)?, u8::MAX);
            } else {
                return Ok(false);
            }
            Ok(true)
        })?;
        return Ok(put_payloads(key, mask, OvsKeyAttr::Ipv4, &k, &m)?);
    }

    if sc.eat("ipv6(") {
        let (mut k, mut m) = (KeyIpv6::default(), KeyIpv6::default());
        scan_fields(sc, |sc| {
            if sc.eat("src=") {
                (k.src, m.src) = sc.masked(Ipv6Addr::from(u128::MAX), Scanner::ipv6)?;
            } else if sc.eat("dst=") {
                (k.dst, m.dst) = sc.masked(Ipv6Addr::from(u128::MAX), Scanner::ipv6)?;
            } else if sc.eat("label=") {
                (k.label, m.label) = sc.masked(LABEL_MASK, Scanner::uint)?;
                if (k.label | m.label) & !LABEL_MASK != 0 {
                    return Err(Expected("a 20 bit flow label"));
                }
            } else if sc.eat("proto=") {
                (k.proto, m.proto) = sc.masked(u8::MAX, Scanner::uint)?;
            } else if sc.eat("tclass=") {
                (k.tclass, m.tclass) = sc.masked(u8::MAX, Scanner::uint)?;
            } else if sc.eat("hlimit=") {
                (k.hlimit, m.hlimit) = sc.masked(u8::MAX, Scanner::uint)?;
            } else if sc.eat("frag=") {
                (k.frag, m.frag) = (scan_frag(sc)?, u8::MAX);
            } else {
                return Ok(false);
            }
            Ok(true)
        })?;
        return Ok(put_payloads(key, mask, OvsKeyAttr::Ipv6, &k, &m)?);
    }

    for (name, attr) in [
        ("tcp(", OvsKeyAttr::Tcp),
        ("udp(", OvsKeyAttr::Udp),
        ("sctp(", OvsKeyAttr::Sctp),
    ] {
        if sc.eat(name) {
            let (mut k, mut m) = (KeyPorts::default(), KeyPorts::default());
            scan_fields(sc, |sc| {
                if sc.eat("src=") {
                    (k.src, m.src) = sc.masked(u16::MAX, Scanner::uint)?;
                } else if sc.eat("dst=") {
                    (k.dst, m.dst) = sc.masked(u16::MAX, Scanner::uint)?;
                } else {
                    return Ok(false);
                }
                Ok(true)
            })?;
            return Ok(put_payloads(key, mask, attr, &k, &m)?);
        }
    }

    if sc.eat("tcp_flags(") {
        let allowed = u32::from(TcpFlags::MASK);
        let (k, m) = parse_flags(sc, TcpFlags::bit_name, allowed, masked)?;
        sc.expect(")")?;
        let k = u16::try_from(k & allowed).unwrap_or(0);
        let m = u16::try_from(m & 0xffff).unwrap_or(u16::MAX);
        return Ok(put_pair(key, mask, OvsKeyAttr::TcpFlags, &k.to_be_bytes(), &m.to_be_bytes())?);
    }

    for (name, attr) in [("icmp(", OvsKeyAttr::Icmp), ("icmpv6(", OvsKeyAttr::Icmpv6)] {
        if sc.eat(name) {
            let (mut k, mut m) = (KeyIcmp::default(), KeyIcmp::default());
            scan_fields(sc, |sc| {
                if sc.eat("type=") {
                    (k.ty, m.ty) = sc.masked(u8::MAX, Scanner::uint)?;
                } else if sc.eat("code=") {
                    (k.code, m.code) = sc.masked(u8::MAX, Scanner::uint)?;
                } else {
                    return Ok(false);
                }
                Ok(true)
            })?;
            return Ok(put_payloads(key, mask, attr, &k, &m)?);
        }
    }

    if sc.eat("arp(") {
        let (mut k, mut m) = (KeyArp::default(), KeyArp::default());
        scan_fields(sc, |sc| {
            if sc.eat("sip=") {
                (k.sip, m.sip) = sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4)?;
            } else if sc.eat("tip=") {
                (k.tip, m.tip) = sc.masked(Ipv4Addr::BROADCAST, Scanner::ipv4)?;
            } else if sc.eat("op=") {
                (k.op, m.op) = sc.masked(u16::MAX, Scanner::uint)?;
            } else if sc.eat("sha=") {
                (k.sha, m.sha) = sc.masked(Mac::BROADCAST, Scanner::mac)?;
            } else if sc.eat("tha=") {
                (k.tha, m.tha) = sc.masked(Mac::BROADCAST, Scanner::mac)?;
            } else {
                return Ok(false);
            }
            Ok(true)
        })?;
        return Ok(put_payloads(key, mask, OvsKeyAttr::Arp, &k, &m)?);
    }

    if sc.eat("nd(") {
        let (mut k, mut m) = (KeyNd::default(), KeyNd::default());
        scan_fields(sc, |sc| {
            if sc.eat("target=") {
                (k.target, m.target) = sc.masked(Ipv6Addr::from(u128::MAX), Scanner::ipv6)?;
            } else if sc.eat("sll=") {
                (k.sll, m.sll) = sc.masked(Mac::BROADCAST, Scanner::mac)?;
            } else if sc.eat("tll=") {
                (k.tll, m.tll) = sc.masked(Mac::BROADCAST, Scanner::mac)?;
            } else {
                return Ok(false);
            }
            Ok(true)
        })?;
        return Ok(put_payloads(key, mask, OvsKeyAttr::Nd, &k, &m)?);
    }

    if sc.eat("encap(") {
        let key_nest = key.start_nested(OvsKeyAttr::Encap.ty())?;
        let mask_nest = match mask.as_deref_mut() {
            Some(m) => Some(m.start_nested(OvsKeyAttr::Encap.ty())?),
            None => None,
        };
        loop {
            sc.skip_delimiters();
            if sc.is_empty() {
                return Err(Expected(")").into());
            }
            if sc.eat(")") {
                break;
            }
            scan_attr(sc, key, mask.as_deref_mut())?;
        }
        key.end_nested(key_nest)?;
        if let (Some(m), Some(nest)) = (mask, mask_nest) {
            m.end_nested(nest)?;
        }
        return Ok(());
    }

    Err(Expected("a key attribute").into())
}

/// Parse one attribute at the cursor, appending it to `key` (and its mask to `mask`).
pub(crate) fn parse_key_attr(
    sc: &mut Scanner<'_>,
    key: &mut AttrWriter,
    mask: Option<&mut AttrWriter>,
) -> Result<(), KeyError> {
    scan_attr(sc, key, mask).map_err(|failure| match failure {
        Failure::Syntax(Expected(expected)) => KeyError::Syntax {
            expected,
            at: excerpt(sc.rest()),
        },
        Failure::Attr(e) => KeyError::Attr(e),
    })
}

/// Parse the text form of a key, as produced by
/// [`odp_flow_key_format`](crate::key::odp_flow_key_format), appending the attributes to `key`.
///
/// With a `mask` writer, fields may carry `/mask` suffixes and the masks are appended to `mask`;
/// fields without a suffix match exactly, and attributes whose fields are all wildcarded are left
/// out of both.
///
/// The result is not checked for consistency (duplicate attributes, say); decoding the key does
/// that.
///
/// # Errors
///
/// Returns a [`KeyError`] if the text cannot be parsed.  Neither writer is modified in that case.
pub fn odp_flow_from_string(
    s: &str,
    key: &mut AttrWriter,
    mut mask: Option<&mut AttrWriter>,
) -> Result<(), KeyError> {
    let key_start = key.len();
    let mask_start = mask.as_ref().map(|m| m.len());
    let mut sc = Scanner::new(s);
    let result = loop {
        sc.skip_delimiters();
        if sc.is_empty() {
            break Ok(());
        }
        if let Err(e) = parse_key_attr(&mut sc, key, mask.as_deref_mut()) {
            break Err(e);
        }
    };
    if let Err(e) = &result {
        debug!("cannot parse flow key: {e}");
        key.truncate(key_start);
        if let (Some(m), Some(start)) = (mask, mask_start) {
            m.truncate(start);
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::Fitness;
    use crate::flow::{Flow, FragFlags};
    use crate::key::{
        EncodeOptions, odp_flow_format, odp_flow_key_format, odp_flow_key_from_flow,
        odp_flow_key_to_flow,
    };
    use net::eth::ethtype::EthType;
    use net::ip::{IPPROTO_ICMPV6, IPPROTO_TCP, IPPROTO_UDP};
    use net::packet::BaseLayer;
    use pretty_assertions::assert_eq;

    fn parse(s: &str) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_flow_from_string(s, &mut w, None).unwrap();
        w.into_bytes()
    }

    fn parse_masked(s: &str) -> (Vec<u8>, Vec<u8>) {
        let mut key = AttrWriter::new();
        let mut mask = AttrWriter::new();
        odp_flow_from_string(s, &mut key, Some(&mut mask)).unwrap();
        (key.into_bytes(), mask.into_bytes())
    }

    fn key_of(flow: &Flow) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, flow, &EncodeOptions::default()).unwrap();
        w.into_bytes()
    }

    fn shapes() -> Vec<Flow> {
        let eth = Flow {
            in_port: 3,
            dl_src: Mac([0, 1, 2, 3, 4, 5]),
            dl_dst: Mac([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            ..Flow::default()
        };
        let tcp = Flow {
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(10, 0, 0, 1),
            nw_dst: Ipv4Addr::new(10, 0, 0, 2),
            nw_proto: IPPROTO_TCP,
            nw_tos: 0x2e,
            nw_ttl: 64,
            tp_src: 80,
            tp_dst: 443,
            tcp_flags: TcpFlags::SYN,
            ..eth.clone()
        };
        let tunneled = Flow {
            tunnel: FlowTnl {
                tun_id: 7,
                ip_src: Ipv4Addr::new(192, 0, 2, 1),
                ip_dst: Ipv4Addr::new(192, 0, 2, 2),
                flags: TnlFlags::KEY | TnlFlags::CSUM,
                ip_tos: 4,
                ip_ttl: 32,
                tp_dst: 4789,
                ..FlowTnl::default()
            },
            skb_priority: 9,
            pkt_mark: 0x55,
            ..tcp.clone()
        };
        let nd = Flow {
            dl_type: EthType::IPV6,
            vlan_tci: Tci::from_parts(100, 5, true),
            ipv6_src: "2001:db8::1".parse().unwrap(),
            ipv6_dst: "ff02::1:ff00:2".parse().unwrap(),
            ipv6_label: 0xbeef,
            nw_proto: IPPROTO_ICMPV6,
            nw_ttl: 255,
            tp_src: 136,
            nd_target: "2001:db8::2".parse().unwrap(),
            arp_tha: Mac([2, 0, 0, 0, 0, 9]),
            ..eth.clone()
        };
        let arp = Flow {
            dl_type: EthType::ARP,
            nw_src: Ipv4Addr::new(10, 0, 0, 1),
            nw_dst: Ipv4Addr::new(10, 0, 0, 9),
            nw_proto: 1,
            arp_sha: Mac([0, 1, 2, 3, 4, 5]),
            ..eth.clone()
        };
        let mpls = Flow {
            dl_type: EthType::MPLS,
            mpls_lse: [
                Lse::from_parts(16, 0, false, 63),
                Lse::from_parts(17, 2, true, 62),
                Lse(0),
            ],
            ..eth.clone()
        };
        let l3 = Flow {
            base_layer: BaseLayer::L3,
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(10, 1, 1, 1),
            nw_dst: Ipv4Addr::new(10, 1, 1, 2),
            nw_proto: IPPROTO_UDP,
            nw_frag: FragFlags::ANY,
            tp_src: 53,
            tp_dst: 5353,
            ..eth.clone()
        };
        vec![tcp, tunneled, nd, arp, mpls, l3]
    }

    #[test]
    fn format_then_parse_is_identity() {
        for flow in shapes() {
            let key = key_of(&flow);
            let text = odp_flow_key_format(&key);
            assert_eq!(parse(&text), key, "{text}");
            let (decoded, fitness) = odp_flow_key_to_flow(&parse(&text));
            assert_eq!(fitness, Fitness::Perfect, "{text}");
            assert_eq!(decoded.dl_type, flow.dl_type);
        }
    }

    #[test]
    fn masked_text() {
        let text = "in_port(1),eth_type(0x0800),ipv4(src=10.0.0.1/255.255.255.0,proto=6)";
        let (key, mask) = parse_masked(text);
        assert_eq!(odp_flow_format(&key, Some(&mask), false), text);

        let (key, mask) = parse_masked("skb_mark(0x10/0xf0),tcp(src=0/0)");
        assert_eq!(odp_flow_format(&key, Some(&mask), false), "skb_mark(0x10/0xf0)");
    }

    #[test]
    fn masked_flags() {
        let (key, mask) = parse_masked("tcp_flags(+syn-ack)");
        assert_eq!(&key[4..], &[0x00, 0x02, 0, 0]);
        assert_eq!(&mask[4..], &[0x00, 0x12, 0, 0]);
        assert_eq!(odp_flow_format(&key, Some(&mask), false), "tcp_flags(+syn-ack)");

        let (key, mask) = parse_masked("tunnel(ttl=64,flags(+df-csum))");
        let text = odp_flow_format(&key, Some(&mask), false);
        assert_eq!(text, "tunnel(ttl=64,flags(+df-csum))");
    }

    #[test]
    fn vlan_bit_fields() {
        let key = parse("vlan(vid=5,pcp=7)");
        assert_eq!(&key[4..6], &Tci::from_parts(5, 7, true).raw().to_be_bytes());
        let key = parse("vlan(vid=5,cfi=0)");
        assert_eq!(&key[4..6], &[0x00, 0x05]);
        let (_, mask) = parse_masked("vlan(vid=5/0xff)");
        assert_eq!(&mask[4..6], &[0x10, 0xff]);
    }

    #[test]
    fn mpls_forms() {
        let one = parse("mpls(label=100,tc=1,ttl=64,bos=1)");
        assert_eq!(&one[4..], &Lse::from_parts(100, 1, true, 64).to_be_bytes());
        let two = parse("mpls(lse0=0x1001,lse1=0x2102)");
        assert_eq!(&two[4..], &[0, 0, 0x10, 0x01, 0, 0, 0x21, 0x02]);
    }

    #[test]
    fn errors_leave_the_writers_alone() {
        for bad in [
            "skb_priority(1),bogus(2)",
            "eth(src=zz:00:00:00:00:00)",
            "vlan(vid=5000)",
            "ipv6(label=0x100000)",
            "ipv4(frag=sometimes)",
            "tcp(src=80",
            "tcp(port=80)",
            "encap(eth_type(0x0800)",
            "mpls(lse3=1)",
            "tcp_flags(syn,bogus)",
        ] {
            let mut key = AttrWriter::new();
            let mut mask = AttrWriter::new();
            key.put_u8(99, 1).unwrap();
            let before = key.clone();
            let err = odp_flow_from_string(bad, &mut key, Some(&mut mask));
            assert!(matches!(err, Err(KeyError::Syntax { .. })), "{bad}");
            assert_eq!(key, before, "{bad}");
            assert!(mask.is_empty(), "{bad}");
        }
    }

    #[test]
    fn out_of_space() {
        let mut key = AttrWriter::with_limit(8);
        let err = odp_flow_from_string("skb_priority(1),skb_mark(2)", &mut key, None);
        assert!(matches!(err, Err(KeyError::Attr(AttrError::InsufficientSpace { .. }))));
        assert!(key.is_empty());
    }

    #[test]
    fn delimiters_are_flexible() {
        assert_eq!(parse(" skb_priority(1) ,\tskb_mark(2)\n"), parse("skb_priority(1),skb_mark(2)"));
    }
}
