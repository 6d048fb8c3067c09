// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Attributes to flow.
//!
//! Decoding a key and decoding a mask share one walk.  A mask is read against the key it belongs
//! to (`src`): the key says which protocols are present, the mask only supplies bits.  When a
//! key is decoded, `src` is `None` and the protocol selectors are read from the flow being
//! filled in.

use crate::Fitness;
use crate::ODPP_NONE;
use crate::attr::{Attr, Attrs};
use crate::flow::{FLOW_MAX_MPLS_LABELS, FragFlags, Flow, TcpFlags};
use crate::key::encode::is_nd;
use crate::key::exact::is_all_zeros;
use crate::key::tunnel::odp_tun_key_from_attr;
use crate::key::{AttrLen, KeyArp, KeyEthernet, KeyIcmp, KeyIpv4, KeyIpv6, KeyNd, KeyPayload};
use crate::key::{KeyPorts, OvsKeyAttr, frag, odp_flow_key_attr_len, ovs_key_attr_to_string};
use net::eth::ethtype::EthType;
use net::ip::{IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP};
use net::mpls::Lse;
use net::packet::BaseLayer;
use net::vlan::Tci;
use tracing::{debug, warn};

const SLOTS: usize = OvsKeyAttr::MAX as usize + 1;

const fn bit(attr: OvsKeyAttr) -> u64 {
    1 << attr.ty()
}

fn attr_names(bits: u64) -> String {
    (0..=OvsKeyAttr::MAX)
        .filter(|ty| bits & (1 << ty) != 0)
        .map(ovs_key_attr_to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// One level of key attributes, indexed by type.
struct KeyAttrs<'a> {
    slots: [Option<Attr<'a>>; SLOTS],
    present: u64,
    out_of_range: Option<u16>,
}

impl<'a> KeyAttrs<'a> {
    /// Index `key`.  Malformed framing, a payload of the wrong size or a duplicate type fail the
    /// whole key.
    fn parse(key: &'a [u8]) -> Option<KeyAttrs<'a>> {
        let mut parsed = KeyAttrs {
            slots: [None; SLOTS],
            present: 0,
            out_of_range: None,
        };
        for attr in Attrs::new(key) {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    warn!("malformed flow key: {e}");
                    return None;
                }
            };
            let ty = attr.ty();
            if let AttrLen::Fixed(len) = odp_flow_key_attr_len(ty) {
                if attr.len() != len {
                    warn!(
                        "attribute {} has length {} but should have length {len}",
                        ovs_key_attr_to_string(ty),
                        attr.len()
                    );
                    return None;
                }
            }
            if ty > OvsKeyAttr::MAX {
                parsed.out_of_range = Some(ty);
                continue;
            }
            if parsed.present & (1 << ty) != 0 {
                warn!("duplicate {} attribute in flow key", ovs_key_attr_to_string(ty));
                return None;
            }
            parsed.present |= 1 << ty;
            parsed.slots[usize::from(ty)] = Some(attr);
        }
        Some(parsed)
    }

    fn has(&self, attr: OvsKeyAttr) -> bool {
        self.present & bit(attr) != 0
    }

    fn get(&self, attr: OvsKeyAttr) -> Option<Attr<'a>> {
        self.slots[usize::from(attr.ty())]
    }

    fn be16(&self, attr: OvsKeyAttr) -> Option<u16> {
        self.get(attr).and_then(|a| a.get_be16().ok())
    }

    fn be32(&self, attr: OvsKeyAttr) -> Option<u32> {
        self.get(attr).and_then(|a| a.get_be32().ok())
    }

    fn payload<P: KeyPayload>(&self, attr: OvsKeyAttr) -> Option<P> {
        self.get(attr).and_then(|a| P::from_payload(a.payload()))
    }

    /// Compare what this level carries with what the decoder expected of it.
    fn check(&self, expected: u64) -> Fitness {
        let missing = expected & !self.present;
        if missing != 0 {
            debug!("expected but not present: {}", attr_names(missing));
            return Fitness::TooLittle;
        }
        let extra = self.present & !expected;
        if extra != 0 || self.out_of_range.is_some() {
            match self.out_of_range {
                Some(ty) => debug!(
                    "present but not expected: {} (and out of range key{ty})",
                    attr_names(extra)
                ),
                None => debug!("present but not expected: {}", attr_names(extra)),
            }
            return Fitness::TooMuch;
        }
        Fitness::Perfect
    }
}

/// Resolve the ethertype of this level, guessing it for a key which does not spell it out.
fn parse_ethertype(
    attrs: &KeyAttrs<'_>,
    expected: &mut u64,
    flow: &mut Flow,
    src: Option<&Flow>,
) -> bool {
    if let Some(raw) = attrs.be16(OvsKeyAttr::Ethertype) {
        flow.dl_type = EthType::new(raw);
        match src {
            None if flow.dl_type < EthType::MIN => {
                warn!("invalid ethertype {raw:#06x} in flow key");
                return false;
            }
            Some(key) if key.dl_type < EthType::MIN && flow.dl_type != EthType::EXACT => {
                debug!("non Ethernet II frame with a partial ethertype mask {raw:#06x}");
                return false;
            }
            _ => {}
        }
        *expected |= bit(OvsKeyAttr::Ethertype);
        return true;
    }
    match src {
        None => {
            // MPLS could just as well be the multicast type; the unicast one is assumed
            flow.dl_type = if attrs.has(OvsKeyAttr::Ipv4) {
                EthType::IPV4
            } else if attrs.has(OvsKeyAttr::Ipv6) {
                EthType::IPV6
            } else if attrs.has(OvsKeyAttr::Mpls) {
                EthType::MPLS
            } else {
                EthType::NONE
            };
        }
        Some(key) if key.dl_type < EthType::MIN => {
            debug!("mask expected for non Ethernet II frame");
            return false;
        }
        Some(_) => {}
    }
    true
}

fn parse_mpls(
    attrs: &KeyAttrs<'_>,
    mut expected: u64,
    flow: &mut Flow,
    is_mask: bool,
) -> Fitness {
    if !is_mask || attrs.has(OvsKeyAttr::Mpls) {
        expected |= bit(OvsKeyAttr::Mpls);
    }
    if let Some(attr) = attrs.get(OvsKeyAttr::Mpls) {
        let stack = attr.payload();
        if stack.is_empty() || stack.len() % Lse::LEN != 0 {
            warn!("mpls attribute of {} bytes", stack.len());
            return Fitness::Error;
        }
        let n = stack.len() / Lse::LEN;
        for (slot, lse) in flow.mpls_lse.iter_mut().zip(stack.chunks_exact(Lse::LEN)) {
            *slot = Lse(u32::from_be_bytes([lse[0], lse[1], lse[2], lse[3]]));
        }
        if n > FLOW_MAX_MPLS_LABELS {
            debug!("{n} mpls labels, only {FLOW_MAX_MPLS_LABELS} are supported");
            return Fitness::TooMuch;
        }
        if !is_mask {
            if flow.mpls_lse[..n - 1].iter().any(|lse| lse.bos()) {
                warn!("bottom of stack bit set above the innermost mpls label");
                return Fitness::Error;
            }
            if n < FLOW_MAX_MPLS_LABELS && !flow.mpls_lse[n - 1].bos() {
                return Fitness::TooLittle;
            }
        }
    }
    attrs.check(expected)
}

/// Everything below the ethertype: MPLS, then the network header, then the transport header.
fn parse_l2_5_onward(
    attrs: &KeyAttrs<'_>,
    mut expected: u64,
    flow: &mut Flow,
    src: Option<&Flow>,
) -> Fitness {
    let is_mask = src.is_some();
    let dl_type = src.map_or(flow.dl_type, |key| key.dl_type);
    // the network attribute of a mask, and whether any of its bits are set
    let mut l3_mask = None;

    match dl_type {
        t if t.is_mpls() => return parse_mpls(attrs, expected, flow, is_mask),
        EthType::IPV4 => {
            if !is_mask {
                expected |= bit(OvsKeyAttr::Ipv4);
            }
            if let Some(ip) = attrs.payload::<KeyIpv4>(OvsKeyAttr::Ipv4) {
                if !is_mask && ip.frag > frag::LATER {
                    warn!("invalid frag {} in flow key", ip.frag);
                    return Fitness::Error;
                }
                ip.put(flow, is_mask);
                l3_mask = Some(OvsKeyAttr::Ipv4);
            }
        }
        EthType::IPV6 => {
            if !is_mask {
                expected |= bit(OvsKeyAttr::Ipv6);
            }
            if let Some(ip) = attrs.payload::<KeyIpv6>(OvsKeyAttr::Ipv6) {
                if !is_mask && ip.frag > frag::LATER {
                    warn!("invalid frag {} in flow key", ip.frag);
                    return Fitness::Error;
                }
                ip.put(flow, is_mask);
                l3_mask = Some(OvsKeyAttr::Ipv6);
            }
        }
        EthType::ARP | EthType::RARP => {
            if !is_mask {
                expected |= bit(OvsKeyAttr::Arp);
            }
            if let Some(arp) = attrs.payload::<KeyArp>(OvsKeyAttr::Arp) {
                if !is_mask && arp.op > 0xff {
                    warn!("unsupported ARP opcode {} in flow key", arp.op);
                    return Fitness::Error;
                }
                arp.put(flow);
                l3_mask = Some(OvsKeyAttr::Arp);
            }
        }
        _ => return attrs.check(expected),
    }

    if let (true, Some(attr)) = (is_mask, l3_mask) {
        let nonzero = attrs.get(attr).is_some_and(|a| !is_all_zeros(a.payload()));
        if nonzero && flow.dl_type != EthType::EXACT {
            debug!("{} mask without an exact ethertype mask", attr.name());
            return Fitness::Error;
        }
        expected |= bit(attr);
    }

    let (proto, dl_type, later) = {
        let key = src.unwrap_or(&*flow);
        (key.nw_proto, key.dl_type, key.nw_frag.contains(FragFlags::LATER))
    };
    if !dl_type.is_ip_any() || later {
        return attrs.check(expected);
    }

    let mut l4 = None;
    match proto {
        IPPROTO_TCP | IPPROTO_UDP | IPPROTO_SCTP => {
            let attr = match proto {
                IPPROTO_TCP => OvsKeyAttr::Tcp,
                IPPROTO_UDP => OvsKeyAttr::Udp,
                _ => OvsKeyAttr::Sctp,
            };
            if !is_mask {
                expected |= bit(attr);
            }
            if let Some(ports) = attrs.payload::<KeyPorts>(attr) {
                ports.put(flow);
                l4 = Some(attr);
            }
            if proto == IPPROTO_TCP {
                if let Some(flags) = attrs.be16(OvsKeyAttr::TcpFlags) {
                    expected |= bit(OvsKeyAttr::TcpFlags);
                    flow.tcp_flags = TcpFlags::from_bits_retain(flags);
                }
            }
        }
        IPPROTO_ICMP if dl_type == EthType::IPV4 => {
            if !is_mask {
                expected |= bit(OvsKeyAttr::Icmp);
            }
            if let Some(icmp) = attrs.payload::<KeyIcmp>(OvsKeyAttr::Icmp) {
                icmp.put(flow);
                l4 = Some(OvsKeyAttr::Icmp);
            }
        }
        IPPROTO_ICMPV6 if dl_type == EthType::IPV6 => {
            if !is_mask {
                expected |= bit(OvsKeyAttr::Icmpv6);
            }
            if let Some(icmp) = attrs.payload::<KeyIcmp>(OvsKeyAttr::Icmpv6) {
                icmp.put(flow);
                l4 = Some(OvsKeyAttr::Icmpv6);
                if is_nd(src.unwrap_or(&*flow)) {
                    if !is_mask {
                        expected |= bit(OvsKeyAttr::Nd);
                    }
                    if let Some(attr) = attrs.get(OvsKeyAttr::Nd) {
                        KeyNd::from_payload(attr.payload())
                            .unwrap_or_default()
                            .put(flow);
                        if is_mask {
                            if !is_all_zeros(attr.payload())
                                && (flow.tp_src != u16::MAX || flow.tp_dst != u16::MAX)
                            {
                                debug!("nd mask without exact icmpv6 type and code masks");
                                return Fitness::Error;
                            }
                            expected |= bit(OvsKeyAttr::Nd);
                        }
                    }
                }
            }
        }
        _ => {}
    }

    if let (true, Some(attr)) = (is_mask, l4) {
        if (flow.tp_src != 0 || flow.tp_dst != 0) && flow.nw_proto != u8::MAX {
            debug!("{} mask without an exact protocol mask", attr.name());
            return Fitness::Error;
        }
        expected |= bit(attr);
    }
    attrs.check(expected)
}

/// The VLAN tag, then the encapsulated frame.
fn parse_8021q_onward(
    attrs: &KeyAttrs<'_>,
    mut expected: u64,
    flow: &mut Flow,
    src: Option<&Flow>,
) -> Fitness {
    let is_mask = src.is_some();
    let encap = attrs.get(OvsKeyAttr::Encap);

    if is_mask {
        for attr in [OvsKeyAttr::Vlan, OvsKeyAttr::Encap] {
            if attrs.has(attr) {
                expected |= bit(attr);
            }
        }
    } else {
        expected |= bit(OvsKeyAttr::Vlan) | bit(OvsKeyAttr::Encap);
    }
    let fitness = attrs.check(expected);

    // the TPID is not the real ethertype
    flow.dl_type = EthType::ZERO;
    flow.vlan_tci = Tci(attrs.be16(OvsKeyAttr::Vlan).unwrap_or(0));
    if is_mask {
        if encap.is_none() {
            return fitness;
        }
    } else {
        if !attrs.has(OvsKeyAttr::Vlan) {
            return Fitness::TooLittle;
        }
        if flow.vlan_tci == Tci(0) {
            // a truncated 802.1Q header
            if fitness == Fitness::Perfect && encap.is_some_and(|e| !e.is_empty()) {
                return Fitness::TooMuch;
            }
            return fitness;
        }
        if !flow.vlan_tci.cfi() {
            warn!(
                "vlan tci {:#06x} is nonzero but CFI bit is not set",
                flow.vlan_tci.raw()
            );
            return Fitness::Error;
        }
    }

    let Some(inner) = KeyAttrs::parse(encap.map_or(&[][..], |e| e.payload())) else {
        return Fitness::Error;
    };
    let mut expected = 0;
    if !parse_ethertype(&inner, &mut expected, flow, src) {
        return Fitness::Error;
    }
    let encap_fitness = parse_l2_5_onward(&inner, expected, flow, src);
    fitness.max(encap_fitness)
}

fn key_to_flow(key: &[u8], flow: &mut Flow, src: Option<&Flow>) -> Fitness {
    let is_mask = src.is_some();
    let Some(attrs) = KeyAttrs::parse(key) else {
        return Fitness::Error;
    };
    let mut expected = 0;

    if let Some(id) = attrs.be32(OvsKeyAttr::RecircId) {
        flow.recirc_id = id;
        expected |= bit(OvsKeyAttr::RecircId);
    } else if is_mask {
        // an unspecified recirculation id is matched exactly
        flow.recirc_id = u32::MAX;
    }
    if let Some(hash) = attrs.be32(OvsKeyAttr::DpHash) {
        flow.dp_hash = hash;
        expected |= bit(OvsKeyAttr::DpHash);
    }
    if let Some(priority) = attrs.be32(OvsKeyAttr::Priority) {
        flow.skb_priority = priority;
        expected |= bit(OvsKeyAttr::Priority);
    }
    if let Some(mark) = attrs.be32(OvsKeyAttr::SkbMark) {
        flow.pkt_mark = mark;
        expected |= bit(OvsKeyAttr::SkbMark);
    }
    if let Some(attr) = attrs.get(OvsKeyAttr::Tunnel) {
        let (tunnel, fitness) = odp_tun_key_from_attr(&attr);
        match fitness {
            Fitness::Error => return Fitness::Error,
            Fitness::Perfect => expected |= bit(OvsKeyAttr::Tunnel),
            Fitness::TooMuch | Fitness::TooLittle => {}
        }
        flow.tunnel = tunnel;
    }
    if let Some(port) = attrs.be32(OvsKeyAttr::InPort) {
        flow.in_port = port;
        expected |= bit(OvsKeyAttr::InPort);
    } else if !is_mask {
        flow.in_port = ODPP_NONE;
    }

    let mut packet_ethertype = None;
    if let Some(eth) = attrs.payload::<KeyEthernet>(OvsKeyAttr::Ethernet) {
        eth.put(flow);
        flow.base_layer = BaseLayer::L2;
        expected |= bit(OvsKeyAttr::Ethernet);
    } else {
        flow.base_layer = BaseLayer::L3;
        packet_ethertype = attrs.be16(OvsKeyAttr::PacketEthertype);
    }
    if let Some(src) = src {
        // the base layer is never wildcarded: a mask matches exactly the layer of its flow
        flow.base_layer = src.base_layer;
    }

    if let Some(raw) = packet_ethertype {
        flow.dl_type = EthType::new(raw);
        expected |= bit(OvsKeyAttr::PacketEthertype);
    } else if !parse_ethertype(&attrs, &mut expected, flow, src) {
        return Fitness::Error;
    }

    let tagged = match src {
        Some(key) => key.vlan_tci.cfi(),
        None => flow.dl_type == EthType::VLAN,
    };
    if tagged {
        return parse_8021q_onward(&attrs, expected, flow, src);
    }
    if is_mask {
        flow.vlan_tci = Tci::EXACT;
        if let Some(tci) = attrs.be16(OvsKeyAttr::Vlan) {
            flow.vlan_tci = Tci(tci);
            expected |= bit(OvsKeyAttr::Vlan);
        }
    }
    parse_l2_5_onward(&attrs, expected, flow, src)
}

/// Decode a flow key.
///
/// The fitness tells how well `key` matched what a key for the resulting flow should carry.
/// On [`Fitness::Error`] the flow is meaningless.
#[must_use]
pub fn odp_flow_key_to_flow(key: &[u8]) -> (Flow, Fitness) {
    let mut flow = Flow::default();
    let fitness = key_to_flow(key, &mut flow, None);
    (flow, fitness)
}

/// Decode the mask `mask_key` of the key that decoded to `flow`.
///
/// The base layer is never wildcarded, so the mask carries the base layer of `flow`.
#[must_use]
pub fn odp_flow_key_to_mask(mask_key: &[u8], flow: &Flow) -> (Flow, Fitness) {
    let mut mask = Flow::default();
    let fitness = key_to_flow(mask_key, &mut mask, Some(flow));
    (mask, fitness)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::attr::AttrWriter;
    use crate::key::encode::{ND_NEIGHBOR_SOLICIT, odp_flow_key_from_flow, odp_flow_key_from_mask};
    use crate::key::{EncodeOptions, EncodeOptionsBuilder};
    use net::eth::mac::Mac;
    use pretty_assertions::assert_eq;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn encode(flow: &Flow) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, flow, &EncodeOptions::default()).unwrap();
        w.into_bytes()
    }

    fn encode_mask(mask: &Flow, flow: &Flow) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_flow_key_from_mask(&mut w, mask, flow, &EncodeOptions::default()).unwrap();
        w.into_bytes()
    }

    fn ipv4(proto: u8) -> Flow {
        Flow {
            in_port: 1,
            dl_src: Mac([0x02, 0, 0, 0, 0, 1]),
            dl_dst: Mac([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(192, 168, 1, 1),
            nw_dst: Ipv4Addr::new(192, 168, 1, 2),
            nw_proto: proto,
            nw_tos: 0x10,
            nw_ttl: 63,
            tp_src: 80,
            tp_dst: 33000,
            ..Flow::default()
        }
    }

    fn shapes() -> Vec<(&'static str, Flow)> {
        let tcp = Flow {
            tcp_flags: TcpFlags::SYN | TcpFlags::ACK,
            ..ipv4(IPPROTO_TCP)
        };
        let no_l2 = Flow {
            base_layer: BaseLayer::L3,
            dl_src: Mac::ZERO,
            dl_dst: Mac::ZERO,
            ..ipv4(IPPROTO_UDP)
        };
        let nd = Flow {
            dl_type: EthType::IPV6,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            ipv6_src: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            ipv6_dst: Ipv6Addr::new(0xff02, 0, 0, 0, 0, 1, 0xff00, 2),
            ipv6_label: 0x12345,
            nw_proto: IPPROTO_ICMPV6,
            nw_ttl: 255,
            tp_src: ND_NEIGHBOR_SOLICIT,
            tp_dst: 0,
            nd_target: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2),
            arp_sha: Mac([0x02, 0, 0, 0, 0, 9]),
            ..ipv4(IPPROTO_ICMPV6)
        };
        let arp = Flow {
            dl_type: EthType::ARP,
            nw_proto: 1,
            nw_tos: 0,
            nw_ttl: 0,
            tp_src: 0,
            tp_dst: 0,
            arp_sha: Mac([0x02, 0, 0, 0, 0, 1]),
            ..ipv4(1)
        };
        let vlan = Flow {
            vlan_tci: Tci::from_parts(100, 5, true),
            ..ipv4(IPPROTO_UDP)
        };
        let mpls = Flow {
            in_port: 1,
            dl_type: EthType::MPLS,
            mpls_lse: [
                Lse::from_parts(100, 1, false, 64),
                Lse::from_parts(200, 0, true, 64),
                Lse(0),
            ],
            ..Flow::default()
        };
        let icmp = Flow {
            tp_src: 8,
            tp_dst: 0,
            ..ipv4(IPPROTO_ICMP)
        };
        vec![
            ("tcp", tcp),
            ("udp", ipv4(IPPROTO_UDP)),
            ("sctp", ipv4(IPPROTO_SCTP)),
            ("icmp", icmp),
            ("no l2", no_l2),
            ("nd", nd),
            ("arp", arp),
            ("vlan", vlan),
            ("mpls", mpls),
        ]
    }

    #[test]
    fn round_trip_is_perfect() {
        for (name, flow) in shapes() {
            let (decoded, fitness) = odp_flow_key_to_flow(&encode(&flow));
            assert_eq!(fitness, Fitness::Perfect, "{name}");
            assert_eq!(decoded, flow, "{name}");
        }
    }

    #[test]
    fn tcp_five_tuple() {
        let flow = ipv4(IPPROTO_TCP);
        let (decoded, fitness) = odp_flow_key_to_flow(&encode(&flow));
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(decoded.dl_dst, "11:22:33:44:55:66".parse::<Mac>().unwrap());
        assert_eq!(
            (decoded.nw_src, decoded.nw_dst, decoded.nw_proto),
            (flow.nw_src, flow.nw_dst, IPPROTO_TCP)
        );
        assert_eq!((decoded.tp_src, decoded.tp_dst), (80, 33000));
    }

    #[test]
    fn recirc_fields_round_trip() {
        let flow = Flow {
            recirc_id: 7,
            dp_hash: 0xabcd,
            skb_priority: 3,
            pkt_mark: 4,
            ..ipv4(IPPROTO_UDP)
        };
        let opts = EncodeOptionsBuilder::default().recirc(true).build().unwrap();
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &opts).unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()), (flow, Fitness::Perfect));
    }

    #[test]
    fn missing_in_port_reads_as_none() {
        let flow = Flow {
            in_port: ODPP_NONE,
            ..ipv4(IPPROTO_UDP)
        };
        let (decoded, fitness) = odp_flow_key_to_flow(&encode(&flow));
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(decoded.in_port, ODPP_NONE);
    }

    #[test]
    fn extra_or_missing_attributes_never_improve_fitness() {
        for (name, flow) in shapes() {
            let key = encode(&flow);

            let mut extra = AttrWriter::new();
            extra.put_be32(40, 0).unwrap();
            let mut more = key.clone();
            more.extend_from_slice(extra.as_bytes());
            assert!(odp_flow_key_to_flow(&more).1 >= Fitness::TooMuch, "{name}");

            // dropping the most specific attribute loses something required (TCP flags are
            // optional)
            let mut attrs: Vec<_> = Attrs::new(&key).map(Result::unwrap).collect();
            let pos = attrs
                .iter()
                .rposition(|a| a.ty() != OvsKeyAttr::TcpFlags.ty())
                .unwrap();
            let last = attrs.remove(pos);
            let mut w = AttrWriter::new();
            for a in &attrs {
                w.put_unspec(a.ty(), a.payload()).unwrap();
            }
            let fitness = odp_flow_key_to_flow(w.as_bytes()).1;
            assert_ne!(fitness, Fitness::Perfect, "{name} without {}", last.ty());
        }
    }

    #[test]
    fn unexpected_transport_attribute_is_too_much() {
        let mut key = encode(&ipv4(IPPROTO_TCP));
        let mut w = AttrWriter::new();
        w.put_unspec(OvsKeyAttr::Udp.ty(), &[0, 1, 0, 2]).unwrap();
        key.extend_from_slice(w.as_bytes());
        assert_eq!(odp_flow_key_to_flow(&key).1, Fitness::TooMuch);
    }

    #[test]
    fn missing_transport_attribute_is_too_little() {
        let mut w = AttrWriter::new();
        w.put_unspec(OvsKeyAttr::Ethernet.ty(), &[0; 12]).unwrap();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x0800).unwrap();
        w.put_unspec(
            OvsKeyAttr::Ipv4.ty(),
            &[1, 1, 1, 1, 2, 2, 2, 2, IPPROTO_TCP, 0, 64, 0],
        )
        .unwrap();
        let (flow, fitness) = odp_flow_key_to_flow(w.as_bytes());
        assert_eq!(fitness, Fitness::TooLittle);
        assert_eq!(flow.nw_proto, IPPROTO_TCP);
    }

    #[test]
    fn ethertype_is_guessed() {
        let mut w = AttrWriter::new();
        w.put_unspec(OvsKeyAttr::Ethernet.ty(), &[0; 12]).unwrap();
        w.put_unspec(OvsKeyAttr::Ipv6.ty(), &[0; 40]).unwrap();
        let (flow, fitness) = odp_flow_key_to_flow(w.as_bytes());
        assert_eq!(flow.dl_type, EthType::IPV6);
        assert_eq!(fitness, Fitness::Perfect);

        let mut w = AttrWriter::new();
        w.put_unspec(OvsKeyAttr::Ethernet.ty(), &[0; 12]).unwrap();
        w.put_unspec(OvsKeyAttr::Mpls.ty(), &Lse::from_parts(1, 0, true, 1).to_be_bytes())
            .unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()).0.dl_type, EthType::MPLS);

        let mut w = AttrWriter::new();
        w.put_unspec(OvsKeyAttr::Ethernet.ty(), &[0; 12]).unwrap();
        let (flow, fitness) = odp_flow_key_to_flow(w.as_bytes());
        assert_eq!(flow.dl_type, EthType::NONE);
        assert_eq!(fitness, Fitness::Perfect);
    }

    #[test]
    fn malformed_keys_are_errors() {
        let key = encode(&ipv4(IPPROTO_UDP));

        let mut dup = key.clone();
        let mut w = AttrWriter::new();
        w.put_be32(OvsKeyAttr::SkbMark.ty(), 1).unwrap();
        dup.extend_from_slice(w.as_bytes());
        assert_eq!(odp_flow_key_to_flow(&dup).1, Fitness::Error);

        let mut trailing = key.clone();
        trailing.extend_from_slice(&[8, 0]);
        assert_eq!(odp_flow_key_to_flow(&trailing).1, Fitness::Error);

        let mut w = AttrWriter::new();
        w.put_be32(OvsKeyAttr::Ethertype.ty(), 0x0800).unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()).1, Fitness::Error);

        let mut w = AttrWriter::new();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x0100).unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()).1, Fitness::Error);
    }

    #[test]
    fn bad_frag_and_arp_opcode() {
        let mut w = AttrWriter::new();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x0800).unwrap();
        w.put_unspec(OvsKeyAttr::Ipv4.ty(), &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3])
            .unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()).1, Fitness::Error);

        let arp = KeyArp {
            op: 0x100,
            ..KeyArp::default()
        };
        let mut w = AttrWriter::new();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x0806).unwrap();
        w.put_unspec(OvsKeyAttr::Arp.ty(), &arp.to_bytes()).unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()).1, Fitness::Error);
    }

    fn tagged(tci: Option<u16>, encap: &[u8]) -> Vec<u8> {
        let mut w = AttrWriter::new();
        w.put_unspec(OvsKeyAttr::Ethernet.ty(), &[0; 12]).unwrap();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x8100).unwrap();
        if let Some(tci) = tci {
            w.put_be16(OvsKeyAttr::Vlan.ty(), tci).unwrap();
        }
        w.put_unspec(OvsKeyAttr::Encap.ty(), encap).unwrap();
        w.into_bytes()
    }

    #[test]
    fn vlan_corner_cases() {
        let mut inner = AttrWriter::new();
        inner.put_be16(OvsKeyAttr::Ethertype.ty(), 0x0806).unwrap();
        inner.put_unspec(OvsKeyAttr::Arp.ty(), &[0; 24]).unwrap();
        let inner = inner.into_bytes();

        let (flow, fitness) = odp_flow_key_to_flow(&tagged(Some(0x1005), &inner));
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(flow.dl_type, EthType::ARP);
        assert_eq!(flow.vlan_tci.vid(), 5);

        assert_eq!(odp_flow_key_to_flow(&tagged(Some(0x0005), &inner)).1, Fitness::Error);
        assert_eq!(odp_flow_key_to_flow(&tagged(None, &inner)).1, Fitness::TooLittle);
        // truncated 802.1Q header
        assert_eq!(odp_flow_key_to_flow(&tagged(Some(0), &inner)).1, Fitness::TooMuch);
        assert_eq!(odp_flow_key_to_flow(&tagged(Some(0), &[])).1, Fitness::Perfect);
    }

    fn mpls_key(stack: &[Lse]) -> Vec<u8> {
        let bytes: Vec<u8> = stack.iter().flat_map(|l| l.to_be_bytes()).collect();
        let mut w = AttrWriter::new();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x8847).unwrap();
        w.put_unspec(OvsKeyAttr::Mpls.ty(), &bytes).unwrap();
        w.into_bytes()
    }

    #[test]
    fn mpls_stack_rules() {
        let top = Lse::from_parts(1, 0, false, 1);
        let bottom = Lse::from_parts(2, 0, true, 1);
        assert_eq!(odp_flow_key_to_flow(&mpls_key(&[top, bottom])).1, Fitness::Perfect);
        assert_eq!(odp_flow_key_to_flow(&mpls_key(&[bottom, top])).1, Fitness::Error);
        assert_eq!(odp_flow_key_to_flow(&mpls_key(&[top, top])).1, Fitness::TooLittle);
        // a full stack does not need to reach the bottom
        assert_eq!(odp_flow_key_to_flow(&mpls_key(&[top; 3])).1, Fitness::Perfect);
        let (flow, fitness) = odp_flow_key_to_flow(&mpls_key(&[top, top, top, bottom]));
        assert_eq!(fitness, Fitness::TooMuch);
        assert_eq!(flow.mpls_lse, [top; 3]);

        let mut w = AttrWriter::new();
        w.put_be16(OvsKeyAttr::Ethertype.ty(), 0x8847).unwrap();
        w.put_unspec(OvsKeyAttr::Mpls.ty(), &[0; 6]).unwrap();
        assert_eq!(odp_flow_key_to_flow(w.as_bytes()).1, Fitness::Error);
    }

    #[test]
    fn unknown_tunnel_option_is_too_much() {
        let mut flow = ipv4(IPPROTO_UDP);
        flow.tunnel.ip_dst = Ipv4Addr::new(1, 1, 1, 1);
        flow.tunnel.ip_ttl = 64;
        flow.tunnel.geneve = arrayvec::ArrayVec::try_from(&[0, 1, 2, 0][..]).unwrap();
        let (decoded, fitness) = odp_flow_key_to_flow(&encode(&flow));
        assert_eq!(fitness, Fitness::TooMuch);
        assert_eq!(decoded, flow);
    }

    fn tcp_mask() -> Flow {
        Flow {
            in_port: u32::MAX,
            recirc_id: u32::MAX,
            dl_dst: Mac::BROADCAST,
            dl_type: EthType::EXACT,
            vlan_tci: Tci::EXACT,
            nw_src: Ipv4Addr::new(255, 255, 255, 0),
            nw_proto: u8::MAX,
            nw_frag: FragFlags::all(),
            tp_dst: u16::MAX,
            ..Flow::default()
        }
    }

    #[test]
    fn mask_round_trip() {
        let flow = ipv4(IPPROTO_TCP);
        let mask = tcp_mask();
        let (decoded, fitness) = odp_flow_key_to_mask(&encode_mask(&mask, &flow), &flow);
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(decoded, mask);
    }

    #[test]
    fn mask_consistency_is_checked() {
        let flow = ipv4(IPPROTO_TCP);

        let loose_ethertype = Flow {
            dl_type: EthType::new(0xff00),
            ..tcp_mask()
        };
        let (_, fitness) = odp_flow_key_to_mask(&encode_mask(&loose_ethertype, &flow), &flow);
        assert_eq!(fitness, Fitness::Error);

        let loose_proto = Flow {
            nw_proto: 0x0f,
            ..tcp_mask()
        };
        let (_, fitness) = odp_flow_key_to_mask(&encode_mask(&loose_proto, &flow), &flow);
        assert_eq!(fitness, Fitness::Error);

        // nothing to match in L3 and L4 needs no exact selectors
        let wide = Flow {
            dl_type: EthType::ZERO,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_proto: 0,
            nw_frag: FragFlags::empty(),
            tp_dst: 0,
            ..tcp_mask()
        };
        let (decoded, fitness) = odp_flow_key_to_mask(&encode_mask(&wide, &flow), &flow);
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(decoded, wide);
    }

    #[test]
    fn mask_defaults() {
        let flow = ipv4(IPPROTO_UDP);
        let (mask, fitness) = odp_flow_key_to_mask(&[], &flow);
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(mask.recirc_id, u32::MAX);
        assert_eq!(mask.vlan_tci, Tci::EXACT);
        assert_eq!(mask.in_port, 0);
    }

    #[test]
    fn masks_keep_the_base_layer_of_their_flow() {
        let flow = Flow {
            base_layer: BaseLayer::L3,
            dl_src: Mac::ZERO,
            dl_dst: Mac::ZERO,
            ..ipv4(IPPROTO_TCP)
        };
        let (mask, fitness) = odp_flow_key_to_mask(&encode_mask(&tcp_mask(), &flow), &flow);
        assert_eq!(fitness, Fitness::Perfect);
        assert_eq!(mask.base_layer, BaseLayer::L3);
        assert_eq!(mask.dl_type, EthType::EXACT);

        // an empty mask has no Ethernet attribute, yet still belongs to an Ethernet flow
        let flow = ipv4(IPPROTO_TCP);
        let (mask, _) = odp_flow_key_to_mask(&[], &flow);
        assert_eq!(mask.base_layer, BaseLayer::L2);
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        bolero::check!().with_type::<Vec<u8>>().for_each(|bytes| {
            let (flow, _) = odp_flow_key_to_flow(bytes);
            let _ = odp_flow_key_to_mask(bytes, &flow);
        });
    }
}
