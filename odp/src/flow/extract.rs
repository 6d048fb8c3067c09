// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Build a [`Flow`] from a parsed packet.

use crate::flow::{FragFlags, Flow, PktMetadata, TcpFlags};
use net::buffer::PacketBufferMut;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::ip::{IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_TCP, l4};
use net::packet::{Fragment, Packet, has_ports};
use net::vlan::Tci;
use std::net::Ipv6Addr;
use tracing::trace;

const ND_NEIGHBOR_SOLICIT: u8 = 135;
const ND_NEIGHBOR_ADVERT: u8 = 136;
const ND_OPT_SOURCE_LINKADDR: u8 = 1;
const ND_OPT_TARGET_LINKADDR: u8 = 2;
const ND_MSG_LEN: usize = 24;

fn frag_flags(frag: Fragment) -> FragFlags {
    match frag {
        Fragment::No => FragFlags::empty(),
        Fragment::First => FragFlags::ANY,
        Fragment::Later => FragFlags::ANY | FragFlags::LATER,
    }
}

/// The flow of `packet`, with its metadata taken from `md`.
#[must_use]
pub fn flow_extract<Buf: PacketBufferMut>(packet: &Packet<Buf>, md: &PktMetadata) -> Flow {
    let layers = packet.layers();
    let mut flow = Flow {
        tunnel: md.tunnel.clone(),
        skb_priority: md.skb_priority,
        pkt_mark: md.pkt_mark,
        recirc_id: md.recirc_id,
        dp_hash: md.dp_hash,
        in_port: md.in_port,
        base_layer: packet.base_layer(),
        dl_type: layers.dl_type,
        ..Flow::default()
    };

    if let Some((src, dst)) = packet.eth_addrs() {
        flow.dl_src = src;
        flow.dl_dst = dst;
    }
    if let Some(tci) = packet.vlan_tci() {
        flow.vlan_tci = Tci(tci.raw() | Tci::CFI);
    }
    if packet.is_mpls() {
        for (slot, lse) in flow.mpls_lse.iter_mut().zip(packet.mpls_stack()) {
            *slot = lse;
        }
        return flow;
    }

    match layers.dl_type {
        EthType::IPV4 => {
            if let Some(ip) = packet.ipv4_fields() {
                flow.nw_src = ip.src;
                flow.nw_dst = ip.dst;
                flow.nw_tos = ip.tos;
                flow.nw_ttl = ip.ttl;
                flow.nw_proto = layers.nw_proto;
                flow.nw_frag = frag_flags(layers.frag);
            }
        }
        EthType::IPV6 => {
            if let Some(ip) = packet.ipv6_fields() {
                flow.ipv6_src = ip.src;
                flow.ipv6_dst = ip.dst;
                flow.ipv6_label = ip.label;
                flow.nw_tos = ip.tclass;
                flow.nw_ttl = ip.hlimit;
                flow.nw_proto = layers.nw_proto;
                flow.nw_frag = frag_flags(layers.frag);
            }
        }
        EthType::ARP | EthType::RARP => {
            if let Some(arp) = packet.arp_fields() {
                if let Ok(op) = u8::try_from(arp.op) {
                    flow.nw_proto = op;
                }
                flow.nw_src = arp.spa;
                flow.nw_dst = arp.tpa;
                flow.arp_sha = arp.sha;
                flow.arp_tha = arp.tha;
            }
            return flow;
        }
        _ => return flow,
    }

    let Some(l4) = packet.l4() else {
        return flow;
    };
    let proto = flow.nw_proto;
    if has_ports(proto) {
        if let Some((src, dst)) = packet.ports() {
            flow.tp_src = src;
            flow.tp_dst = dst;
        }
        if proto == IPPROTO_TCP && l4.len() >= l4::TCP_HEADER_LEN {
            let word = u16::from_be_bytes([l4[l4::TCP_CTL_OFFSET], l4[l4::TCP_CTL_OFFSET + 1]]);
            flow.tcp_flags = TcpFlags::from_bits_retain(word & TcpFlags::MASK);
        }
    } else if l4.len() >= l4::ICMP_HEADER_LEN
        && ((proto == IPPROTO_ICMP && flow.dl_type == EthType::IPV4)
            || (proto == IPPROTO_ICMPV6 && flow.dl_type == EthType::IPV6))
    {
        flow.tp_src = u16::from(l4[0]);
        flow.tp_dst = u16::from(l4[1]);
        if proto == IPPROTO_ICMPV6 {
            extract_nd(l4, &mut flow);
        }
    }
    flow
}

fn extract_nd(icmp: &[u8], flow: &mut Flow) {
    if icmp[1] != 0
        || !matches!(icmp[0], ND_NEIGHBOR_SOLICIT | ND_NEIGHBOR_ADVERT)
        || icmp.len() < ND_MSG_LEN
    {
        return;
    }
    let mut target = [0u8; 16];
    target.copy_from_slice(&icmp[8..ND_MSG_LEN]);
    flow.nd_target = Ipv6Addr::from(target);

    let mut options = &icmp[ND_MSG_LEN..];
    while let [ty, len, ..] = *options {
        let opt_len = usize::from(len) * 8;
        if opt_len == 0 || opt_len > options.len() {
            trace!("malformed neighbor discovery option");
            break;
        }
        if opt_len == 8 {
            let mut lladdr = [0u8; 6];
            lladdr.copy_from_slice(&options[2..8]);
            match ty {
                ND_OPT_SOURCE_LINKADDR if flow.arp_sha.is_zero() => flow.arp_sha = Mac(lladdr),
                ND_OPT_TARGET_LINKADDR if flow.arp_tha.is_zero() => flow.arp_tha = Mac(lladdr),
                _ => {}
            }
        }
        options = &options[opt_len..];
    }
}
