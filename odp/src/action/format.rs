// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Text form of action lists.
//!
//! Formatting works on the attribute form and never fails: a malformed action prints as its
//! raw bytes, so that anything found in a buffer can be shown in a log.

use crate::action::wire::userspace_from_attr;
use crate::action::{
    GreFlags, OVS_HASH_ALG_L4, OvsActionAttr, OvsSampleAttr, SlowPathReason, TnlL4, TnlPushData,
    UserspaceCookie,
};
use crate::attr::{Attr, Attrs};
use crate::key::{AttrLen, KeyIpv6, KeyPayload, OvsKeyAttr, format_key_attr, format_vlan_tci};
use crate::text::{format_flags, push_hex, push_hex_spaced};
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::mpls::Lse;
use net::vlan::Tci;
use std::fmt::Write;

fn be32(payload: &[u8]) -> u32 {
    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
}

fn be16(payload: &[u8]) -> u16 {
    u16::from_be_bytes([payload[0], payload[1]])
}

/// Format an action list.  An empty list is `drop`.
#[must_use]
pub fn format_odp_actions(actions: &[u8]) -> String {
    let mut out = String::new();
    format_actions(&mut out, actions);
    out
}

fn format_actions(out: &mut String, actions: &[u8]) {
    if actions.is_empty() {
        out.push_str("drop");
        return;
    }
    let mut attrs = Attrs::new(actions);
    let mut first = true;
    while let Some(Ok(a)) = attrs.next() {
        if !first {
            out.push(',');
        }
        first = false;
        format_action(out, &a);
    }
    let left = attrs.left();
    if left > 0 {
        if left == actions.len() {
            out.push_str("<empty>");
        }
        let _ = write!(out, ",***{left} leftover bytes*** (");
        push_hex(out, attrs.rest());
        out.push(')');
    }
}

fn format_generic(out: &mut String, a: &Attr<'_>) {
    let _ = write!(out, "action{}", a.ty());
    if !a.is_empty() {
        out.push('(');
        push_hex_spaced(out, a.payload());
        out.push(')');
    }
}

fn format_lse(out: &mut String, lse: Lse) {
    let _ = write!(
        out,
        "label={},tc={},ttl={},bos={}",
        lse.label(),
        lse.tc(),
        lse.ttl(),
        u8::from(lse.bos())
    );
}

fn format_action(out: &mut String, a: &Attr<'_>) {
    let Some(kind) = OvsActionAttr::from_u16(a.ty()) else {
        format_generic(out, a);
        return;
    };
    if let AttrLen::Fixed(expected) = kind.expected_len() {
        if a.len() != expected {
            let _ = write!(out, "bad length {}, expected {expected} for: ", a.len());
            format_generic(out, a);
            return;
        }
    }
    let p = a.payload();
    match kind {
        OvsActionAttr::Unspec => format_generic(out, a),
        OvsActionAttr::Output => {
            let _ = write!(out, "{}", be32(p));
        }
        OvsActionAttr::TunnelPop => {
            let _ = write!(out, "tnl_pop({})", be32(p));
        }
        OvsActionAttr::Recirc => {
            let _ = write!(out, "recirc({})", be32(p));
        }
        OvsActionAttr::TunnelPush => format_tnl_push(out, a),
        OvsActionAttr::Userspace => format_userspace(out, a),
        OvsActionAttr::Hash => {
            let (alg, basis) = (be32(p), be32(&p[4..]));
            if alg == OVS_HASH_ALG_L4 {
                let _ = write!(out, "hash(hash_l4({basis}))");
            } else {
                let _ = write!(out, "hash(Unknown hash algorithm({alg}))");
            }
        }
        OvsActionAttr::Set => {
            out.push_str("set(");
            match a.nested().next() {
                Some(Ok(inner)) => format_key_attr(out, &inner, None, true),
                _ => out.push_str("error"),
            }
            out.push(')');
        }
        OvsActionAttr::SetMasked => format_set_masked(out, a),
        OvsActionAttr::PushEth => {
            let _ = write!(
                out,
                "push_eth(src={},dst={},type=0x{:04x})",
                Mac([p[0], p[1], p[2], p[3], p[4], p[5]]),
                Mac([p[6], p[7], p[8], p[9], p[10], p[11]]),
                be16(&p[12..])
            );
        }
        OvsActionAttr::PopEth => out.push_str("pop_eth"),
        OvsActionAttr::PushVlan => {
            let tpid = be16(p);
            out.push_str("push_vlan(");
            if tpid != EthType::VLAN.raw() {
                let _ = write!(out, "tpid=0x{tpid:04x},");
            }
            format_vlan_tci(out, Tci(be16(&p[2..])), Tci::EXACT, true);
            out.push(')');
        }
        OvsActionAttr::PopVlan => out.push_str("pop_vlan"),
        OvsActionAttr::PushMpls => {
            out.push_str("push_mpls(");
            format_lse(out, Lse(be32(p)));
            let _ = write!(out, ",eth_type=0x{:x})", be16(&p[4..]));
        }
        OvsActionAttr::PopMpls => {
            let _ = write!(out, "pop_mpls(eth_type=0x{:x})", be16(p));
        }
        OvsActionAttr::Sample => format_sample(out, a),
    }
}

/// The value and mask halves print as one masked key attribute.
fn format_set_masked(out: &mut String, a: &Attr<'_>) {
    out.push_str("set(");
    match a.nested().next() {
        Some(Ok(inner)) => {
            let half = inner.len() / 2;
            if inner.ty() == OvsKeyAttr::Tunnel.ty()
                || inner.len() % 2 != 0
                || half > KeyIpv6::LEN
            {
                format_key_attr(out, &inner, None, false);
            } else {
                let (key, mask) = inner.payload().split_at(half);
                format_key_attr(
                    out,
                    &Attr::new(inner.ty(), key),
                    Some(&Attr::new(inner.ty(), mask)),
                    false,
                );
            }
        }
        _ => out.push_str("error"),
    }
    out.push(')');
}

fn format_userspace(out: &mut String, a: &Attr<'_>) {
    let Ok(userspace) = userspace_from_attr(a) else {
        out.push_str("userspace(error)");
        return;
    };
    let _ = write!(out, "userspace(pid={}", userspace.pid);
    match &userspace.cookie {
        Some(UserspaceCookie::Sflow { tci, output }) => {
            let _ = write!(
                out,
                ",sFlow(vid={},pcp={},output={output})",
                tci.vid(),
                tci.pcp()
            );
        }
        Some(UserspaceCookie::SlowPath(reason)) => {
            out.push_str(",slow_path(");
            format_flags(out, SlowPathReason::bit_name, reason.bits(), ',');
            out.push(')');
        }
        Some(UserspaceCookie::FlowSample {
            probability,
            collector_set_id,
            obs_domain_id,
            obs_point_id,
        }) => {
            let _ = write!(
                out,
                ",flow_sample(probability={probability},collector_set_id={collector_set_id},\
                 obs_domain_id={obs_domain_id},obs_point_id={obs_point_id})"
            );
        }
        Some(UserspaceCookie::Ipfix { output_port }) => {
            let _ = write!(out, ",ipfix(output_port={output_port})");
        }
        Some(UserspaceCookie::Opaque(data)) => {
            out.push_str(",userdata(");
            push_hex(out, data);
            out.push(')');
        }
        None => {}
    }
    if let Some(port) = userspace.tunnel_out_port {
        let _ = write!(out, ",tunnel_out_port={port}");
    }
    out.push(')');
}

fn format_sample(out: &mut String, a: &Attr<'_>) {
    out.push_str("sample");
    let mut probability = None;
    let mut actions = None;
    for inner in a.nested() {
        match inner {
            Ok(i) if i.ty() == OvsSampleAttr::Probability as u16 => {
                probability = i.get_be32().ok();
            }
            Ok(i) if i.ty() == OvsSampleAttr::Actions as u16 => actions = Some(i.payload()),
            _ => {
                probability = None;
                break;
            }
        }
    }
    let (Some(probability), Some(actions)) = (probability, actions) else {
        out.push_str("(error)");
        return;
    };
    let percentage = 100.0 * f64::from(probability) / f64::from(u32::MAX);
    let _ = write!(out, "(sample={percentage:.1}%,actions(");
    format_actions(out, actions);
    out.push_str("))");
}

fn format_tnl_push(out: &mut String, a: &Attr<'_>) {
    let Some((data, h)) = TnlPushData::from_payload(a.payload())
        .ok()
        .and_then(|data| data.parsed_header().map(|h| (data, h)))
    else {
        format_generic(out, a);
        return;
    };
    let _ = write!(
        out,
        "tnl_push(tnl_port({}),header(size={},type={},eth(dst={},src={},dl_type=0x{:04x}),\
         ipv4(src={},dst={},proto={},tos={:#x},ttl={},frag=0x{:x}),",
        data.tnl_port,
        data.header.len(),
        data.tnl_type,
        h.eth_dst,
        h.eth_src,
        h.eth_type.raw(),
        h.ip_src,
        h.ip_dst,
        h.ip_proto,
        h.ip_tos,
        h.ip_ttl,
        h.ip_frag_off
    );
    match h.l4 {
        TnlL4::Vxlan {
            udp_src,
            udp_dst,
            flags,
            vni,
        } => {
            let _ = write!(
                out,
                "udp(src={udp_src},dst={udp_dst}),vxlan(flags=0x{flags:x},vni=0x{vni:x})"
            );
        }
        TnlL4::Gre {
            flags,
            proto,
            csum,
            key,
            seq,
        } => {
            let _ = write!(out, "gre((flags=0x{:x},proto=0x{proto:x})", flags.bits());
            for (flag, name, word) in [
                (GreFlags::CSUM, "csum", csum),
                (GreFlags::KEY, "key", key),
                (GreFlags::SEQ, "seq", seq),
            ] {
                if flags.contains(flag) {
                    let _ = write!(out, ",{name}=0x{word:x}");
                }
            }
            out.push(')');
        }
    }
    let _ = write!(out, "),out_port({}))", data.out_port);
}
