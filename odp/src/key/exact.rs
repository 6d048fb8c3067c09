// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Whether a mask attribute matches every bit of its key.

use crate::attr::Attr;
use crate::flow::{FlowTnl, TcpFlags, TnlFlags};
use crate::key::tunnel::odp_tun_key_from_attr;
use crate::key::{KeyArp, KeyIpv6, KeyPayload, OvsKeyAttr};
use net::ip::ipv6::LABEL_MASK;

/// True if every byte is zero.
#[must_use]
pub fn is_all_zeros(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

fn is_all_ones(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == u8::MAX)
}

/// True if a tunnel mask matches every tunnel field.  Geneve options are not considered.
#[must_use]
pub fn tun_mask_is_exact(mask: &FlowTnl) -> bool {
    mask.flags == TnlFlags::all()
        && mask.tun_id == u64::MAX
        && mask.ip_src.to_bits() == u32::MAX
        && mask.ip_dst.to_bits() == u32::MAX
        && mask.ip_tos == u8::MAX
        && mask.ip_ttl == u8::MAX
        && mask.tp_src == u16::MAX
        && mask.tp_dst == u16::MAX
}

/// True if the `attr` mask payload `mask` leaves no bit wildcarded.
///
/// Bits that carry no information (reserved bits of the flow label and of the TCP flags word,
/// the ARP padding) do not count.
#[must_use]
pub fn odp_mask_is_exact(attr: OvsKeyAttr, mask: &[u8]) -> bool {
    match attr {
        OvsKeyAttr::TcpFlags => match mask {
            &[hi, lo] => u16::from_be_bytes([hi, lo]) & TcpFlags::MASK == TcpFlags::MASK,
            _ => false,
        },
        OvsKeyAttr::Ipv6 => KeyIpv6::from_payload(mask).is_some_and(|ip| {
            ip.label & LABEL_MASK == LABEL_MASK
                && ip.proto == u8::MAX
                && ip.tclass == u8::MAX
                && ip.hlimit == u8::MAX
                && ip.frag == u8::MAX
                && ip.src.to_bits() == u128::MAX
                && ip.dst.to_bits() == u128::MAX
        }),
        OvsKeyAttr::Tunnel => {
            let (tun, _) = odp_tun_key_from_attr(&Attr::new(attr.ty(), mask));
            tun_mask_is_exact(&tun)
        }
        OvsKeyAttr::Arp => {
            mask.len() == KeyArp::LEN && is_all_ones(&mask[..KeyArp::FIELDS_LEN])
        }
        _ => is_all_ones(mask),
    }
}

/// [`odp_mask_is_exact`] for a mask attribute.  Attributes of unknown type are never exact.
#[must_use]
pub fn odp_mask_attr_is_exact(mask: &Attr<'_>) -> bool {
    OvsKeyAttr::from_u16(mask.ty()).is_some_and(|attr| odp_mask_is_exact(attr, mask.payload()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::attr::{AttrWriter, Attrs};
    use crate::key::tunnel::tun_key_to_attr;
    use crate::key::KeyPorts;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn default_rule_is_all_ones() {
        assert!(odp_mask_is_exact(OvsKeyAttr::Priority, &[0xff; 4]));
        assert!(!odp_mask_is_exact(OvsKeyAttr::Priority, &[0xff, 0xff, 0xff, 0xfe]));
        let ports = KeyPorts {
            src: u16::MAX,
            dst: 0xff00,
        };
        assert!(!odp_mask_is_exact(OvsKeyAttr::Tcp, &ports.to_bytes()));
        assert!(is_all_zeros(&[0, 0, 0]));
        assert!(!is_all_zeros(&[0, 1]));
    }

    #[test]
    fn tcp_flags_ignore_reserved_bits() {
        assert!(odp_mask_is_exact(OvsKeyAttr::TcpFlags, &[0x0f, 0xff]));
        assert!(odp_mask_is_exact(OvsKeyAttr::TcpFlags, &[0xff, 0xff]));
        assert!(!odp_mask_is_exact(OvsKeyAttr::TcpFlags, &[0x0e, 0xff]));
        assert!(!odp_mask_is_exact(OvsKeyAttr::TcpFlags, &[0xff]));
    }

    #[test]
    fn ipv6_ignores_upper_label_bits() {
        let exact = KeyIpv6 {
            src: Ipv6Addr::from(u128::MAX),
            dst: Ipv6Addr::from(u128::MAX),
            label: LABEL_MASK,
            proto: u8::MAX,
            tclass: u8::MAX,
            hlimit: u8::MAX,
            frag: u8::MAX,
        };
        assert!(odp_mask_is_exact(OvsKeyAttr::Ipv6, &exact.to_bytes()));
        let short_label = KeyIpv6 {
            label: 0x7ffff,
            ..exact
        };
        assert!(!odp_mask_is_exact(OvsKeyAttr::Ipv6, &short_label.to_bytes()));
        let loose_dst = KeyIpv6 {
            dst: Ipv6Addr::new(0xffff, 0xffff, 0xffff, 0xffff, 0, 0, 0, 0),
            ..exact
        };
        assert!(!odp_mask_is_exact(OvsKeyAttr::Ipv6, &loose_dst.to_bytes()));
    }

    #[test]
    fn arp_ignores_padding() {
        let mut mask = [0xff; KeyArp::LEN];
        mask[22] = 0;
        mask[23] = 0;
        assert!(odp_mask_is_exact(OvsKeyAttr::Arp, &mask));
        mask[21] = 0;
        assert!(!odp_mask_is_exact(OvsKeyAttr::Arp, &mask));
    }

    #[test]
    fn tunnel_ignores_options() {
        let mut tun = FlowTnl {
            tun_id: u64::MAX,
            ip_src: Ipv4Addr::BROADCAST,
            ip_dst: Ipv4Addr::BROADCAST,
            flags: TnlFlags::all(),
            ip_tos: u8::MAX,
            ip_ttl: u8::MAX,
            tp_src: u16::MAX,
            tp_dst: u16::MAX,
            ..FlowTnl::default()
        };
        tun.geneve.push(0);
        tun.geneve.push(1);
        tun.geneve.push(2);
        tun.geneve.push(0);
        let mut w = AttrWriter::new();
        tun_key_to_attr(&mut w, &tun).unwrap();
        let attr = Attrs::new(w.as_bytes()).next().unwrap().unwrap();
        assert!(odp_mask_attr_is_exact(&attr));

        tun.ip_tos = 0xfc;
        let mut w = AttrWriter::new();
        tun_key_to_attr(&mut w, &tun).unwrap();
        let attr = Attrs::new(w.as_bytes()).next().unwrap().unwrap();
        assert!(!odp_mask_attr_is_exact(&attr));
    }

    #[test]
    fn unknown_attribute_is_not_exact() {
        assert!(!odp_mask_attr_is_exact(&Attr::new(60, &[0xff; 4])));
    }
}
