// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Metadata-only keys.

use crate::Fitness;
use crate::ODPP_NONE;
use crate::attr::{AttrError, AttrWriter, Attrs};
use crate::flow::{FlowTnl, PktMetadata};
use crate::key::tunnel::{odp_tun_key_from_attr, tun_key_to_attr};
use crate::key::{AttrLen, OvsKeyAttr};
use ahash::AHasher;
use net::eth::ethtype::EthType;
use net::packet::BaseLayer;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

/// Append the attributes describing packet metadata.
///
/// An L3 packet also gets its out of band ethertype, so that the key says there is no Ethernet
/// header.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the writer is full.
pub fn odp_key_from_pkt_metadata(w: &mut AttrWriter, md: &PktMetadata) -> Result<(), AttrError> {
    w.put_be32(OvsKeyAttr::Priority.ty(), md.skb_priority)?;
    if !md.tunnel.ip_dst.is_unspecified() {
        tun_key_to_attr(w, &md.tunnel)?;
    }
    w.put_be32(OvsKeyAttr::SkbMark.ty(), md.pkt_mark)?;
    if md.in_port != ODPP_NONE {
        w.put_be32(OvsKeyAttr::InPort.ty(), md.in_port)?;
    }
    if md.base_layer == BaseLayer::L3 {
        w.put_be16(OvsKeyAttr::PacketEthertype.ty(), md.packet_ethertype.raw())?;
    }
    Ok(())
}

/// Read the metadata out of a key, ignoring everything else.
///
/// This is a best effort: attributes of the wrong size are skipped and a malformed tunnel reads
/// as no tunnel.
#[must_use]
pub fn odp_key_to_pkt_metadata(key: &[u8]) -> PktMetadata {
    let mut md = PktMetadata::default();
    let mut ethernet = false;
    let mut packet_ethertype = false;

    for attr in Attrs::new(key) {
        let attr = match attr {
            Ok(attr) => attr,
            Err(e) => {
                debug!("metadata key: {e}");
                break;
            }
        };
        let Some(kind) = OvsKeyAttr::from_u16(attr.ty()) else {
            continue;
        };
        if let AttrLen::Fixed(len) = kind.expected_len() {
            if attr.len() != len {
                debug!("metadata key: {} has length {}, expected {len}", kind.name(), attr.len());
                continue;
            }
        }
        match kind {
            OvsKeyAttr::RecircId => md.recirc_id = attr.get_be32().unwrap_or_default(),
            OvsKeyAttr::DpHash => md.dp_hash = attr.get_be32().unwrap_or_default(),
            OvsKeyAttr::Priority => md.skb_priority = attr.get_be32().unwrap_or_default(),
            OvsKeyAttr::SkbMark => md.pkt_mark = attr.get_be32().unwrap_or_default(),
            OvsKeyAttr::InPort => md.in_port = attr.get_be32().unwrap_or(ODPP_NONE),
            OvsKeyAttr::Tunnel => {
                let (tunnel, fitness) = odp_tun_key_from_attr(&attr);
                md.tunnel = if fitness == Fitness::Error {
                    warn!("metadata key: malformed tunnel attribute");
                    FlowTnl::default()
                } else {
                    tunnel
                };
            }
            OvsKeyAttr::Ethernet => ethernet = true,
            OvsKeyAttr::Ethertype => {}
            OvsKeyAttr::Ipv4 => md.packet_ethertype = EthType::IPV4,
            OvsKeyAttr::Ipv6 => md.packet_ethertype = EthType::IPV6,
            OvsKeyAttr::PacketEthertype => {
                packet_ethertype = true;
                md.packet_ethertype = EthType::new(attr.get_be16().unwrap_or_default());
            }
            _ => {}
        }
    }

    md.base_layer = if packet_ethertype && !ethernet {
        BaseLayer::L3
    } else {
        BaseLayer::L2
    };
    md
}

/// A hash of the key bytes.  Equal keys hash equally within and across processes.
#[must_use]
pub fn odp_flow_key_hash(key: &[u8]) -> u32 {
    let mut hasher = AHasher::default();
    key.hash(&mut hasher);
    #[allow(clippy::cast_possible_truncation)] // we want the low 32 bits
    let hash = hasher.finish() as u32;
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::flow::{Flow, TnlFlags};
    use crate::key::{EncodeOptions, odp_flow_key_format, odp_flow_key_from_flow};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn tunnel() -> FlowTnl {
        FlowTnl {
            tun_id: 0x99,
            ip_src: Ipv4Addr::new(192, 0, 2, 1),
            ip_dst: Ipv4Addr::new(192, 0, 2, 2),
            flags: TnlFlags::KEY,
            ip_ttl: 64,
            ..FlowTnl::default()
        }
    }

    fn encode(md: &PktMetadata) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_key_from_pkt_metadata(&mut w, md).unwrap();
        w.into_bytes()
    }

    #[test]
    fn metadata_round_trip() {
        let md = PktMetadata {
            skb_priority: 3,
            pkt_mark: 0xabc,
            tunnel: tunnel(),
            in_port: 7,
            ..PktMetadata::default()
        };
        let key = encode(&md);
        assert_eq!(
            odp_flow_key_format(&key),
            "skb_priority(0x3),tunnel(tun_id=0x99,src=192.0.2.1,dst=192.0.2.2,tos=0x0,ttl=64,\
             tp_src=0,tp_dst=0,flags(key)),skb_mark(0xabc),in_port(7)"
        );
        assert_eq!(odp_key_to_pkt_metadata(&key), md);
    }

    #[test]
    fn defaults_are_omitted() {
        let md = PktMetadata::default();
        let key = encode(&md);
        assert_eq!(odp_flow_key_format(&key), "skb_priority(0x0),skb_mark(0x0)");
        assert_eq!(odp_key_to_pkt_metadata(&key), md);
    }

    #[test]
    fn l3_packets_carry_their_ethertype() {
        let md = PktMetadata {
            in_port: 1,
            base_layer: BaseLayer::L3,
            packet_ethertype: EthType::IPV6,
            ..PktMetadata::default()
        };
        let key = encode(&md);
        assert!(odp_flow_key_format(&key).ends_with("packet_eth_type(0x86dd)"));
        assert_eq!(odp_key_to_pkt_metadata(&key), md);
    }

    #[test]
    fn metadata_from_a_full_key() {
        let flow = Flow {
            in_port: 4,
            pkt_mark: 1,
            dl_type: EthType::IPV4,
            nw_ttl: 1,
            ..Flow::default()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &EncodeOptions::default()).unwrap();
        let md = odp_key_to_pkt_metadata(w.as_bytes());
        assert_eq!(md.in_port, 4);
        assert_eq!(md.pkt_mark, 1);
        assert_eq!(md.base_layer, BaseLayer::L2);
        assert_eq!(md.packet_ethertype, EthType::IPV4);
    }

    #[test]
    fn bad_attributes_are_skipped() {
        let mut w = AttrWriter::new();
        w.put_be16(OvsKeyAttr::InPort.ty(), 5).unwrap();
        w.put_be32(OvsKeyAttr::SkbMark.ty(), 9).unwrap();
        // a tunnel without a ttl is malformed
        let nest = w.start_nested(OvsKeyAttr::Tunnel.ty()).unwrap();
        w.put_be32(2, 0x0a00_0001).unwrap();
        w.end_nested(nest).unwrap();
        let md = odp_key_to_pkt_metadata(w.as_bytes());
        assert_eq!(md.in_port, ODPP_NONE);
        assert_eq!(md.pkt_mark, 9);
        assert_eq!(md.tunnel, FlowTnl::default());
    }

    #[test]
    fn key_hash_is_stable() {
        let a = encode(&PktMetadata::default());
        let b = encode(&PktMetadata {
            in_port: 2,
            ..PktMetadata::default()
        });
        assert_eq!(odp_flow_key_hash(&a), odp_flow_key_hash(&a.clone()));
        assert_ne!(odp_flow_key_hash(&a), odp_flow_key_hash(&b));
    }
}
