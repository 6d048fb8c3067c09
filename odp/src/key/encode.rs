// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow to attributes.

use crate::ODPP_NONE;
use crate::attr::{AttrError, AttrWriter};
use crate::flow::{FLOW_MAX_MPLS_LABELS, FragFlags, Flow};
use crate::key::fields::put_key;
use crate::key::tunnel::tun_key_to_attr;
use crate::key::{KeyArp, KeyEthernet, KeyIcmp, KeyIpv4, KeyIpv6, KeyNd, KeyPorts, OvsKeyAttr};
use derive_builder::Builder;
use net::eth::ethtype::EthType;
use net::ip::{IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP};
use net::vlan::Tci;

pub(crate) const ND_NEIGHBOR_SOLICIT: u16 = 135;
pub(crate) const ND_NEIGHBOR_ADVERT: u16 = 136;

/// Knobs of the key encoder.
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Most MPLS label stack entries to emit.
    #[builder(default = FLOW_MAX_MPLS_LABELS)]
    pub max_mpls_depth: usize,
    /// Emit the recirculation id and the datapath hash.
    #[builder(default = false)]
    pub recirc: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            max_mpls_depth: FLOW_MAX_MPLS_LABELS,
            recirc: false,
        }
    }
}

/// True for an ICMPv6 neighbor solicitation or advertisement.
pub(crate) fn is_nd(flow: &Flow) -> bool {
    flow.tp_dst == 0 && (flow.tp_src == ND_NEIGHBOR_SOLICIT || flow.tp_src == ND_NEIGHBOR_ADVERT)
}

fn end_encap(w: &mut AttrWriter, encap: Option<usize>) -> Result<(), AttrError> {
    match encap {
        Some(offset) => w.end_nested(offset),
        None => Ok(()),
    }
}

/// `flow` selects which attributes are present, `data` (the flow itself or its mask) supplies
/// their values.
fn flow_to_attrs(
    w: &mut AttrWriter,
    flow: &Flow,
    mask: Option<&Flow>,
    opts: &EncodeOptions,
) -> Result<(), AttrError> {
    let export_mask = mask.is_some();
    let data = mask.unwrap_or(flow);

    w.put_be32(OvsKeyAttr::Priority.ty(), data.skb_priority)?;
    if !flow.tunnel.ip_dst.is_unspecified() || export_mask {
        tun_key_to_attr(w, &data.tunnel)?;
    }
    w.put_be32(OvsKeyAttr::SkbMark.ty(), data.pkt_mark)?;
    if opts.recirc {
        w.put_be32(OvsKeyAttr::RecircId.ty(), data.recirc_id)?;
        w.put_be32(OvsKeyAttr::DpHash.ty(), data.dp_hash)?;
    }
    if export_mask || data.in_port != ODPP_NONE {
        w.put_be32(OvsKeyAttr::InPort.ty(), data.in_port)?;
    }

    let mut encap = None;
    if flow.is_l3() {
        let ethertype = if export_mask {
            EthType::EXACT
        } else {
            data.dl_type
        };
        w.put_be16(OvsKeyAttr::PacketEthertype.ty(), ethertype.raw())?;
    } else {
        put_key(w, OvsKeyAttr::Ethernet, &KeyEthernet::from_flow(data))?;

        if flow.vlan_tci != Tci(0) || flow.dl_type == EthType::VLAN {
            let tpid = if export_mask {
                EthType::EXACT
            } else {
                EthType::VLAN
            };
            w.put_be16(OvsKeyAttr::Ethertype.ty(), tpid.raw())?;
            w.put_be16(OvsKeyAttr::Vlan.ty(), data.vlan_tci.raw())?;
            encap = Some(w.start_nested(OvsKeyAttr::Encap.ty())?);
            if flow.vlan_tci == Tci(0) {
                return end_encap(w, encap);
            }
        }

        // Frames without an Ethernet II type carry no ethertype attribute; their mask says
        // "must not be Ethernet II" with an exact ethertype.
        if flow.dl_type < EthType::MIN {
            if export_mask {
                w.put_be16(OvsKeyAttr::Ethertype.ty(), EthType::EXACT.raw())?;
            }
            return end_encap(w, encap);
        }
        w.put_be16(OvsKeyAttr::Ethertype.ty(), data.dl_type.raw())?;
    }

    put_l3_l4(w, flow, data, export_mask, opts)?;
    end_encap(w, encap)
}

fn put_l3_l4(
    w: &mut AttrWriter,
    flow: &Flow,
    data: &Flow,
    export_mask: bool,
    opts: &EncodeOptions,
) -> Result<(), AttrError> {
    match flow.dl_type {
        EthType::IPV4 => put_key(w, OvsKeyAttr::Ipv4, &KeyIpv4::from_flow(data, export_mask))?,
        EthType::IPV6 => put_key(w, OvsKeyAttr::Ipv6, &KeyIpv6::from_flow(data, export_mask))?,
        EthType::ARP | EthType::RARP => put_key(w, OvsKeyAttr::Arp, &KeyArp::from_flow(data))?,
        t if t.is_mpls() => {
            let n = flow.count_mpls_labels().min(opts.max_mpls_depth);
            let stack: Vec<u8> = data.mpls_lse[..n]
                .iter()
                .flat_map(|lse| lse.to_be_bytes())
                .collect();
            w.put_unspec(OvsKeyAttr::Mpls.ty(), &stack)?;
        }
        _ => {}
    }

    if !flow.is_ip_any() || flow.nw_frag.contains(FragFlags::LATER) {
        return Ok(());
    }
    match flow.nw_proto {
        IPPROTO_TCP => {
            put_key(w, OvsKeyAttr::Tcp, &KeyPorts::from_flow(data))?;
            if !data.tcp_flags.is_empty() {
                w.put_be16(OvsKeyAttr::TcpFlags.ty(), data.tcp_flags.bits())?;
            }
        }
        IPPROTO_UDP => put_key(w, OvsKeyAttr::Udp, &KeyPorts::from_flow(data))?,
        IPPROTO_SCTP => put_key(w, OvsKeyAttr::Sctp, &KeyPorts::from_flow(data))?,
        IPPROTO_ICMP if flow.dl_type == EthType::IPV4 => {
            put_key(w, OvsKeyAttr::Icmp, &KeyIcmp::from_flow(data))?;
        }
        IPPROTO_ICMPV6 if flow.dl_type == EthType::IPV6 => {
            put_key(w, OvsKeyAttr::Icmpv6, &KeyIcmp::from_flow(data))?;
            if is_nd(flow) && (!export_mask || (data.tp_src == u16::MAX && data.tp_dst == u16::MAX))
            {
                put_key(w, OvsKeyAttr::Nd, &KeyNd::from_flow(data))?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Append the attributes describing `flow`.
///
/// The input port attribute is only written if `flow.in_port` is not [`ODPP_NONE`].
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the writer runs out of room; nothing is appended
/// in that case.
pub fn odp_flow_key_from_flow(
    w: &mut AttrWriter,
    flow: &Flow,
    opts: &EncodeOptions,
) -> Result<(), AttrError> {
    let start = w.len();
    flow_to_attrs(w, flow, None, opts).inspect_err(|_| w.truncate(start))
}

/// Append the attributes of `mask`, using `flow` to decide which protocols the mask bits belong
/// to.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the writer runs out of room; nothing is appended
/// in that case.
pub fn odp_flow_key_from_mask(
    w: &mut AttrWriter,
    mask: &Flow,
    flow: &Flow,
    opts: &EncodeOptions,
) -> Result<(), AttrError> {
    let start = w.len();
    flow_to_attrs(w, flow, Some(mask), opts).inspect_err(|_| w.truncate(start))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::attr::{Attr, Attrs};
    use crate::flow::TcpFlags;
    use net::eth::mac::Mac;
    use net::mpls::Lse;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn types(bytes: &[u8]) -> Vec<u16> {
        Attrs::new(bytes).map(|a| a.unwrap().ty()).collect()
    }

    fn find(bytes: &[u8], attr: OvsKeyAttr) -> Attr<'_> {
        crate::attr::attr_find(bytes, attr.ty()).unwrap()
    }

    fn tcp_flow() -> Flow {
        Flow {
            in_port: 4,
            dl_src: Mac([0, 1, 2, 3, 4, 5]),
            dl_dst: Mac([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(10, 0, 0, 1),
            nw_dst: Ipv4Addr::new(10, 0, 0, 2),
            nw_proto: IPPROTO_TCP,
            nw_ttl: 64,
            tp_src: 80,
            tp_dst: 1024,
            tcp_flags: TcpFlags::SYN,
            ..Flow::default()
        }
    }

    #[test]
    fn emission_order() {
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &tcp_flow(), &EncodeOptions::default()).unwrap();
        assert_eq!(
            types(w.as_bytes()),
            [
                OvsKeyAttr::Priority,
                OvsKeyAttr::SkbMark,
                OvsKeyAttr::InPort,
                OvsKeyAttr::Ethernet,
                OvsKeyAttr::Ethertype,
                OvsKeyAttr::Ipv4,
                OvsKeyAttr::Tcp,
                OvsKeyAttr::TcpFlags,
            ]
            .map(OvsKeyAttr::ty)
        );
        let bytes = w.as_bytes();
        assert_eq!(find(bytes, OvsKeyAttr::Ethertype).payload(), [0x08, 0x00]);
        assert_eq!(find(bytes, OvsKeyAttr::Tcp).payload(), [0, 80, 4, 0]);
        assert_eq!(
            find(bytes, OvsKeyAttr::Ipv4).payload(),
            [10, 0, 0, 1, 10, 0, 0, 2, IPPROTO_TCP, 0, 64, 0]
        );
    }

    #[test]
    fn recirc_and_no_in_port() {
        let flow = Flow {
            in_port: ODPP_NONE,
            ..tcp_flow()
        };
        let opts = EncodeOptionsBuilder::default().recirc(true).build().unwrap();
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &opts).unwrap();
        let got = types(w.as_bytes());
        assert_eq!(
            got[..4],
            [
                OvsKeyAttr::Priority,
                OvsKeyAttr::SkbMark,
                OvsKeyAttr::RecircId,
                OvsKeyAttr::DpHash,
            ]
            .map(OvsKeyAttr::ty)
        );
        assert!(!got.contains(&OvsKeyAttr::InPort.ty()));
    }

    #[test]
    fn vlan_nests_the_rest() {
        let flow = Flow {
            vlan_tci: Tci::from_parts(100, 0, true),
            ..tcp_flow()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &EncodeOptions::default()).unwrap();
        let bytes = w.as_bytes();
        assert_eq!(find(bytes, OvsKeyAttr::Ethertype).get_be16().unwrap(), 0x8100);
        assert_eq!(find(bytes, OvsKeyAttr::Vlan).get_be16().unwrap(), flow.vlan_tci.raw());
        let inner: Vec<u16> = find(bytes, OvsKeyAttr::Encap)
            .nested()
            .map(|a| a.unwrap().ty())
            .collect();
        assert_eq!(
            inner,
            [
                OvsKeyAttr::Ethertype,
                OvsKeyAttr::Ipv4,
                OvsKeyAttr::Tcp,
                OvsKeyAttr::TcpFlags
            ]
            .map(OvsKeyAttr::ty)
        );
    }

    #[test]
    fn l3_packet_has_no_ethernet() {
        let flow = Flow {
            base_layer: net::packet::BaseLayer::L3,
            dl_src: Mac::ZERO,
            dl_dst: Mac::ZERO,
            ..tcp_flow()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &EncodeOptions::default()).unwrap();
        let got = types(w.as_bytes());
        assert!(!got.contains(&OvsKeyAttr::Ethernet.ty()));
        assert!(!got.contains(&OvsKeyAttr::Ethertype.ty()));
        assert_eq!(
            find(w.as_bytes(), OvsKeyAttr::PacketEthertype)
                .get_be16()
                .unwrap(),
            0x0800
        );
    }

    #[test]
    fn mask_mode() {
        let flow = Flow {
            dl_type: EthType::NONE,
            ..Flow::default()
        };
        let mask = Flow {
            in_port: u32::MAX,
            ..Flow::default()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_mask(&mut w, &mask, &flow, &EncodeOptions::default()).unwrap();
        let bytes = w.as_bytes();
        // tunnel and in_port are always present in a mask
        assert!(crate::attr::attr_find(bytes, OvsKeyAttr::Tunnel.ty()).is_some());
        assert_eq!(find(bytes, OvsKeyAttr::InPort).get_be32().unwrap(), u32::MAX);
        assert_eq!(find(bytes, OvsKeyAttr::Ethertype).get_be16().unwrap(), 0xffff);
    }

    #[test]
    fn mpls_depth_is_capped() {
        let flow = Flow {
            dl_type: EthType::MPLS,
            mpls_lse: [
                Lse::from_parts(1, 0, false, 1),
                Lse::from_parts(2, 0, true, 1),
                Lse(0),
            ],
            ..Flow::default()
        };
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &EncodeOptions::default()).unwrap();
        assert_eq!(find(w.as_bytes(), OvsKeyAttr::Mpls).len(), 8);

        let opts = EncodeOptionsBuilder::default()
            .max_mpls_depth(1)
            .build()
            .unwrap();
        let mut w = AttrWriter::new();
        odp_flow_key_from_flow(&mut w, &flow, &opts).unwrap();
        assert_eq!(
            find(w.as_bytes(), OvsKeyAttr::Mpls).payload(),
            flow.mpls_lse[0].to_be_bytes()
        );
    }

    #[test]
    fn full_writer_is_rolled_back() {
        let mut w = AttrWriter::with_limit(40);
        w.put_be32(OvsKeyAttr::Priority.ty(), 1).unwrap();
        let err = odp_flow_key_from_flow(&mut w, &tcp_flow(), &EncodeOptions::default());
        assert!(matches!(err, Err(AttrError::InsufficientSpace { .. })));
        assert_eq!(w.len(), 8);
    }
}
