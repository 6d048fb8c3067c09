// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Moving fields between a [`Flow`] and the fixed size key payloads.
//!
//! The conversions are shared by the encoder, the decoder and the committer, so a field always
//! lands in the same place whichever way it travels.

use crate::attr::{AttrError, AttrWriter};
use crate::flow::{FragFlags, Flow};
use crate::key::{KeyArp, KeyEthernet, KeyIcmp, KeyIpv4, KeyIpv6, KeyNd, KeyPayload, KeyPorts};
use crate::key::{OvsKeyAttr, frag};

/// The low byte of a host order `u16` (ICMP type and code live there).
pub(crate) fn low_byte(v: u16) -> u8 {
    v.to_be_bytes()[1]
}

/// Fragment class in its wire form.
///
/// The wire form is an enumeration, not a bit set, so a mask can only be all or nothing.
pub(crate) fn ovs_to_odp_frag(nw_frag: FragFlags, is_mask: bool) -> u8 {
    if is_mask {
        return if nw_frag.contains(FragFlags::ANY) {
            u8::MAX
        } else {
            0
        };
    }
    if !nw_frag.contains(FragFlags::ANY) {
        frag::NONE
    } else if nw_frag.contains(FragFlags::LATER) {
        frag::LATER
    } else {
        frag::FIRST
    }
}

/// Fragment class from its wire form.  Values above [`frag::LATER`] are invalid in a key and
/// read as "not a fragment"; callers reject them beforehand.
pub(crate) fn odp_to_ovs_frag(odp_frag: u8, is_mask: bool) -> FragFlags {
    if is_mask {
        return if odp_frag == 0 {
            FragFlags::empty()
        } else {
            FragFlags::all()
        };
    }
    match odp_frag {
        frag::FIRST => FragFlags::ANY,
        frag::LATER => FragFlags::ANY | FragFlags::LATER,
        _ => FragFlags::empty(),
    }
}

/// Append a fixed size payload.
pub(crate) fn put_key<P: KeyPayload>(
    w: &mut AttrWriter,
    attr: OvsKeyAttr,
    payload: &P,
) -> Result<(), AttrError> {
    w.put_unspec(attr.ty(), &payload.to_bytes())
}

impl KeyEthernet {
    /// The Ethernet addresses of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow) -> KeyEthernet {
        KeyEthernet {
            src: flow.dl_src,
            dst: flow.dl_dst,
        }
    }

    /// Store into `flow`.
    pub fn put(&self, flow: &mut Flow) {
        flow.dl_src = self.src;
        flow.dl_dst = self.dst;
    }
}

impl KeyIpv4 {
    /// The IPv4 fields of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow, is_mask: bool) -> KeyIpv4 {
        KeyIpv4 {
            src: flow.nw_src,
            dst: flow.nw_dst,
            proto: flow.nw_proto,
            tos: flow.nw_tos,
            ttl: flow.nw_ttl,
            frag: ovs_to_odp_frag(flow.nw_frag, is_mask),
        }
    }

    /// Store into `flow`.
    pub fn put(&self, flow: &mut Flow, is_mask: bool) {
        flow.nw_src = self.src;
        flow.nw_dst = self.dst;
        flow.nw_proto = self.proto;
        flow.nw_tos = self.tos;
        flow.nw_ttl = self.ttl;
        flow.nw_frag = odp_to_ovs_frag(self.frag, is_mask);
    }
}

impl KeyIpv6 {
    /// The IPv6 fields of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow, is_mask: bool) -> KeyIpv6 {
        KeyIpv6 {
            src: flow.ipv6_src,
            dst: flow.ipv6_dst,
            label: flow.ipv6_label,
            proto: flow.nw_proto,
            tclass: flow.nw_tos,
            hlimit: flow.nw_ttl,
            frag: ovs_to_odp_frag(flow.nw_frag, is_mask),
        }
    }

    /// Store into `flow`.
    pub fn put(&self, flow: &mut Flow, is_mask: bool) {
        flow.ipv6_src = self.src;
        flow.ipv6_dst = self.dst;
        flow.ipv6_label = self.label;
        flow.nw_proto = self.proto;
        flow.nw_tos = self.tclass;
        flow.nw_ttl = self.hlimit;
        flow.nw_frag = odp_to_ovs_frag(self.frag, is_mask);
    }
}

impl KeyPorts {
    /// The transport ports of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow) -> KeyPorts {
        KeyPorts {
            src: flow.tp_src,
            dst: flow.tp_dst,
        }
    }

    /// Store into `flow`.
    pub fn put(&self, flow: &mut Flow) {
        flow.tp_src = self.src;
        flow.tp_dst = self.dst;
    }
}

impl KeyIcmp {
    /// ICMP type and code of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow) -> KeyIcmp {
        KeyIcmp {
            ty: low_byte(flow.tp_src),
            code: low_byte(flow.tp_dst),
        }
    }

    /// Store into `flow`.
    pub fn put(&self, flow: &mut Flow) {
        flow.tp_src = u16::from(self.ty);
        flow.tp_dst = u16::from(self.code);
    }
}

impl KeyArp {
    /// The ARP fields of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow) -> KeyArp {
        KeyArp {
            sip: flow.nw_src,
            tip: flow.nw_dst,
            op: u16::from(flow.nw_proto),
            sha: flow.arp_sha,
            tha: flow.arp_tha,
        }
    }

    /// Store into `flow`.  Only the low byte of the opcode fits.
    pub fn put(&self, flow: &mut Flow) {
        flow.nw_src = self.sip;
        flow.nw_dst = self.tip;
        flow.nw_proto = low_byte(self.op);
        flow.arp_sha = self.sha;
        flow.arp_tha = self.tha;
    }
}

impl KeyNd {
    /// The neighbor discovery fields of `flow`.
    #[must_use]
    pub fn from_flow(flow: &Flow) -> KeyNd {
        KeyNd {
            target: flow.nd_target,
            sll: flow.arp_sha,
            tll: flow.arp_tha,
        }
    }

    /// Store into `flow`.
    pub fn put(&self, flow: &mut Flow) {
        flow.nd_target = self.target;
        flow.arp_sha = self.sll;
        flow.arp_tha = self.tll;
    }
}
