// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tunnel push data.
//!
//! A tunnel push carries the complete outer header to prepend.  The datapath treats it as
//! opaque bytes; [`TnlHeader`] is the view of the two layouts this crate can describe:
//! Ethernet + IPv4 + UDP + VXLAN and Ethernet + IPv4 + GRE.

use crate::action::ActionError;
use bitflags::bitflags;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::ip::{IPPROTO_GRE, IPPROTO_UDP};
use std::net::Ipv4Addr;

/// Vport type of GRE tunnels.
pub const OVS_VPORT_TYPE_GRE: u32 = 3;
/// Vport type of VXLAN tunnels.
pub const OVS_VPORT_TYPE_VXLAN: u32 = 4;

/// Longest header a tunnel push can carry.
pub const TNL_PUSH_HEADER_SIZE: usize = 128;

/// Bytes before the header in the action payload.
const PREFIX_LEN: usize = 16;

const ETH_LEN: usize = 14;
const IPV4_LEN: usize = 20;
const UDP_LEN: usize = 8;
const VXLAN_LEN: usize = 8;
const GRE_BASE_LEN: usize = 4;

bitflags! {
    /// GRE header flags, as they appear in the first 16 bits of the header.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GreFlags: u16 {
        /// A checksum word follows.
        const CSUM = 0x8000;
        /// A key word follows.
        const KEY = 0x2000;
        /// A sequence number word follows.
        const SEQ = 0x1000;
        const _ = !0;
    }
}

/// The payload of a tunnel push action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TnlPushData {
    /// Tunnel port the header was built for.
    pub tnl_port: u32,
    /// Port the encapsulated packet leaves through.
    pub out_port: u32,
    /// Vport type, such as [`OVS_VPORT_TYPE_VXLAN`].
    pub tnl_type: u32,
    /// The header bytes, at most [`TNL_PUSH_HEADER_SIZE`].
    pub header: Vec<u8>,
}

/// The transport part of a tunnel header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TnlL4 {
    /// UDP + VXLAN.
    Vxlan {
        /// UDP source port
        udp_src: u16,
        /// UDP destination port
        udp_dst: u16,
        /// VXLAN flags word
        flags: u32,
        /// VXLAN network identifier word (the VNI is in the upper 24 bits)
        vni: u32,
    },
    /// GRE.  The optional words are present when the matching flag is set.
    Gre {
        /// flags and version
        flags: GreFlags,
        /// protocol of the payload
        proto: u16,
        /// checksum word, with [`GreFlags::CSUM`]
        csum: u32,
        /// key, with [`GreFlags::KEY`]
        key: u32,
        /// sequence number, with [`GreFlags::SEQ`]
        seq: u32,
    },
}

/// A tunnel header of a layout this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TnlHeader {
    pub eth_dst: Mac,
    pub eth_src: Mac,
    pub eth_type: EthType,
    pub ip_src: Ipv4Addr,
    pub ip_dst: Ipv4Addr,
    pub ip_proto: u8,
    pub ip_tos: u8,
    pub ip_ttl: u8,
    /// Flags and fragment offset word.
    pub ip_frag_off: u16,
    pub l4: TnlL4,
}

fn be16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

fn be32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn mac(b: &[u8], at: usize) -> Mac {
    let mut out = [0; 6];
    out.copy_from_slice(&b[at..at + 6]);
    Mac(out)
}

impl TnlL4 {
    fn gre_words(flags: GreFlags) -> usize {
        [GreFlags::CSUM, GreFlags::KEY, GreFlags::SEQ]
            .iter()
            .filter(|f| flags.contains(**f))
            .count()
    }

    fn len(&self) -> usize {
        match self {
            TnlL4::Vxlan { .. } => UDP_LEN + VXLAN_LEN,
            TnlL4::Gre { flags, .. } => GRE_BASE_LEN + 4 * TnlL4::gre_words(*flags),
        }
    }
}

impl TnlHeader {
    /// The vport type of this layout.
    #[must_use]
    pub fn tnl_type(&self) -> u32 {
        match self.l4 {
            TnlL4::Vxlan { .. } => OVS_VPORT_TYPE_VXLAN,
            TnlL4::Gre { .. } => OVS_VPORT_TYPE_GRE,
        }
    }

    /// Size of the header.
    #[must_use]
    pub fn len(&self) -> usize {
        ETH_LEN + IPV4_LEN + self.l4.len()
    }

    /// Never true; here for symmetry with [`TnlHeader::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The header bytes.
    ///
    /// The IPv4 total length, identification and checksum, and the UDP length and checksum,
    /// are left zero for the datapath to fill in.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.eth_dst.0);
        out.extend_from_slice(&self.eth_src.0);
        out.extend_from_slice(&self.eth_type.to_be_bytes());

        out.extend_from_slice(&[0x45, self.ip_tos, 0, 0, 0, 0]);
        out.extend_from_slice(&self.ip_frag_off.to_be_bytes());
        out.extend_from_slice(&[self.ip_ttl, self.ip_proto, 0, 0]);
        out.extend_from_slice(&self.ip_src.octets());
        out.extend_from_slice(&self.ip_dst.octets());

        match self.l4 {
            TnlL4::Vxlan {
                udp_src,
                udp_dst,
                flags,
                vni,
            } => {
                out.extend_from_slice(&udp_src.to_be_bytes());
                out.extend_from_slice(&udp_dst.to_be_bytes());
                out.extend_from_slice(&[0; 4]);
                out.extend_from_slice(&flags.to_be_bytes());
                out.extend_from_slice(&vni.to_be_bytes());
            }
            TnlL4::Gre {
                flags,
                proto,
                csum,
                key,
                seq,
            } => {
                out.extend_from_slice(&flags.bits().to_be_bytes());
                out.extend_from_slice(&proto.to_be_bytes());
                for (flag, word) in [(GreFlags::CSUM, csum), (GreFlags::KEY, key), (GreFlags::SEQ, seq)] {
                    if flags.contains(flag) {
                        out.extend_from_slice(&word.to_be_bytes());
                    }
                }
            }
        }
        out
    }

    /// Read a header of vport type `tnl_type`.  Returns `None` for other types and for headers
    /// whose size does not match their layout.
    #[must_use]
    pub fn from_bytes(tnl_type: u32, b: &[u8]) -> Option<TnlHeader> {
        const L4: usize = ETH_LEN + IPV4_LEN;
        if b.len() < L4 + GRE_BASE_LEN {
            return None;
        }
        let ip = ETH_LEN;
        let l4 = match tnl_type {
            OVS_VPORT_TYPE_VXLAN => TnlL4::Vxlan {
                udp_src: be16(b, L4),
                udp_dst: be16(b, L4 + 2),
                flags: be32(b, L4 + UDP_LEN),
                vni: be32(b, L4 + UDP_LEN + 4),
            },
            OVS_VPORT_TYPE_GRE => {
                let flags = GreFlags::from_bits_retain(be16(b, L4));
                let mut words = [0; 3];
                let mut at = L4 + GRE_BASE_LEN;
                for (slot, flag) in words.iter_mut().zip([GreFlags::CSUM, GreFlags::KEY, GreFlags::SEQ]) {
                    if flags.contains(flag) {
                        if b.len() < at + 4 {
                            return None;
                        }
                        *slot = be32(b, at);
                        at += 4;
                    }
                }
                TnlL4::Gre {
                    flags,
                    proto: be16(b, L4 + 2),
                    csum: words[0],
                    key: words[1],
                    seq: words[2],
                }
            }
            _ => return None,
        };
        if b.len() != L4 + l4.len() {
            return None;
        }
        Some(TnlHeader {
            eth_dst: mac(b, 0),
            eth_src: mac(b, 6),
            eth_type: EthType::new(be16(b, 12)),
            ip_src: Ipv4Addr::from(be32(b, ip + 12)),
            ip_dst: Ipv4Addr::from(be32(b, ip + 16)),
            ip_proto: b[ip + 9],
            ip_tos: b[ip + 1],
            ip_ttl: b[ip + 8],
            ip_frag_off: be16(b, ip + 6),
            l4,
        })
    }

    /// The usual IPv4 protocol for the layout.
    #[must_use]
    pub fn default_proto(l4: &TnlL4) -> u8 {
        match l4 {
            TnlL4::Vxlan { .. } => IPPROTO_UDP,
            TnlL4::Gre { .. } => IPPROTO_GRE,
        }
    }
}

impl TnlPushData {
    /// Push data for `header`.
    #[must_use]
    pub fn new(tnl_port: u32, out_port: u32, header: &TnlHeader) -> TnlPushData {
        TnlPushData {
            tnl_port,
            out_port,
            tnl_type: header.tnl_type(),
            header: header.to_bytes(),
        }
    }

    /// The header, if it has a layout this crate understands.
    #[must_use]
    pub fn parsed_header(&self) -> Option<TnlHeader> {
        TnlHeader::from_bytes(self.tnl_type, &self.header)
    }

    /// The action payload.
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREFIX_LEN + self.header.len());
        #[allow(clippy::cast_possible_truncation)] // bounded by TNL_PUSH_HEADER_SIZE on decode
        let header_len = self.header.len() as u32;
        for word in [self.tnl_port, self.out_port, header_len, self.tnl_type] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.extend_from_slice(&self.header);
        out
    }

    /// Read an action payload.
    pub(crate) fn from_payload(payload: &[u8]) -> Result<TnlPushData, ActionError> {
        const MALFORMED: ActionError = ActionError::Malformed("tnl_push");
        if payload.len() < PREFIX_LEN {
            return Err(MALFORMED);
        }
        let header = &payload[PREFIX_LEN..];
        let header_len = usize::try_from(be32(payload, 8)).map_err(|_| MALFORMED)?;
        if header_len != header.len() || header_len > TNL_PUSH_HEADER_SIZE {
            return Err(MALFORMED);
        }
        Ok(TnlPushData {
            tnl_port: be32(payload, 0),
            out_port: be32(payload, 4),
            tnl_type: be32(payload, 12),
            header: header.to_vec(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vxlan() -> TnlHeader {
        TnlHeader {
            eth_dst: Mac([0xf8, 0xbc, 0x12, 0x44, 0x34, 0xb6]),
            eth_src: Mac([0xf8, 0xbc, 0x12, 0x46, 0x58, 0xe0]),
            eth_type: EthType::IPV4,
            ip_src: Ipv4Addr::new(1, 1, 2, 88),
            ip_dst: Ipv4Addr::new(1, 1, 2, 92),
            ip_proto: IPPROTO_UDP,
            ip_tos: 0,
            ip_ttl: 64,
            ip_frag_off: 0x4000,
            l4: TnlL4::Vxlan {
                udp_src: 0,
                udp_dst: 4789,
                flags: 0x0800_0000,
                vni: 0x7b << 8,
            },
        }
    }

    #[test]
    fn vxlan_layout() {
        let h = vxlan();
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), 50);
        assert_eq!(h.len(), 50);
        assert_eq!(&bytes[12..16], &[0x08, 0x00, 0x45, 0x00]);
        assert_eq!(&bytes[36..38], &4789u16.to_be_bytes());
        assert_eq!(TnlHeader::from_bytes(OVS_VPORT_TYPE_VXLAN, &bytes), Some(h));
        assert_eq!(TnlHeader::from_bytes(OVS_VPORT_TYPE_GRE, &bytes), None);
        assert_eq!(TnlHeader::from_bytes(OVS_VPORT_TYPE_VXLAN, &bytes[..49]), None);
    }

    #[test]
    fn gre_options_follow_the_flags() {
        let h = TnlHeader {
            ip_proto: IPPROTO_GRE,
            l4: TnlL4::Gre {
                flags: GreFlags::KEY | GreFlags::SEQ,
                proto: 0x6558,
                csum: 0,
                key: 0x1e241,
                seq: 9,
            },
            ..vxlan()
        };
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), 14 + 20 + 4 + 8);
        assert_eq!(&bytes[34..38], &[0x30, 0x00, 0x65, 0x58]);
        assert_eq!(&bytes[38..42], &0x1e241u32.to_be_bytes());
        assert_eq!(TnlHeader::from_bytes(OVS_VPORT_TYPE_GRE, &bytes), Some(h));
        assert_eq!(h.tnl_type(), OVS_VPORT_TYPE_GRE);
        assert_eq!(TnlHeader::default_proto(&h.l4), IPPROTO_GRE);
    }

    #[test]
    fn payload_checks_the_header_length() {
        let data = TnlPushData::new(4, 1, &vxlan());
        let payload = data.to_payload();
        assert_eq!(payload.len(), 16 + 50);
        assert_eq!(TnlPushData::from_payload(&payload).unwrap(), data);
        assert_eq!(data.parsed_header(), Some(vxlan()));

        let mut short = payload.clone();
        short.pop();
        assert_eq!(
            TnlPushData::from_payload(&short),
            Err(ActionError::Malformed("tnl_push"))
        );
        assert!(TnlPushData::from_payload(&payload[..8]).is_err());
    }
}
