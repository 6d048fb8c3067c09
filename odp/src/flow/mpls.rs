// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! MPLS label stack bookkeeping on a [`Flow`].

use crate::flow::{FLOW_MAX_MPLS_LABELS, FragFlags, Flow, TcpFlags};
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::mpls::Lse;
use std::net::{Ipv4Addr, Ipv6Addr};

const IPV4_EXPLICIT_NULL: u32 = 0;
const IPV6_EXPLICIT_NULL: u32 = 2;
const DEFAULT_MPLS_TTL: u8 = 64;
const IP_DSCP_MASK: u8 = 0xfc;

impl Flow {
    /// Number of label stack entries the flow carries: everything up to the first bottom of
    /// stack entry, or all of them if none has the bit.
    #[must_use]
    pub fn count_mpls_labels(&self) -> usize {
        if !self.dl_type.is_mpls() {
            return 0;
        }
        self.mpls_lse
            .iter()
            .position(|lse| lse.bos())
            .map_or(FLOW_MAX_MPLS_LABELS, |i| i + 1)
    }

    /// Number of equal entries at the bottom of the `n` entries of `self` and the `other_n`
    /// entries of `other`.
    #[must_use]
    pub fn count_common_mpls_labels(&self, n: usize, other: &Flow, other_n: usize) -> usize {
        self.mpls_lse[..n]
            .iter()
            .rev()
            .zip(other.mpls_lse[..other_n].iter().rev())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Push a label on top of the `n` entries the flow has.
    ///
    /// When the flow has no label yet, the new entry is derived from the IP header (explicit
    /// null label, traffic class from the DSCP, TTL from the IP TTL) and all network and
    /// transport fields are cleared, since they are now hidden behind the label stack.
    pub fn push_mpls(&mut self, n: usize, ethertype: EthType) {
        if n > 0 {
            for i in (1..=n.min(FLOW_MAX_MPLS_LABELS - 1)).rev() {
                self.mpls_lse[i] = self.mpls_lse[i - 1];
            }
            self.mpls_lse[0] = self.mpls_lse[1].with_bos(false);
        } else {
            let label = if self.dl_type == EthType::IPV6 {
                IPV6_EXPLICIT_NULL
            } else {
                IPV4_EXPLICIT_NULL
            };
            let (tc, ttl) = if self.is_ip_any() {
                let ttl = if self.nw_ttl == 0 {
                    DEFAULT_MPLS_TTL
                } else {
                    self.nw_ttl
                };
                ((self.nw_tos & IP_DSCP_MASK) >> 2, ttl)
            } else {
                (0, DEFAULT_MPLS_TTL)
            };
            self.mpls_lse[0] = Lse::from_parts(label, tc, true, ttl);
            self.clear_l3_l4();
        }
        self.dl_type = ethertype;
    }

    /// Pop the top of the `n` entries the flow has, leaving `eth_type` as ethertype.
    ///
    /// Returns false if nothing could be popped: the stack is empty, or it is full and its last
    /// entry is not the bottom of stack (what lies below is unknown).
    pub fn pop_mpls(&mut self, n: usize, eth_type: EthType) -> bool {
        if n == 0 || n > FLOW_MAX_MPLS_LABELS {
            return false;
        }
        if n == FLOW_MAX_MPLS_LABELS && !self.mpls_lse[n - 1].bos() {
            return false;
        }
        self.mpls_lse.copy_within(1..n, 0);
        self.mpls_lse[n - 1] = Lse(0);
        self.dl_type = eth_type;
        true
    }

    /// Overwrite entry `idx`.
    pub fn set_mpls_lse(&mut self, idx: usize, lse: Lse) {
        if let Some(slot) = self.mpls_lse.get_mut(idx) {
            *slot = lse;
        }
    }

    fn clear_l3_l4(&mut self) {
        self.nw_src = Ipv4Addr::UNSPECIFIED;
        self.nw_dst = Ipv4Addr::UNSPECIFIED;
        self.ipv6_src = Ipv6Addr::UNSPECIFIED;
        self.ipv6_dst = Ipv6Addr::UNSPECIFIED;
        self.ipv6_label = 0;
        self.nd_target = Ipv6Addr::UNSPECIFIED;
        self.nw_frag = FragFlags::empty();
        self.nw_tos = 0;
        self.nw_ttl = 0;
        self.nw_proto = 0;
        self.arp_sha = Mac::ZERO;
        self.arp_tha = Mac::ZERO;
        self.tp_src = 0;
        self.tp_dst = 0;
        self.tcp_flags = TcpFlags::empty();
        self.dp_hash = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ip_flow() -> Flow {
        Flow {
            dl_type: EthType::IPV4,
            nw_src: Ipv4Addr::new(1, 2, 3, 4),
            nw_proto: 6,
            nw_tos: 0xb8,
            nw_ttl: 17,
            tp_src: 80,
            ..Flow::default()
        }
    }

    #[test]
    fn first_push_derives_label_from_ip() {
        let mut flow = ip_flow();
        flow.push_mpls(0, EthType::MPLS);
        assert_eq!(flow.dl_type, EthType::MPLS);
        assert_eq!(flow.mpls_lse[0], Lse::from_parts(0, 0xb8 >> 2, true, 17));
        assert_eq!(flow.nw_src, Ipv4Addr::UNSPECIFIED);
        assert_eq!(flow.tp_src, 0);
        assert_eq!(flow.count_mpls_labels(), 1);

        let mut flow = Flow {
            dl_type: EthType::IPV6,
            ..Flow::default()
        };
        flow.push_mpls(0, EthType::MPLS_MCAST);
        assert_eq!(flow.mpls_lse[0], Lse::from_parts(2, 0, true, 64));
    }

    #[test]
    fn push_pop_stack() {
        let mut flow = ip_flow();
        flow.push_mpls(0, EthType::MPLS);
        flow.push_mpls(1, EthType::MPLS);
        flow.set_mpls_lse(0, flow.mpls_lse[0].with_label(100));
        assert_eq!(flow.count_mpls_labels(), 2);
        assert_eq!(flow.mpls_lse[0].label(), 100);
        assert!(!flow.mpls_lse[0].bos());
        assert!(flow.mpls_lse[1].bos());

        let other = flow.clone();
        assert_eq!(flow.count_common_mpls_labels(2, &other, 2), 2);
        let mut shorter = flow.clone();
        assert!(shorter.pop_mpls(2, EthType::MPLS));
        assert_eq!(shorter.count_mpls_labels(), 1);
        assert_eq!(flow.count_common_mpls_labels(2, &shorter, 1), 1);

        assert!(shorter.pop_mpls(1, EthType::IPV4));
        assert_eq!(shorter.dl_type, EthType::IPV4);
        assert_eq!(shorter.count_mpls_labels(), 0);
        assert!(!shorter.pop_mpls(0, EthType::IPV4));
    }

    #[test]
    fn full_stack_without_bottom_cannot_pop() {
        let mut flow = Flow {
            dl_type: EthType::MPLS,
            mpls_lse: [Lse::from_parts(1, 0, false, 1); FLOW_MAX_MPLS_LABELS],
            ..Flow::default()
        };
        assert_eq!(flow.count_mpls_labels(), FLOW_MAX_MPLS_LABELS);
        assert!(!flow.pop_mpls(FLOW_MAX_MPLS_LABELS, EthType::MPLS));
        flow.mpls_lse[2] = flow.mpls_lse[2].with_bos(true);
        assert!(flow.pop_mpls(FLOW_MAX_MPLS_LABELS, EthType::MPLS));
        assert_eq!(flow.mpls_lse[2], Lse(0));
    }
}
