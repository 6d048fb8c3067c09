// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Userspace action cookies.
//!
//! A cookie is the userdata of a userspace action when it has one of the known shapes: a
//! big endian `u16` type followed by a fixed layout.  Anything else is kept as opaque bytes.

use bitflags::bitflags;
use net::vlan::Tci;

bitflags! {
    /// Why a flow has to be processed in userspace.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlowPathReason: u32 {
        /// CFM packets need per-packet processing.
        const CFM = 1 << 0;
        /// BFD packets need per-packet processing.
        const BFD = 1 << 1;
        /// LACP packets need per-packet processing.
        const LACP = 1 << 2;
        /// STP packets need per-packet processing.
        const STP = 1 << 3;
        /// LLDP packets need per-packet processing.
        const LLDP = 1 << 4;
        /// Sends "packet-in" messages to the controller.
        const CONTROLLER = 1 << 5;
        /// Uses an action the datapath cannot execute.
        const ACTION = 1 << 6;
    }
}

impl SlowPathReason {
    const NAMES: [(SlowPathReason, &'static str, &'static str); 7] = [
        (SlowPathReason::CFM, "cfm", "Consists of CFM packets"),
        (SlowPathReason::BFD, "bfd", "Consists of BFD packets"),
        (SlowPathReason::LACP, "lacp", "Consists of LACP packets"),
        (SlowPathReason::STP, "stp", "Consists of STP packets"),
        (SlowPathReason::LLDP, "lldp", "Consists of LLDP packets"),
        (
            SlowPathReason::CONTROLLER,
            "controller",
            "Sends \"packet-in\" messages to the OpenFlow controller",
        ),
        (
            SlowPathReason::ACTION,
            "action",
            "Uses action(s) not supported by datapath",
        ),
    ];

    /// Text name of a single reason bit.
    #[must_use]
    pub fn bit_name(bit: u32) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(reason, _, _)| reason.bits() == bit)
            .map(|(_, name, _)| *name)
    }

    /// A sentence for a single reason bit.
    #[must_use]
    pub fn explanation(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(reason, _, _)| *reason == self)
            .map_or("<unknown>", |(_, _, explanation)| *explanation)
    }
}

const COOKIE_SFLOW: u16 = 1;
const COOKIE_SLOW_PATH: u16 = 2;
const COOKIE_FLOW_SAMPLE: u16 = 3;
const COOKIE_IPFIX: u16 = 4;

/// Size of the largest cookie.
const COOKIE_MAX_LEN: usize = 16;

/// The userdata of a userspace action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserspaceCookie {
    /// An sFlow sample.
    Sflow {
        /// VLAN of the sampled packet
        tci: Tci,
        /// output port, or a port count with the high bit set
        output: u32,
    },
    /// A flow that has to be handled in userspace.
    SlowPath(SlowPathReason),
    /// A per-flow sample.
    FlowSample {
        /// sampling probability, as a fraction of `u16::MAX`
        probability: u16,
        /// collector set
        collector_set_id: u32,
        /// observation domain
        obs_domain_id: u32,
        /// observation point
        obs_point_id: u32,
    },
    /// A per-bridge IPFIX sample.
    Ipfix {
        /// output port
        output_port: u32,
    },
    /// Userdata of no known shape.
    Opaque(Vec<u8>),
}

fn be16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

fn be32(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

impl UserspaceCookie {
    /// Recognize a cookie.
    ///
    /// A cookie is recognized when its type and length agree and its padding is zero, so that
    /// writing it back yields the same bytes.
    #[must_use]
    pub fn from_userdata(data: &[u8]) -> UserspaceCookie {
        if data.len() < 2 || data.len() > COOKIE_MAX_LEN {
            return UserspaceCookie::Opaque(data.to_vec());
        }
        match (be16(data, 0), data.len()) {
            (COOKIE_SFLOW, 8) => UserspaceCookie::Sflow {
                tci: Tci(be16(data, 2)),
                output: be32(data, 4),
            },
            (COOKIE_SLOW_PATH, 8) if be16(data, 2) == 0 => {
                UserspaceCookie::SlowPath(SlowPathReason::from_bits_retain(be32(data, 4)))
            }
            (COOKIE_FLOW_SAMPLE, 16) => UserspaceCookie::FlowSample {
                probability: be16(data, 2),
                collector_set_id: be32(data, 4),
                obs_domain_id: be32(data, 8),
                obs_point_id: be32(data, 12),
            },
            (COOKIE_IPFIX, 8) if be16(data, 2) == 0 => UserspaceCookie::Ipfix {
                output_port: be32(data, 4),
            },
            _ => UserspaceCookie::Opaque(data.to_vec()),
        }
    }

    /// The userdata bytes.
    #[must_use]
    pub fn to_userdata(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COOKIE_MAX_LEN);
        match self {
            UserspaceCookie::Sflow { tci, output } => {
                out.extend_from_slice(&COOKIE_SFLOW.to_be_bytes());
                out.extend_from_slice(&tci.0.to_be_bytes());
                out.extend_from_slice(&output.to_be_bytes());
            }
            UserspaceCookie::SlowPath(reason) => {
                out.extend_from_slice(&COOKIE_SLOW_PATH.to_be_bytes());
                out.extend_from_slice(&[0, 0]);
                out.extend_from_slice(&reason.bits().to_be_bytes());
            }
            UserspaceCookie::FlowSample {
                probability,
                collector_set_id,
                obs_domain_id,
                obs_point_id,
            } => {
                out.extend_from_slice(&COOKIE_FLOW_SAMPLE.to_be_bytes());
                out.extend_from_slice(&probability.to_be_bytes());
                out.extend_from_slice(&collector_set_id.to_be_bytes());
                out.extend_from_slice(&obs_domain_id.to_be_bytes());
                out.extend_from_slice(&obs_point_id.to_be_bytes());
            }
            UserspaceCookie::Ipfix { output_port } => {
                out.extend_from_slice(&COOKIE_IPFIX.to_be_bytes());
                out.extend_from_slice(&[0, 0]);
                out.extend_from_slice(&output_port.to_be_bytes());
            }
            UserspaceCookie::Opaque(data) => out.extend_from_slice(data),
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_shapes() {
        let cookies = [
            UserspaceCookie::Sflow {
                tci: Tci::from_parts(10, 3, true),
                output: 7,
            },
            UserspaceCookie::SlowPath(SlowPathReason::LACP | SlowPathReason::ACTION),
            UserspaceCookie::FlowSample {
                probability: 100,
                collector_set_id: 1,
                obs_domain_id: 2,
                obs_point_id: 3,
            },
            UserspaceCookie::Ipfix { output_port: 9 },
        ];
        for cookie in cookies {
            let data = cookie.to_userdata();
            assert!(data.len() == 8 || data.len() == 16);
            assert_eq!(UserspaceCookie::from_userdata(&data), cookie);
        }
    }

    #[test]
    fn odd_shapes_are_opaque() {
        // a slow path cookie with the length of a flow sample
        let mut data = UserspaceCookie::SlowPath(SlowPathReason::STP).to_userdata();
        data.extend_from_slice(&[0; 8]);
        assert_eq!(
            UserspaceCookie::from_userdata(&data),
            UserspaceCookie::Opaque(data.clone())
        );
        // junk in the padding
        let data = [0, 4, 0, 1, 0, 0, 0, 5];
        assert!(matches!(
            UserspaceCookie::from_userdata(&data),
            UserspaceCookie::Opaque(_)
        ));
        assert_eq!(
            UserspaceCookie::from_userdata(&[1]),
            UserspaceCookie::Opaque(vec![1])
        );
        assert_eq!(
            UserspaceCookie::from_userdata(&[0; 20]),
            UserspaceCookie::Opaque(vec![0; 20])
        );
    }

    #[test]
    fn reason_names() {
        assert_eq!(SlowPathReason::bit_name(1), Some("cfm"));
        assert_eq!(SlowPathReason::bit_name(1 << 6), Some("action"));
        assert_eq!(SlowPathReason::bit_name(1 << 7), None);
        assert_eq!(SlowPathReason::bit_name(3), None);
        assert_eq!(
            SlowPathReason::ACTION.explanation(),
            "Uses action(s) not supported by datapath"
        );
        assert_eq!((SlowPathReason::CFM | SlowPathReason::BFD).explanation(), "<unknown>");
    }
}
