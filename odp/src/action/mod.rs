// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Datapath actions.
//!
//! An action list is a sequence of attributes, one per action, executed left to right.  This
//! module has the typed form ([`Action`]), the attribute form (see [`odp_actions_to_wire`] and
//! [`odp_actions_from_wire`]) and the text form ([`format_odp_actions`] and
//! [`odp_actions_from_string`]).

mod cookie;
mod format;
mod parse;
mod put;
mod tnl;
mod wire;

pub use cookie::{SlowPathReason, UserspaceCookie};
pub use format::format_odp_actions;
pub use parse::odp_actions_from_string;
pub use put::{
    odp_put_pop_eth_action, odp_put_push_eth_action, odp_put_tnl_push_action,
    odp_put_tunnel_action, odp_put_userspace_action,
};
pub use tnl::{
    GreFlags, OVS_VPORT_TYPE_GRE, OVS_VPORT_TYPE_VXLAN, TNL_PUSH_HEADER_SIZE, TnlHeader, TnlL4,
    TnlPushData,
};
pub use wire::{odp_actions_from_wire, odp_actions_to_wire};

use crate::attr::AttrError;
use crate::flow::FlowTnl;
use crate::key::{AttrLen, KeyArp, KeyError, KeyEthernet, KeyIpv4, KeyIpv6, KeyPorts, OvsKeyAttr};
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::mpls::Lse;
use net::vlan::Tci;
use std::fmt::{Display, Formatter};

/// Action attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum OvsActionAttr {
    Unspec = 0,
    Output = 1,
    /// Nested [`OvsUserspaceAttr`] attributes.
    Userspace = 2,
    /// One nested key attribute.
    Set = 3,
    PushVlan = 4,
    PopVlan = 5,
    /// Nested [`OvsSampleAttr`] attributes.
    Sample = 6,
    Recirc = 7,
    Hash = 8,
    PushMpls = 9,
    PopMpls = 10,
    /// One nested key attribute whose payload is the value followed by the mask.
    SetMasked = 11,
    TunnelPush = 12,
    TunnelPop = 13,
    PushEth = 14,
    PopEth = 15,
}

impl OvsActionAttr {
    /// Highest known type.
    pub const MAX: u16 = OvsActionAttr::PopEth as u16;

    const ALL: [OvsActionAttr; 16] = [
        OvsActionAttr::Unspec,
        OvsActionAttr::Output,
        OvsActionAttr::Userspace,
        OvsActionAttr::Set,
        OvsActionAttr::PushVlan,
        OvsActionAttr::PopVlan,
        OvsActionAttr::Sample,
        OvsActionAttr::Recirc,
        OvsActionAttr::Hash,
        OvsActionAttr::PushMpls,
        OvsActionAttr::PopMpls,
        OvsActionAttr::SetMasked,
        OvsActionAttr::TunnelPush,
        OvsActionAttr::TunnelPop,
        OvsActionAttr::PushEth,
        OvsActionAttr::PopEth,
    ];

    /// The attribute type for a wire value, if known.
    #[must_use]
    pub fn from_u16(ty: u16) -> Option<OvsActionAttr> {
        OvsActionAttr::ALL.get(usize::from(ty)).copied()
    }

    /// The wire value.
    #[must_use]
    pub const fn ty(self) -> u16 {
        self as u16
    }

    /// Name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OvsActionAttr::Unspec => "unspec",
            OvsActionAttr::Output => "output",
            OvsActionAttr::Userspace => "userspace",
            OvsActionAttr::Set => "set",
            OvsActionAttr::PushVlan => "push_vlan",
            OvsActionAttr::PopVlan => "pop_vlan",
            OvsActionAttr::Sample => "sample",
            OvsActionAttr::Recirc => "recirc",
            OvsActionAttr::Hash => "hash",
            OvsActionAttr::PushMpls => "push_mpls",
            OvsActionAttr::PopMpls => "pop_mpls",
            OvsActionAttr::SetMasked => "set_masked",
            OvsActionAttr::TunnelPush => "tnl_push",
            OvsActionAttr::TunnelPop => "tnl_pop",
            OvsActionAttr::PushEth => "push_eth",
            OvsActionAttr::PopEth => "pop_eth",
        }
    }

    /// Payload length this type must have.
    #[must_use]
    pub const fn expected_len(self) -> AttrLen {
        match self {
            OvsActionAttr::Unspec => AttrLen::Invalid,
            OvsActionAttr::Output | OvsActionAttr::TunnelPop | OvsActionAttr::Recirc => {
                AttrLen::Fixed(4)
            }
            OvsActionAttr::PushEth => AttrLen::Fixed(14),
            OvsActionAttr::PopEth | OvsActionAttr::PopVlan => AttrLen::Fixed(0),
            OvsActionAttr::PushVlan => AttrLen::Fixed(4),
            OvsActionAttr::PushMpls => AttrLen::Fixed(6),
            OvsActionAttr::PopMpls => AttrLen::Fixed(2),
            OvsActionAttr::Hash => AttrLen::Fixed(8),
            OvsActionAttr::Userspace
            | OvsActionAttr::Set
            | OvsActionAttr::SetMasked
            | OvsActionAttr::Sample
            | OvsActionAttr::TunnelPush => AttrLen::Variable,
        }
    }

    /// Actions that only the datapath can carry out.
    #[must_use]
    pub const fn needs_datapath(self) -> bool {
        matches!(
            self,
            OvsActionAttr::Output
                | OvsActionAttr::TunnelPush
                | OvsActionAttr::TunnelPop
                | OvsActionAttr::Userspace
                | OvsActionAttr::Recirc
        )
    }
}

/// Expected payload length of a raw action type.
#[must_use]
pub fn odp_action_len(ty: u16) -> AttrLen {
    OvsActionAttr::from_u16(ty).map_or(AttrLen::Invalid, OvsActionAttr::expected_len)
}

/// Nested attributes of a userspace action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OvsUserspaceAttr {
    /// Netlink port id of the receiver.
    Pid = 1,
    /// Opaque data handed back with the packet.
    Userdata = 2,
    /// Tunnel port the packet would have left through.
    EgressTunPort = 3,
}

/// Nested attributes of a sample action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OvsSampleAttr {
    /// Fraction of `u32::MAX`.
    Probability = 1,
    /// Nested action list.
    Actions = 2,
}

/// Wire value of [`HashAlg::L4`].
pub const OVS_HASH_ALG_L4: u32 = 0;

/// Hash algorithms of the hash action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    /// Hash of the 5-tuple.
    L4,
}

impl HashAlg {
    /// The algorithm for a wire value, if known.
    #[must_use]
    pub const fn from_u32(alg: u32) -> Option<HashAlg> {
        match alg {
            OVS_HASH_ALG_L4 => Some(HashAlg::L4),
            _ => None,
        }
    }

    /// The wire value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            HashAlg::L4 => OVS_HASH_ALG_L4,
        }
    }
}

/// A userspace upcall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Userspace {
    /// Netlink port id of the receiver.
    pub pid: u32,
    /// Data handed back with the packet.
    pub cookie: Option<UserspaceCookie>,
    /// Tunnel port the packet would have left through.
    pub tunnel_out_port: Option<u32>,
}

/// A value written by a set action.
///
/// Only these key attributes can be set; the others describe headers or metadata the datapath
/// cannot rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SetField {
    Priority(u32),
    SkbMark(u32),
    Tunnel(FlowTnl),
    Ethernet(KeyEthernet),
    Ipv4(KeyIpv4),
    Ipv6(KeyIpv6),
    Tcp(KeyPorts),
    Udp(KeyPorts),
    Sctp(KeyPorts),
    /// The outermost label stack entry.
    Mpls(Lse),
    Arp(KeyArp),
    DpHash(u32),
    RecircId(u32),
}

impl SetField {
    /// The key attribute that carries the field.
    #[must_use]
    pub const fn attr(&self) -> OvsKeyAttr {
        match self {
            SetField::Priority(_) => OvsKeyAttr::Priority,
            SetField::SkbMark(_) => OvsKeyAttr::SkbMark,
            SetField::Tunnel(_) => OvsKeyAttr::Tunnel,
            SetField::Ethernet(_) => OvsKeyAttr::Ethernet,
            SetField::Ipv4(_) => OvsKeyAttr::Ipv4,
            SetField::Ipv6(_) => OvsKeyAttr::Ipv6,
            SetField::Tcp(_) => OvsKeyAttr::Tcp,
            SetField::Udp(_) => OvsKeyAttr::Udp,
            SetField::Sctp(_) => OvsKeyAttr::Sctp,
            SetField::Mpls(_) => OvsKeyAttr::Mpls,
            SetField::Arp(_) => OvsKeyAttr::Arp,
            SetField::DpHash(_) => OvsKeyAttr::DpHash,
            SetField::RecircId(_) => OvsKeyAttr::RecircId,
        }
    }
}

/// One datapath action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send to a datapath port.
    Output(u32),
    /// Send to userspace.
    Userspace(Userspace),
    /// Overwrite a field.
    Set(SetField),
    /// Overwrite the bits of a field selected by `mask`, which must be the same kind of field.
    SetMasked {
        /// new bits
        key: SetField,
        /// bits to overwrite
        mask: SetField,
    },
    /// Insert an 802.1Q tag.
    PushVlan {
        /// tag protocol identifier
        tpid: EthType,
        /// tag control information; the CFI bit must be set
        tci: Tci,
    },
    /// Remove the outermost 802.1Q tag.
    PopVlan,
    /// Run `actions` on a random fraction of the packets.
    Sample {
        /// fraction of `u32::MAX` of the packets to sample
        probability: u32,
        /// actions run on the sampled packets
        actions: Vec<Action>,
    },
    /// Run the packet through the datapath again with this recirculation id.
    Recirc(u32),
    /// Store a hash of the packet in its metadata.
    Hash {
        /// what to hash
        alg: HashAlg,
        /// hash seed
        basis: u32,
    },
    /// Push an MPLS label stack entry.
    PushMpls {
        /// the new entry
        lse: Lse,
        /// ethertype of the packet after the push (one of the MPLS ethertypes)
        ethertype: EthType,
    },
    /// Pop the outermost MPLS label stack entry; the packet gets this ethertype.
    PopMpls(EthType),
    /// Encapsulate in a tunnel header and send.
    TunnelPush(TnlPushData),
    /// Decapsulate and send to a tunnel port.
    TunnelPop(u32),
    /// Prepend an Ethernet header.
    PushEth {
        /// source address
        src: Mac,
        /// destination address
        dst: Mac,
        /// ethertype of the new header
        ethertype: EthType,
    },
    /// Strip the Ethernet header.
    PopEth,
}

impl Action {
    /// The attribute type of the action.
    #[must_use]
    pub const fn kind(&self) -> OvsActionAttr {
        match self {
            Action::Output(_) => OvsActionAttr::Output,
            Action::Userspace(_) => OvsActionAttr::Userspace,
            Action::Set(_) => OvsActionAttr::Set,
            Action::SetMasked { .. } => OvsActionAttr::SetMasked,
            Action::PushVlan { .. } => OvsActionAttr::PushVlan,
            Action::PopVlan => OvsActionAttr::PopVlan,
            Action::Sample { .. } => OvsActionAttr::Sample,
            Action::Recirc(_) => OvsActionAttr::Recirc,
            Action::Hash { .. } => OvsActionAttr::Hash,
            Action::PushMpls { .. } => OvsActionAttr::PushMpls,
            Action::PopMpls(_) => OvsActionAttr::PopMpls,
            Action::TunnelPush(_) => OvsActionAttr::TunnelPush,
            Action::TunnelPop(_) => OvsActionAttr::TunnelPop,
            Action::PushEth { .. } => OvsActionAttr::PushEth,
            Action::PopEth => OvsActionAttr::PopEth,
        }
    }

    /// True for the actions that are handed to the datapath instead of being applied to the
    /// packet.
    #[must_use]
    pub const fn needs_datapath(&self) -> bool {
        self.kind().needs_datapath()
    }
}

/// Formats the action in its text form.  An action that cannot be encoded (a masked set whose
/// key and mask disagree) formats as its debug form.
impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut w = crate::attr::AttrWriter::new();
        match self.put(&mut w) {
            Ok(()) => f.write_str(&format_odp_actions(w.as_bytes())),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// Errors of the action codec.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The attribute layer failed.
    #[error(transparent)]
    Attr(#[from] AttrError),
    /// The action type is not known.
    #[error("unknown action type {0}")]
    UnknownType(u16),
    /// A fixed size action has the wrong size.
    #[error("{name} action has length {len}, expected {expected}")]
    BadLength {
        /// action name
        name: &'static str,
        /// payload length
        len: usize,
        /// required payload length
        expected: usize,
    },
    /// A nested structure is missing a part or has parts of the wrong size.
    #[error("malformed {0} action")]
    Malformed(&'static str),
    /// The hash action names an unknown algorithm.
    #[error("unknown hash algorithm {0}")]
    UnknownHashAlg(u32),
    /// The key attribute of a set action cannot be set.
    #[error("{0} cannot be set")]
    NotSettable(String),
    /// The field cannot be set under a mask.
    #[error("{0} cannot be set under a mask")]
    MaskNotSupported(&'static str),
    /// The key and mask of a masked set are different kinds of field.
    #[error("masked set of {key} with a mask for {mask}")]
    MaskMismatch {
        /// kind of the key
        key: &'static str,
        /// kind of the mask
        mask: &'static str,
    },
    /// Bytes follow the last complete action.
    #[error("{0} leftover bytes after the last action")]
    Leftover(usize),
    /// The text form did not parse.
    #[error("expected {expected} at \"{at}\"")]
    Syntax {
        /// what was expected
        expected: &'static str,
        /// the text where parsing stopped
        at: String,
    },
    /// The field of a set action did not parse.
    #[error(transparent)]
    Key(#[from] KeyError),
}
