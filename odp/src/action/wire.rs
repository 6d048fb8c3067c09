// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Actions in attribute form.

use crate::Fitness;
use crate::ODPP_NONE;
use crate::action::put::{
    all_or_nothing, odp_put_push_eth_action, odp_put_tnl_push_action, odp_put_userspace_action,
};
use crate::action::{
    Action, ActionError, HashAlg, OvsActionAttr, OvsSampleAttr, OvsUserspaceAttr, SetField,
    TnlPushData, Userspace, UserspaceCookie,
};
use crate::attr::{Attr, AttrWriter, Attrs};
use crate::key::{
    AttrLen, KeyArp, KeyEthernet, KeyIpv4, KeyIpv6, KeyPayload, KeyPorts, OvsKeyAttr,
    odp_tun_key_from_attr, tun_key_to_attr,
};
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;
use net::mpls::Lse;
use net::vlan::Tci;
use tracing::debug;

fn be32(payload: &[u8]) -> u32 {
    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
}

fn be16(payload: &[u8]) -> u16 {
    u16::from_be_bytes([payload[0], payload[1]])
}

fn key_payload<P: KeyPayload>(payload: &[u8]) -> Result<P, ActionError> {
    P::from_payload(payload).ok_or(ActionError::Malformed("set"))
}

/// The single attribute nested in a set action.
fn only_nested<'a>(attr: &Attr<'a>, name: &'static str) -> Result<Attr<'a>, ActionError> {
    let mut nested = attr.nested();
    match (nested.next(), nested.next()) {
        (Some(Ok(inner)), None) => Ok(inner),
        _ => Err(ActionError::Malformed(name)),
    }
}

impl SetField {
    /// The payload of every kind but [`SetField::Tunnel`], which is nested.
    fn payload(&self) -> Vec<u8> {
        match self {
            SetField::Priority(v)
            | SetField::SkbMark(v)
            | SetField::DpHash(v)
            | SetField::RecircId(v) => v.to_be_bytes().to_vec(),
            SetField::Tunnel(_) => Vec::new(),
            SetField::Ethernet(k) => k.to_bytes(),
            SetField::Ipv4(k) => k.to_bytes(),
            SetField::Ipv6(k) => k.to_bytes(),
            SetField::Tcp(k) | SetField::Udp(k) | SetField::Sctp(k) => k.to_bytes(),
            SetField::Mpls(lse) => lse.to_be_bytes().to_vec(),
            SetField::Arp(k) => k.to_bytes(),
        }
    }

    /// Append the field as a key attribute.
    pub(crate) fn put(&self, w: &mut AttrWriter) -> Result<(), ActionError> {
        match self {
            SetField::Tunnel(tunnel) => tun_key_to_attr(w, tunnel)?,
            _ => w.put_unspec(self.attr().ty(), &self.payload())?,
        }
        Ok(())
    }

    /// Append the field and `mask` as one key attribute, value first.
    pub(crate) fn put_masked(&self, mask: &SetField, w: &mut AttrWriter) -> Result<(), ActionError> {
        if self.attr() != mask.attr() {
            return Err(ActionError::MaskMismatch {
                key: self.attr().name(),
                mask: mask.attr().name(),
            });
        }
        if matches!(self, SetField::Tunnel(_)) {
            return Err(ActionError::MaskNotSupported(OvsKeyAttr::Tunnel.name()));
        }
        let mut payload = self.payload();
        payload.extend_from_slice(&mask.payload());
        w.put_unspec(self.attr().ty(), &payload)?;
        Ok(())
    }

    /// The settable key attribute kind of `attr`.
    fn settable_kind(attr: &Attr<'_>) -> Result<OvsKeyAttr, ActionError> {
        let kind = OvsKeyAttr::from_u16(attr.ty())
            .ok_or_else(|| ActionError::NotSettable(format!("key{}", attr.ty())))?;
        match kind {
            OvsKeyAttr::Priority
            | OvsKeyAttr::SkbMark
            | OvsKeyAttr::Tunnel
            | OvsKeyAttr::Ethernet
            | OvsKeyAttr::Ipv4
            | OvsKeyAttr::Ipv6
            | OvsKeyAttr::Tcp
            | OvsKeyAttr::Udp
            | OvsKeyAttr::Sctp
            | OvsKeyAttr::Mpls
            | OvsKeyAttr::Arp
            | OvsKeyAttr::DpHash
            | OvsKeyAttr::RecircId => Ok(kind),
            _ => Err(ActionError::NotSettable(kind.name().to_string())),
        }
    }

    /// Length of the payload of a kind other than the tunnel.
    fn payload_len(kind: OvsKeyAttr) -> usize {
        match kind.expected_len() {
            AttrLen::Fixed(len) => len,
            // one label stack entry
            AttrLen::Variable | AttrLen::Invalid => Lse::LEN,
        }
    }

    fn from_payload(kind: OvsKeyAttr, payload: &[u8]) -> Result<SetField, ActionError> {
        let expected = SetField::payload_len(kind);
        if payload.len() != expected {
            return Err(ActionError::BadLength {
                name: kind.name(),
                len: payload.len(),
                expected,
            });
        }
        Ok(match kind {
            OvsKeyAttr::Priority => SetField::Priority(be32(payload)),
            OvsKeyAttr::SkbMark => SetField::SkbMark(be32(payload)),
            OvsKeyAttr::DpHash => SetField::DpHash(be32(payload)),
            OvsKeyAttr::RecircId => SetField::RecircId(be32(payload)),
            OvsKeyAttr::Ethernet => SetField::Ethernet(key_payload::<KeyEthernet>(payload)?),
            OvsKeyAttr::Ipv4 => SetField::Ipv4(key_payload::<KeyIpv4>(payload)?),
            OvsKeyAttr::Ipv6 => SetField::Ipv6(key_payload::<KeyIpv6>(payload)?),
            OvsKeyAttr::Tcp => SetField::Tcp(key_payload::<KeyPorts>(payload)?),
            OvsKeyAttr::Udp => SetField::Udp(key_payload::<KeyPorts>(payload)?),
            OvsKeyAttr::Sctp => SetField::Sctp(key_payload::<KeyPorts>(payload)?),
            OvsKeyAttr::Arp => SetField::Arp(key_payload::<KeyArp>(payload)?),
            OvsKeyAttr::Mpls => SetField::Mpls(Lse(be32(payload))),
            _ => return Err(ActionError::NotSettable(kind.name().to_string())),
        })
    }

    /// Read the key attribute of a set action.
    pub(crate) fn from_attr(attr: &Attr<'_>) -> Result<SetField, ActionError> {
        let kind = SetField::settable_kind(attr)?;
        if kind == OvsKeyAttr::Tunnel {
            let (tunnel, fitness) = odp_tun_key_from_attr(attr);
            if fitness == Fitness::Error {
                return Err(ActionError::Malformed("set"));
            }
            return Ok(SetField::Tunnel(tunnel));
        }
        SetField::from_payload(kind, attr.payload())
    }

    /// Read the key attribute of a masked set action: the value followed by the mask.
    pub(crate) fn from_masked_attr(attr: &Attr<'_>) -> Result<(SetField, SetField), ActionError> {
        let kind = SetField::settable_kind(attr)?;
        if kind == OvsKeyAttr::Tunnel {
            return Err(ActionError::MaskNotSupported(kind.name()));
        }
        let half = SetField::payload_len(kind);
        let payload = attr.payload();
        if payload.len() != 2 * half {
            return Err(ActionError::BadLength {
                name: kind.name(),
                len: payload.len(),
                expected: 2 * half,
            });
        }
        let (key, mask) = payload.split_at(half);
        Ok((
            SetField::from_payload(kind, key)?,
            SetField::from_payload(kind, mask)?,
        ))
    }
}

impl Action {
    /// Append the action.
    ///
    /// # Errors
    ///
    /// Fails if the action does not fit, or if it cannot be expressed (a masked set whose key
    /// and mask are different fields, or a tunnel header that is too long).  Nothing is written
    /// on failure.
    pub fn put(&self, w: &mut AttrWriter) -> Result<(), ActionError> {
        all_or_nothing(w, |w| self.put_inner(w))
    }

    fn put_inner(&self, w: &mut AttrWriter) -> Result<(), ActionError> {
        let ty = self.kind().ty();
        match self {
            Action::Output(port) | Action::Recirc(port) | Action::TunnelPop(port) => {
                w.put_be32(ty, *port)?;
            }
            Action::Userspace(userspace) => {
                let userdata = userspace.cookie.as_ref().map(UserspaceCookie::to_userdata);
                odp_put_userspace_action(
                    w,
                    userspace.pid,
                    userdata.as_deref(),
                    userspace.tunnel_out_port.unwrap_or(ODPP_NONE),
                )?;
            }
            Action::Set(field) => {
                let nest = w.start_nested(ty)?;
                field.put(w)?;
                w.end_nested(nest)?;
            }
            Action::SetMasked { key, mask } => {
                let nest = w.start_nested(ty)?;
                key.put_masked(mask, w)?;
                w.end_nested(nest)?;
            }
            Action::PushVlan { tpid, tci } => {
                let payload = w.put_unspec_zero(ty, 4)?;
                payload[..2].copy_from_slice(&tpid.to_be_bytes());
                payload[2..].copy_from_slice(&tci.0.to_be_bytes());
            }
            Action::PopVlan | Action::PopEth => w.put_flag(ty)?,
            Action::Sample {
                probability,
                actions,
            } => {
                let nest = w.start_nested(ty)?;
                w.put_be32(OvsSampleAttr::Probability as u16, *probability)?;
                let inner = w.start_nested(OvsSampleAttr::Actions as u16)?;
                for action in actions {
                    action.put_inner(w)?;
                }
                w.end_nested(inner)?;
                w.end_nested(nest)?;
            }
            Action::Hash { alg, basis } => {
                let payload = w.put_unspec_zero(ty, 8)?;
                payload[..4].copy_from_slice(&alg.as_u32().to_be_bytes());
                payload[4..].copy_from_slice(&basis.to_be_bytes());
            }
            Action::PushMpls { lse, ethertype } => {
                let payload = w.put_unspec_zero(ty, 6)?;
                payload[..4].copy_from_slice(&lse.to_be_bytes());
                payload[4..].copy_from_slice(&ethertype.to_be_bytes());
            }
            Action::PopMpls(ethertype) => w.put_be16(ty, ethertype.raw())?,
            Action::TunnelPush(data) => odp_put_tnl_push_action(w, data)?,
            Action::PushEth {
                src,
                dst,
                ethertype,
            } => odp_put_push_eth_action(w, *src, *dst, *ethertype)?,
        }
        Ok(())
    }

    /// Read one action attribute.
    ///
    /// # Errors
    ///
    /// Fails on unknown action types, payloads of the wrong size, nested attributes that are
    /// missing or malformed, and unknown hash algorithms.
    pub fn from_attr(attr: &Attr<'_>) -> Result<Action, ActionError> {
        let kind = OvsActionAttr::from_u16(attr.ty()).ok_or(ActionError::UnknownType(attr.ty()))?;
        let payload = attr.payload();
        if let AttrLen::Fixed(expected) = kind.expected_len() {
            if payload.len() != expected {
                return Err(ActionError::BadLength {
                    name: kind.name(),
                    len: payload.len(),
                    expected,
                });
            }
        }
        Ok(match kind {
            OvsActionAttr::Unspec => return Err(ActionError::UnknownType(attr.ty())),
            OvsActionAttr::Output => Action::Output(be32(payload)),
            OvsActionAttr::Recirc => Action::Recirc(be32(payload)),
            OvsActionAttr::TunnelPop => Action::TunnelPop(be32(payload)),
            OvsActionAttr::Userspace => Action::Userspace(userspace_from_attr(attr)?),
            OvsActionAttr::Set => Action::Set(SetField::from_attr(&only_nested(attr, "set")?)?),
            OvsActionAttr::SetMasked => {
                let (key, mask) =
                    SetField::from_masked_attr(&only_nested(attr, "set_masked")?)?;
                Action::SetMasked { key, mask }
            }
            OvsActionAttr::PushVlan => Action::PushVlan {
                tpid: EthType::new(be16(payload)),
                tci: Tci(be16(&payload[2..])),
            },
            OvsActionAttr::PopVlan => Action::PopVlan,
            OvsActionAttr::Sample => sample_from_attr(attr)?,
            OvsActionAttr::Hash => {
                let alg = be32(payload);
                Action::Hash {
                    alg: HashAlg::from_u32(alg).ok_or(ActionError::UnknownHashAlg(alg))?,
                    basis: be32(&payload[4..]),
                }
            }
            OvsActionAttr::PushMpls => Action::PushMpls {
                lse: Lse(be32(payload)),
                ethertype: EthType::new(be16(&payload[4..])),
            },
            OvsActionAttr::PopMpls => Action::PopMpls(EthType::new(be16(payload))),
            OvsActionAttr::TunnelPush => Action::TunnelPush(TnlPushData::from_payload(payload)?),
            OvsActionAttr::PushEth => {
                let mut src = [0; 6];
                let mut dst = [0; 6];
                src.copy_from_slice(&payload[..6]);
                dst.copy_from_slice(&payload[6..12]);
                Action::PushEth {
                    src: Mac(src),
                    dst: Mac(dst),
                    ethertype: EthType::new(be16(&payload[12..])),
                }
            }
            OvsActionAttr::PopEth => Action::PopEth,
        })
    }
}

pub(crate) fn userspace_from_attr(attr: &Attr<'_>) -> Result<Userspace, ActionError> {
    const MALFORMED: ActionError = ActionError::Malformed("userspace");
    let mut pid = None;
    let mut cookie = None;
    let mut tunnel_out_port = None;
    for inner in attr.nested() {
        let inner = inner.map_err(|_| MALFORMED)?;
        match inner.ty() {
            ty if ty == OvsUserspaceAttr::Pid as u16 => {
                pid = Some(inner.get_be32().map_err(|_| MALFORMED)?);
            }
            ty if ty == OvsUserspaceAttr::Userdata as u16 => {
                cookie = Some(UserspaceCookie::from_userdata(inner.payload()));
            }
            ty if ty == OvsUserspaceAttr::EgressTunPort as u16 => {
                tunnel_out_port = Some(inner.get_be32().map_err(|_| MALFORMED)?);
            }
            _ => return Err(MALFORMED),
        }
    }
    Ok(Userspace {
        pid: pid.ok_or(MALFORMED)?,
        cookie,
        tunnel_out_port,
    })
}

fn sample_from_attr(attr: &Attr<'_>) -> Result<Action, ActionError> {
    const MALFORMED: ActionError = ActionError::Malformed("sample");
    let mut probability = None;
    let mut actions = None;
    for inner in attr.nested() {
        let inner = inner.map_err(|_| MALFORMED)?;
        match inner.ty() {
            ty if ty == OvsSampleAttr::Probability as u16 => {
                probability = Some(inner.get_be32().map_err(|_| MALFORMED)?);
            }
            ty if ty == OvsSampleAttr::Actions as u16 => {
                actions = Some(odp_actions_from_wire(inner.payload())?);
            }
            _ => return Err(MALFORMED),
        }
    }
    match (probability, actions) {
        (Some(probability), Some(actions)) => Ok(Action::Sample {
            probability,
            actions,
        }),
        _ => Err(MALFORMED),
    }
}

/// Append an action list.
///
/// # Errors
///
/// Fails like [`Action::put`].  Nothing is written on failure.
pub fn odp_actions_to_wire(w: &mut AttrWriter, actions: &[Action]) -> Result<(), ActionError> {
    all_or_nothing(w, |w| actions.iter().try_for_each(|action| action.put_inner(w)))
}

/// Read an action list.
///
/// # Errors
///
/// Fails like [`Action::from_attr`] on the first bad action, and with
/// [`ActionError::Leftover`] if bytes remain that do not form an attribute.
pub fn odp_actions_from_wire(data: &[u8]) -> Result<Vec<Action>, ActionError> {
    let mut attrs = Attrs::new(data);
    let mut actions = Vec::new();
    while let Some(attr) = attrs.next() {
        let Ok(attr) = attr else {
            debug!("actions: {} leftover bytes", attrs.left());
            return Err(ActionError::Leftover(attrs.left()));
        };
        actions.push(Action::from_attr(&attr).inspect_err(|e| {
            debug!("actions: {e}");
        })?);
    }
    Ok(actions)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::action::{OVS_HASH_ALG_L4, SlowPathReason};
    use crate::flow::{FlowTnl, TnlFlags};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn encode(actions: &[Action]) -> Vec<u8> {
        let mut w = AttrWriter::new();
        odp_actions_to_wire(&mut w, actions).unwrap();
        w.into_bytes()
    }

    fn every_kind() -> Vec<Action> {
        vec![
            Action::Output(1),
            Action::Userspace(Userspace {
                pid: 7,
                cookie: Some(UserspaceCookie::SlowPath(SlowPathReason::CFM)),
                tunnel_out_port: Some(3),
            }),
            Action::Set(SetField::SkbMark(9)),
            Action::Set(SetField::Tunnel(FlowTnl {
                tun_id: 0x42,
                ip_dst: Ipv4Addr::new(10, 0, 0, 2),
                ip_ttl: 64,
                flags: TnlFlags::KEY,
                ..FlowTnl::default()
            })),
            Action::SetMasked {
                key: SetField::Tcp(KeyPorts { src: 80, dst: 0 }),
                mask: SetField::Tcp(KeyPorts {
                    src: 0xffff,
                    dst: 0,
                }),
            },
            Action::SetMasked {
                key: SetField::Mpls(Lse::from_parts(5, 0, true, 0)),
                mask: SetField::Mpls(Lse(Lse::LABEL_MASK)),
            },
            Action::PushVlan {
                tpid: EthType::VLAN,
                tci: Tci::from_parts(10, 2, true),
            },
            Action::PopVlan,
            Action::Sample {
                probability: u32::MAX / 2,
                actions: vec![Action::Output(2), Action::PopVlan],
            },
            Action::Recirc(5),
            Action::Hash {
                alg: HashAlg::L4,
                basis: 77,
            },
            Action::PushMpls {
                lse: Lse::from_parts(100, 1, true, 64),
                ethertype: EthType::MPLS,
            },
            Action::PopMpls(EthType::IPV4),
            Action::TunnelPush(TnlPushData {
                tnl_port: 4,
                out_port: 1,
                tnl_type: 4,
                header: vec![0xaa; 50],
            }),
            Action::TunnelPop(4),
            Action::PushEth {
                src: Mac([2, 0, 0, 0, 0, 1]),
                dst: Mac([2, 0, 0, 0, 0, 2]),
                ethertype: EthType::IPV6,
            },
            Action::PopEth,
        ]
    }

    #[test]
    fn every_kind_decodes_back() {
        let actions = every_kind();
        assert_eq!(odp_actions_from_wire(&encode(&actions)).unwrap(), actions);
    }

    #[test]
    fn fixed_layouts() {
        let bytes = encode(&[Action::PushMpls {
            lse: Lse(0x0006_41ff),
            ethertype: EthType::MPLS,
        }]);
        assert_eq!(&bytes[4..10], &[0x00, 0x06, 0x41, 0xff, 0x88, 0x47]);
        let bytes = encode(&[Action::Hash {
            alg: HashAlg::L4,
            basis: 1,
        }]);
        assert_eq!(&bytes[4..], &[0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn bad_lengths() {
        let mut w = AttrWriter::new();
        w.put_be16(OvsActionAttr::Output.ty(), 1).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::BadLength {
                name: "output",
                len: 2,
                expected: 4
            })
        );

        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::Set.ty()).unwrap();
        w.put_be16(OvsKeyAttr::SkbMark.ty(), 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::BadLength {
                name: "skb_mark",
                len: 2,
                expected: 4
            })
        );
    }

    #[test]
    fn unknown_and_unsettable() {
        let mut w = AttrWriter::new();
        w.put_flag(OvsActionAttr::MAX + 1).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::UnknownType(16))
        );

        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::Set.ty()).unwrap();
        w.put_be32(OvsKeyAttr::InPort.ty(), 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::NotSettable("in_port".to_string()))
        );

        let mut w = AttrWriter::new();
        w.put_unspec(OvsActionAttr::Hash.ty(), &[0, 0, 0, 9, 0, 0, 0, 0])
            .unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::UnknownHashAlg(9))
        );
        assert_eq!(OVS_HASH_ALG_L4, 0);
    }

    #[test]
    fn trailing_bytes() {
        let mut bytes = encode(&[Action::Output(1)]);
        bytes.extend_from_slice(&[1, 2]);
        assert_eq!(odp_actions_from_wire(&bytes), Err(ActionError::Leftover(2)));
    }

    #[test]
    fn masked_sets_check_their_halves() {
        let mismatch = Action::SetMasked {
            key: SetField::Priority(1),
            mask: SetField::SkbMark(1),
        };
        let mut w = AttrWriter::new();
        w.put_be32(OvsActionAttr::Output.ty(), 1).unwrap();
        assert_eq!(
            odp_actions_to_wire(&mut w, &[Action::PopVlan, mismatch]),
            Err(ActionError::MaskMismatch {
                key: "skb_priority",
                mask: "skb_mark"
            })
        );
        assert_eq!(w.len(), 8);

        let tunnel = Action::SetMasked {
            key: SetField::Tunnel(FlowTnl::default()),
            mask: SetField::Tunnel(FlowTnl::default()),
        };
        assert_eq!(
            tunnel.put(&mut w),
            Err(ActionError::MaskNotSupported("tunnel"))
        );

        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::SetMasked.ty()).unwrap();
        w.put_be32(OvsKeyAttr::SkbMark.ty(), 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::BadLength {
                name: "skb_mark",
                len: 4,
                expected: 8
            })
        );
    }

    #[test]
    fn nested_structures_are_checked() {
        // a sample without actions
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::Sample.ty()).unwrap();
        w.put_be32(OvsSampleAttr::Probability as u16, 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::Malformed("sample"))
        );

        // a userspace action without a pid
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::Userspace.ty()).unwrap();
        w.put_be32(OvsUserspaceAttr::EgressTunPort as u16, 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::Malformed("userspace"))
        );

        // a set of two fields
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::Set.ty()).unwrap();
        w.put_be32(OvsKeyAttr::SkbMark.ty(), 1).unwrap();
        w.put_be32(OvsKeyAttr::Priority.ty(), 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::Malformed("set"))
        );

        // bad nested sample actions surface as themselves
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsActionAttr::Sample.ty()).unwrap();
        w.put_be32(OvsSampleAttr::Probability as u16, 1).unwrap();
        let inner = w.start_nested(OvsSampleAttr::Actions as u16).unwrap();
        w.put_be16(OvsActionAttr::Recirc.ty(), 1).unwrap();
        w.end_nested(inner).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()),
            Err(ActionError::BadLength {
                name: "recirc",
                len: 2,
                expected: 4
            })
        );
    }

    #[test]
    fn empty_list() {
        assert_eq!(odp_actions_from_wire(&[]).unwrap(), vec![]);
        assert!(encode(&[]).is_empty());
    }
}
