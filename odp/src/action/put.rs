// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Helpers appending single actions to an attribute buffer.
//!
//! Each helper writes all of its action or nothing.

use crate::ODPP_NONE;
use crate::action::tnl::TNL_PUSH_HEADER_SIZE;
use crate::action::{ActionError, OvsActionAttr, OvsUserspaceAttr, TnlPushData};
use crate::attr::{AttrError, AttrWriter};
use crate::flow::FlowTnl;
use crate::key::tun_key_to_attr;
use net::eth::ethtype::EthType;
use net::eth::mac::Mac;

/// Shortest userdata put on the wire; shorter userdata is zero padded.
pub(crate) const USERDATA_MIN_LEN: usize = 8;

/// Run `f`, dropping whatever it wrote if it fails.
pub(crate) fn all_or_nothing<T, E>(
    w: &mut AttrWriter,
    f: impl FnOnce(&mut AttrWriter) -> Result<T, E>,
) -> Result<T, E> {
    let start = w.len();
    let result = f(w);
    if result.is_err() {
        w.truncate(start);
    }
    result
}

/// Append a userspace action.
///
/// `userdata` is zero padded to at least 8 bytes.  `tunnel_out_port` is left out when it is
/// [`ODPP_NONE`].  Returns the offset of the userdata payload in `w`, so that the caller can fill
/// it in later.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the action does not fit.
pub fn odp_put_userspace_action(
    w: &mut AttrWriter,
    pid: u32,
    userdata: Option<&[u8]>,
    tunnel_out_port: u32,
) -> Result<Option<usize>, AttrError> {
    all_or_nothing(w, |w| {
        let nest = w.start_nested(OvsActionAttr::Userspace.ty())?;
        w.put_be32(OvsUserspaceAttr::Pid as u16, pid)?;
        let offset = match userdata {
            Some(data) => {
                let len = data.len().max(USERDATA_MIN_LEN);
                let payload = w.put_unspec_zero(OvsUserspaceAttr::Userdata as u16, len)?;
                payload[..data.len()].copy_from_slice(data);
                Some(w.len() - crate::attr::align(len))
            }
            None => None,
        };
        if tunnel_out_port != ODPP_NONE {
            w.put_be32(OvsUserspaceAttr::EgressTunPort as u16, tunnel_out_port)?;
        }
        w.end_nested(nest)?;
        Ok(offset)
    })
}

/// Append `set(tunnel(...))`.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the action does not fit.
pub fn odp_put_tunnel_action(w: &mut AttrWriter, tunnel: &FlowTnl) -> Result<(), AttrError> {
    all_or_nothing(w, |w| {
        let nest = w.start_nested(OvsActionAttr::Set.ty())?;
        tun_key_to_attr(w, tunnel)?;
        w.end_nested(nest)
    })
}

/// Append a push of an Ethernet header.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the action does not fit.
pub fn odp_put_push_eth_action(
    w: &mut AttrWriter,
    src: Mac,
    dst: Mac,
    ethertype: EthType,
) -> Result<(), AttrError> {
    let payload = w.put_unspec_zero(OvsActionAttr::PushEth.ty(), 14)?;
    payload[..6].copy_from_slice(&src.0);
    payload[6..12].copy_from_slice(&dst.0);
    payload[12..].copy_from_slice(&ethertype.to_be_bytes());
    Ok(())
}

/// Append a pop of the Ethernet header.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the action does not fit.
pub fn odp_put_pop_eth_action(w: &mut AttrWriter) -> Result<(), AttrError> {
    w.put_flag(OvsActionAttr::PopEth.ty())
}

/// Append a tunnel push.
///
/// # Errors
///
/// Returns [`ActionError::Malformed`] if the header is longer than [`TNL_PUSH_HEADER_SIZE`], or
/// an attribute error if the action does not fit.
pub fn odp_put_tnl_push_action(w: &mut AttrWriter, data: &TnlPushData) -> Result<(), ActionError> {
    if data.header.len() > TNL_PUSH_HEADER_SIZE {
        return Err(ActionError::Malformed("tnl_push"));
    }
    w.put_unspec(OvsActionAttr::TunnelPush.ty(), &data.to_payload())?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::action::{Action, Userspace, UserspaceCookie, odp_actions_from_wire};
    use crate::attr::Attrs;
    use crate::flow::TnlFlags;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    #[test]
    fn userdata_is_padded() {
        let mut w = AttrWriter::new();
        let offset = odp_put_userspace_action(&mut w, 5, Some(&[1, 2, 3]), ODPP_NONE)
            .unwrap()
            .unwrap();
        assert_eq!(&w.as_bytes()[offset..offset + 8], &[1, 2, 3, 0, 0, 0, 0, 0]);
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()).unwrap(),
            vec![Action::Userspace(Userspace {
                pid: 5,
                cookie: Some(UserspaceCookie::Opaque(vec![1, 2, 3, 0, 0, 0, 0, 0])),
                tunnel_out_port: None,
            })]
        );
    }

    #[test]
    fn userspace_without_userdata() {
        let mut w = AttrWriter::new();
        let offset = odp_put_userspace_action(&mut w, 1, None, 9).unwrap();
        assert_eq!(offset, None);
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()).unwrap(),
            vec![Action::Userspace(Userspace {
                pid: 1,
                cookie: None,
                tunnel_out_port: Some(9),
            })]
        );
    }

    #[test]
    fn failed_puts_write_nothing() {
        let mut w = AttrWriter::with_limit(16);
        w.put_be32(OvsActionAttr::Output.ty(), 1).unwrap();
        assert!(odp_put_userspace_action(&mut w, 1, Some(&[0; 8]), ODPP_NONE).is_err());
        let tunnel = FlowTnl {
            ip_dst: Ipv4Addr::new(10, 0, 0, 1),
            ip_ttl: 64,
            flags: TnlFlags::DONT_FRAGMENT,
            ..FlowTnl::default()
        };
        assert!(odp_put_tunnel_action(&mut w, &tunnel).is_err());
        assert_eq!(w.len(), 8);
    }

    #[test]
    fn push_and_pop_eth() {
        let mut w = AttrWriter::new();
        let src = Mac([0, 1, 2, 3, 4, 5]);
        let dst = Mac([6, 7, 8, 9, 10, 11]);
        odp_put_push_eth_action(&mut w, src, dst, EthType::IPV4).unwrap();
        odp_put_pop_eth_action(&mut w).unwrap();
        let attrs: Vec<_> = Attrs::new(w.as_bytes()).map(Result::unwrap).collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].payload()[12..], [0x08, 0x00]);
        assert!(attrs[1].is_empty());
        assert_eq!(
            odp_actions_from_wire(w.as_bytes()).unwrap(),
            vec![
                Action::PushEth {
                    src,
                    dst,
                    ethertype: EthType::IPV4
                },
                Action::PopEth
            ]
        );
    }

    #[test]
    fn oversized_tunnel_header() {
        let mut w = AttrWriter::new();
        let data = TnlPushData {
            tnl_port: 1,
            out_port: 2,
            tnl_type: 4,
            header: vec![0; TNL_PUSH_HEADER_SIZE + 1],
        };
        assert_eq!(
            odp_put_tnl_push_action(&mut w, &data),
            Err(ActionError::Malformed("tnl_push"))
        );
        assert!(w.is_empty());
    }
}
