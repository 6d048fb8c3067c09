// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The nested tunnel attribute.

use crate::Fitness;
use crate::attr::{Attr, AttrError, AttrWriter};
use crate::flow::{FlowTnl, TnlFlags};
use crate::key::{AttrLen, OvsKeyAttr, OvsTunnelKeyAttr};
use arrayvec::ArrayVec;
use std::net::Ipv4Addr;
use tracing::debug;

const GENEVE_OPT_HDR_LEN: usize = 4;
const GENEVE_OPT_LEN_MASK: u8 = 0x1f;
const GENEVE_CRIT_OPT_TYPE: u8 = 0x80;

/// Walk a block of Geneve options.  We understand none of them, so only the framing is checked
/// and a critical option is refused.
fn check_geneve_opts(mut opts: &[u8]) -> bool {
    while !opts.is_empty() {
        let Some(&[_, _, ty, len]) = opts.first_chunk::<GENEVE_OPT_HDR_LEN>() else {
            return false;
        };
        let len = GENEVE_OPT_HDR_LEN + usize::from(len & GENEVE_OPT_LEN_MASK) * 4;
        if len > opts.len() {
            return false;
        }
        if ty & GENEVE_CRIT_OPT_TYPE != 0 {
            debug!("critical geneve option {ty:#x} is not supported");
            return false;
        }
        opts = &opts[len..];
    }
    true
}

fn read_tunnel(attr: &Attr<'_>, tun: &mut FlowTnl) -> Result<Fitness, AttrError> {
    let mut ttl = false;
    let mut unknown = false;
    for a in attr.nested() {
        let a = a?;
        let Some(kind) = OvsTunnelKeyAttr::from_u16(a.ty()) else {
            unknown = true;
            continue;
        };
        if let AttrLen::Fixed(len) = kind.expected_len() {
            if a.len() != len {
                debug!("tunnel attribute {} has length {}, expected {len}", a.ty(), a.len());
                return Ok(Fitness::Error);
            }
        }
        match kind {
            OvsTunnelKeyAttr::Id => {
                tun.tun_id = a.get_be64()?;
                tun.flags |= TnlFlags::KEY;
            }
            OvsTunnelKeyAttr::Ipv4Src => tun.ip_src = Ipv4Addr::from(a.get_be32()?),
            OvsTunnelKeyAttr::Ipv4Dst => tun.ip_dst = Ipv4Addr::from(a.get_be32()?),
            OvsTunnelKeyAttr::Tos => tun.ip_tos = a.get_u8()?,
            OvsTunnelKeyAttr::Ttl => {
                tun.ip_ttl = a.get_u8()?;
                ttl = true;
            }
            OvsTunnelKeyAttr::DontFragment => tun.flags |= TnlFlags::DONT_FRAGMENT,
            OvsTunnelKeyAttr::Csum => tun.flags |= TnlFlags::CSUM,
            OvsTunnelKeyAttr::Oam => tun.flags |= TnlFlags::OAM,
            OvsTunnelKeyAttr::TpSrc => tun.tp_src = a.get_be16()?,
            OvsTunnelKeyAttr::TpDst => tun.tp_dst = a.get_be16()?,
            OvsTunnelKeyAttr::GeneveOpts => {
                if !check_geneve_opts(a.payload()) {
                    return Ok(Fitness::Error);
                }
                let Ok(opts) = ArrayVec::try_from(a.payload()) else {
                    debug!("{} bytes of geneve options is too much", a.len());
                    return Ok(Fitness::Error);
                };
                // options are carried verbatim so that they can be reproduced exactly
                tun.geneve = opts;
                unknown = true;
            }
        }
    }
    if !ttl {
        debug!("tunnel key without ttl");
        return Ok(Fitness::Error);
    }
    Ok(if unknown {
        Fitness::TooMuch
    } else {
        Fitness::Perfect
    })
}

/// Decode a tunnel attribute.
///
/// Unknown sub-attributes and Geneve options make the result [`Fitness::TooMuch`]; a missing TTL
/// or a malformed sub-attribute is an [`Fitness::Error`].
#[must_use]
pub fn odp_tun_key_from_attr(attr: &Attr<'_>) -> (FlowTnl, Fitness) {
    let mut tun = FlowTnl::default();
    let fitness = read_tunnel(attr, &mut tun).unwrap_or_else(|e| {
        debug!("malformed tunnel attribute: {e}");
        Fitness::Error
    });
    (tun, fitness)
}

/// Append `tun` as a tunnel attribute.
///
/// # Errors
///
/// Returns [`AttrError::InsufficientSpace`] if the writer is full.
pub fn tun_key_to_attr(w: &mut AttrWriter, tun: &FlowTnl) -> Result<(), AttrError> {
    let nest = w.start_nested(OvsKeyAttr::Tunnel.ty())?;
    // a mask may carry an id without the key flag
    if tun.tun_id != 0 || tun.flags.contains(TnlFlags::KEY) {
        w.put_be64(OvsTunnelKeyAttr::Id.ty(), tun.tun_id)?;
    }
    if !tun.ip_src.is_unspecified() {
        w.put_be32(OvsTunnelKeyAttr::Ipv4Src.ty(), tun.ip_src.into())?;
    }
    if !tun.ip_dst.is_unspecified() {
        w.put_be32(OvsTunnelKeyAttr::Ipv4Dst.ty(), tun.ip_dst.into())?;
    }
    if tun.ip_tos != 0 {
        w.put_u8(OvsTunnelKeyAttr::Tos.ty(), tun.ip_tos)?;
    }
    w.put_u8(OvsTunnelKeyAttr::Ttl.ty(), tun.ip_ttl)?;
    if tun.flags.contains(TnlFlags::DONT_FRAGMENT) {
        w.put_flag(OvsTunnelKeyAttr::DontFragment.ty())?;
    }
    if tun.flags.contains(TnlFlags::CSUM) {
        w.put_flag(OvsTunnelKeyAttr::Csum.ty())?;
    }
    if tun.tp_src != 0 {
        w.put_be16(OvsTunnelKeyAttr::TpSrc.ty(), tun.tp_src)?;
    }
    if tun.tp_dst != 0 {
        w.put_be16(OvsTunnelKeyAttr::TpDst.ty(), tun.tp_dst)?;
    }
    if tun.flags.contains(TnlFlags::OAM) {
        w.put_flag(OvsTunnelKeyAttr::Oam.ty())?;
    }
    if !tun.geneve.is_empty() {
        w.put_unspec(OvsTunnelKeyAttr::GeneveOpts.ty(), &tun.geneve)?;
    }
    w.end_nested(nest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use crate::attr::Attrs;
    use pretty_assertions::assert_eq;

    fn encode(tun: &FlowTnl) -> Vec<u8> {
        let mut w = AttrWriter::new();
        tun_key_to_attr(&mut w, tun).unwrap();
        w.into_bytes()
    }

    fn decode(bytes: &[u8]) -> (FlowTnl, Fitness) {
        let attr = Attrs::new(bytes).next().unwrap().unwrap();
        assert_eq!(attr.ty(), OvsKeyAttr::Tunnel.ty());
        odp_tun_key_from_attr(&attr)
    }

    fn sample() -> FlowTnl {
        FlowTnl {
            tun_id: 0x1234,
            ip_src: Ipv4Addr::new(192, 168, 0, 1),
            ip_dst: Ipv4Addr::new(192, 168, 0, 2),
            flags: TnlFlags::KEY | TnlFlags::DONT_FRAGMENT | TnlFlags::CSUM,
            ip_tos: 0x10,
            ip_ttl: 64,
            tp_src: 4000,
            tp_dst: 4789,
            ..FlowTnl::default()
        }
    }

    #[test]
    fn perfect_round_trip() {
        let tun = sample();
        assert_eq!(decode(&encode(&tun)), (tun, Fitness::Perfect));
    }

    #[test]
    fn ttl_is_mandatory() {
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsKeyAttr::Tunnel.ty()).unwrap();
        w.put_be32(OvsTunnelKeyAttr::Ipv4Dst.ty(), 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(decode(w.as_bytes()).1, Fitness::Error);
    }

    #[test]
    fn bad_sub_attribute_length() {
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsKeyAttr::Tunnel.ty()).unwrap();
        w.put_u8(OvsTunnelKeyAttr::Ttl.ty(), 1).unwrap();
        w.put_be16(OvsTunnelKeyAttr::Tos.ty(), 1).unwrap();
        w.end_nested(nest).unwrap();
        assert_eq!(decode(w.as_bytes()).1, Fitness::Error);
    }

    #[test]
    fn unknown_sub_attribute_is_too_much() {
        let mut w = AttrWriter::new();
        let nest = w.start_nested(OvsKeyAttr::Tunnel.ty()).unwrap();
        w.put_u8(OvsTunnelKeyAttr::Ttl.ty(), 1).unwrap();
        w.put_be32(77, 1).unwrap();
        w.end_nested(nest).unwrap();
        let (tun, fitness) = decode(w.as_bytes());
        assert_eq!(fitness, Fitness::TooMuch);
        assert_eq!(tun.ip_ttl, 1);
    }

    #[test]
    fn geneve_options_are_echoed() {
        let mut tun = sample();
        // class 0x0102, type 3, one word of data
        tun.geneve = ArrayVec::try_from(&[0x01, 0x02, 0x03, 0x01, 0xde, 0xad, 0xbe, 0xef][..]).unwrap();
        let bytes = encode(&tun);
        let (decoded, fitness) = decode(&bytes);
        assert_eq!(fitness, Fitness::TooMuch);
        assert_eq!(decoded, tun);
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn bad_geneve_options() {
        assert!(check_geneve_opts(&[]));
        assert!(!check_geneve_opts(&[0, 1, 2]));
        // claims two words, carries one
        assert!(!check_geneve_opts(&[0, 1, 2, 2, 0, 0, 0, 0]));
        // critical
        assert!(!check_geneve_opts(&[0, 1, 0x82, 0]));
        assert!(check_geneve_opts(&[0, 1, 2, 0, 0, 1, 3, 1, 9, 9, 9, 9]));

        let mut tun = sample();
        tun.geneve = ArrayVec::try_from(&[0, 1, 0x82, 0][..]).unwrap();
        assert_eq!(decode(&encode(&tun)).1, Fitness::Error);
    }
}
