// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Action lists from their text form.

use crate::action::{
    Action, ActionError, GreFlags, HashAlg, SetField, SlowPathReason, TnlHeader, TnlL4,
    TnlPushData, Userspace, UserspaceCookie, odp_actions_to_wire,
};
use crate::attr::{AttrWriter, Attrs};
use crate::key::{KeyError, OvsKeyAttr, odp_mask_attr_is_exact, parse_key_attr};
use crate::text::{Expected, Scanner, excerpt, parse_flags};
use net::eth::ethtype::EthType;
use net::mpls::Lse;
use net::vlan::Tci;
use tracing::debug;

enum Failure {
    Syntax(Expected),
    Action(ActionError),
}

impl From<Expected> for Failure {
    fn from(e: Expected) -> Self {
        Failure::Syntax(e)
    }
}

impl From<ActionError> for Failure {
    fn from(e: ActionError) -> Self {
        Failure::Action(e)
    }
}

impl From<KeyError> for Failure {
    fn from(e: KeyError) -> Self {
        Failure::Action(ActionError::Key(e))
    }
}

/// An unsigned integer no larger than `max`.
fn uint_max<T: TryFrom<u64> + PartialOrd>(sc: &mut Scanner<'_>, max: T) -> Result<T, Expected> {
    let value = sc.uint::<T>()?;
    if value > max {
        return Err(Expected("a value that fits the field"));
    }
    Ok(value)
}

/// `name` followed by an unsigned integer.
fn field<T: TryFrom<u64>>(sc: &mut Scanner<'_>, name: &'static str) -> Result<T, Expected> {
    sc.expect(name)?;
    sc.uint()
}

fn ethtype(sc: &mut Scanner<'_>) -> Result<EthType, Expected> {
    Ok(EthType::new(sc.uint()?))
}

fn percentage(sc: &mut Scanner<'_>) -> Result<f64, Expected> {
    let token = sc.take_while(|c| c.is_ascii_digit() || c == '.');
    token
        .parse::<f64>()
        .ok()
        .filter(|p| (0.0..=100.0).contains(p))
        .ok_or(Expected("a percentage between 0 and 100"))
}

/// The nearest fraction of `u32::MAX`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped first
fn probability(percentage: f64) -> u32 {
    let p = (f64::from(u32::MAX) * (percentage / 100.0) + 0.5).floor();
    if p <= 0.0 {
        0
    } else if p >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        p as u32
    }
}

fn scan_cookie(sc: &mut Scanner<'_>) -> Result<Option<UserspaceCookie>, Expected> {
    let cookie = if sc.eat(",sFlow(vid=") {
        let vid = uint_max(sc, Tci::VID_MASK)?;
        sc.expect(",pcp=")?;
        let pcp = uint_max(sc, 7u8)?;
        let output = field(sc, ",output=")?;
        let mut tci = Tci::from_parts(vid, pcp, false);
        if tci.raw() != 0 {
            tci = Tci(tci.raw() | Tci::CFI);
        }
        UserspaceCookie::Sflow { tci, output }
    } else if sc.eat(",slow_path(") {
        let (reasons, _) = parse_flags(
            sc,
            SlowPathReason::bit_name,
            SlowPathReason::all().bits(),
            false,
        )?;
        UserspaceCookie::SlowPath(SlowPathReason::from_bits_retain(reasons))
    } else if sc.eat(",flow_sample(") {
        UserspaceCookie::FlowSample {
            probability: field(sc, "probability=")?,
            collector_set_id: field(sc, ",collector_set_id=")?,
            obs_domain_id: field(sc, ",obs_domain_id=")?,
            obs_point_id: field(sc, ",obs_point_id=")?,
        }
    } else if sc.eat(",ipfix(") {
        UserspaceCookie::Ipfix {
            output_port: field(sc, "output_port=")?,
        }
    } else if sc.eat(",userdata(") {
        UserspaceCookie::from_userdata(&sc.hex_bytes()?)
    } else {
        return Ok(None);
    };
    sc.expect(")")?;
    Ok(Some(cookie))
}

fn scan_userspace(sc: &mut Scanner<'_>) -> Result<Action, Expected> {
    let pid = field(sc, "pid=")?;
    let cookie = scan_cookie(sc)?;
    let tunnel_out_port = if sc.eat(",tunnel_out_port=") {
        Some(sc.uint()?)
    } else {
        None
    };
    sc.expect(")")?;
    Ok(Action::Userspace(Userspace {
        pid,
        cookie,
        tunnel_out_port,
    }))
}

/// A single key attribute.  Fully masked fields give a plain set, anything else a masked one.
fn scan_set(sc: &mut Scanner<'_>) -> Result<Action, Failure> {
    const NOTHING: Expected = Expected("a field to set");

    let mut key = AttrWriter::new();
    let mut mask = AttrWriter::new();
    parse_key_attr(sc, &mut key, Some(&mut mask))?;
    sc.expect(")")?;

    let Some(Ok(k)) = Attrs::new(key.as_bytes()).next() else {
        return Err(NOTHING.into());
    };
    if k.ty() == OvsKeyAttr::Tunnel.ty() {
        return Ok(Action::Set(SetField::from_attr(&k)?));
    }
    let Some(Ok(m)) = Attrs::new(mask.as_bytes()).next() else {
        return Err(NOTHING.into());
    };
    if odp_mask_attr_is_exact(&m) {
        Ok(Action::Set(SetField::from_attr(&k)?))
    } else {
        Ok(Action::SetMasked {
            key: SetField::from_attr(&k)?,
            mask: SetField::from_attr(&m)?,
        })
    }
}

fn scan_push_vlan(sc: &mut Scanner<'_>) -> Result<Action, Expected> {
    let tpid = if sc.eat("tpid=") {
        let tpid = ethtype(sc)?;
        sc.expect(",")?;
        tpid
    } else {
        EthType::VLAN
    };
    sc.expect("vid=")?;
    let vid = uint_max(sc, Tci::VID_MASK)?;
    sc.expect(",pcp=")?;
    let pcp = uint_max(sc, 7u8)?;
    let cfi = if sc.eat(",cfi=") {
        uint_max(sc, 1u8)? == 1
    } else {
        true
    };
    sc.expect(")")?;
    Ok(Action::PushVlan {
        tpid,
        tci: Tci::from_parts(vid, pcp, cfi),
    })
}

fn scan_push_mpls(sc: &mut Scanner<'_>) -> Result<Action, Expected> {
    sc.expect("label=")?;
    let label = uint_max(sc, 0x000f_ffffu32)?;
    sc.expect(",tc=")?;
    let tc = uint_max(sc, 7u8)?;
    let ttl = field(sc, ",ttl=")?;
    sc.expect(",bos=")?;
    let bos = uint_max(sc, 1u8)? == 1;
    sc.expect(",eth_type=")?;
    let ethertype = ethtype(sc)?;
    sc.expect(")")?;
    Ok(Action::PushMpls {
        lse: Lse::from_parts(label, tc, bos, ttl),
        ethertype,
    })
}

fn scan_sample(sc: &mut Scanner<'_>) -> Result<Action, Failure> {
    let probability = probability(percentage(sc)?);
    sc.expect("%,actions(")?;
    let mut actions = Vec::new();
    loop {
        sc.skip_delimiters();
        if sc.eat(")") {
            break;
        }
        if sc.is_empty() {
            return Err(Expected(")").into());
        }
        if sc.eat("drop") {
            continue;
        }
        actions.push(scan_action(sc)?);
    }
    sc.expect(")")?;
    Ok(Action::Sample {
        probability,
        actions,
    })
}

fn scan_tnl_l4(sc: &mut Scanner<'_>) -> Result<TnlL4, Expected> {
    if sc.eat("udp(src=") {
        let udp_src = sc.uint()?;
        let udp_dst = field(sc, ",dst=")?;
        sc.expect("),vxlan(flags=")?;
        let flags = sc.uint()?;
        let vni = field(sc, ",vni=")?;
        sc.expect(")")?;
        return Ok(TnlL4::Vxlan {
            udp_src,
            udp_dst,
            flags,
            vni,
        });
    }
    if sc.eat("gre((flags=") {
        let flags = GreFlags::from_bits_retain(sc.uint()?);
        let proto = field(sc, ",proto=")?;
        sc.expect(")")?;
        let mut words = [0u32; 3];
        for ((flag, name), word) in [
            (GreFlags::CSUM, ",csum="),
            (GreFlags::KEY, ",key="),
            (GreFlags::SEQ, ",seq="),
        ]
        .into_iter()
        .zip(words.iter_mut())
        {
            if flags.contains(flag) {
                *word = field(sc, name)?;
            }
        }
        sc.expect(")")?;
        let [csum, key, seq] = words;
        return Ok(TnlL4::Gre {
            flags,
            proto,
            csum,
            key,
            seq,
        });
    }
    Err(Expected("udp or gre"))
}

fn scan_tnl_push(sc: &mut Scanner<'_>) -> Result<Action, Failure> {
    let tnl_port = sc.uint()?;
    sc.expect("),header(size=")?;
    let size: usize = sc.uint()?;
    let tnl_type: u32 = field(sc, ",type=")?;

    sc.expect(",eth(dst=")?;
    let eth_dst = sc.mac()?;
    sc.expect(",src=")?;
    let eth_src = sc.mac()?;
    sc.expect(",dl_type=")?;
    let eth_type = ethtype(sc)?;

    sc.expect("),ipv4(src=")?;
    let ip_src = sc.ipv4()?;
    sc.expect(",dst=")?;
    let ip_dst = sc.ipv4()?;
    let ip_proto = field(sc, ",proto=")?;
    let ip_tos = field(sc, ",tos=")?;
    let ip_ttl = field(sc, ",ttl=")?;
    let ip_frag_off = field(sc, ",frag=")?;
    sc.expect("),")?;

    let l4 = scan_tnl_l4(sc)?;
    sc.expect("),out_port(")?;
    let out_port = sc.uint()?;
    sc.expect("))")?;

    let header = TnlHeader {
        eth_dst,
        eth_src,
        eth_type,
        ip_src,
        ip_dst,
        ip_proto,
        ip_tos,
        ip_ttl,
        ip_frag_off,
        l4,
    };
    if header.len() != size || header.tnl_type() != tnl_type {
        return Err(ActionError::Malformed("tnl_push").into());
    }
    Ok(Action::TunnelPush(TnlPushData::new(
        tnl_port, out_port, &header,
    )))
}

fn scan_action(sc: &mut Scanner<'_>) -> Result<Action, Failure> {
    if sc.peek().is_some_and(|c| c.is_ascii_digit()) {
        return Ok(Action::Output(sc.uint()?));
    }
    if sc.eat("recirc(") {
        let id = sc.uint()?;
        sc.expect(")")?;
        return Ok(Action::Recirc(id));
    }
    if sc.eat("tnl_pop(") {
        let port = sc.uint()?;
        sc.expect(")")?;
        return Ok(Action::TunnelPop(port));
    }
    if sc.eat("userspace(") {
        return Ok(scan_userspace(sc)?);
    }
    if sc.eat("set(") {
        return scan_set(sc);
    }
    if sc.eat("push_eth(src=") {
        let src = sc.mac()?;
        sc.expect(",dst=")?;
        let dst = sc.mac()?;
        sc.expect(",type=")?;
        let ethertype = ethtype(sc)?;
        sc.expect(")")?;
        return Ok(Action::PushEth {
            src,
            dst,
            ethertype,
        });
    }
    if sc.eat("pop_eth") {
        return Ok(Action::PopEth);
    }
    if sc.eat("push_vlan(") {
        return Ok(scan_push_vlan(sc)?);
    }
    if sc.eat("pop_vlan") {
        return Ok(Action::PopVlan);
    }
    if sc.eat("push_mpls(") {
        return Ok(scan_push_mpls(sc)?);
    }
    if sc.eat("pop_mpls(eth_type=") {
        let ethertype = ethtype(sc)?;
        sc.expect(")")?;
        return Ok(Action::PopMpls(ethertype));
    }
    if sc.eat("hash(hash_l4(") {
        let basis = sc.uint()?;
        sc.expect("))")?;
        return Ok(Action::Hash {
            alg: HashAlg::L4,
            basis,
        });
    }
    if sc.eat("sample(sample=") {
        return scan_sample(sc);
    }
    if sc.eat("tnl_push(tnl_port(") {
        return scan_tnl_push(sc);
    }
    Err(Expected("an action").into())
}

fn scan_actions(s: &str) -> Result<Vec<Action>, ActionError> {
    if s.trim().eq_ignore_ascii_case("drop") {
        return Ok(Vec::new());
    }
    let mut sc = Scanner::new(s);
    let mut actions = Vec::new();
    loop {
        sc.skip_delimiters();
        if sc.is_empty() {
            return Ok(actions);
        }
        match scan_action(&mut sc) {
            Ok(action) => actions.push(action),
            Err(Failure::Syntax(Expected(expected))) => {
                return Err(ActionError::Syntax {
                    expected,
                    at: excerpt(sc.rest()),
                });
            }
            Err(Failure::Action(e)) => return Err(e),
        }
    }
}

/// Parse the text form of an action list, as produced by
/// [`format_odp_actions`](crate::action::format_odp_actions), appending the actions to `w`.
///
/// `drop`, in any case, is the empty list.  A `set` whose fields are all exact becomes a plain
/// set, anything else a masked set.
///
/// # Errors
///
/// Returns an [`ActionError`] if the text cannot be parsed or the actions do not fit.  `w` is
/// not modified in that case.
pub fn odp_actions_from_string(s: &str, w: &mut AttrWriter) -> Result<(), ActionError> {
    let actions = scan_actions(s).inspect_err(|e| debug!("cannot parse actions: {e}"))?;
    odp_actions_to_wire(w, &actions)
}
