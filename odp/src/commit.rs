// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Computing the actions that turn one flow state into another.
//!
//! Translation keeps a *base* flow: the header state the datapath will have after the actions
//! emitted so far.  [`commit_odp_actions`] compares the base against the target flow, appends
//! the `set`, push and pop actions that remove the differences and updates the base (and the
//! wildcards of the fields it had to match on) to match.  Committing the same target twice
//! emits nothing the second time.

use crate::action::{Action, ActionError, SetField, SlowPathReason};
use crate::attr::AttrWriter;
use crate::flow::Flow;
use crate::key::{
    KeyArp, KeyEthernet, KeyIpv4, KeyIpv6, KeyPayload, KeyPorts, odp_mask_is_exact, payload_and,
};
use net::eth::ethtype::EthType;
use net::ip::{IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP};
use net::vlan::Tci;
use tracing::{debug, warn};

/// Append `set(tunnel(...))` if the target flow carries a tunnel the base does not have yet.
///
/// A tunnel without a destination address is no tunnel and is never committed.
///
/// # Errors
///
/// Fails if the action does not fit in `w`; `base` is left alone in that case.
pub fn commit_odp_tunnel_action(
    flow: &Flow,
    base: &mut Flow,
    w: &mut AttrWriter,
) -> Result<(), ActionError> {
    if flow.tunnel.ip_dst.is_unspecified() || base.tunnel == flow.tunnel {
        return Ok(());
    }
    let action = Action::Set(SetField::Tunnel(flow.tunnel.clone()));
    action.put(w)?;
    debug!("committed {action:?}");
    base.tunnel = flow.tunnel.clone();
    Ok(())
}

/// Append the actions that change `base` into `flow`, and change `base` the same way.
///
/// Fields are committed in a fixed order: Ethernet addresses, network header, transport ports,
/// MPLS stack, VLAN tag, priority and mark.  Tunnels are not committed here, see
/// [`commit_odp_tunnel_action`].
///
/// With `use_masked`, a field whose wildcard in `wc` is not exact is rewritten with a masked
/// set that touches only the matched bits.  Otherwise the whole field is rewritten and its
/// wildcard becomes exact.
///
/// Returns the reasons, if any, why packets of the flow must take the slow path.  Only an ARP
/// rewrite has one.
///
/// # Errors
///
/// Fails if an action does not fit in `w`.  Nothing is appended to `w`, and `base` and `wc`
/// are left alone, in that case.
pub fn commit_odp_actions(
    flow: &Flow,
    base: &mut Flow,
    wc: &mut Flow,
    w: &mut AttrWriter,
    use_masked: bool,
) -> Result<SlowPathReason, ActionError> {
    let start = w.len();
    let mut new_base = base.clone();
    let mut new_wc = wc.clone();
    let mut commit = Commit {
        flow,
        base: &mut new_base,
        wc: &mut new_wc,
        w: &mut *w,
        use_masked,
    };
    let slow = commit.all().inspect_err(|_| w.truncate(start))?;
    *base = new_base;
    *wc = new_wc;
    Ok(slow)
}

/// One commit: the target, the state being brought in line with it and where actions go.
struct Commit<'a> {
    flow: &'a Flow,
    base: &'a mut Flow,
    wc: &'a mut Flow,
    w: &'a mut AttrWriter,
    use_masked: bool,
}

/// Outcome of committing one field group.
enum Committed<P> {
    Unchanged,
    /// The field was written; this is the wildcard it now has.
    Written(P),
}

impl Commit<'_> {
    fn all(&mut self) -> Result<SlowPathReason, ActionError> {
        self.ethernet()?;
        let slow = self.network()?;
        self.ports()?;
        self.mpls()?;
        self.vlan()?;
        self.priority()?;
        self.mark()?;
        Ok(slow)
    }

    fn emit(&mut self, action: &Action) -> Result<(), ActionError> {
        action.put(self.w)?;
        debug!("committed {action:?}");
        Ok(())
    }

    /// Rewrite one field group if `key` and `base` differ.
    ///
    /// The caller stores the new base and the returned wildcard back into the flows.
    fn field<P: KeyPayload>(
        &mut self,
        use_masked: bool,
        key: P,
        base: P,
        mask: P,
        field: fn(P) -> SetField,
    ) -> Result<Committed<P>, ActionError> {
        if key == base {
            return Ok(Committed::Unchanged);
        }
        let exact = odp_mask_is_exact(field(mask).attr(), &mask.to_bytes());
        if use_masked && !exact {
            self.emit(&Action::SetMasked {
                key: field(payload_and(&key, &mask)),
                mask: field(mask),
            })?;
            Ok(Committed::Written(mask))
        } else {
            self.emit(&Action::Set(field(key)))?;
            if exact {
                Ok(Committed::Written(mask))
            } else {
                Ok(Committed::Written(all_ones()))
            }
        }
    }

    fn ethernet(&mut self) -> Result<(), ActionError> {
        // push_eth establishes the addresses of a flow that gains an Ethernet header
        if self.base.is_l3() && !self.flow.is_l3() {
            return Ok(());
        }
        let key = KeyEthernet::from_flow(self.flow);
        let base = KeyEthernet::from_flow(self.base);
        let mask = KeyEthernet::from_flow(self.wc);
        if let Committed::Written(mask) =
            self.field(self.use_masked, key, base, mask, SetField::Ethernet)?
        {
            key.put(self.base);
            mask.put(self.wc);
        }
        Ok(())
    }

    fn network(&mut self) -> Result<SlowPathReason, ActionError> {
        if self.flow.nw_proto == 0 {
            return Ok(SlowPathReason::empty());
        }
        match self.base.dl_type {
            EthType::IPV4 => self.ipv4()?,
            EthType::IPV6 => self.ipv6()?,
            EthType::ARP => return self.arp(),
            _ => {}
        }
        Ok(SlowPathReason::empty())
    }

    /// True if the protocol and fragment class, which no action can change, agree.
    fn same_ip_class(&self) -> bool {
        let same =
            self.flow.nw_proto == self.base.nw_proto && self.flow.nw_frag == self.base.nw_frag;
        if !same {
            warn!(
                "cannot commit a change of IP protocol ({} to {}) or fragment class",
                self.base.nw_proto, self.flow.nw_proto
            );
        }
        same
    }

    fn ipv4(&mut self) -> Result<(), ActionError> {
        if !self.same_ip_class() {
            return Ok(());
        }
        let key = KeyIpv4::from_flow(self.flow, false);
        let base = KeyIpv4::from_flow(self.base, false);
        let mask = KeyIpv4 {
            proto: 0,
            frag: 0,
            ..KeyIpv4::from_flow(self.wc, true)
        };
        if let Committed::Written(mask) =
            self.field(self.use_masked, key, base, mask, SetField::Ipv4)?
        {
            key.put(self.base, false);
            // a zero protocol means the wildcard was left as it was
            if mask.proto != 0 {
                mask.put(self.wc, true);
            }
        }
        Ok(())
    }

    fn ipv6(&mut self) -> Result<(), ActionError> {
        if !self.same_ip_class() {
            return Ok(());
        }
        let key = KeyIpv6::from_flow(self.flow, false);
        let base = KeyIpv6::from_flow(self.base, false);
        let mask = KeyIpv6 {
            proto: 0,
            frag: 0,
            ..KeyIpv6::from_flow(self.wc, true)
        };
        if let Committed::Written(mask) =
            self.field(self.use_masked, key, base, mask, SetField::Ipv6)?
        {
            key.put(self.base, false);
            if mask.proto != 0 {
                mask.put(self.wc, true);
            }
        }
        Ok(())
    }

    /// ARP rewrites are always masked, and always send the flow to the slow path.
    fn arp(&mut self) -> Result<SlowPathReason, ActionError> {
        let key = KeyArp::from_flow(self.flow);
        let base = KeyArp::from_flow(self.base);
        let mask = KeyArp::from_flow(self.wc);
        match self.field(true, key, base, mask, SetField::Arp)? {
            Committed::Written(mask) => {
                key.put(self.base);
                mask.put(self.wc);
                Ok(SlowPathReason::ACTION)
            }
            Committed::Unchanged => Ok(SlowPathReason::empty()),
        }
    }

    fn ports(&mut self) -> Result<(), ActionError> {
        if self.flow.nw_proto == 0 || !self.base.is_ip_any() {
            return Ok(());
        }
        let field: fn(KeyPorts) -> SetField = match self.flow.nw_proto {
            IPPROTO_TCP => SetField::Tcp,
            IPPROTO_UDP => SetField::Udp,
            IPPROTO_SCTP => SetField::Sctp,
            _ => return Ok(()),
        };
        let key = KeyPorts::from_flow(self.flow);
        let base = KeyPorts::from_flow(self.base);
        let mask = KeyPorts::from_flow(self.wc);
        if let Committed::Written(mask) = self.field(self.use_masked, key, base, mask, field)? {
            key.put(self.base);
            mask.put(self.wc);
        }
        Ok(())
    }

    /// Bring the label stack in line: pop what is not shared with the target, rewrite the top
    /// entry when exactly one differs, then push what is missing.
    ///
    /// The wildcards were settled when the labels were translated, so they are not touched.
    fn mpls(&mut self) -> Result<(), ActionError> {
        let flow_n = self.flow.count_mpls_labels();
        let mut base_n = self.base.count_mpls_labels();
        let mut common_n = self.flow.count_common_mpls_labels(flow_n, self.base, base_n);

        while base_n > common_n {
            if base_n - 1 == common_n && flow_n > common_n {
                let lse = self.flow.mpls_lse[flow_n - base_n];
                self.emit(&Action::Set(SetField::Mpls(lse)))?;
                self.base.set_mpls_lse(0, lse);
                common_n += 1;
            } else {
                // every pop but the last leaves an MPLS packet behind, whatever the target is
                let eth_type = if !self.flow.dl_type.is_mpls() && base_n > 1 {
                    EthType::MPLS
                } else {
                    self.flow.dl_type
                };
                self.emit(&Action::PopMpls(eth_type))?;
                if !self.base.pop_mpls(base_n, self.flow.dl_type) {
                    warn!("label stack of the base flow cannot be popped");
                    return Ok(());
                }
                base_n -= 1;
            }
        }

        while base_n < flow_n {
            let lse = self.flow.mpls_lse[flow_n - base_n - 1];
            let ethertype = self.flow.dl_type;
            self.emit(&Action::PushMpls { lse, ethertype })?;
            self.base.push_mpls(base_n, ethertype);
            self.base.set_mpls_lse(0, lse);
            base_n += 1;
        }
        Ok(())
    }

    /// A changed tag is popped and pushed again whole, so the whole tag is matched.
    fn vlan(&mut self) -> Result<(), ActionError> {
        let tci = self.flow.vlan_tci;
        if self.base.vlan_tci == tci {
            return Ok(());
        }
        self.wc.vlan_tci = Tci::EXACT;
        if self.base.vlan_tci.cfi() {
            self.emit(&Action::PopVlan)?;
            self.base.vlan_tci = Tci(0);
        }
        if tci.cfi() {
            self.emit(&Action::PushVlan {
                tpid: EthType::VLAN,
                tci,
            })?;
        }
        self.base.vlan_tci = tci;
        Ok(())
    }

    fn priority(&mut self) -> Result<(), ActionError> {
        let (key, base, mask) = (
            self.flow.skb_priority,
            self.base.skb_priority,
            self.wc.skb_priority,
        );
        if let Committed::Written(mask) =
            self.field(self.use_masked, key, base, mask, SetField::Priority)?
        {
            self.base.skb_priority = key;
            self.wc.skb_priority = mask;
        }
        Ok(())
    }

    fn mark(&mut self) -> Result<(), ActionError> {
        let (key, base, mask) = (self.flow.pkt_mark, self.base.pkt_mark, self.wc.pkt_mark);
        if let Committed::Written(mask) =
            self.field(self.use_masked, key, base, mask, SetField::SkbMark)?
        {
            self.base.pkt_mark = key;
            self.wc.pkt_mark = mask;
        }
        Ok(())
    }
}

/// A payload with every bit set.
fn all_ones<P: KeyPayload>() -> P {
    P::from_payload(&vec![u8::MAX; P::LEN]).unwrap_or_default()
}
