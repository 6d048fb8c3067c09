// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Replaying action lists against packets.
//!
//! [`execute`] walks an action list once per batch.  Header and metadata rewrites are applied
//! here, packet by packet.  Actions which need a datapath (output, tunnel push and pop,
//! userspace, recirculation) are handed to a [`DpExecute`] implementation.
//!
//! Ownership follows the [`Batch`]: a [`Batch::Stolen`] batch belongs to the executor, which
//! passes it on to the datapath with the last dispatch action, or drops whatever is left at the
//! end of the list.  A [`Batch::Borrowed`] batch stays with the caller, rewritten in place.

use crate::action::{Action, ActionError, HashAlg, SetField, odp_actions_from_wire};
use crate::flow::{PktMetadata, flow_extract};
use crate::key::{KeyArp, KeyEthernet, KeyIpv4, KeyIpv6, KeyPorts, payload_and, payload_masked_set};
use net::buffer::{PacketBufferMut, SpliceError};
use net::mpls::Lse;
use net::packet::{ArpFields, Packet};
use rand::RngCore;
use tracing::{debug, trace, warn};

/// A packet and the metadata that travels with it.
#[derive(Debug)]
pub struct DpPacket<Buf: PacketBufferMut> {
    /// The frame.
    pub packet: Packet<Buf>,
    /// Its datapath metadata.
    pub md: PktMetadata,
}

impl<Buf: PacketBufferMut> DpPacket<Buf> {
    /// Wrap `packet` with default metadata matching its base layer.
    #[must_use]
    pub fn new(packet: Packet<Buf>) -> DpPacket<Buf> {
        let md = PktMetadata {
            base_layer: packet.base_layer(),
            packet_ethertype: packet.packet_type(),
            ..PktMetadata::default()
        };
        DpPacket { packet, md }
    }

    fn sync_layer(&mut self) {
        self.md.base_layer = self.packet.base_layer();
        self.md.packet_ethertype = self.packet.packet_type();
    }
}

/// The packets an action list runs on.
#[derive(Debug)]
pub enum Batch<'a, Buf: PacketBufferMut> {
    /// Packets owned by whoever holds the batch.
    Stolen(Vec<DpPacket<Buf>>),
    /// Packets the caller keeps.
    Borrowed(&'a mut [DpPacket<Buf>]),
}

impl<Buf: PacketBufferMut> Batch<'_, Buf> {
    /// The packets.
    #[must_use]
    pub fn packets(&self) -> &[DpPacket<Buf>] {
        match self {
            Batch::Stolen(packets) => packets,
            Batch::Borrowed(packets) => packets,
        }
    }

    /// The packets, mutably.
    pub fn packets_mut(&mut self) -> &mut [DpPacket<Buf>] {
        match self {
            Batch::Stolen(packets) => packets,
            Batch::Borrowed(packets) => packets,
        }
    }

    /// Number of packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets().len()
    }

    /// True if the batch has no packets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets().is_empty()
    }

    /// True if the holder of the batch owns its packets.
    #[must_use]
    pub fn is_stolen(&self) -> bool {
        matches!(self, Batch::Stolen(_))
    }
}

/// The datapath side of execution.
pub trait DpExecute<Buf: PacketBufferMut> {
    /// Run a dispatch action (see [`Action::needs_datapath`]) on `batch`.
    ///
    /// A [`Batch::Stolen`] batch is the datapath's to consume; the executor never sees those
    /// packets again.
    fn execute(&mut self, batch: Batch<'_, Buf>, action: &Action);
}

/// No datapath: dispatch actions are skipped.
impl<Buf: PacketBufferMut> DpExecute<Buf> for () {
    fn execute(&mut self, _batch: Batch<'_, Buf>, _action: &Action) {}
}

fn log_splice(what: &str, result: Result<(), SpliceError>) {
    if let Err(e) = result {
        warn!("{what} failed, packet left unchanged: {e}");
    }
}

fn masked_u32(old: u32, key: u32, mask: u32) -> u32 {
    (key & mask) | (old & !mask)
}

fn sampled(probability: u32) -> bool {
    rand::rng().next_u32() < probability
}

fn set_field<Buf: PacketBufferMut>(p: &mut DpPacket<Buf>, field: &SetField) {
    let DpPacket { packet, md } = p;
    match field {
        SetField::Priority(v) => md.skb_priority = *v,
        SetField::SkbMark(v) => md.pkt_mark = *v,
        SetField::Tunnel(tunnel) => md.tunnel = tunnel.clone(),
        SetField::DpHash(v) => md.dp_hash = *v,
        SetField::RecircId(v) => md.recirc_id = *v,
        SetField::Ethernet(k) => packet.set_eth_addrs(k.src, k.dst),
        SetField::Ipv4(k) => packet.set_ipv4(k.src, k.dst, k.tos, k.ttl),
        SetField::Ipv6(k) => packet.set_ipv6(k.proto, k.src, k.dst, k.tclass, k.label, k.hlimit),
        SetField::Tcp(k) => packet.set_tcp_ports(k.src, k.dst),
        SetField::Udp(k) => packet.set_udp_ports(k.src, k.dst),
        SetField::Sctp(k) => packet.set_sctp_ports(k.src, k.dst),
        SetField::Mpls(lse) => packet.set_mpls_lse(*lse),
        SetField::Arp(k) => packet.set_arp(&ArpFields {
            op: k.op,
            sha: k.sha,
            spa: k.sip,
            tha: k.tha,
            tpa: k.tip,
        }),
    }
}

/// `key` is masked before it is applied, so that stray bits outside `mask` never reach the
/// packet.
#[allow(clippy::too_many_lines)]
fn set_masked<Buf: PacketBufferMut>(p: &mut DpPacket<Buf>, key: &SetField, mask: &SetField) {
    let DpPacket { packet, md } = p;
    match (key, mask) {
        (SetField::Priority(k), SetField::Priority(m)) => {
            md.skb_priority = masked_u32(md.skb_priority, *k, *m);
        }
        (SetField::SkbMark(k), SetField::SkbMark(m)) => {
            md.pkt_mark = masked_u32(md.pkt_mark, *k, *m);
        }
        (SetField::DpHash(k), SetField::DpHash(m)) => {
            md.dp_hash = masked_u32(md.dp_hash, *k, *m);
        }
        (SetField::RecircId(k), SetField::RecircId(m)) => {
            md.recirc_id = masked_u32(md.recirc_id, *k, *m);
        }
        (SetField::Ethernet(k), SetField::Ethernet(m)) => {
            if let Some((src, dst)) = packet.eth_addrs() {
                let new = payload_masked_set(&KeyEthernet { src, dst }, &payload_and(k, m), m);
                packet.set_eth_addrs(new.src, new.dst);
            }
        }
        (SetField::Ipv4(k), SetField::Ipv4(m)) => {
            if let Some(ip) = packet.ipv4_fields() {
                let old = KeyIpv4 {
                    src: ip.src,
                    dst: ip.dst,
                    tos: ip.tos,
                    ttl: ip.ttl,
                    ..KeyIpv4::default()
                };
                let new = payload_masked_set(&old, &payload_and(k, m), m);
                packet.set_ipv4(new.src, new.dst, new.tos, new.ttl);
            }
        }
        (SetField::Ipv6(k), SetField::Ipv6(m)) => {
            if let Some(ip) = packet.ipv6_fields() {
                let old = KeyIpv6 {
                    src: ip.src,
                    dst: ip.dst,
                    label: ip.label,
                    tclass: ip.tclass,
                    hlimit: ip.hlimit,
                    ..KeyIpv6::default()
                };
                let new = payload_masked_set(&old, &payload_and(k, m), m);
                let proto = packet.layers().nw_proto;
                packet.set_ipv6(proto, new.src, new.dst, new.tclass, new.label, new.hlimit);
            }
        }
        (SetField::Tcp(k), SetField::Tcp(m))
        | (SetField::Udp(k), SetField::Udp(m))
        | (SetField::Sctp(k), SetField::Sctp(m)) => {
            let Some((src, dst)) = packet.ports() else {
                return;
            };
            let new = payload_masked_set(&KeyPorts { src, dst }, &payload_and(k, m), m);
            match key {
                SetField::Tcp(_) => packet.set_tcp_ports(new.src, new.dst),
                SetField::Udp(_) => packet.set_udp_ports(new.src, new.dst),
                _ => packet.set_sctp_ports(new.src, new.dst),
            }
        }
        (SetField::Mpls(k), SetField::Mpls(m)) => {
            if let Some(old) = packet.mpls_top() {
                packet.set_mpls_lse(Lse(masked_u32(old.0, k.0, m.0)));
            }
        }
        (SetField::Arp(k), SetField::Arp(m)) => {
            if let Some(arp) = packet.arp_fields() {
                let old = KeyArp {
                    sip: arp.spa,
                    tip: arp.tpa,
                    op: arp.op,
                    sha: arp.sha,
                    tha: arp.tha,
                };
                let new = payload_masked_set(&old, &payload_and(k, m), m);
                packet.set_arp(&ArpFields {
                    op: new.op,
                    sha: new.sha,
                    spa: new.sip,
                    tha: new.tha,
                    tpa: new.tip,
                });
            }
        }
        _ => warn!(
            "masked set of {} under a {} mask ignored",
            key.attr().name(),
            mask.attr().name()
        ),
    }
}

/// Apply a packet local action.
fn apply<Buf: PacketBufferMut>(p: &mut DpPacket<Buf>, action: &Action) {
    match action {
        Action::Set(field) => set_field(p, field),
        Action::SetMasked { key, mask } => set_masked(p, key, mask),
        Action::Hash {
            alg: HashAlg::L4,
            basis,
        } => {
            let hash = flow_extract(&p.packet, &p.md).hash_5tuple(*basis);
            // zero means "no hash"
            p.md.dp_hash = if hash == 0 { 1 } else { hash };
        }
        Action::PushVlan { tpid, tci } => log_splice("push_vlan", p.packet.push_vlan(*tpid, *tci)),
        Action::PopVlan => log_splice("pop_vlan", p.packet.pop_vlan()),
        Action::PushMpls { lse, ethertype } => {
            log_splice("push_mpls", p.packet.push_mpls(*ethertype, *lse));
        }
        Action::PopMpls(ethertype) => log_splice("pop_mpls", p.packet.pop_mpls(*ethertype)),
        Action::PushEth {
            src,
            dst,
            ethertype,
        } => {
            log_splice("push_eth", p.packet.push_eth(*dst, *src, *ethertype));
            p.sync_layer();
        }
        Action::PopEth => {
            log_splice("pop_eth", p.packet.pop_eth());
            p.sync_layer();
        }
        // dispatched or recursed by `execute`
        Action::Output(_)
        | Action::Userspace(_)
        | Action::TunnelPush(_)
        | Action::TunnelPop(_)
        | Action::Recirc(_)
        | Action::Sample { .. } => {}
    }
}

/// Run `actions` on `batch`, in order.
///
/// Dispatch actions go to `dp`.  The batch itself goes with the last action of the list, so
/// only that action may receive a [`Batch::Stolen`] batch.  A sample draws once per packet:
/// packets that lose the draw skip the nested list (and are dropped if the executor owns them),
/// the others run it as a batch of one.
pub fn execute<Buf, D>(dp: &mut D, mut batch: Batch<'_, Buf>, actions: &[Action])
where
    Buf: PacketBufferMut,
    D: DpExecute<Buf> + ?Sized,
{
    for (i, action) in actions.iter().enumerate() {
        let last = i + 1 == actions.len();
        match action {
            Action::Output(_)
            | Action::Userspace(_)
            | Action::TunnelPush(_)
            | Action::TunnelPop(_)
            | Action::Recirc(_) => {
                if last {
                    dp.execute(batch, action);
                    return;
                }
                dp.execute(Batch::Borrowed(batch.packets_mut()), action);
            }
            Action::Sample {
                probability,
                actions: nested,
            } => {
                batch = match batch {
                    Batch::Stolen(packets) if last => {
                        for packet in packets {
                            if sampled(*probability) {
                                execute(dp, Batch::Stolen(vec![packet]), nested);
                            } else {
                                trace!("packet not sampled, dropped");
                            }
                        }
                        return;
                    }
                    batch => batch,
                };
                for packet in batch.packets_mut() {
                    if sampled(*probability) {
                        execute(dp, Batch::Borrowed(std::slice::from_mut(packet)), nested);
                    }
                }
            }
            _ => {
                for packet in batch.packets_mut() {
                    apply(packet, action);
                }
            }
        }
    }
    if batch.is_stolen() && !batch.is_empty() {
        trace!("releasing {} packets", batch.len());
    }
}

/// Decode `actions` and run them on `batch`, as [`execute`] does.
///
/// # Errors
///
/// Returns the decode error if `actions` is malformed.  Nothing is executed in that case.
///
/// # Panics
///
/// Panics on a hash action with an unknown algorithm: the peer which built the list speaks a
/// different version of the action format.
pub fn execute_wire<Buf, D>(dp: &mut D, batch: Batch<'_, Buf>, actions: &[u8]) -> Result<(), ActionError>
where
    Buf: PacketBufferMut,
    D: DpExecute<Buf> + ?Sized,
{
    let actions = match odp_actions_from_wire(actions) {
        Ok(actions) => actions,
        Err(ActionError::UnknownHashAlg(alg)) => unreachable!("unknown hash algorithm {alg}"),
        Err(e) => {
            debug!("not executing malformed actions: {e}");
            return Err(e);
        }
    };
    execute(dp, batch, &actions);
    Ok(())
}
