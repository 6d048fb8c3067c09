// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frame builders and checksum validators for tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

pub use crate::buffer::TestBuffer;
use crate::checksum::{accumulate, csum, fold};
use crate::eth::ethtype::EthType;
use crate::ip::{IPPROTO_ICMPV6, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP};
use crate::packet::Packet;
use etherparse::PacketBuilder;

/// Source mac used by the builders.
pub const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
/// Destination mac used by the builders.
pub const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];
/// IPv6 source used by the builders.
pub const SRC_IP6: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
/// IPv6 destination used by the builders.
pub const DST_IP6: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];

const PAYLOAD: &[u8] = b"the quick brown fox";

/// Eth / IPv4 / TCP frame with a valid header and transport checksum.
#[must_use]
pub fn tcp4_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut frame = Vec::new();
    PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .tcp(sport, dport, 1, 1024)
        .write(&mut frame, PAYLOAD)
        .unwrap();
    frame
}

/// [`tcp4_frame`] wrapped in a [`Packet`].
#[must_use]
pub fn tcp4_packet(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Packet<TestBuffer> {
    Packet::new(TestBuffer::from_raw_data(&tcp4_frame(src, dst, sport, dport)))
}

/// Eth / IPv4 / UDP frame with a valid header and transport checksum.
#[must_use]
pub fn udp4_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut frame = Vec::new();
    PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .udp(sport, dport)
        .write(&mut frame, PAYLOAD)
        .unwrap();
    frame
}

/// Eth / IPv6 / UDP frame between [`SRC_IP6`] and [`DST_IP6`].
#[must_use]
pub fn udp6_frame(sport: u16, dport: u16) -> Vec<u8> {
    let mut frame = Vec::new();
    PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv6(SRC_IP6, DST_IP6, 64)
        .udp(sport, dport)
        .write(&mut frame, PAYLOAD)
        .unwrap();
    frame
}

/// Eth / IPv6 / TCP frame between [`SRC_IP6`] and [`DST_IP6`].
#[must_use]
pub fn tcp6_frame(sport: u16, dport: u16) -> Vec<u8> {
    let mut frame = Vec::new();
    PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv6(SRC_IP6, DST_IP6, 64)
        .tcp(sport, dport, 1, 1024)
        .write(&mut frame, PAYLOAD)
        .unwrap();
    frame
}

fn eth_header(ty: EthType) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14);
    frame.extend_from_slice(&DST_MAC);
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&ty.to_be_bytes());
    frame
}

fn ipv4_header(proto: u8, src: [u8; 4], dst: [u8; 4], payload_len: usize) -> [u8; 20] {
    let total = u16::try_from(20 + payload_len).unwrap().to_be_bytes();
    let mut header = [
        0x45, 0, total[0], total[1], 0, 1, 0x40, 0, 64, proto, 0, 0, src[0], src[1], src[2],
        src[3], dst[0], dst[1], dst[2], dst[3],
    ];
    let c = csum(&header).to_be_bytes();
    header[10] = c[0];
    header[11] = c[1];
    header
}

/// Eth / IPv4 / SCTP frame with a valid CRC32c.
#[must_use]
pub fn sctp4_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut sctp = Vec::new();
    sctp.extend_from_slice(&sport.to_be_bytes());
    sctp.extend_from_slice(&dport.to_be_bytes());
    sctp.extend_from_slice(&[0, 0, 0, 7, 0, 0, 0, 0]);
    sctp.extend_from_slice(PAYLOAD);
    let crc = crate::checksum::crc32c(&sctp).to_le_bytes();
    sctp[8..12].copy_from_slice(&crc);
    let mut frame = eth_header(EthType::IPV4);
    frame.extend_from_slice(&ipv4_header(IPPROTO_SCTP, src, dst, sctp.len()));
    frame.extend_from_slice(&sctp);
    frame
}

/// Eth / ARP request frame.
#[must_use]
pub fn arp_frame(op: u16, spa: [u8; 4], tpa: [u8; 4]) -> Vec<u8> {
    let mut frame = eth_header(EthType::ARP);
    frame.extend_from_slice(&[0, 1, 0x08, 0x00, 6, 4]);
    frame.extend_from_slice(&op.to_be_bytes());
    frame.extend_from_slice(&SRC_MAC);
    frame.extend_from_slice(&spa);
    frame.extend_from_slice(&[0; 6]);
    frame.extend_from_slice(&tpa);
    frame
}

/// Eth / IPv6 / ICMPv6 neighbor solicitation (`ty` 135) or advertisement (`ty` 136) carrying a
/// link layer address option (source for 135, target for 136).
#[must_use]
pub fn nd_frame(ty: u8, target: [u8; 16], lladdr: [u8; 6]) -> Vec<u8> {
    let option = if ty == 135 { 1 } else { 2 };
    let mut icmp = vec![ty, 0, 0, 0, 0, 0, 0, 0];
    icmp.extend_from_slice(&target);
    icmp.extend_from_slice(&[option, 1]);
    icmp.extend_from_slice(&lladdr);
    let mut frame = eth_header(EthType::IPV6);
    let len = u16::try_from(icmp.len()).unwrap().to_be_bytes();
    frame.extend_from_slice(&[0x60, 0, 0, 0, len[0], len[1], IPPROTO_ICMPV6, 255]);
    frame.extend_from_slice(&SRC_IP6);
    frame.extend_from_slice(&DST_IP6);
    let sum = pseudo_header_sum(&frame[14..], icmp.len());
    let c = (!fold(accumulate(sum, &icmp))).to_be_bytes();
    icmp[2] = c[0];
    icmp[3] = c[1];
    frame.extend_from_slice(&icmp);
    frame
}

fn pseudo_header_sum(ip: &[u8], l4_len: usize) -> u32 {
    let len = u32::try_from(l4_len).unwrap();
    if ip[0] >> 4 == 4 {
        let mut sum = accumulate(0, &ip[12..20]);
        sum = accumulate(sum, &[0, ip[9]]);
        accumulate(sum, &u16::try_from(len).unwrap().to_be_bytes())
    } else {
        let mut sum = accumulate(0, &ip[8..40]);
        sum = accumulate(sum, &len.to_be_bytes());
        accumulate(sum, &[0, 0, 0, ip[6]])
    }
}

/// True if the IPv4 header checksum of the packet verifies.
#[must_use]
pub fn ipv4_checksum_ok(packet: &Packet<TestBuffer>) -> bool {
    let l3 = packet.l3().unwrap();
    let ihl = usize::from(l3[0] & 0xf) * 4;
    csum(&l3[..ihl]) == 0
}

/// True if the TCP, UDP, ICMPv6 or SCTP checksum of the packet verifies.
#[must_use]
pub fn l4_checksum_ok(packet: &Packet<TestBuffer>) -> bool {
    let l3 = packet.l3().unwrap();
    let l4 = packet.l4().unwrap();
    let proto = packet.layers().nw_proto;
    if proto == IPPROTO_SCTP {
        let mut copy = l4.to_vec();
        let stored = u32::from_le_bytes(copy[8..12].try_into().unwrap());
        copy[8..12].fill(0);
        return crate::checksum::crc32c(&copy) == stored;
    }
    if proto == IPPROTO_UDP && l4[6..8] == [0, 0] {
        return true;
    }
    assert!(matches!(proto, IPPROTO_TCP | IPPROTO_UDP | IPPROTO_ICMPV6));
    fold(accumulate(pseudo_header_sum(l3, l4.len()), l4)) == 0xffff
}
