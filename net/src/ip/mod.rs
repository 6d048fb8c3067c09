// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IP protocol numbers and header geometry common to IPv4 and IPv6.

use etherparse::IpNumber;

/// [ICMP](https://en.wikipedia.org/wiki/Internet_Control_Message_Protocol)
pub const IPPROTO_ICMP: u8 = IpNumber::ICMP.0;
/// [TCP](https://en.wikipedia.org/wiki/Transmission_Control_Protocol)
pub const IPPROTO_TCP: u8 = IpNumber::TCP.0;
/// [UDP](https://en.wikipedia.org/wiki/User_Datagram_Protocol)
pub const IPPROTO_UDP: u8 = IpNumber::UDP.0;
/// GRE
pub const IPPROTO_GRE: u8 = 47;
/// ICMP for IPv6
pub const IPPROTO_ICMPV6: u8 = IpNumber::IPV6_ICMP.0;
/// [SCTP](https://en.wikipedia.org/wiki/Stream_Control_Transmission_Protocol)
pub const IPPROTO_SCTP: u8 = 132;

/// IPv4 header geometry.
pub mod ipv4 {
    /// Length of an IPv4 header without options.
    pub const HEADER_LEN: usize = 20;
    /// Offset of the type of service byte.
    pub const TOS_OFFSET: usize = 1;
    /// Offset of the flags and fragment offset word.
    pub const FRAG_OFFSET: usize = 6;
    /// Offset of the TTL byte.
    pub const TTL_OFFSET: usize = 8;
    /// Offset of the protocol byte.
    pub const PROTO_OFFSET: usize = 9;
    /// Offset of the header checksum.
    pub const CSUM_OFFSET: usize = 10;
    /// Offset of the source address.
    pub const SRC_OFFSET: usize = 12;
    /// Offset of the destination address.
    pub const DST_OFFSET: usize = 16;
    /// "More fragments" flag.
    pub const MORE_FRAGMENTS: u16 = 0x2000;
    /// Fragment offset bits.
    pub const FRAG_OFFSET_MASK: u16 = 0x1fff;
}

/// IPv6 header geometry.
pub mod ipv6 {
    use etherparse::IpNumber;

    /// Length of the fixed IPv6 header.
    pub const HEADER_LEN: usize = 40;
    /// Offset of the next header byte.
    pub const NEXT_HEADER_OFFSET: usize = 6;
    /// Offset of the hop limit byte.
    pub const HOP_LIMIT_OFFSET: usize = 7;
    /// Offset of the source address.
    pub const SRC_OFFSET: usize = 8;
    /// Offset of the destination address.
    pub const DST_OFFSET: usize = 24;
    /// Bits of the flow label.
    pub const LABEL_MASK: u32 = 0x000f_ffff;
    /// Hop-by-hop options extension header.
    pub const HOP_BY_HOP: u8 = IpNumber::IPV6_HEADER_HOP_BY_HOP.0;
    /// Routing extension header.
    pub const ROUTING: u8 = IpNumber::IPV6_ROUTE_HEADER.0;
    /// Fragment extension header.
    pub const FRAGMENT: u8 = IpNumber::IPV6_FRAGMENTATION_HEADER.0;
    /// Destination options extension header.
    pub const DEST_OPTIONS: u8 = IpNumber::IPV6_DESTINATION_OPTIONS.0;
    /// Authentication header.
    pub const AUTH: u8 = IpNumber::AUTHENTICATION_HEADER.0;
}

/// Checksum offsets within the transport headers.
pub mod l4 {
    /// TCP checksum offset.
    pub const TCP_CSUM_OFFSET: usize = 16;
    /// Minimum TCP header length.
    pub const TCP_HEADER_LEN: usize = 20;
    /// TCP data offset / flags word offset.
    pub const TCP_CTL_OFFSET: usize = 12;
    /// UDP checksum offset.
    pub const UDP_CSUM_OFFSET: usize = 6;
    /// UDP header length.
    pub const UDP_HEADER_LEN: usize = 8;
    /// SCTP checksum offset.
    pub const SCTP_CSUM_OFFSET: usize = 8;
    /// SCTP common header length.
    pub const SCTP_HEADER_LEN: usize = 12;
    /// ICMPv6 checksum offset.
    pub const ICMPV6_CSUM_OFFSET: usize = 2;
    /// ICMP header length (type, code, checksum).
    pub const ICMP_HEADER_LEN: usize = 4;
}

#[cfg(test)]
mod test {
    #[test]
    fn protocol_numbers() {
        assert_eq!(super::IPPROTO_ICMP, 1);
        assert_eq!(super::IPPROTO_TCP, 6);
        assert_eq!(super::IPPROTO_UDP, 17);
        assert_eq!(super::IPPROTO_ICMPV6, 58);
        assert_eq!(super::ipv6::FRAGMENT, 44);
        assert_eq!(super::ipv6::HOP_BY_HOP, 0);
    }
}
