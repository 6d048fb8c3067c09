// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet type related fields

use etherparse::EtherType;
use std::fmt::{Display, Formatter};

/// The ethernet header's ethertype field.
///
/// This is a transparent wrapper around the type provided by etherparse.
/// Any `u16` is representable because the same field doubles as a bit mask in flow masks.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthType(pub(crate) EtherType);

impl EthType {
    /// Ethernet type for [address resolution protocol](https://en.wikipedia.org/wiki/Address_Resolution_Protocol)
    pub const ARP: EthType = EthType(EtherType::ARP);
    /// Ethernet type for reverse address resolution protocol
    pub const RARP: EthType = EthType::new(0x8035);
    /// Ethernet type for [IPv4](https://en.wikipedia.org/wiki/IPv4)
    pub const IPV4: EthType = EthType(EtherType::IPV4);
    /// Ethernet type for [IPv6](https://en.wikipedia.org/wiki/IPv6)
    pub const IPV6: EthType = EthType(EtherType::IPV6);
    /// Ethernet type for [VLAN](https://en.wikipedia.org/wiki/IEEE_802.1Q)
    pub const VLAN: EthType = EthType(EtherType::VLAN_TAGGED_FRAME);
    /// Ethernet type for [QinQ (aka provider bridging)](https://en.wikipedia.org/wiki/IEEE_802.1ad)
    pub const VLAN_QINQ: EthType = EthType(EtherType::PROVIDER_BRIDGING);
    /// Ethernet type for unicast [MPLS](https://en.wikipedia.org/wiki/Multiprotocol_Label_Switching)
    pub const MPLS: EthType = EthType::new(0x8847);
    /// Ethernet type for multicast MPLS
    pub const MPLS_MCAST: EthType = EthType::new(0x8848);
    /// Smallest value which is an Ethernet II type rather than an 802.3 length.
    pub const MIN: EthType = EthType::new(0x0600);
    /// Marker used for frames which carry no Ethernet II type at all.
    pub const NONE: EthType = EthType::new(0x05ff);
    /// The zero value (no type known).
    pub const ZERO: EthType = EthType::new(0);
    /// All ones, which is the exact match mask.
    pub const EXACT: EthType = EthType::new(u16::MAX);

    /// Map a raw (native-endian) u16 into an [`EthType`]
    #[must_use]
    pub const fn new(raw: u16) -> EthType {
        EthType(EtherType(raw))
    }

    /// Map a raw (big-endian) u16 into an [`EthType`]
    #[must_use]
    pub const fn new_from_be_bytes(raw: [u8; 2]) -> EthType {
        EthType(EtherType(u16::from_be_bytes(raw)))
    }

    /// get the raw `u16` value (native-endian)
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0.0
    }

    /// The value in network byte order.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.raw().to_be_bytes()
    }

    /// True for either MPLS ethertype.
    #[must_use]
    pub const fn is_mpls(self) -> bool {
        matches!(self.raw(), 0x8847 | 0x8848)
    }

    /// True for the 802.1Q and 802.1ad tag protocol identifiers.
    #[must_use]
    pub const fn is_vlan(self) -> bool {
        matches!(self.raw(), 0x8100 | 0x88a8)
    }

    /// True if the value is a real Ethernet II type (not an 802.3 length).
    #[must_use]
    pub const fn is_ethernet_ii(self) -> bool {
        self.raw() >= Self::MIN.raw()
    }

    /// True for IPv4 or IPv6.
    #[must_use]
    pub const fn is_ip_any(self) -> bool {
        matches!(self.raw(), 0x0800 | 0x86dd)
    }
}

impl Default for EthType {
    fn default() -> Self {
        EthType::ZERO
    }
}

impl From<u16> for EthType {
    fn from(raw: u16) -> Self {
        EthType::new(raw)
    }
}

impl From<EthType> for u16 {
    fn from(value: EthType) -> Self {
        value.raw()
    }
}

impl Display for EthType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.raw())
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::EthType;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for EthType {
        fn generate<D: Driver>(u: &mut D) -> Option<Self> {
            Some(EthType::new(u.produce()?))
        }
    }
}
