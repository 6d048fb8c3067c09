// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet types

pub mod ethtype;
pub mod mac;

/// Layout of an Ethernet II header.
///
/// Only the geometry is described here; reading and writing the fields is done in place by
/// [`crate::packet::Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Eth;

impl Eth {
    /// The length (in bytes) of an ethernet header
    pub const HEADER_LEN: usize = 14;
    /// The length (in bytes) of both address fields together.
    pub const ADDRS_LEN: usize = 2 * mac::Mac::LEN;
    /// Offset of the destination address.
    pub const DST_OFFSET: usize = 0;
    /// Offset of the source address.
    pub const SRC_OFFSET: usize = mac::Mac::LEN;
    /// Offset of the ethertype field.
    pub const TYPE_OFFSET: usize = Self::ADDRS_LEN;
}
