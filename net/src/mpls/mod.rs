// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! MPLS label stack entries.

use std::fmt::{Display, Formatter};

/// An MPLS label stack entry, in host order.
///
/// Layout: label (20 bits) | traffic class (3 bits) | bottom of stack (1 bit) | TTL (8 bits).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lse(pub u32);

impl Lse {
    /// Length of one entry on the wire.
    pub const LEN: usize = 4;
    /// Label bits.
    pub const LABEL_MASK: u32 = 0xffff_f000;
    /// Label shift.
    pub const LABEL_SHIFT: u32 = 12;
    /// Traffic class bits.
    pub const TC_MASK: u32 = 0x0000_0e00;
    /// Traffic class shift.
    pub const TC_SHIFT: u32 = 9;
    /// Bottom of stack bit.
    pub const BOS_MASK: u32 = 0x0000_0100;
    /// TTL bits.
    pub const TTL_MASK: u32 = 0x0000_00ff;
    /// All bits set, the exact match mask.
    pub const EXACT: Lse = Lse(u32::MAX);

    /// Assemble an entry from its parts. Out of range bits are truncated.
    #[must_use]
    pub const fn from_parts(label: u32, tc: u8, bos: bool, ttl: u8) -> Lse {
        Lse(((label << Self::LABEL_SHIFT) & Self::LABEL_MASK)
            | (((tc as u32) << Self::TC_SHIFT) & Self::TC_MASK)
            | if bos { Self::BOS_MASK } else { 0 }
            | ttl as u32)
    }

    /// The 20 bit label.
    #[must_use]
    pub const fn label(self) -> u32 {
        (self.0 & Self::LABEL_MASK) >> Self::LABEL_SHIFT
    }

    /// The traffic class.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // 3 bits
    pub const fn tc(self) -> u8 {
        ((self.0 & Self::TC_MASK) >> Self::TC_SHIFT) as u8
    }

    /// True if this is the last entry of the stack.
    #[must_use]
    pub const fn bos(self) -> bool {
        self.0 & Self::BOS_MASK != 0
    }

    /// The time to live.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // 8 bits
    pub const fn ttl(self) -> u8 {
        (self.0 & Self::TTL_MASK) as u8
    }

    /// Copy with a different label.
    #[must_use]
    pub const fn with_label(self, label: u32) -> Lse {
        Lse((self.0 & !Self::LABEL_MASK) | ((label << Self::LABEL_SHIFT) & Self::LABEL_MASK))
    }

    /// Copy with a different traffic class.
    #[must_use]
    pub const fn with_tc(self, tc: u8) -> Lse {
        Lse((self.0 & !Self::TC_MASK) | (((tc as u32) << Self::TC_SHIFT) & Self::TC_MASK))
    }

    /// Copy with the bottom of stack bit set or cleared.
    #[must_use]
    pub const fn with_bos(self, bos: bool) -> Lse {
        Lse((self.0 & !Self::BOS_MASK) | if bos { Self::BOS_MASK } else { 0 })
    }

    /// Copy with a different TTL.
    #[must_use]
    pub const fn with_ttl(self, ttl: u8) -> Lse {
        Lse((self.0 & !Self::TTL_MASK) | ttl as u32)
    }

    /// The entry in network byte order.
    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Read an entry from network byte order.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Lse {
        Lse(u32::from_be_bytes(bytes))
    }
}

impl Display for Lse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "label={},tc={},ttl={},bos={}",
            self.label(),
            self.tc(),
            self.ttl(),
            u8::from(self.bos())
        )
    }
}
