// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VLAN tag control information.

use std::fmt::{Display, Formatter};

/// An 802.1Q tag control information word.
///
/// The flow model keeps the TCI in host order and uses the CFI bit as a "tag present" marker,
/// so any `u16` is representable here (including masks such as `0xffff`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tci(pub u16);

impl Tci {
    /// Length in bytes of a full 802.1Q tag (TPID + TCI).
    pub const TAG_LEN: usize = 4;
    /// Bits holding the VLAN identifier.
    pub const VID_MASK: u16 = 0x0fff;
    /// Bits holding the priority code point.
    pub const PCP_MASK: u16 = 0xe000;
    /// Shift of the priority code point.
    pub const PCP_SHIFT: u16 = 13;
    /// The canonical format indicator (CFI / DEI) bit.
    pub const CFI: u16 = 0x1000;
    /// All bits set, the exact match mask.
    pub const EXACT: Tci = Tci(u16::MAX);

    /// Assemble a [`Tci`] from its parts.
    ///
    /// Out of range `vid` and `pcp` bits are silently truncated.
    #[must_use]
    pub const fn from_parts(vid: u16, pcp: u8, cfi: bool) -> Tci {
        let cfi = if cfi { Self::CFI } else { 0 };
        Tci((vid & Self::VID_MASK) | (((pcp as u16) << Self::PCP_SHIFT) & Self::PCP_MASK) | cfi)
    }

    /// The 12 bit VLAN identifier.
    #[must_use]
    pub const fn vid(self) -> u16 {
        self.0 & Self::VID_MASK
    }

    /// The 3 bit priority code point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // at most 3 bits remain
    pub const fn pcp(self) -> u8 {
        (self.0 >> Self::PCP_SHIFT) as u8
    }

    /// True if the CFI bit is set.
    #[must_use]
    pub const fn cfi(self) -> bool {
        self.0 & Self::CFI != 0
    }

    /// The raw value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<u16> for Tci {
    fn from(value: u16) -> Self {
        Tci(value)
    }
}

impl Display for Tci {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "vid={},pcp={}", self.vid(), self.pcp())?;
        if !self.cfi() {
            write!(f, ",cfi=0")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Tci;

    #[test]
    fn parts() {
        bolero::check!()
            .with_type::<(u16, u8, bool)>()
            .for_each(|&(vid, pcp, cfi)| {
                let tci = Tci::from_parts(vid, pcp, cfi);
                assert_eq!(tci.vid(), vid & 0xfff);
                assert_eq!(tci.pcp(), pcp & 0x7);
                assert_eq!(tci.cfi(), cfi);
            });
    }

    #[test]
    fn display() {
        assert_eq!(Tci::from_parts(10, 3, true).to_string(), "vid=10,pcp=3");
        assert_eq!(Tci::from_parts(10, 0, false).to_string(), "vid=10,pcp=0,cfi=0");
    }
}
