// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Internet checksum helpers.
//!
//! The incremental updates follow [RFC 1624] (`HC' = ~(~HC + ~m + m')`).
//! All values are taken in the same byte order as the checksum they update; ones' complement
//! arithmetic is byte order independent as long as the inputs agree.
//!
//! [RFC 1624]: https://www.rfc-editor.org/rfc/rfc1624

/// Fold a 32 bit accumulator into 16 bits with end around carry.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // folded below 2^16
pub const fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// Add `data` into a running ones' complement accumulator, as big-endian 16 bit words.
///
/// An odd trailing byte is padded with zero.
#[must_use]
pub fn accumulate(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum = u32::from(fold(sum + u32::from(u16::from_be_bytes([word[0], word[1]]))));
    }
    if let [last] = chunks.remainder() {
        sum = u32::from(fold(sum + (u32::from(*last) << 8)));
    }
    sum
}

/// The full internet checksum of `data`.
#[must_use]
pub fn csum(data: &[u8]) -> u16 {
    !fold(accumulate(0, data))
}

/// Update `old_csum` after a 16 bit field changed from `old` to `new`.
#[must_use]
pub const fn recalc_csum16(old_csum: u16, old: u16, new: u16) -> u16 {
    let sum = (!old_csum) as u32 + (!old) as u32 + new as u32;
    !fold(sum)
}

/// Update `old_csum` after a 32 bit field changed from `old` to `new`.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // splitting into halves
pub const fn recalc_csum32(old_csum: u16, old: u32, new: u32) -> u16 {
    let csum = recalc_csum16(old_csum, (old >> 16) as u16, (new >> 16) as u16);
    recalc_csum16(csum, old as u16, new as u16)
}

/// Update `old_csum` after a 128 bit field (an IPv6 address) changed from `old` to `new`.
#[must_use]
pub fn recalc_csum128(mut old_csum: u16, old: &[u8; 16], new: &[u8; 16]) -> u16 {
    for (o, n) in old.chunks_exact(2).zip(new.chunks_exact(2)) {
        old_csum = recalc_csum16(
            old_csum,
            u16::from_be_bytes([o[0], o[1]]),
            u16::from_be_bytes([n[0], n[1]]),
        );
    }
    old_csum
}

/// CRC32c (Castagnoli), as used by SCTP.
///
/// The result is the final (inverted) value; SCTP stores it least significant byte first.
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    const POLY: u32 = 0x82f6_3b78;
    let mut crc = u32::MAX;
    for byte in data {
        crc ^= u32::from(*byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;

    #[test]
    fn known_header_checksum() {
        // 20 byte IPv4 header with a zeroed checksum field.
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(csum(&header), 0xb861);
    }

    #[test]
    fn crc32c_check_value() {
        assert_eq!(crc32c(b"123456789"), 0xe306_9283);
    }

    #[test]
    fn incremental_matches_full() {
        bolero::check!()
            .with_type::<([u8; 20], usize, u16)>()
            .for_each(|(data, at, new)| {
                let mut data = *data;
                let at = (at % 10) * 2;
                let before = csum(&data);
                let old = u16::from_be_bytes([data[at], data[at + 1]]);
                data[at..at + 2].copy_from_slice(&new.to_be_bytes());
                let after = csum(&data);
                // 0x0000 and 0xffff are the same ones' complement value
                let updated = recalc_csum16(before, old, *new);
                assert!(
                    updated == after || ((updated ^ after) == 0xffff && (after == 0 || after == 0xffff)),
                    "{updated:#x} != {after:#x}"
                );
            });
    }

    #[test]
    fn incremental_128() {
        let mut data = [0u8; 40];
        data[..16].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let old: [u8; 16] = data[..16].try_into().unwrap();
        let new = [0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0x12, 0x34, 0, 0, 0, 0, 0, 9];
        let before = csum(&data);
        data[..16].copy_from_slice(&new);
        assert_eq!(recalc_csum128(before, &old, &new), csum(&data));
    }
}
