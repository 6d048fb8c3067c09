// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounds checked cursor over raw packet bytes.

use std::num::NonZero;

/// Error returned when a read would run past the end of the input.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("expected at least {expected} bytes, got {actual}")]
pub struct LengthError {
    pub(crate) expected: NonZero<usize>,
    pub(crate) actual: usize,
}

impl LengthError {
    /// The number of bytes the read needed.
    #[must_use]
    pub fn expected(&self) -> NonZero<usize> {
        self.expected
    }

    /// The number of bytes that were actually available.
    #[must_use]
    pub fn actual(&self) -> usize {
        self.actual
    }
}

/// A forward-only reader over a byte slice.
///
/// Every read checks the remaining length first, and a failed read leaves the cursor where it
/// was.  Multi-byte integers are read in network byte order.
#[derive(Debug, Clone)]
pub struct Reader<'buf> {
    inner: &'buf [u8],
    remaining: usize,
}

impl<'buf> Reader<'buf> {
    /// Create a reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'buf [u8]) -> Reader<'buf> {
        Reader {
            inner: buf,
            remaining: buf.len(),
        }
    }

    /// Offset of the cursor from the start of the input.
    #[must_use]
    pub fn position(&self) -> usize {
        self.inner.len() - self.remaining
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// The unread bytes.
    #[must_use]
    pub fn rest(&self) -> &'buf [u8] {
        &self.inner[self.position()..]
    }

    fn check(&self, n: usize) -> Result<(), LengthError> {
        if n > self.remaining {
            return Err(LengthError {
                expected: NonZero::new(n).unwrap_or(NonZero::<usize>::MIN),
                actual: self.remaining,
            });
        }
        Ok(())
    }

    /// Advance the cursor by `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> Result<(), LengthError> {
        self.check(n)?;
        self.remaining -= n;
        Ok(())
    }

    /// Read `N` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if fewer than `N` bytes remain.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], LengthError> {
        self.check(N)?;
        let start = self.position();
        let mut out = [0u8; N];
        out.copy_from_slice(&self.inner[start..start + N]);
        self.remaining -= N;
        Ok(out)
    }

    /// Read one byte.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if the input is exhausted.
    pub fn read_u8(&mut self) -> Result<u8, LengthError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a big endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if fewer than 2 bytes remain.
    pub fn read_be16(&mut self) -> Result<u16, LengthError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read a big endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if fewer than 4 bytes remain.
    pub fn read_be32(&mut self) -> Result<u32, LengthError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Look at the next big endian `u16` without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`LengthError`] if fewer than 2 bytes remain.
    pub fn peek_be16(&self) -> Result<u16, LengthError> {
        self.clone().read_be16()
    }
}
