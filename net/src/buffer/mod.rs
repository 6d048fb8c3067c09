// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! [`PacketBuffer`] and related traits

#[cfg(any(doc, test, feature = "test_buffer"))]
pub mod test_buffer;

use core::fmt::Debug;
use std::error::Error;

#[allow(unused_imports)] // re-export
#[cfg(any(doc, test, feature = "test_buffer"))]
pub use test_buffer::*;

/// Super trait representing the abstract operations which may be performed on a packet buffer.
pub trait PacketBuffer: AsRef<[u8]> + Headroom + Debug + 'static {}
impl<T> PacketBuffer for T where T: AsRef<[u8]> + Headroom + Debug + 'static {}

/// Super trait representing the abstract operations which may be performed on mutable a packet buffer.
pub trait PacketBufferMut: PacketBuffer + AsMut<[u8]> + Prepend + Send + TrimFromStart {}
impl<T> PacketBufferMut for T where T: PacketBuffer + AsMut<[u8]> + Prepend + Send + TrimFromStart {}

/// Trait representing the ability to get the unused headroom in a packet buffer.
pub trait Headroom {
    /// Get the (unused) headroom in a packet buffer.
    fn headroom(&self) -> u16;
}

/// Trait representing the ability to prepend data to a packet buffer.
pub trait Prepend {
    /// Error which may occur when attempting to prepend data to the buffer.
    type Error: Debug + Error;
    /// Prepend data to the buffer if possible.
    ///
    /// If successful, this method returns a slice to the net start of the buffer.
    /// The contents of the buffer will not be otherwise altered.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if an error occurs while performing this operation.
    /// For example, there may not be enough headroom available.
    fn prepend(&mut self, len: u16) -> Result<&mut [u8], Self::Error>;
}

/// Trait representing the ability to trim data from the start of a packet buffer.
pub trait TrimFromStart {
    /// Error which may occur when attempting to trim data from the start of the buffer.
    type Error: Debug + Error;
    /// Trim data from the start of the buffer if possible.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if an error occurs while performing this operation.
    /// For example, the buffer may not have `len` bytes in it to begin with.
    fn trim_from_start(&mut self, len: u16) -> Result<&mut [u8], Self::Error>;
}

/// Errors which may occur while opening or closing a gap inside a packet buffer.
#[derive(Debug, thiserror::Error)]
pub enum SpliceError {
    /// The buffer could not grow at the front.
    #[error(transparent)]
    Headroom(#[from] NotEnoughHeadRoom),
    /// The requested region lies (at least partly) outside the buffer.
    #[error(transparent)]
    Length(#[from] MemoryBufferNotLongEnough),
}

/// Opening and closing gaps in the middle of a packet.
///
/// Headers are always inserted or removed close to the start of a frame, so the bytes *before*
/// the gap are moved rather than the (typically much longer) payload after it.
pub trait Splice {
    /// Open a gap of `len` zeroed bytes at `offset`, shifting the first `offset` bytes toward the
    /// front of the buffer.
    ///
    /// On success the returned slice is the gap itself.
    ///
    /// # Errors
    ///
    /// Fails if `offset` is past the end of the buffer or if there is not enough headroom.
    fn insert_gap(&mut self, offset: usize, len: u16) -> Result<&mut [u8], SpliceError>;

    /// Remove the `len` bytes found at `offset`, shifting the first `offset` bytes toward the end
    /// of the buffer.
    ///
    /// # Errors
    ///
    /// Fails if `offset + len` is past the end of the buffer.
    fn remove_range(&mut self, offset: usize, len: u16) -> Result<(), SpliceError>;
}

impl<T> Splice for T
where
    T: PacketBufferMut,
{
    fn insert_gap(&mut self, offset: usize, len: u16) -> Result<&mut [u8], SpliceError> {
        if offset > self.as_ref().len() {
            return Err(MemoryBufferNotLongEnough.into());
        }
        if self.headroom() < len {
            return Err(NotEnoughHeadRoom.into());
        }
        let data = self.prepend(len).map_err(|_| NotEnoughHeadRoom)?;
        let len = usize::from(len);
        data.copy_within(len..len + offset, 0);
        let gap = &mut data[offset..offset + len];
        gap.fill(0);
        Ok(gap)
    }

    fn remove_range(&mut self, offset: usize, len: u16) -> Result<(), SpliceError> {
        let n = usize::from(len);
        if offset + n > self.as_ref().len() {
            return Err(MemoryBufferNotLongEnough.into());
        }
        self.as_mut().copy_within(0..offset, n);
        self.trim_from_start(len)
            .map_err(|_| MemoryBufferNotLongEnough)?;
        Ok(())
    }
}

/// Error indicating that there is not enough headroom in a memory buffer for the requested
/// operation.
#[non_exhaustive]
#[repr(transparent)]
#[derive(Debug, thiserror::Error)]
#[error("Not enough head room in memory buffer")]
pub struct NotEnoughHeadRoom;

/// Error indicating that the buffer is not long enough to perform the requested operation.
#[non_exhaustive]
#[repr(transparent)]
#[derive(Debug, thiserror::Error)]
#[error("MemoryBuffer not long enough to remove required number of bytes")]
pub struct MemoryBufferNotLongEnough;
