// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Toy implementation of [`PacketBuffer`] which is useful for testing.

#[cfg(any(test, feature = "bolero"))]
pub use contract::*;

use crate::buffer::{Headroom, MemoryBufferNotLongEnough, NotEnoughHeadRoom, Prepend, TrimFromStart};
use tracing::trace;

// only included for doc ref
#[cfg(doc)]
use crate::buffer::PacketBuffer;

/// Toy data structure which implements [`PacketBuffer`]
///
/// The frame lives in a `Vec` surrounded by reserved head and tail room, so that headers can be
/// pushed in front of the frame the same way a datapath buffer would allow.
#[derive(Debug, Clone)]
pub struct TestBuffer {
    buffer: Vec<u8>,
    headroom: u16,
    tailroom: u16,
}

impl Drop for TestBuffer {
    fn drop(&mut self) {
        trace!("Dropping TestBuffer");
    }
}

impl TestBuffer {
    /// The maximum capacity of a `TestBuffer`.
    ///
    /// This is the maximum number of octets that generated test buffers will hold.
    pub const CAPACITY: u16 = 2048;
    /// The reserved headroom of a `TestBuffer`.
    pub const HEADROOM: u16 = 96;
    /// The reserved tailroom of a `TestBuffer`.
    pub const TAILROOM: u16 = 96;

    /// Create a new `TestBuffer` from a given slice of octets
    #[must_use]
    pub fn from_raw_data(data: &[u8]) -> TestBuffer {
        let mut buffer = Vec::with_capacity(
            data.len() + usize::from(TestBuffer::HEADROOM) + usize::from(TestBuffer::TAILROOM),
        );
        buffer.extend_from_slice(&[0; TestBuffer::HEADROOM as usize]);
        buffer.extend_from_slice(data);
        buffer.extend_from_slice(&[0; TestBuffer::TAILROOM as usize]);
        TestBuffer {
            buffer,
            headroom: TestBuffer::HEADROOM,
            tailroom: TestBuffer::TAILROOM,
        }
    }
}

impl AsRef<[u8]> for TestBuffer {
    fn as_ref(&self) -> &[u8] {
        let start = self.headroom as usize;
        let end = self.buffer.len() - self.tailroom as usize;
        &self.buffer.as_slice()[start..end]
    }
}

impl AsMut<[u8]> for TestBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        let start = self.headroom as usize;
        let end = self.buffer.len() - self.tailroom as usize;
        &mut self.buffer.as_mut_slice()[start..end]
    }
}

impl Headroom for TestBuffer {
    fn headroom(&self) -> u16 {
        self.headroom
    }
}

impl Prepend for TestBuffer {
    type Error = NotEnoughHeadRoom;
    fn prepend(&mut self, len: u16) -> Result<&mut [u8], Self::Error> {
        if self.headroom < len {
            return Err(NotEnoughHeadRoom);
        }
        self.headroom -= len;
        Ok(self.as_mut())
    }
}

impl TrimFromStart for TestBuffer {
    type Error = MemoryBufferNotLongEnough;
    fn trim_from_start(&mut self, len: u16) -> Result<&mut [u8], MemoryBufferNotLongEnough> {
        debug_assert!(
            usize::from(self.headroom) + usize::from(self.tailroom) + self.as_ref().len()
                == self.buffer.len()
        );
        if usize::from(len) > self.as_ref().len() {
            return Err(MemoryBufferNotLongEnough);
        }
        self.headroom += len;
        Ok(self.as_mut())
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use crate::buffer::TestBuffer;
    use bolero::{Driver, TypeGenerator, ValueGenerator};

    /// [`ValueGenerator`] which produces [`TestBuffer`]s of a specified length.
    #[repr(transparent)]
    pub struct GenerateTestBufferOfLength(u16);

    impl GenerateTestBufferOfLength {
        /// Create a new `GenerateTestBufferOfLength` to generate test buffers of length `len`.
        ///
        /// If `len` is greater than [`TestBuffer::CAPACITY`], it will be set to [`TestBuffer::CAPACITY`].
        #[must_use]
        pub fn new(len: u16) -> Self {
            Self(len.min(TestBuffer::CAPACITY))
        }
    }

    impl ValueGenerator for GenerateTestBufferOfLength {
        type Output = TestBuffer;

        fn generate<D: Driver>(&self, driver: &mut D) -> Option<Self::Output> {
            let mut data = Vec::<u8>::with_capacity(self.0 as usize);
            for _ in 0..self.0 {
                data.push(driver.produce()?);
            }
            Some(TestBuffer::from_raw_data(&data))
        }
    }

    impl TypeGenerator for TestBuffer {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            // most interesting frames are short, keep the search space small
            GenerateTestBufferOfLength::new(driver.produce::<u8>()?.into()).generate(driver)
        }
    }
}
