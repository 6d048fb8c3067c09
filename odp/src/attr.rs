// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Length prefixed, 4 byte aligned attributes.
//!
//! Every attribute starts with a 4 byte header: the total length (header included) and the type,
//! both `u16` in host byte order.  The payload follows and is padded to a multiple of
//! [`ALIGNTO`] bytes.  The payload of a nested attribute is itself a sequence of attributes.
//!
//! Integer payloads written through [`AttrWriter`] are big endian.

/// Attribute alignment.
pub const ALIGNTO: usize = 4;

/// Size of an attribute header.
pub const HDRLEN: usize = 4;

/// Round `len` up to the attribute alignment.
#[must_use]
pub const fn align(len: usize) -> usize {
    len.div_ceil(ALIGNTO) * ALIGNTO
}

/// Errors of the attribute layer.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrError {
    /// Fewer bytes than an attribute header remain.
    #[error("truncated attribute header ({0} bytes left)")]
    Truncated(usize),
    /// The length in the header is smaller than the header or runs past the buffer.
    #[error("attribute {ty} claims {len} bytes but {avail} are available")]
    BadLength {
        /// attribute type
        ty: u16,
        /// claimed length
        len: usize,
        /// bytes left in the buffer
        avail: usize,
    },
    /// A typed accessor found a payload of the wrong size.
    #[error("attribute {ty} has a {actual} byte payload, expected {expected}")]
    PayloadLength {
        /// attribute type
        ty: u16,
        /// required payload size
        expected: usize,
        /// actual payload size
        actual: usize,
    },
    /// The writer has no room left (or the attribute is too long for its header).
    #[error("no room for {needed} more bytes (limit {limit})")]
    InsufficientSpace {
        /// bytes the put needed
        needed: usize,
        /// the writer limit
        limit: usize,
    },
}

/// A borrowed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    ty: u16,
    payload: &'a [u8],
}

impl<'a> Attr<'a> {
    /// Wrap a payload.
    #[must_use]
    pub fn new(ty: u16, payload: &'a [u8]) -> Attr<'a> {
        Attr { ty, payload }
    }

    /// The attribute type.
    #[must_use]
    pub fn ty(&self) -> u16 {
        self.ty
    }

    /// The payload, without padding.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// The payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for a flag attribute (empty payload).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The payload as an array of exactly `N` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::PayloadLength`] if the payload is not `N` bytes long.
    pub fn get_array<const N: usize>(&self) -> Result<[u8; N], AttrError> {
        self.payload.try_into().map_err(|_| AttrError::PayloadLength {
            ty: self.ty,
            expected: N,
            actual: self.payload.len(),
        })
    }

    /// # Errors
    ///
    /// Returns [`AttrError::PayloadLength`] unless the payload is 1 byte.
    pub fn get_u8(&self) -> Result<u8, AttrError> {
        Ok(self.get_array::<1>()?[0])
    }

    /// # Errors
    ///
    /// Returns [`AttrError::PayloadLength`] unless the payload is 2 bytes.
    pub fn get_be16(&self) -> Result<u16, AttrError> {
        self.get_array().map(u16::from_be_bytes)
    }

    /// # Errors
    ///
    /// Returns [`AttrError::PayloadLength`] unless the payload is 4 bytes.
    pub fn get_be32(&self) -> Result<u32, AttrError> {
        self.get_array().map(u32::from_be_bytes)
    }

    /// # Errors
    ///
    /// Returns [`AttrError::PayloadLength`] unless the payload is 8 bytes.
    pub fn get_be64(&self) -> Result<u64, AttrError> {
        self.get_array().map(u64::from_be_bytes)
    }

    /// Iterate over the attributes nested in the payload.
    #[must_use]
    pub fn nested(&self) -> Attrs<'a> {
        Attrs::new(self.payload)
    }
}

/// Iterator over a sequence of attributes.
///
/// Iteration stops at the first malformed header, which is yielded as an error.  After that,
/// [`Attrs::left`] tells how many bytes were not consumed.
#[derive(Debug, Clone)]
pub struct Attrs<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Attrs<'a> {
    /// Iterate over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Attrs<'a> {
        Attrs {
            data,
            pos: 0,
            done: false,
        }
    }

    /// Bytes not consumed by well formed attributes so far.
    #[must_use]
    pub fn left(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The unconsumed bytes.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl<'a> Iterator for Attrs<'a> {
    type Item = Result<Attr<'a>, AttrError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let avail = self.left();
        if avail == 0 {
            self.done = true;
            return None;
        }
        let rest = self.rest();
        let Some(&[l0, l1, t0, t1]) = rest.first_chunk::<HDRLEN>() else {
            self.done = true;
            return Some(Err(AttrError::Truncated(avail)));
        };
        let len = usize::from(u16::from_ne_bytes([l0, l1]));
        let ty = u16::from_ne_bytes([t0, t1]);
        if len < HDRLEN || len > avail {
            self.done = true;
            return Some(Err(AttrError::BadLength { ty, len, avail }));
        }
        self.pos += align(len).min(avail);
        Some(Ok(Attr {
            ty,
            payload: &rest[HDRLEN..len],
        }))
    }
}

/// Find the first well formed attribute of type `ty` in `data`.
#[must_use]
pub fn attr_find(data: &[u8], ty: u16) -> Option<Attr<'_>> {
    Attrs::new(data).map_while(Result::ok).find(|a| a.ty() == ty)
}

/// Growable attribute buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttrWriter {
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl AttrWriter {
    /// An unbounded writer.
    #[must_use]
    pub fn new() -> AttrWriter {
        AttrWriter::default()
    }

    /// A writer which refuses to grow beyond `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> AttrWriter {
        AttrWriter {
            buf: Vec::with_capacity(limit),
            limit: Some(limit),
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The written bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Drop everything written after offset `len`.
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    fn room(&self, needed: usize) -> Result<(), AttrError> {
        match self.limit {
            Some(limit) if self.buf.len() + needed > limit => {
                Err(AttrError::InsufficientSpace { needed, limit })
            }
            _ => Ok(()),
        }
    }

    fn header(&mut self, ty: u16, len: usize) -> Result<(), AttrError> {
        let total = u16::try_from(HDRLEN + len).map_err(|_| AttrError::InsufficientSpace {
            needed: HDRLEN + len,
            limit: usize::from(u16::MAX),
        })?;
        self.buf.extend_from_slice(&total.to_ne_bytes());
        self.buf.extend_from_slice(&ty.to_ne_bytes());
        Ok(())
    }

    fn pad(&mut self) {
        self.buf.resize(align(self.buf.len()), 0);
    }

    /// Append an attribute with `len` zero bytes of payload and return the payload for filling.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_unspec_zero(&mut self, ty: u16, len: usize) -> Result<&mut [u8], AttrError> {
        self.room(align(HDRLEN + len))?;
        self.header(ty, len)?;
        let start = self.buf.len();
        self.buf.resize(start + len, 0);
        self.pad();
        Ok(&mut self.buf[start..start + len])
    }

    /// Append an attribute with an opaque payload.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_unspec(&mut self, ty: u16, payload: &[u8]) -> Result<(), AttrError> {
        self.put_unspec_zero(ty, payload.len())?
            .copy_from_slice(payload);
        Ok(())
    }

    /// Append a flag (an attribute without payload).
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_flag(&mut self, ty: u16) -> Result<(), AttrError> {
        self.put_unspec(ty, &[])
    }

    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_u8(&mut self, ty: u16, value: u8) -> Result<(), AttrError> {
        self.put_unspec(ty, &[value])
    }

    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_be16(&mut self, ty: u16, value: u16) -> Result<(), AttrError> {
        self.put_unspec(ty, &value.to_be_bytes())
    }

    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_be32(&mut self, ty: u16, value: u32) -> Result<(), AttrError> {
        self.put_unspec(ty, &value.to_be_bytes())
    }

    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the attribute does not fit.
    pub fn put_be64(&mut self, ty: u16, value: u64) -> Result<(), AttrError> {
        self.put_unspec(ty, &value.to_be_bytes())
    }

    /// Open a nested attribute.  Pass the returned offset to [`AttrWriter::end_nested`] once the
    /// inner attributes are written.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the header does not fit.
    pub fn start_nested(&mut self, ty: u16) -> Result<usize, AttrError> {
        self.room(HDRLEN)?;
        let offset = self.buf.len();
        self.header(ty, 0)?;
        Ok(offset)
    }

    /// Close the nested attribute opened at `offset`, patching its length.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::InsufficientSpace`] if the nest grew beyond what a header can
    /// describe.
    pub fn end_nested(&mut self, offset: usize) -> Result<(), AttrError> {
        let needed = self.buf.len() - offset;
        let len = u16::try_from(needed).map_err(|_| AttrError::InsufficientSpace {
            needed,
            limit: usize::from(u16::MAX),
        })?;
        self.buf[offset..offset + 2].copy_from_slice(&len.to_ne_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn put_and_walk() {
        let mut w = AttrWriter::new();
        w.put_u8(1, 7).unwrap();
        w.put_be16(2, 0x1234).unwrap();
        w.put_flag(3).unwrap();
        w.put_be64(4, 42).unwrap();
        assert_eq!(w.len(), 8 + 8 + 4 + 12);

        let attrs: Vec<_> = Attrs::new(w.as_bytes()).map(Result::unwrap).collect();
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs[0].get_u8().unwrap(), 7);
        assert_eq!(attrs[1].get_be16().unwrap(), 0x1234);
        assert!(attrs[2].is_empty());
        assert_eq!(attrs[3].get_be64().unwrap(), 42);
        assert_eq!(
            attrs[1].get_be32(),
            Err(AttrError::PayloadLength {
                ty: 2,
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn nested_length_is_backpatched() {
        let mut w = AttrWriter::new();
        let nest = w.start_nested(9).unwrap();
        w.put_be32(1, 1).unwrap();
        w.put_u8(2, 2).unwrap();
        w.end_nested(nest).unwrap();
        w.put_be16(3, 3).unwrap();

        let outer: Vec<_> = Attrs::new(w.as_bytes()).map(Result::unwrap).collect();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[0].ty(), 9);
        assert_eq!(outer[0].len(), 16);
        let inner: Vec<u16> = outer[0].nested().map(|a| a.unwrap().ty()).collect();
        assert_eq!(inner, vec![1, 2]);
        assert_eq!(attr_find(w.as_bytes(), 3).unwrap().get_be16().unwrap(), 3);
        assert!(attr_find(w.as_bytes(), 1).is_none());
    }

    #[test]
    fn malformed_headers_stop_iteration() {
        let mut w = AttrWriter::new();
        w.put_be32(1, 1).unwrap();
        let mut bytes = w.into_bytes();
        bytes.extend_from_slice(&[1, 0]);
        let mut attrs = Attrs::new(&bytes);
        assert!(attrs.next().unwrap().is_ok());
        assert_eq!(attrs.next(), Some(Err(AttrError::Truncated(2))));
        assert_eq!(attrs.next(), None);
        assert_eq!(attrs.left(), 2);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&40u16.to_ne_bytes());
        bytes.extend_from_slice(&5u16.to_ne_bytes());
        let mut attrs = Attrs::new(&bytes);
        assert_eq!(
            attrs.next(),
            Some(Err(AttrError::BadLength {
                ty: 5,
                len: 40,
                avail: 4
            }))
        );
        assert_eq!(attrs.left(), 4);
    }

    #[test]
    fn limit_is_enforced() {
        let mut w = AttrWriter::with_limit(12);
        w.put_be32(1, 1).unwrap();
        assert_eq!(
            w.put_be32(2, 2),
            Err(AttrError::InsufficientSpace {
                needed: 8,
                limit: 12
            })
        );
        assert_eq!(w.len(), 8);
        w.put_flag(3).unwrap();
        assert!(w.put_flag(4).is_err());
    }

    #[test]
    fn walking_arbitrary_bytes_never_panics() {
        bolero::check!().with_type::<Vec<u8>>().for_each(|bytes| {
            let mut attrs = Attrs::new(bytes);
            let consumed: usize = attrs
                .by_ref()
                .map_while(Result::ok)
                .map(|a| a.len())
                .sum();
            assert!(consumed <= bytes.len());
            assert!(attrs.left() <= bytes.len());
        });
    }
}
