//! Byte buffers and byte-order-aware primitive packing.
//!
//! [`OutBuffer`] is a write cursor over a `BytesMut` that either grows on
//! demand or refuses to pass a fixed capacity. [`InBuffer`] is a read cursor
//! over an immutable `Bytes`. Multi-byte numbers are laid out in an explicit
//! [`ByteOrder`], never in host order.

use crate::{EncoderError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Byte order of multi-byte integers and floats on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network order, the format default.
    #[default]
    BigEndian,
    LittleEndian,
}

mod sealed {
    pub trait Sealed {}
}

/// Fixed-width numbers that can be packed into a buffer.
///
/// Implemented for the 8/16/32/64-bit integers and the two IEEE-754 widths.
pub trait Number: Copy + sealed::Sealed {
    /// Width on the wire.
    const SIZE: usize;

    #[doc(hidden)]
    fn put_to(self, writer: &mut BytesMut, order: ByteOrder);

    #[doc(hidden)]
    fn get_from(reader: &mut &[u8], order: ByteOrder) -> Self;
}

macro_rules! impl_number {
    ($ty:ty, $size:expr, $put_be:ident, $put_le:ident, $get_be:ident, $get_le:ident) => {
        impl sealed::Sealed for $ty {}
        impl Number for $ty {
            const SIZE: usize = $size;

            #[inline]
            fn put_to(self, writer: &mut BytesMut, order: ByteOrder) {
                match order {
                    ByteOrder::BigEndian => writer.$put_be(self),
                    ByteOrder::LittleEndian => writer.$put_le(self),
                }
            }

            #[inline]
            fn get_from(reader: &mut &[u8], order: ByteOrder) -> Self {
                match order {
                    ByteOrder::BigEndian => reader.$get_be(),
                    ByteOrder::LittleEndian => reader.$get_le(),
                }
            }
        }
    };
}

// Single bytes have no order.
impl sealed::Sealed for u8 {}
impl Number for u8 {
    const SIZE: usize = 1;

    #[inline]
    fn put_to(self, writer: &mut BytesMut, _order: ByteOrder) {
        writer.put_u8(self);
    }

    #[inline]
    fn get_from(reader: &mut &[u8], _order: ByteOrder) -> Self {
        reader.get_u8()
    }
}
impl sealed::Sealed for i8 {}
impl Number for i8 {
    const SIZE: usize = 1;

    #[inline]
    fn put_to(self, writer: &mut BytesMut, _order: ByteOrder) {
        writer.put_i8(self);
    }

    #[inline]
    fn get_from(reader: &mut &[u8], _order: ByteOrder) -> Self {
        reader.get_i8()
    }
}

impl_number!(u16, 2, put_u16, put_u16_le, get_u16, get_u16_le);
impl_number!(i16, 2, put_i16, put_i16_le, get_i16, get_i16_le);
impl_number!(u32, 4, put_u32, put_u32_le, get_u32, get_u32_le);
impl_number!(i32, 4, put_i32, put_i32_le, get_i32, get_i32_le);
impl_number!(u64, 8, put_u64, put_u64_le, get_u64, get_u64_le);
impl_number!(i64, 8, put_i64, put_i64_le, get_i64, get_i64_le);
impl_number!(f32, 4, put_f32, put_f32_le, get_f32, get_f32_le);
impl_number!(f64, 8, put_f64, put_f64_le, get_f64, get_f64_le);

/// Growable or bounded output block.
#[derive(Debug, Default)]
pub struct OutBuffer {
    data: BytesMut,
    limit: Option<usize>,
}

impl OutBuffer {
    /// Creates an empty growable buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a growable buffer with room for `capacity` bytes before it reallocates.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            limit: None,
        }
    }

    /// Creates a buffer that never holds more than `capacity` bytes.
    ///
    /// Writes past the capacity fail with [`EncoderError::Overflow`].
    pub fn fixed(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            limit: Some(capacity),
        }
    }

    /// Resumes writing at the end of existing content. The result is growable.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            data: BytesMut::from(&bytes[..]),
            limit: None,
        }
    }

    pub fn is_expandable(&self) -> bool {
        self.limit.is_none()
    }

    /// Number of bytes written so far; also the write position.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fixed capacity for bounded buffers, current allocation for growable ones.
    pub fn capacity(&self) -> usize {
        self.limit.unwrap_or_else(|| self.data.capacity())
    }

    /// Bytes that can be written before the buffer must grow (or overflows).
    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Moves the write position back to `pos`, dropping everything after it.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `pos` is past the written length.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(EncoderError::InvalidArgument(format!(
                "position {} out of range for buffer of {} bytes",
                pos,
                self.data.len()
            )));
        }
        self.data.truncate(pos);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Hands off the written bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    #[inline]
    fn accommodate(&mut self, needed: usize) -> Result<()> {
        if let Some(limit) = self.limit {
            let remaining = limit.saturating_sub(self.data.len());
            if needed > remaining {
                return Err(EncoderError::Overflow { needed, remaining });
            }
        }
        Ok(())
    }

    #[inline]
    pub fn put_u8(&mut self, byte: u8) -> Result<()> {
        self.accommodate(1)?;
        self.data.put_u8(byte);
        Ok(())
    }

    #[inline]
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.accommodate(bytes.len())?;
        self.data.put_slice(bytes);
        Ok(())
    }

    /// Appends `N::SIZE` bytes of `value` in `order`.
    #[inline]
    pub fn put_num<N: Number>(&mut self, value: N, order: ByteOrder) -> Result<()> {
        self.accommodate(N::SIZE)?;
        value.put_to(&mut self.data, order);
        Ok(())
    }
}

/// Read-only input block with a cursor.
#[derive(Debug, Clone, Default)]
pub struct InBuffer {
    data: Bytes,
    pos: usize,
}

impl InBuffer {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Repositions the cursor.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `pos` is past the end of the buffer.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(EncoderError::InvalidArgument(format!(
                "position {} out of range for buffer of {} bytes",
                pos,
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(EncoderError::OutOfRange { needed, remaining });
        }
        Ok(())
    }

    /// The whole underlying buffer, independent of the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Gives back the underlying bytes, leaving the buffer empty.
    pub fn release(&mut self) -> Bytes {
        self.pos = 0;
        std::mem::take(&mut self.data)
    }

    #[inline]
    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Consumes `N::SIZE` bytes and assembles them in `order`.
    #[inline]
    pub fn get_num<N: Number>(&mut self, order: ByteOrder) -> Result<N> {
        self.ensure(N::SIZE)?;
        let mut src = &self.data[self.pos..self.pos + N::SIZE];
        let value = N::get_from(&mut src, order);
        self.pos += N::SIZE;
        Ok(value)
    }

    /// Consumes `len` bytes, sharing the underlying storage.
    pub fn get_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        let bytes = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(bytes)
    }

    /// Consumes `len` bytes as a borrowed slice.
    pub fn get_slice(&mut self, len: usize) -> Result<&[u8]> {
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..start + len])
    }

    /// Advances the cursor by `len` bytes.
    pub fn advance(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }
}

impl From<OutBuffer> for InBuffer {
    fn from(mut out: OutBuffer) -> Self {
        InBuffer::new(out.take())
    }
}
