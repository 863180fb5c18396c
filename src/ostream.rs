//! The encoding cursor.
//!
//! An [`OutputStream`] appends encoded values to an [`OutBuffer`]. Header
//! writers always pick the shortest form that can hold their argument.
//! Values go through [`Encoder`], so new types plug in with an impl and never
//! need changes here.

use crate::buffer::Number;
use crate::registry::{ObjectId, Polymorphic, TypeTag, INVALID_TAG};
use crate::typecode::{self, *};
use crate::{ByteOrder, Context, Encoder, EncoderError, OutBuffer, Result};
use bytes::Bytes;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Identities of shared objects already written to a stream.
#[derive(Default)]
struct DedupTable {
    saved: HashMap<ObjectId, (TypeTag, u32)>,
    // Indexed by serial.
    written: Vec<SavedObject>,
}

struct SavedObject {
    id: ObjectId,
    start: usize,
    // Keeps the identity from being reused while the table refers to it.
    _handle: Box<dyn Any + Send + Sync>,
}

impl DedupTable {
    fn clear(&mut self) {
        self.saved.clear();
        self.written.clear();
    }

    /// Forgets every object whose framing starts at or after `pos`.
    fn truncate(&mut self, pos: usize) {
        while let Some(last) = self.written.last() {
            if last.start < pos {
                break;
            }
            self.saved.remove(&last.id);
            self.written.pop();
        }
    }
}

enum Sighting {
    Untracked,
    Seen(TypeTag, u32),
    First,
}

/// Stream that encodes values into a byte buffer.
///
/// ```rust
/// use bstream::OutputStream;
///
/// let mut os = OutputStream::new();
/// os.write(&1u8).write(&"hi");
/// os.write_array_header(2).unwrap();
/// assert_eq!(os.as_slice(), &[0x01, 0xa2, b'h', b'i', 0x92]);
/// ```
pub struct OutputStream {
    buf: OutBuffer,
    context: Arc<Context>,
    dedup: Option<DedupTable>,
}

impl OutputStream {
    /// Growable stream using the shared default context.
    pub fn new() -> Self {
        Self::with_context(Context::shared_default())
    }

    pub fn with_context(context: Arc<Context>) -> Self {
        Self::with_buffer(OutBuffer::new(), context)
    }

    /// Writes into `buf`, which may be bounded (see [`OutBuffer::fixed`]).
    pub fn with_buffer(buf: OutBuffer, context: Arc<Context>) -> Self {
        let dedup = context.dedup_enabled().then(DedupTable::default);
        Self {
            buf,
            context,
            dedup,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.context.byte_order()
    }

    pub fn is_dedup_enabled(&self) -> bool {
        self.dedup.is_some()
    }

    // --- cursor and buffer hand-off ---

    /// Current write position, equal to the number of bytes written.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Moves the write position back, discarding everything after `pos`.
    ///
    /// Shared objects whose framing started at or after `pos` are forgotten,
    /// so writing one again emits its body rather than a back-reference.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `pos` is past the end of the written data.
    pub fn set_position(&mut self, pos: usize) -> Result<&mut Self> {
        self.buf.set_position(pos)?;
        if let Some(table) = self.dedup.as_mut() {
            table.truncate(pos);
        }
        Ok(self)
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Empties the buffer and forgets every shared object written so far.
    pub fn clear(&mut self) -> &mut Self {
        self.buf.clear();
        if let Some(table) = self.dedup.as_mut() {
            table.clear();
        }
        self
    }

    /// Hands off the encoded bytes and resets the stream for reuse.
    pub fn take_bytes(&mut self) -> Bytes {
        if let Some(table) = self.dedup.as_mut() {
            table.clear();
        }
        self.buf.take()
    }

    pub fn into_bytes(mut self) -> Bytes {
        self.take_bytes()
    }

    pub fn hex_dump(&self) -> String {
        crate::dump::hex_dump(self.buf.as_slice())
    }

    // --- raw output ---

    // Fails up front when a bounded buffer cannot take `needed` more bytes,
    // so a header is either written whole or not at all.
    fn reserve(&self, needed: usize) -> Result<()> {
        let remaining = self.buf.remaining();
        if !self.buf.is_expandable() && needed > remaining {
            return Err(EncoderError::Overflow { needed, remaining });
        }
        Ok(())
    }

    /// Appends a fixed-width number in the context's byte order.
    #[inline]
    pub fn put_num<N: Number>(&mut self, value: N) -> Result<&mut Self> {
        let order = self.byte_order();
        self.buf.put_num(value, order)?;
        Ok(self)
    }

    /// Appends pre-encoded bytes verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.buf.put_slice(bytes)?;
        Ok(self)
    }

    // Writes `code` followed by `len` in the smallest of the three width
    // classes: u8 when `code8` is given, then u16, then u32.
    fn write_sized_code(
        &mut self,
        len: usize,
        code8: Option<u8>,
        code16: u8,
        code32: u8,
    ) -> Result<&mut Self> {
        match code8 {
            Some(code) if len <= u8::MAX as usize => {
                self.reserve(2)?;
                self.buf.put_u8(code)?;
                self.buf.put_u8(len as u8)?;
            }
            _ if len <= u16::MAX as usize => {
                self.reserve(3)?;
                self.buf.put_u8(code16)?;
                self.put_num(len as u16)?;
            }
            _ if len <= u32::MAX as usize => {
                self.reserve(5)?;
                self.buf.put_u8(code32)?;
                self.put_num(len as u32)?;
            }
            _ => {
                return Err(EncoderError::InvalidArgument(format!(
                    "length {} exceeds the 32-bit limit",
                    len
                )))
            }
        }
        Ok(self)
    }

    // --- headers ---

    /// Writes a map header for `count` key/value pairs.
    pub fn write_map_header(&mut self, count: usize) -> Result<&mut Self> {
        if count <= FIX_CONTAINER_MAX {
            self.buf.put_u8(FIXMAP_MIN | count as u8)?;
            Ok(self)
        } else {
            self.write_sized_code(count, None, MAP_16, MAP_32)
        }
    }

    /// Writes an array header for `count` elements.
    pub fn write_array_header(&mut self, count: usize) -> Result<&mut Self> {
        if count <= FIX_CONTAINER_MAX {
            self.buf.put_u8(FIXARRAY_MIN | count as u8)?;
            Ok(self)
        } else {
            self.write_sized_code(count, None, ARRAY_16, ARRAY_32)
        }
    }

    /// Frames an aggregate of `field_count` fields. Same bytes as an array header.
    pub fn write_object_header(&mut self, field_count: usize) -> Result<&mut Self> {
        self.write_array_header(field_count)
    }

    /// Writes a binary blob header; the `len` body bytes must follow.
    pub fn write_blob_header(&mut self, len: usize) -> Result<&mut Self> {
        self.write_sized_code(len, Some(BIN_8), BIN_16, BIN_32)
    }

    pub fn write_blob_body(&mut self, body: &[u8]) -> Result<&mut Self> {
        self.write_raw(body)
    }

    /// Writes a complete binary blob.
    pub fn write_blob(&mut self, body: &[u8]) -> Result<&mut Self> {
        self.reserve(typecode::blob_header_size(body.len()) + body.len())?;
        self.write_blob_header(body.len())?;
        self.write_blob_body(body)
    }

    /// Writes a UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<&mut Self> {
        let len = value.len();
        self.reserve(typecode::str_header_size(len) + len)?;
        if len <= FIXSTR_LEN_MAX {
            self.buf.put_u8(FIXSTR_MIN | len as u8)?;
        } else {
            self.write_sized_code(len, Some(STR_8), STR_16, STR_32)?;
        }
        self.write_raw(value.as_bytes())
    }

    /// Writes an extension header for a `len` byte payload of application type `subtype`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `len` does not fit in 32 bits.
    pub fn write_ext_header(&mut self, subtype: i8, len: usize) -> Result<&mut Self> {
        if let Some(code) = typecode::fixext_code(len) {
            self.reserve(2)?;
            self.buf.put_u8(code)?;
        } else {
            if len > u32::MAX as usize {
                return Err(EncoderError::InvalidArgument(format!(
                    "extension payload of {} bytes exceeds the 32-bit limit",
                    len
                )));
            }
            self.reserve(typecode::ext_header_size(len))?;
            self.write_sized_code(len, Some(EXT_8), EXT_16, EXT_32)?;
        }
        self.put_num(subtype)
    }

    /// Writes a complete extension value.
    pub fn write_ext(&mut self, subtype: i8, payload: &[u8]) -> Result<&mut Self> {
        if payload.len() <= u32::MAX as usize {
            self.reserve(typecode::ext_header_size(payload.len()) + payload.len())?;
        }
        self.write_ext_header(subtype, payload.len())?;
        self.write_raw(payload)
    }

    // --- scalars ---

    pub fn write_nil(&mut self) -> Result<&mut Self> {
        self.buf.put_u8(NIL)?;
        Ok(self)
    }

    /// Writes the absent-pointer shape `[INVALID_TAG, nil]`.
    pub fn write_null_ptr(&mut self) -> Result<&mut Self> {
        self.reserve(3)?;
        self.write_array_header(2)?;
        self.write_uint(INVALID_TAG.get() as u64)?;
        self.write_nil()
    }

    pub fn write_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.buf
            .put_u8(if value { BOOL_TRUE } else { BOOL_FALSE })?;
        Ok(self)
    }

    /// Writes an unsigned integer in its shortest form.
    pub fn write_uint(&mut self, value: u64) -> Result<&mut Self> {
        self.reserve(typecode::uint_size(value))?;
        if value <= POSITIVE_FIXINT_MAX as u64 {
            self.buf.put_u8(value as u8)?;
        } else if value <= u8::MAX as u64 {
            self.buf.put_u8(UINT_8)?;
            self.buf.put_u8(value as u8)?;
        } else if value <= u16::MAX as u64 {
            self.buf.put_u8(UINT_16)?;
            self.put_num(value as u16)?;
        } else if value <= u32::MAX as u64 {
            self.buf.put_u8(UINT_32)?;
            self.put_num(value as u32)?;
        } else {
            self.buf.put_u8(UINT_64)?;
            self.put_num(value)?;
        }
        Ok(self)
    }

    /// Writes a signed integer in its shortest form.
    ///
    /// Non-negative values use the unsigned codes; -32..=-1 fit in a single
    /// negative fixint byte.
    pub fn write_int(&mut self, value: i64) -> Result<&mut Self> {
        if value >= 0 {
            return self.write_uint(value as u64);
        }
        self.reserve(typecode::int_size(value))?;
        if value >= NEGATIVE_FIXINT_FLOOR {
            self.buf.put_u8(value as i8 as u8)?;
        } else if value >= i8::MIN as i64 {
            self.buf.put_u8(INT_8)?;
            self.put_num(value as i8)?;
        } else if value >= i16::MIN as i64 {
            self.buf.put_u8(INT_16)?;
            self.put_num(value as i16)?;
        } else if value >= i32::MIN as i64 {
            self.buf.put_u8(INT_32)?;
            self.put_num(value as i32)?;
        } else {
            self.buf.put_u8(INT_64)?;
            self.put_num(value)?;
        }
        Ok(self)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<&mut Self> {
        self.reserve(5)?;
        self.buf.put_u8(FLOAT_32)?;
        self.put_num(value)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<&mut Self> {
        self.reserve(9)?;
        self.buf.put_u8(FLOAT_64)?;
        self.put_num(value)
    }

    // --- values ---

    /// Encodes `value` through its [`Encoder`] impl.
    pub fn try_write<T: Encoder + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        value.encode(self)?;
        Ok(self)
    }

    /// Encodes `value`, panicking on failure.
    ///
    /// # Panics
    /// Panics with the error [`try_write`](Self::try_write) would have returned.
    pub fn write<T: Encoder + ?Sized>(&mut self, value: &T) -> &mut Self {
        if let Err(err) = value.encode(self) {
            panic!("bstream: write failed: {}", err);
        }
        self
    }

    /// Writes a shared pointer as `[tag, body]`, or `[INVALID_TAG, nil]` for `None`.
    ///
    /// With dedup enabled, a pointer whose object was already written is
    /// emitted as `[tag, serial]` instead, where `serial` counts distinct
    /// shared objects in the order they were first written.
    ///
    /// # Errors
    /// Returns `UnregisteredType` if the object's concrete type has no tag.
    /// With dedup enabled, returns `InvalidArgument` if the body would start
    /// with an integer, which readers could not tell from a back-reference.
    pub fn write_shared<P>(&mut self, ptr: Option<&Arc<P>>) -> Result<&mut Self>
    where
        P: ?Sized + Polymorphic,
    {
        let Some(ptr) = ptr else {
            return self.write_null_ptr();
        };
        // Dispatch on the pointee; `Arc<P>` is itself an encoder.
        let value: &P = ptr;
        let tag = self.context.registry().tag_of(value)?;
        let id = ObjectId::of(ptr);
        let sighting = match &self.dedup {
            None => Sighting::Untracked,
            Some(table) => match table.saved.get(&id) {
                Some(&(saved_tag, serial)) => Sighting::Seen(saved_tag, serial),
                None => Sighting::First,
            },
        };
        match sighting {
            Sighting::Untracked => self.write_tagged_body(tag, value),
            Sighting::Seen(saved_tag, serial) => {
                tracing::trace!(tag = saved_tag.get(), serial, "shared object back-reference");
                self.write_array_header(2)?;
                self.write_uint(saved_tag.get() as u64)?;
                self.write_uint(serial as u64)
            }
            Sighting::First => {
                let start = self.position();
                if let Some(table) = self.dedup.as_mut() {
                    let serial = table.written.len() as u32;
                    table.saved.insert(id, (tag, serial));
                    table.written.push(SavedObject {
                        id,
                        start,
                        _handle: Box::new(Arc::clone(ptr)),
                    });
                    tracing::trace!(tag = tag.get(), serial, "new shared object");
                }
                self.write_array_header(2)?;
                self.write_uint(tag.get() as u64)?;
                let body_start = self.position();
                value.encode_body(self)?;
                let first = self.as_slice().get(body_start).copied();
                match first {
                    Some(code) if typecode::category(code).is_integer() => {
                        Err(EncoderError::InvalidArgument(format!(
                            "shared {} encodes as an integer, which is ambiguous with a back-reference",
                            value.concrete_type_name()
                        )))
                    }
                    _ => Ok(self),
                }
            }
        }
    }

    /// Writes an exclusively owned pointer as `[tag, body]`, or `[INVALID_TAG, nil]` for `None`.
    ///
    /// Owned objects are never deduplicated.
    ///
    /// # Errors
    /// Returns `UnregisteredType` if the object's concrete type has no tag.
    pub fn write_unique<P>(&mut self, ptr: Option<&P>) -> Result<&mut Self>
    where
        P: ?Sized + Polymorphic,
    {
        match ptr {
            None => self.write_null_ptr(),
            Some(value) => {
                let tag = self.context.registry().tag_of(value)?;
                self.write_tagged_body(tag, value)
            }
        }
    }

    fn write_tagged_body<P: ?Sized + Polymorphic>(
        &mut self,
        tag: TypeTag,
        value: &P,
    ) -> Result<&mut Self> {
        self.write_array_header(2)?;
        self.write_uint(tag.get() as u64)?;
        value.encode_body(self)?;
        Ok(self)
    }
}

impl Default for OutputStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("len", &self.buf.len())
            .field("byte_order", &self.byte_order())
            .field(
                "shared_objects",
                &self.dedup.as_ref().map(|table| table.saved.len()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn headers_pick_the_smallest_class() {
        let mut os = OutputStream::new();
        os.write_array_header(15).unwrap();
        os.write_array_header(16).unwrap();
        os.write_map_header(65536).unwrap();
        assert_eq!(
            os.as_slice(),
            &[0x9f, ARRAY_16, 0x00, 0x10, MAP_32, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn integers_pick_the_smallest_class() {
        let mut os = OutputStream::new();
        os.write_int(-1).unwrap();
        os.write_int(-33).unwrap();
        os.write_int(200).unwrap();
        os.write_uint(256).unwrap();
        assert_eq!(
            os.as_slice(),
            &[0xff, INT_8, 0xdf, UINT_8, 200, UINT_16, 0x01, 0x00]
        );
    }

    #[test]
    fn ext_uses_fixext_for_exact_sizes() {
        let mut os = OutputStream::new();
        os.write_ext(3, &[1, 2, 3, 4]).unwrap();
        os.write_ext(-1, &[9, 9, 9]).unwrap();
        assert_eq!(
            os.as_slice(),
            &[FIXEXT_4, 3, 1, 2, 3, 4, EXT_8, 3, 0xff, 9, 9, 9]
        );
    }

    #[test]
    fn bounded_stream_rejects_partial_headers() {
        let mut os = OutputStream::with_buffer(OutBuffer::fixed(2), Context::shared_default());
        os.write_nil().unwrap();
        let err = os.write_uint(300).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert_eq!(os.len(), 1);
    }

    #[test]
    fn null_pointer_shape() {
        let mut os = OutputStream::new();
        os.write_null_ptr().unwrap();
        assert_eq!(os.as_slice(), &[0x92, 0x00, NIL]);
    }

    #[test]
    fn set_position_truncates() {
        let mut os = OutputStream::new();
        os.write_str("abc").unwrap();
        os.set_position(1).unwrap();
        os.write_bool(true).unwrap();
        assert_eq!(os.as_slice(), &[0xa3, BOOL_TRUE]);
        assert_eq!(os.set_position(5).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
