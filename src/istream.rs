//! The decoding cursor.
//!
//! [`InputStream`] mirrors [`OutputStream`](crate::OutputStream): header and
//! scalar readers accept every size class of their kind, not only the
//! shortest one a writer would pick. A header or scalar read that fails
//! leaves the cursor where it was; after any other failed read the stream
//! should be discarded.

use crate::buffer::Number;
use crate::registry::TypeTag;
use crate::typecode::{self, Category, *};
use crate::{ByteOrder, Context, Decoder, EncoderError, InBuffer, OutputStream, Result};
use bytes::Bytes;
use std::any::{type_name, Any};
use std::sync::Arc;

/// A shared object decoded earlier in the stream, indexed by serial number.
struct SharedSlot {
    tag: TypeTag,
    // `None` while the object's own body is being decoded.
    object: Option<Box<dyn Any + Send + Sync>>,
}

/// Stream that decodes values from a byte buffer.
///
/// ```rust
/// use bstream::InputStream;
///
/// let mut is = InputStream::from_slice(&[0x01, 0xa2, b'h', b'i']);
/// assert_eq!(is.read::<u8>(), 1);
/// assert_eq!(is.read_as::<String>().unwrap(), "hi");
/// assert_eq!(is.remaining(), 0);
/// ```
pub struct InputStream {
    buf: InBuffer,
    context: Arc<Context>,
    shared: Option<Vec<SharedSlot>>,
}

impl InputStream {
    /// Reads `bytes` with the shared default context.
    pub fn new(bytes: Bytes) -> Self {
        Self::with_context(bytes, Context::shared_default())
    }

    pub fn with_context(bytes: Bytes, context: Arc<Context>) -> Self {
        let shared = context.dedup_enabled().then(Vec::new);
        Self {
            buf: InBuffer::new(bytes),
            context,
            shared,
        }
    }

    /// Copies `bytes` and reads them with the shared default context.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.context.byte_order()
    }

    pub fn position(&self) -> usize {
        self.buf.position()
    }

    /// Repositions the cursor.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `pos` is past the end of the buffer.
    pub fn set_position(&mut self, pos: usize) -> Result<&mut Self> {
        self.buf.set_position(pos)?;
        Ok(self)
    }

    /// Moves the cursor to the start and forgets decoded shared objects.
    pub fn rewind(&mut self) -> &mut Self {
        self.buf.rewind();
        if let Some(table) = self.shared.as_mut() {
            table.clear();
        }
        self
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Gives back the underlying bytes, leaving the stream empty.
    pub fn release(&mut self) -> Bytes {
        if let Some(table) = self.shared.as_mut() {
            table.clear();
        }
        self.buf.release()
    }

    pub fn hex_dump(&self) -> String {
        crate::dump::hex_dump(self.buf.as_slice())
    }

    fn rollback_on_err<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.buf.position();
        let result = read(self);
        if result.is_err() {
            // `start` was a valid position a moment ago.
            let _ = self.buf.set_position(start);
        }
        result
    }

    // --- raw input ---

    /// The next byte, without consuming it.
    pub fn peek(&self) -> Result<u8> {
        self.buf.peek_u8()
    }

    /// The type code of the next value, without consuming it.
    pub fn peek_typecode(&self) -> Result<u8> {
        self.buf.peek_u8()
    }

    pub fn read_typecode(&mut self) -> Result<u8> {
        self.buf.get_u8()
    }

    /// Consumes a fixed-width number in the context's byte order.
    #[inline]
    pub fn get_num<N: Number>(&mut self) -> Result<N> {
        let order = self.byte_order();
        self.buf.get_num(order)
    }

    /// Consumes `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> Result<Bytes> {
        self.buf.get_bytes(len)
    }

    // Reads the length that follows a sized code: u8, u16 or u32 wide.
    fn read_len(&mut self, width: usize) -> Result<usize> {
        Ok(match width {
            1 => self.get_num::<u8>()? as usize,
            2 => self.get_num::<u16>()? as usize,
            _ => self.get_num::<u32>()? as usize,
        })
    }

    // --- headers ---

    /// Reads a map header and returns the number of key/value pairs.
    pub fn read_map_header(&mut self) -> Result<usize> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match code {
                FIXMAP_MIN..=FIXMAP_MAX => Ok((code & 0x0f) as usize),
                MAP_16 => is.read_len(2),
                MAP_32 => is.read_len(4),
                _ => Err(EncoderError::unexpected("map", code)),
            }
        })
    }

    /// Reads an array header and returns the element count.
    pub fn read_array_header(&mut self) -> Result<usize> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match code {
                FIXARRAY_MIN..=FIXARRAY_MAX => Ok((code & 0x0f) as usize),
                ARRAY_16 => is.read_len(2),
                ARRAY_32 => is.read_len(4),
                _ => Err(EncoderError::unexpected("array", code)),
            }
        })
    }

    /// Reads an array header that must announce exactly `expected` elements.
    ///
    /// # Errors
    /// Returns `CountMismatch` carrying both counts when they differ.
    pub fn check_array_header(&mut self, expected: usize) -> Result<()> {
        self.rollback_on_err(|is| {
            let actual = is.read_array_header()?;
            if actual != expected {
                return Err(EncoderError::CountMismatch { expected, actual });
            }
            Ok(())
        })
    }

    /// Reads a map header that must announce exactly `expected` pairs.
    pub fn check_map_header(&mut self, expected: usize) -> Result<()> {
        self.rollback_on_err(|is| {
            let actual = is.read_map_header()?;
            if actual != expected {
                return Err(EncoderError::CountMismatch { expected, actual });
            }
            Ok(())
        })
    }

    /// Reads a binary blob header and returns the body length.
    pub fn read_blob_header(&mut self) -> Result<usize> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match code {
                BIN_8 => is.read_len(1),
                BIN_16 => is.read_len(2),
                BIN_32 => is.read_len(4),
                _ => Err(EncoderError::unexpected("binary", code)),
            }
        })
    }

    /// Reads a whole binary blob, sharing storage with the input buffer.
    pub fn read_blob(&mut self) -> Result<Bytes> {
        self.rollback_on_err(|is| {
            let len = is.read_blob_header()?;
            is.buf.get_bytes(len)
        })
    }

    /// Reads a string header and returns the byte length of the UTF-8 body.
    pub fn read_str_header(&mut self) -> Result<usize> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match code {
                FIXSTR_MIN..=FIXSTR_MAX => Ok((code & 0x1f) as usize),
                STR_8 => is.read_len(1),
                STR_16 => is.read_len(2),
                STR_32 => is.read_len(4),
                _ => Err(EncoderError::unexpected("string", code)),
            }
        })
    }

    /// Reads a UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        self.rollback_on_err(|is| {
            let len = is.read_str_header()?;
            let bytes = is.buf.get_slice(len)?;
            std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| EncoderError::Type(format!("Invalid UTF-8 in string: {}", e)))
        })
    }

    /// Reads an extension header and returns `(subtype, payload length)`.
    pub fn read_ext_header(&mut self) -> Result<(i8, usize)> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            let len = match code {
                FIXEXT_1 => 1,
                FIXEXT_2 => 2,
                FIXEXT_4 => 4,
                FIXEXT_8 => 8,
                FIXEXT_16 => 16,
                EXT_8 => is.read_len(1)?,
                EXT_16 => is.read_len(2)?,
                EXT_32 => is.read_len(4)?,
                _ => return Err(EncoderError::unexpected("extension", code)),
            };
            let subtype = is.get_num::<i8>()?;
            Ok((subtype, len))
        })
    }

    /// Reads a whole extension value as `(subtype, payload)`.
    pub fn read_ext(&mut self) -> Result<(i8, Bytes)> {
        self.rollback_on_err(|is| {
            let (subtype, len) = is.read_ext_header()?;
            Ok((subtype, is.buf.get_bytes(len)?))
        })
    }

    // --- scalars ---

    pub fn read_nil(&mut self) -> Result<()> {
        let code = self.peek_typecode()?;
        if code != NIL {
            return Err(EncoderError::unexpected("nil", code));
        }
        self.buf.advance(1)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let code = self.peek_typecode()?;
        let value = match code {
            BOOL_TRUE => true,
            BOOL_FALSE => false,
            _ => return Err(EncoderError::unexpected("bool", code)),
        };
        self.buf.advance(1)?;
        Ok(value)
    }

    fn read_int_body(&mut self, code: u8) -> Result<i64> {
        Ok(match code {
            INT_8 => self.get_num::<i8>()? as i64,
            INT_16 => self.get_num::<i16>()? as i64,
            INT_32 => self.get_num::<i32>()? as i64,
            _ => self.get_num::<i64>()?,
        })
    }

    fn read_uint_body(&mut self, code: u8) -> Result<u64> {
        Ok(match code {
            UINT_8 => self.get_num::<u8>()? as u64,
            UINT_16 => self.get_num::<u16>()? as u64,
            UINT_32 => self.get_num::<u32>()? as u64,
            _ => self.get_num::<u64>()?,
        })
    }

    /// Reads any integer form holding a non-negative value.
    pub fn read_uint(&mut self) -> Result<u64> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match typecode::category(code) {
                Category::PositiveFixint => Ok(code as u64),
                Category::Uint => is.read_uint_body(code),
                Category::Int => {
                    let value = is.read_int_body(code)?;
                    u64::try_from(value).map_err(|_| {
                        EncoderError::Type(format!("Negative value {} for unsigned integer", value))
                    })
                }
                Category::NegativeFixint => Err(EncoderError::Type(format!(
                    "Negative value {} for unsigned integer",
                    code as i8
                ))),
                _ => Err(EncoderError::unexpected("integer", code)),
            }
        })
    }

    /// Reads any integer form holding a value in `i64` range.
    pub fn read_int(&mut self) -> Result<i64> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match typecode::category(code) {
                Category::PositiveFixint => Ok(code as i64),
                Category::NegativeFixint => Ok(code as i8 as i64),
                Category::Int => is.read_int_body(code),
                Category::Uint => {
                    let value = is.read_uint_body(code)?;
                    i64::try_from(value).map_err(|_| {
                        EncoderError::Type(format!("Value {} out of range for signed integer", value))
                    })
                }
                _ => Err(EncoderError::unexpected("integer", code)),
            }
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match code {
                FLOAT_32 => is.get_num::<f32>(),
                _ => Err(EncoderError::unexpected("float_32", code)),
            }
        })
    }

    /// Reads a float_64, or a float_32 widened without loss.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.rollback_on_err(|is| {
            let code = is.read_typecode()?;
            match code {
                FLOAT_64 => is.get_num::<f64>(),
                FLOAT_32 => Ok(is.get_num::<f32>()? as f64),
                _ => Err(EncoderError::unexpected("float", code)),
            }
        })
    }

    // --- values ---

    /// Decodes a `T` through its [`Decoder`] impl.
    pub fn read_as<T: Decoder>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Decodes a `T`, panicking on failure.
    ///
    /// # Panics
    /// Panics with the error [`read_as`](Self::read_as) would have returned.
    pub fn read<T: Decoder>(&mut self) -> T {
        match T::decode(self) {
            Ok(value) => value,
            Err(err) => panic!("bstream: read of {} failed: {}", type_name::<T>(), err),
        }
    }

    // Reads the `[tag, ...]` framing of a pointer. `None` means the null
    // pointer, whose `nil` has already been consumed.
    fn read_pointer_tag(&mut self) -> Result<Option<TypeTag>> {
        self.check_array_header(2)?;
        let tag = TypeTag::new(self.read_as::<u32>()?);
        if tag.is_valid() {
            Ok(Some(tag))
        } else {
            self.read_nil()?;
            Ok(None)
        }
    }

    /// Reads a shared pointer written by [`OutputStream::write_shared`].
    ///
    /// With dedup enabled, every back-reference to an object yields a clone
    /// of the same `Arc`. An object must be read back through the same
    /// pointer type each time it is referenced.
    ///
    /// # Errors
    /// Returns `UnregisteredType` if no constructor produces a `P` for the
    /// tag, or `Type` for a back-reference that does not resolve.
    pub fn read_shared<P>(&mut self) -> Result<Option<Arc<P>>>
    where
        P: ?Sized + Send + Sync + 'static,
    {
        let Some(tag) = self.read_pointer_tag()? else {
            return Ok(None);
        };
        if self.shared.is_some() && typecode::category(self.peek_typecode()?).is_integer() {
            let serial = self.read_as::<u32>()?;
            return self.resolve_shared(tag, serial).map(Some);
        }
        let slot = self.shared.as_mut().map(|table| {
            table.push(SharedSlot { tag, object: None });
            table.len() - 1
        });
        let context = Arc::clone(&self.context);
        let object: Arc<P> = Arc::from(context.registry().construct::<P>(tag, self)?);
        if let (Some(table), Some(slot)) = (self.shared.as_mut(), slot) {
            tracing::trace!(tag = tag.get(), serial = slot, "decoded shared object");
            table[slot].object = Some(Box::new(Arc::clone(&object)));
        }
        Ok(Some(object))
    }

    fn resolve_shared<P>(&self, tag: TypeTag, serial: u32) -> Result<Arc<P>>
    where
        P: ?Sized + Send + Sync + 'static,
    {
        let slot = self
            .shared
            .as_ref()
            .and_then(|table| table.get(serial as usize))
            .ok_or_else(|| {
                EncoderError::Type(format!("Back-reference to unknown shared object #{}", serial))
            })?;
        if slot.tag != tag {
            return Err(EncoderError::Type(format!(
                "Back-reference #{} carries tag {}, object was written with tag {}",
                serial, tag, slot.tag
            )));
        }
        let object = slot.object.as_ref().ok_or_else(|| {
            EncoderError::Type(format!(
                "Back-reference #{} to an object that is still being decoded",
                serial
            ))
        })?;
        tracing::trace!(tag = tag.get(), serial, "resolved shared object");
        (**object)
            .downcast_ref::<Arc<P>>()
            .cloned()
            .ok_or_else(|| {
                EncoderError::Type(format!(
                    "Shared object #{} was not decoded as {}",
                    serial,
                    type_name::<Arc<P>>()
                ))
            })
    }

    /// Reads an owned pointer written by [`OutputStream::write_unique`].
    pub fn read_unique<P>(&mut self) -> Result<Option<Box<P>>>
    where
        P: ?Sized + 'static,
    {
        let Some(tag) = self.read_pointer_tag()? else {
            return Ok(None);
        };
        let context = Arc::clone(&self.context);
        context.registry().construct::<P>(tag, self).map(Some)
    }

    /// Skips over one complete value of any kind.
    ///
    /// Nested containers are walked with an explicit stack of pending
    /// element counts, so nesting depth is bounded by memory, not by the
    /// call stack.
    ///
    /// # Errors
    /// Returns `OutOfRange` if the value is truncated, or `Type` for the unused code.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut pending: Vec<usize> = vec![1];
        while let Some(left) = pending.last_mut() {
            if *left == 0 {
                pending.pop();
                continue;
            }
            *left -= 1;
            let nested = self.skip_header()?;
            if nested > 0 {
                pending.push(nested);
            }
        }
        Ok(())
    }

    /// Steps over one value's header and any scalar body, returning how many
    /// nested values follow it.
    fn skip_header(&mut self) -> Result<usize> {
        let code = self.peek_typecode()?;
        match typecode::category(code) {
            Category::PositiveFixint | Category::NegativeFixint | Category::Nil | Category::Bool => {
                self.buf.advance(1)?
            }
            Category::Uint | Category::Int => {
                let width = 1usize << (code & 0x03);
                self.buf.advance(1 + width)?
            }
            Category::Float32 => self.buf.advance(5)?,
            Category::Float64 => self.buf.advance(9)?,
            Category::Str => {
                let len = self.read_str_header()?;
                self.buf.advance(len)?
            }
            Category::Bin => {
                let len = self.read_blob_header()?;
                self.buf.advance(len)?
            }
            Category::Ext => {
                let (_, len) = self.read_ext_header()?;
                self.buf.advance(len)?
            }
            Category::Array => return self.read_array_header(),
            // Keys and values alike.
            Category::Map => return self.read_map_header().map(|count| count.saturating_mul(2)),
            Category::Unused => return Err(EncoderError::unexpected("a value", code)),
        }
        Ok(0)
    }
}

impl From<OutputStream> for InputStream {
    /// Reads back what `os` wrote, with the same context.
    fn from(os: OutputStream) -> Self {
        let context = Arc::clone(os.context());
        InputStream::with_context(os.into_bytes(), context)
    }
}

impl std::fmt::Debug for InputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("position", &self.buf.position())
            .field("len", &self.buf.len())
            .field("byte_order", &self.byte_order())
            .field("shared_objects", &self.shared.as_ref().map(Vec::len))
            .finish()
    }
}
