//! Built-in encoding rules.
//!
//! - Integers use the shortest integer form; any integer form is accepted on
//!   decode as long as the value fits the target type.
//! - Sequences and sets are `array(count)` of elements.
//! - Maps are `array(count)` of `array(2)[key, value]` pairs.
//! - Tuples are fixed-length arrays; `()` is an empty array.
//! - `Bytes`/`BytesMut` are binary blobs. `Vec<u8>` is an ordinary array;
//!   use [`blob`] with `#[bstream(with = "bstream::core::blob")]` to store it as a blob.
//! - `Duration` is a nanosecond count, `SystemTime` signed nanoseconds since the Unix epoch.
//! - `Arc<P>` and `Box<P>` are polymorphic pointers framed as `[tag, body]`.

use crate::registry::Polymorphic;
use crate::typecode;
use crate::{Decoder, Encoder, EncoderError, InputStream, OutputStream, Result};
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// --- bool ---
impl Encoder for bool {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_bool(*self)?;
        Ok(())
    }
}

impl Decoder for bool {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_bool()
    }
}

// --- Unsigned integer types ---
macro_rules! impl_unsigned {
    ($($ty:ty),*) => {$(
        impl Encoder for $ty {
            #[inline]
            fn encode(&self, os: &mut OutputStream) -> Result<()> {
                os.write_uint(*self as u64)?;
                Ok(())
            }
        }

        impl Decoder for $ty {
            #[inline]
            fn decode(is: &mut InputStream) -> Result<Self> {
                let start = is.position();
                let value = is.read_uint()?;
                <$ty>::try_from(value).map_err(|_| {
                    let _ = is.set_position(start);
                    EncoderError::Type(format!(
                        "Value {} out of range for {}",
                        value,
                        stringify!($ty)
                    ))
                })
            }
        }
    )*};
}

impl_unsigned!(u8, u16, u32, u64, usize);

// --- Signed integer types ---
macro_rules! impl_signed {
    ($($ty:ty),*) => {$(
        impl Encoder for $ty {
            #[inline]
            fn encode(&self, os: &mut OutputStream) -> Result<()> {
                os.write_int(*self as i64)?;
                Ok(())
            }
        }

        impl Decoder for $ty {
            #[inline]
            fn decode(is: &mut InputStream) -> Result<Self> {
                let start = is.position();
                let value = is.read_int()?;
                <$ty>::try_from(value).map_err(|_| {
                    let _ = is.set_position(start);
                    EncoderError::Type(format!(
                        "Value {} out of range for {}",
                        value,
                        stringify!($ty)
                    ))
                })
            }
        }
    )*};
}

impl_signed!(i8, i16, i32, i64, isize);

// --- f32/f64 ---
/// Encodes an `f32` as float_32, bit for bit.
impl Encoder for f32 {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_f32(*self)?;
        Ok(())
    }
}

impl Decoder for f32 {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_f32()
    }
}

/// Encodes an `f64` as float_64. Decoding also accepts float_32.
impl Encoder for f64 {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_f64(*self)?;
        Ok(())
    }
}

impl Decoder for f64 {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_f64()
    }
}

// --- char ---
/// Encodes a `char` as its scalar value.
impl Encoder for char {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_uint(*self as u64)?;
        Ok(())
    }
}

impl Decoder for char {
    fn decode(is: &mut InputStream) -> Result<Self> {
        let value = u32::decode(is)?;
        char::from_u32(value)
            .ok_or_else(|| EncoderError::Type(format!("Invalid char scalar value {:#x}", value)))
    }
}

// --- String ---
impl Encoder for str {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_str(self)?;
        Ok(())
    }
}

impl Encoder for String {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_str(self)?;
        Ok(())
    }
}

impl Decoder for String {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_str()
    }
}

// --- Blobs ---
impl Encoder for Bytes {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_blob(self)?;
        Ok(())
    }
}

impl Decoder for Bytes {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_blob()
    }
}

impl Encoder for BytesMut {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_blob(self)?;
        Ok(())
    }
}

impl Decoder for BytesMut {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_blob().map(|bytes| BytesMut::from(&bytes[..]))
    }
}

/// Field rule storing a `Vec<u8>` as a binary blob rather than an array of integers.
///
/// ```rust
/// use bstream::{Decode, Encode};
///
/// #[derive(Encode, Decode)]
/// struct Packet {
///     #[bstream(with = "bstream::core::blob")]
///     payload: Vec<u8>,
/// }
/// ```
pub mod blob {
    use crate::{InputStream, OutputStream, Result};

    pub fn encode(value: &[u8], os: &mut OutputStream) -> Result<()> {
        os.write_blob(value)?;
        Ok(())
    }

    pub fn decode(is: &mut InputStream) -> Result<Vec<u8>> {
        is.read_blob().map(|bytes| bytes.to_vec())
    }
}

// --- Option ---
/// `None` is written by `T::encode_none`: `nil` for plain values, the
/// null-pointer shape for pointers. A nested `Some(inner)` is framed as
/// `array(1)[inner]` so that `Some(None)` does not collapse into `None`.
impl<T: Encoder> Encoder for Option<T> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        match self {
            Some(value) => value.encode_some(os),
            None => T::encode_none(os),
        }
    }

    fn encode_some(&self, os: &mut OutputStream) -> Result<()> {
        os.write_array_header(1)?;
        self.encode(os)
    }
}

impl<T: Decoder> Decoder for Option<T> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        T::decode_option(is)
    }

    fn decode_option(is: &mut InputStream) -> Result<Option<Self>> {
        if is.peek_typecode()? == typecode::NIL {
            is.read_nil()?;
            return Ok(None);
        }
        is.check_array_header(1)?;
        Self::decode(is).map(Some)
    }
}

// --- Sequences ---

/// Writes `array(len)` followed by every item in iteration order.
pub fn encode_seq<'a, T, I>(len: usize, items: I, os: &mut OutputStream) -> Result<()>
where
    T: Encoder + 'a,
    I: IntoIterator<Item = &'a T>,
{
    os.write_array_header(len)?;
    for item in items {
        item.encode(os)?;
    }
    Ok(())
}

/// Reads `array(n)` and collects `n` decoded items.
pub fn decode_seq<T: Decoder, C: FromIterator<T>>(is: &mut InputStream) -> Result<C> {
    let count = is.read_array_header()?;
    (0..count).map(|_| T::decode(is)).collect()
}

/// Writes `array(len)` of `array(2)[key, value]`.
pub fn encode_pairs<'a, K, V, I>(len: usize, pairs: I, os: &mut OutputStream) -> Result<()>
where
    K: Encoder + 'a,
    V: Encoder + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    os.write_array_header(len)?;
    for (key, value) in pairs {
        os.write_array_header(2)?;
        key.encode(os)?;
        value.encode(os)?;
    }
    Ok(())
}

/// Reads what [`encode_pairs`] wrote.
pub fn decode_pairs<K: Decoder, V: Decoder, C: FromIterator<(K, V)>>(
    is: &mut InputStream,
) -> Result<C> {
    let count = is.read_array_header()?;
    (0..count)
        .map(|_| -> Result<(K, V)> {
            is.check_array_header(2)?;
            let key = K::decode(is)?;
            let value = V::decode(is)?;
            Ok((key, value))
        })
        .collect()
}

impl<T: Encoder> Encoder for [T] {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

impl<T: Encoder> Encoder for Vec<T> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

impl<T: Decoder> Decoder for Vec<T> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        let count = is.read_array_header()?;
        // Every element takes at least one byte.
        let mut items = Vec::with_capacity(count.min(is.remaining()));
        for _ in 0..count {
            items.push(T::decode(is)?);
        }
        Ok(items)
    }
}

impl<T: Encoder> Encoder for VecDeque<T> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

impl<T: Decoder> Decoder for VecDeque<T> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        Vec::decode(is).map(VecDeque::from)
    }
}

impl<T: Encoder> Encoder for LinkedList<T> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

impl<T: Decoder> Decoder for LinkedList<T> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_seq::<T, _>(is)
    }
}

// --- Array ---
impl<T: Encoder, const N: usize> Encoder for [T; N] {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(N, self, os)
    }
}

/// Decodes a fixed-size array; the wire count must equal `N`.
impl<T: Decoder, const N: usize> Decoder for [T; N] {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.check_array_header(N)?;
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(is)?);
        }
        items.try_into().map_err(|items: Vec<T>| EncoderError::CountMismatch {
            expected: N,
            actual: items.len(),
        })
    }
}

// --- Sets ---
impl<T: Encoder, S> Encoder for HashSet<T, S> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

impl<T: Decoder + Eq + Hash, S: BuildHasher + Default> Decoder for HashSet<T, S> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_seq::<T, _>(is)
    }
}

impl<T: Encoder> Encoder for BTreeSet<T> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

impl<T: Decoder + Ord> Decoder for BTreeSet<T> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_seq::<T, _>(is)
    }
}

// --- Maps ---
impl<K: Encoder, V: Encoder, S> Encoder for HashMap<K, V, S> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_pairs(self.len(), self, os)
    }
}

impl<K, V, S> Decoder for HashMap<K, V, S>
where
    K: Decoder + Eq + Hash,
    V: Decoder,
    S: BuildHasher + Default,
{
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_pairs::<K, V, _>(is)
    }
}

impl<K: Encoder, V: Encoder> Encoder for BTreeMap<K, V> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_pairs(self.len(), self, os)
    }
}

impl<K: Decoder + Ord, V: Decoder> Decoder for BTreeMap<K, V> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_pairs::<K, V, _>(is)
    }
}

// --- Tuple ---
/// Each tuple is a fixed-length array of its elements in order.
macro_rules! impl_tuple {
    () => {
        impl Encoder for () {
            fn encode(&self, os: &mut OutputStream) -> Result<()> {
                os.write_array_header(0)?;
                Ok(())
            }
        }

        impl Decoder for () {
            fn decode(is: &mut InputStream) -> Result<Self> {
                is.check_array_header(0)
            }
        }
    };
    ($($T:ident : $idx:tt),+) => {
        impl<$($T: Encoder),+> Encoder for ($($T,)+) {
            fn encode(&self, os: &mut OutputStream) -> Result<()> {
                os.write_array_header(count_args!($($T),+))?;
                $(
                    self.$idx.encode(os)?;
                )+
                Ok(())
            }
        }

        impl<$($T: Decoder),+> Decoder for ($($T,)+) {
            fn decode(is: &mut InputStream) -> Result<Self> {
                is.check_array_header(count_args!($($T),+))?;
                Ok(($(
                    $T::decode(is)?,
                )+))
            }
        }
    };
}

macro_rules! count_args {
    () => { 0 };
    ($head:ident $(, $tail:ident)*) => { 1 + count_args!($($tail),*) };
}

impl_tuple!();
impl_tuple!(T0: 0);
impl_tuple!(T0: 0, T1: 1);
impl_tuple!(T0: 0, T1: 1, T2: 2);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9, T10: 10);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9, T10: 10, T11: 11);

// --- Time ---
/// Encodes a `Duration` as whole nanoseconds.
///
/// # Errors
/// Returns `InvalidArgument` for durations longer than `u64::MAX` nanoseconds (about 584 years).
impl Encoder for Duration {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        let nanos = u64::try_from(self.as_nanos()).map_err(|_| {
            EncoderError::InvalidArgument(format!("{:?} does not fit in 64-bit nanoseconds", self))
        })?;
        os.write_uint(nanos)?;
        Ok(())
    }
}

impl Decoder for Duration {
    fn decode(is: &mut InputStream) -> Result<Self> {
        u64::decode(is).map(Duration::from_nanos)
    }
}

/// Encodes a `SystemTime` as signed nanoseconds since the Unix epoch.
impl Encoder for SystemTime {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        let out_of_range =
            || EncoderError::InvalidArgument(format!("{:?} does not fit in 64-bit nanoseconds", self));
        let nanos = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => i128::try_from(after.as_nanos()).map_err(|_| out_of_range())?,
            Err(before) => {
                -i128::try_from(before.duration().as_nanos()).map_err(|_| out_of_range())?
            }
        };
        let nanos = i64::try_from(nanos).map_err(|_| out_of_range())?;
        os.write_int(nanos)?;
        Ok(())
    }
}

impl Decoder for SystemTime {
    fn decode(is: &mut InputStream) -> Result<Self> {
        let nanos = i64::decode(is)?;
        let offset = Duration::from_nanos(nanos.unsigned_abs());
        let time = if nanos >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        time.ok_or_else(|| EncoderError::Type(format!("Timestamp {}ns is out of range", nanos)))
    }
}

// --- Pointers ---
/// A shared polymorphic pointer. See [`OutputStream::write_shared`].
impl<P: ?Sized + Polymorphic> Encoder for Arc<P> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_shared(Some(self))?;
        Ok(())
    }

    fn encode_none(os: &mut OutputStream) -> Result<()> {
        os.write_null_ptr()?;
        Ok(())
    }
}

impl<P: ?Sized + Send + Sync + 'static> Decoder for Arc<P> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_shared()?
            .ok_or_else(|| EncoderError::Type("Null pointer for non-optional Arc".to_string()))
    }

    fn decode_option(is: &mut InputStream) -> Result<Option<Self>> {
        is.read_shared()
    }
}

/// An owned polymorphic pointer. See [`OutputStream::write_unique`].
impl<P: ?Sized + Polymorphic> Encoder for Box<P> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        let value: &P = self;
        os.write_unique(Some(value))?;
        Ok(())
    }

    fn encode_none(os: &mut OutputStream) -> Result<()> {
        os.write_null_ptr()?;
        Ok(())
    }
}

impl<P: ?Sized + 'static> Decoder for Box<P> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_unique()?
            .ok_or_else(|| EncoderError::Type("Null pointer for non-optional Box".to_string()))
    }

    fn decode_option(is: &mut InputStream) -> Result<Option<Self>> {
        is.read_unique()
    }
}

// --- &T ---
/// Encodes a reference by encoding the referenced value.
impl<T: Encoder + ?Sized> Encoder for &T {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        (**self).encode(os)
    }

    fn encode_some(&self, os: &mut OutputStream) -> Result<()> {
        (**self).encode_some(os)
    }
}
