#[cfg(feature = "ahash")]
use ahash::{AHashMap, AHashSet};
#[cfg(feature = "chrono")]
use chrono::{DateTime, TimeZone, Utc};
#[cfg(feature = "indexmap")]
use indexmap::{IndexMap, IndexSet};
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "uuid")]
use uuid::Uuid;

#[allow(unused_imports)]
use crate::core::{decode_pairs, decode_seq, encode_pairs, encode_seq};
#[allow(unused_imports)]
use crate::*;
#[allow(unused_imports)]
use std::hash::{BuildHasher, Hash};

/// Extension subtype of `uuid::Uuid` values.
#[cfg(feature = "uuid")]
pub const UUID_EXT_TYPE: i8 = 1;

// --- IndexSet ---
/// Encodes an `IndexSet` like any other set, in insertion order.
#[cfg(feature = "indexmap")]
impl<T: Encoder, S> Encoder for IndexSet<T, S> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self, os)
    }
}

#[cfg(feature = "indexmap")]
impl<T: Decoder + Eq + Hash, S: BuildHasher + Default> Decoder for IndexSet<T, S> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_seq::<T, _>(is)
    }
}

// --- IndexMap ---
/// Encodes an `IndexMap` as key/value pairs in insertion order; decoding keeps that order.
#[cfg(feature = "indexmap")]
impl<K: Encoder, V: Encoder, S> Encoder for IndexMap<K, V, S> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_pairs(self.len(), self, os)
    }
}

#[cfg(feature = "indexmap")]
impl<K, V, S> Decoder for IndexMap<K, V, S>
where
    K: Decoder + Eq + Hash,
    V: Decoder,
    S: BuildHasher + Default,
{
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_pairs::<K, V, _>(is)
    }
}

// --- AHashMap / AHashSet ---
#[cfg(feature = "ahash")]
impl<K: Encoder, V: Encoder> Encoder for AHashMap<K, V> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_pairs(self.len(), self.iter(), os)
    }
}

#[cfg(feature = "ahash")]
impl<K: Decoder + Eq + Hash, V: Decoder> Decoder for AHashMap<K, V> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_pairs::<K, V, _>(is)
    }
}

#[cfg(feature = "ahash")]
impl<T: Encoder> Encoder for AHashSet<T> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        encode_seq(self.len(), self.iter(), os)
    }
}

#[cfg(feature = "ahash")]
impl<T: Decoder + Eq + Hash> Decoder for AHashSet<T> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        decode_seq::<T, _>(is)
    }
}

// --- SmolStr ---
#[cfg(feature = "smol_str")]
impl Encoder for SmolStr {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_str(self.as_str())?;
        Ok(())
    }
}

#[cfg(feature = "smol_str")]
impl Decoder for SmolStr {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.read_str().map(SmolStr::from)
    }
}

// --- DateTime<Utc> ---
/// Encodes a `chrono::DateTime<Utc>` as signed nanoseconds since the Unix epoch,
/// the same tick count a `SystemTime` uses.
///
/// # Errors
/// Returns `InvalidArgument` for instants outside roughly 1677..2262.
#[cfg(feature = "chrono")]
impl Encoder for DateTime<Utc> {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        let nanos = self.timestamp_nanos_opt().ok_or_else(|| {
            EncoderError::InvalidArgument(format!("{} does not fit in 64-bit nanoseconds", self))
        })?;
        os.write_int(nanos)?;
        Ok(())
    }
}

#[cfg(feature = "chrono")]
impl Decoder for DateTime<Utc> {
    fn decode(is: &mut InputStream) -> Result<Self> {
        i64::decode(is).map(|nanos| Utc.timestamp_nanos(nanos))
    }
}

// --- UUID ---
/// Encodes a `uuid::Uuid` as a 16-byte extension of subtype [`UUID_EXT_TYPE`].
#[cfg(feature = "uuid")]
impl Encoder for Uuid {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        os.write_ext(UUID_EXT_TYPE, self.as_bytes())?;
        Ok(())
    }
}

#[cfg(feature = "uuid")]
impl Decoder for Uuid {
    fn decode(is: &mut InputStream) -> Result<Self> {
        let start = is.position();
        let (subtype, payload) = is.read_ext()?;
        if subtype != UUID_EXT_TYPE {
            let _ = is.set_position(start);
            return Err(EncoderError::Type(format!(
                "Expected UUID extension type {}, got {}",
                UUID_EXT_TYPE, subtype
            )));
        }
        Uuid::from_slice(&payload)
            .map_err(|e| EncoderError::Type(format!("Invalid UUID payload: {}", e)))
    }
}
