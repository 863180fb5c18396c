//! # bstream
//!
//! A MessagePack-style binary object stream for Rust.
//!
//! - Typed output/input streams over growable or bounded byte buffers
//! - Shortest-form-first encoding of integers, strings, blobs, arrays, maps and extensions
//! - Polymorphic pointers (`Arc<dyn Trait>`, `Box<dyn Trait>`) resolved through a type-tag registry
//! - Optional deduplication of shared pointers, so object graphs round-trip as DAGs
//! - Custom derive macros for fixed-shape aggregates
//! - Feature-gated support for optional dependencies
//!
//! ## Attribute Macros
//!
//! - `#[bstream(base)]`: Inlines the fields of a parent aggregate into this type's field list.
//! - `#[bstream(with = "path")]`: Encodes the field with `path::encode` and decodes it with `path::decode`.
//! - `#[bstream(as_map)]`: Frames a named struct as a map of field name to value instead of an array.
//!
//! ## Feature Flags
//!
//! - `chrono`: Enables encoding/decoding of `chrono::DateTime<Utc>`.
//! - `uuid`: Enables encoding/decoding of `uuid::Uuid` as a 16-byte extension.
//! - `indexmap`: Enables encoding/decoding of `IndexMap` and `IndexSet` collections.
//! - `ahash`: Enables encoding/decoding of `ahash::AHashMap` and `ahash::AHashSet`.
//! - `smol_str`: Enables encoding/decoding of `smol_str::SmolStr`.
//!
//! `HashMap` and `HashSet` are supported for any `BuildHasher`, so aliases such as
//! `fxhash::FxHashMap` need no feature.
//!
//! ## Example
//!
//! ```rust
//! use bstream::{decode, encode, Decode, Encode};
//!
//! #[derive(Encode, Decode, PartialEq, Debug)]
//! struct MyStruct {
//!     id: u32,
//!     name: String,
//! }
//!
//! let value = MyStruct { id: 42, name: "hello".to_string() };
//! let bytes = encode(&value).unwrap();
//! let decoded: MyStruct = decode(bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

pub mod buffer;
pub mod category;
pub mod context;
pub mod core;
pub mod dump;
mod features;
pub mod istream;
pub mod ostream;
pub mod registry;
pub mod typecode;

pub use bstream_derive::{Decode, Encode};
pub use buffer::{ByteOrder, InBuffer, OutBuffer};
pub use category::{ErrorCategory, ErrorCategoryIndex, ErrorCode, GENERIC_CATEGORY, SYSTEM_CATEGORY};
pub use context::{Context, ContextBuilder};
pub use istream::InputStream;
pub use ostream::OutputStream;
pub use registry::{ObjectId, Polymorphic, TypeRegistry, TypeTag, INVALID_TAG};
#[cfg(feature = "uuid")]
pub use features::UUID_EXT_TYPE;

use bytes::Bytes;

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    /// A read needed more bytes than the input buffer holds.
    #[error("Read past end of buffer: needed {needed} bytes, {remaining} remaining")]
    OutOfRange { needed: usize, remaining: usize },
    /// A write did not fit in a non-expandable output buffer.
    #[error("Overflow on non-expandable buffer: needed {needed} bytes, {remaining} remaining")]
    Overflow { needed: usize, remaining: usize },
    /// The next value on the wire is not of the requested kind.
    #[error("Type error: {0}")]
    Type(String),
    /// A fixed-shape header carried a different element count than expected.
    #[error("Invalid element count: expected {expected}, found {actual}")]
    CountMismatch { expected: usize, actual: usize },
    /// An argument was outside the range the format or the buffer accepts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A value's runtime type has no tag in the registry.
    #[error("Type {type_name} is not registered")]
    UnregisteredType { type_name: String },
    /// A decoded tag has no constructor for the requested target type.
    #[error("No constructor registered for tag {tag} as {target}")]
    UnregisteredTag { tag: TypeTag, target: &'static str },
    /// Struct-specific decode error
    #[error(transparent)]
    StructDecode(#[from] StructDecodeError),
    /// Enum-specific decode error
    #[error(transparent)]
    EnumDecode(#[from] EnumDecodeError),
}

/// Coarse classification of an [`EncoderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfRange,
    Overflow,
    Type,
    InvalidArgument,
    UnregisteredType,
}

impl EncoderError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncoderError::OutOfRange { .. } => ErrorKind::OutOfRange,
            EncoderError::Overflow { .. } => ErrorKind::Overflow,
            EncoderError::Type(_)
            | EncoderError::CountMismatch { .. }
            | EncoderError::StructDecode(_)
            | EncoderError::EnumDecode(_) => ErrorKind::Type,
            EncoderError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EncoderError::UnregisteredType { .. } | EncoderError::UnregisteredTag { .. } => {
                ErrorKind::UnregisteredType
            }
        }
    }

    pub(crate) fn unexpected(expected: &str, code: u8) -> Self {
        EncoderError::Type(format!(
            "Expected {}, got {} (0x{:02x})",
            expected,
            typecode::name(code),
            code
        ))
    }
}

/// The result type used throughout this crate for encode/decode operations.
pub type Result<T> = std::result::Result<T, EncoderError>;

/// Derive-specific error types for struct operations
#[derive(Debug, thiserror::Error)]
pub enum StructDecodeError {
    #[error("Field count mismatch for struct {struct_name}: expected {expected}, got {actual}")]
    FieldCountMismatch {
        struct_name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Unknown field '{field}' for struct {struct_name}")]
    UnknownField {
        field: String,
        struct_name: &'static str,
    },
    #[error("Required field '{field}' not found for struct {struct_name}")]
    MissingRequiredField {
        field: &'static str,
        struct_name: &'static str,
    },
}

/// Derive-specific error types for enum operations
#[derive(Debug, thiserror::Error)]
pub enum EnumDecodeError {
    #[error("Unknown discriminant {value} for enum {enum_name}")]
    UnknownDiscriminant { value: i64, enum_name: &'static str },
    #[error("Unknown variant index {index} for enum {enum_name}")]
    UnknownVariant { index: u32, enum_name: &'static str },
    #[error("Field count mismatch for variant {enum_name}::{variant_name}: expected {expected}, got {actual}")]
    FieldCountMismatch {
        enum_name: &'static str,
        variant_name: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Trait for types that can be written to an [`OutputStream`].
///
/// Implement this trait for your type to enable serialization.
/// Most users should use `#[derive(Encode)]` instead of manual implementation.
///
/// # Errors
/// Returns `EncoderError` if the value cannot be encoded.
pub trait Encoder {
    /// Encode the value into the given stream.
    fn encode(&self, os: &mut OutputStream) -> Result<()>;

    /// Writes the absent value of an `Option<Self>`.
    ///
    /// Plain values write `nil`; pointer types override this to write the
    /// null-pointer shape.
    fn encode_none(os: &mut OutputStream) -> Result<()>
    where
        Self: Sized,
    {
        os.write_nil()?;
        Ok(())
    }

    /// Writes the present value of an `Option<Self>`.
    ///
    /// Types whose own encoding can be `nil` override this so that
    /// `Some(value)` stays distinct from `None`.
    fn encode_some(&self, os: &mut OutputStream) -> Result<()> {
        self.encode(os)
    }
}

/// Trait for types that can be read back from an [`InputStream`].
///
/// Implement this trait for your type to enable deserialization.
/// Most users should use `#[derive(Decode)]` instead of manual implementation.
///
/// # Errors
/// Returns `EncoderError` if the value cannot be decoded or the data is invalid.
pub trait Decoder: Sized {
    /// Decode the value from the given stream.
    fn decode(is: &mut InputStream) -> Result<Self>;

    /// Reads an `Option<Self>`, the counterpart of [`Encoder::encode_none`]
    /// and [`Encoder::encode_some`].
    fn decode_option(is: &mut InputStream) -> Result<Option<Self>> {
        if is.peek_typecode()? == typecode::NIL {
            is.read_nil()?;
            Ok(None)
        } else {
            Self::decode(is).map(Some)
        }
    }
}

/// Ordered field list of an aggregate type, write side.
///
/// Derived by `#[derive(Encode)]`. An aggregate marked `#[bstream(base)]`
/// inside another contributes its fields inline through this trait, so a
/// parent and child share one wire array.
pub trait EncodeFields {
    /// Number of wire elements the fields occupy.
    const FIELD_COUNT: usize;

    /// Writes the fields without a header.
    fn encode_fields(&self, os: &mut OutputStream) -> Result<()>;
}

/// Ordered field list of an aggregate type, read side. Derived by `#[derive(Decode)]`.
pub trait DecodeFields: Sized {
    /// Number of wire elements the fields occupy.
    const FIELD_COUNT: usize;

    /// Reads the fields without a header.
    fn decode_fields(is: &mut InputStream) -> Result<Self>;
}

/// Convenience function to encode a value with the default context.
///
/// # Example
/// ```rust
/// let bytes = bstream::encode(&300u16).unwrap();
/// assert_eq!(&bytes[..], &[0xcd, 0x01, 0x2c]);
/// ```
pub fn encode<T: Encoder + ?Sized>(value: &T) -> Result<Bytes> {
    let mut os = OutputStream::new();
    value.encode(&mut os)?;
    Ok(os.take_bytes())
}

/// Convenience function to decode a value with the default context.
///
/// # Example
/// ```rust
/// let value: u16 = bstream::decode(bytes::Bytes::from_static(&[0xcd, 0x01, 0x2c])).unwrap();
/// assert_eq!(value, 300);
/// ```
pub fn decode<T: Decoder>(bytes: Bytes) -> Result<T> {
    let mut is = InputStream::new(bytes);
    T::decode(&mut is)
}
