//! Wire type codes of the bstream format.
//!
//! Every encoded value starts with one of these bytes. Some codes carry their
//! payload inline (fixint, fixmap, fixarray, fixstr); the rest are followed by
//! a fixed-width length or value in the stream's configured byte order.
//!
//! The codes are the MessagePack ones and are part of the wire format.

pub const POSITIVE_FIXINT_MIN: u8 = 0x00;
pub const POSITIVE_FIXINT_MAX: u8 = 0x7f;
pub const FIXMAP_MIN: u8 = 0x80;
pub const FIXMAP_MAX: u8 = 0x8f;
pub const FIXARRAY_MIN: u8 = 0x90;
pub const FIXARRAY_MAX: u8 = 0x9f;
pub const FIXSTR_MIN: u8 = 0xa0;
pub const FIXSTR_MAX: u8 = 0xbf;
pub const NIL: u8 = 0xc0;
/// Never used by the format.
pub const UNUSED: u8 = 0xc1;
pub const BOOL_FALSE: u8 = 0xc2;
pub const BOOL_TRUE: u8 = 0xc3;
pub const BIN_8: u8 = 0xc4;
pub const BIN_16: u8 = 0xc5;
pub const BIN_32: u8 = 0xc6;
pub const EXT_8: u8 = 0xc7;
pub const EXT_16: u8 = 0xc8;
pub const EXT_32: u8 = 0xc9;
pub const FLOAT_32: u8 = 0xca;
pub const FLOAT_64: u8 = 0xcb;
pub const UINT_8: u8 = 0xcc;
pub const UINT_16: u8 = 0xcd;
pub const UINT_32: u8 = 0xce;
pub const UINT_64: u8 = 0xcf;
pub const INT_8: u8 = 0xd0;
pub const INT_16: u8 = 0xd1;
pub const INT_32: u8 = 0xd2;
pub const INT_64: u8 = 0xd3;
pub const FIXEXT_1: u8 = 0xd4;
pub const FIXEXT_2: u8 = 0xd5;
pub const FIXEXT_4: u8 = 0xd6;
pub const FIXEXT_8: u8 = 0xd7;
pub const FIXEXT_16: u8 = 0xd8;
pub const STR_8: u8 = 0xd9;
pub const STR_16: u8 = 0xda;
pub const STR_32: u8 = 0xdb;
pub const ARRAY_16: u8 = 0xdc;
pub const ARRAY_32: u8 = 0xdd;
pub const MAP_16: u8 = 0xde;
pub const MAP_32: u8 = 0xdf;
pub const NEGATIVE_FIXINT_MIN: u8 = 0xe0;
pub const NEGATIVE_FIXINT_MAX: u8 = 0xff;

/// Largest count that fits in a fixmap/fixarray code.
pub const FIX_CONTAINER_MAX: usize = 15;
/// Largest length that fits in a fixstr code.
pub const FIXSTR_LEN_MAX: usize = 31;
/// Smallest value representable as a negative fixint.
pub const NEGATIVE_FIXINT_FLOOR: i64 = -32;

/// Semantic category of a type code byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    PositiveFixint,
    NegativeFixint,
    Map,
    Array,
    Str,
    Bin,
    Ext,
    Nil,
    Bool,
    Float32,
    Float64,
    Uint,
    Int,
    Unused,
}

impl Category {
    /// Returns true for every category that decodes to an integer.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Category::PositiveFixint | Category::NegativeFixint | Category::Uint | Category::Int
        )
    }
}

/// Classifies a type code byte.
pub fn category(code: u8) -> Category {
    match code {
        POSITIVE_FIXINT_MIN..=POSITIVE_FIXINT_MAX => Category::PositiveFixint,
        FIXMAP_MIN..=FIXMAP_MAX | MAP_16 | MAP_32 => Category::Map,
        FIXARRAY_MIN..=FIXARRAY_MAX | ARRAY_16 | ARRAY_32 => Category::Array,
        FIXSTR_MIN..=FIXSTR_MAX | STR_8 | STR_16 | STR_32 => Category::Str,
        NIL => Category::Nil,
        UNUSED => Category::Unused,
        BOOL_FALSE | BOOL_TRUE => Category::Bool,
        BIN_8 | BIN_16 | BIN_32 => Category::Bin,
        EXT_8 | EXT_16 | EXT_32 | FIXEXT_1..=FIXEXT_16 => Category::Ext,
        FLOAT_32 => Category::Float32,
        FLOAT_64 => Category::Float64,
        UINT_8..=UINT_64 => Category::Uint,
        INT_8..=INT_64 => Category::Int,
        NEGATIVE_FIXINT_MIN..=NEGATIVE_FIXINT_MAX => Category::NegativeFixint,
    }
}

/// Human readable name of a type code, used in error messages.
pub fn name(code: u8) -> &'static str {
    match code {
        POSITIVE_FIXINT_MIN..=POSITIVE_FIXINT_MAX => "positive_fixint",
        FIXMAP_MIN..=FIXMAP_MAX => "fixmap",
        FIXARRAY_MIN..=FIXARRAY_MAX => "fixarray",
        FIXSTR_MIN..=FIXSTR_MAX => "fixstr",
        NIL => "nil",
        UNUSED => "unused",
        BOOL_FALSE => "false",
        BOOL_TRUE => "true",
        BIN_8 => "bin_8",
        BIN_16 => "bin_16",
        BIN_32 => "bin_32",
        EXT_8 => "ext_8",
        EXT_16 => "ext_16",
        EXT_32 => "ext_32",
        FLOAT_32 => "float_32",
        FLOAT_64 => "float_64",
        UINT_8 => "uint_8",
        UINT_16 => "uint_16",
        UINT_32 => "uint_32",
        UINT_64 => "uint_64",
        INT_8 => "int_8",
        INT_16 => "int_16",
        INT_32 => "int_32",
        INT_64 => "int_64",
        FIXEXT_1 => "fixext_1",
        FIXEXT_2 => "fixext_2",
        FIXEXT_4 => "fixext_4",
        FIXEXT_8 => "fixext_8",
        FIXEXT_16 => "fixext_16",
        STR_8 => "str_8",
        STR_16 => "str_16",
        STR_32 => "str_32",
        ARRAY_16 => "array_16",
        ARRAY_32 => "array_32",
        MAP_16 => "map_16",
        MAP_32 => "map_32",
        NEGATIVE_FIXINT_MIN..=NEGATIVE_FIXINT_MAX => "negative_fixint",
    }
}

// --- Encoded size predicates (shortest-form-first) ---

/// Bytes taken by an array header for `count` elements.
#[inline]
pub fn array_header_size(count: usize) -> usize {
    if count <= FIX_CONTAINER_MAX {
        1
    } else if count <= u16::MAX as usize {
        3
    } else {
        5
    }
}

/// Bytes taken by a map header for `count` entries.
#[inline]
pub fn map_header_size(count: usize) -> usize {
    array_header_size(count)
}

/// Bytes taken by a blob header for a body of `len` bytes.
#[inline]
pub fn blob_header_size(len: usize) -> usize {
    if len <= u8::MAX as usize {
        2
    } else if len <= u16::MAX as usize {
        3
    } else {
        5
    }
}

/// Bytes taken by a string header for `len` bytes of UTF-8.
#[inline]
pub fn str_header_size(len: usize) -> usize {
    if len <= FIXSTR_LEN_MAX {
        1
    } else {
        blob_header_size(len)
    }
}

/// Bytes taken by an extension header (code, length, subtype) for a `len` byte payload.
#[inline]
pub fn ext_header_size(len: usize) -> usize {
    match fixext_code(len) {
        Some(_) => 2,
        None => blob_header_size(len) + 1,
    }
}

/// The fixext code for payloads of exactly 1, 2, 4, 8 or 16 bytes.
#[inline]
pub fn fixext_code(len: usize) -> Option<u8> {
    match len {
        1 => Some(FIXEXT_1),
        2 => Some(FIXEXT_2),
        4 => Some(FIXEXT_4),
        8 => Some(FIXEXT_8),
        16 => Some(FIXEXT_16),
        _ => None,
    }
}

/// Encoded size of an unsigned integer.
#[inline]
pub fn uint_size(value: u64) -> usize {
    if value <= POSITIVE_FIXINT_MAX as u64 {
        1
    } else if value <= u8::MAX as u64 {
        2
    } else if value <= u16::MAX as u64 {
        3
    } else if value <= u32::MAX as u64 {
        5
    } else {
        9
    }
}

/// Encoded size of a signed integer.
#[inline]
pub fn int_size(value: i64) -> usize {
    if value >= 0 {
        uint_size(value as u64)
    } else if value >= NEGATIVE_FIXINT_FLOOR {
        1
    } else if value >= i8::MIN as i64 {
        2
    } else if value >= i16::MIN as i64 {
        3
    } else if value >= i32::MIN as i64 {
        5
    } else {
        9
    }
}
