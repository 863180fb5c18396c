//! Scalar and string encodings at the boundaries of each size class.

use bstream::typecode::*;
use bstream::{decode, encode, ByteOrder, Context, Decoder, Encoder, InputStream, OutputStream};
use std::fmt::Debug;

fn roundtrip<T: Encoder + Decoder + PartialEq + Debug>(value: T, expected_len: usize) -> Vec<u8> {
    let bytes = encode(&value).unwrap();
    assert_eq!(bytes.len(), expected_len, "encoded length of {:?}", value);
    let decoded: T = decode(bytes.clone()).unwrap();
    assert_eq!(decoded, value);
    bytes.to_vec()
}

#[test]
fn test_unsigned_boundaries() {
    let cases: &[(u64, usize, u8)] = &[
        (0, 1, 0x00),
        (127, 1, 0x7f),
        (128, 2, UINT_8),
        (255, 2, UINT_8),
        (256, 3, UINT_16),
        (65535, 3, UINT_16),
        (65536, 5, UINT_32),
        (u32::MAX as u64, 5, UINT_32),
        (1 << 32, 9, UINT_64),
        (u64::MAX, 9, UINT_64),
    ];
    for &(value, len, code) in cases {
        let bytes = roundtrip(value, len);
        assert_eq!(bytes[0], code, "typecode of {}", value);
    }
}

#[test]
fn test_signed_boundaries() {
    let cases: &[(i64, usize, u8)] = &[
        (-1, 1, 0xff),
        (-32, 1, 0xe0),
        (-33, 2, INT_8),
        (-128, 2, INT_8),
        (-129, 3, INT_16),
        (-32768, 3, INT_16),
        (-32769, 5, INT_32),
        (i32::MIN as i64, 5, INT_32),
        (i32::MIN as i64 - 1, 9, INT_64),
        (i64::MIN, 9, INT_64),
        (100, 1, 0x64),
        (i64::MAX, 9, UINT_64),
    ];
    for &(value, len, code) in cases {
        let bytes = roundtrip(value, len);
        assert_eq!(bytes[0], code, "typecode of {}", value);
    }
}

#[test]
fn test_narrow_integers_use_shortest_form() {
    assert_eq!(roundtrip(200u8, 2), vec![UINT_8, 200]);
    assert_eq!(roundtrip(-100i8, 2), vec![INT_8, 0x9c]);
    assert_eq!(roundtrip(1000u16, 3), vec![UINT_16, 0x03, 0xe8]);
    assert_eq!(roundtrip(5usize, 1), vec![0x05]);
    assert_eq!(roundtrip(-5isize, 1), vec![0xfb]);
}

#[test]
fn test_integer_decode_checks_target_range() {
    let bytes = encode(&300u32).unwrap();
    let err = decode::<u8>(bytes).unwrap_err();
    assert_eq!(err.kind(), bstream::ErrorKind::Type);

    let bytes = encode(&-1i32).unwrap();
    assert!(decode::<u64>(bytes).is_err());

    // Any integer form is accepted when the value fits.
    let mut is = InputStream::from_slice(&[UINT_64, 0, 0, 0, 0, 0, 0, 0, 7]);
    assert_eq!(is.read_as::<u8>().unwrap(), 7);
    let mut is = InputStream::from_slice(&[INT_32, 0, 0, 0, 42]);
    assert_eq!(is.read_as::<u16>().unwrap(), 42);
}

#[test]
fn test_bool_and_nil() {
    assert_eq!(roundtrip(true, 1), vec![BOOL_TRUE]);
    assert_eq!(roundtrip(false, 1), vec![BOOL_FALSE]);
    assert_eq!(roundtrip(None::<u32>, 1), vec![NIL]);
}

#[test]
fn test_floats() {
    assert_eq!(roundtrip(1.5f32, 5), vec![FLOAT_32, 0x3f, 0xc0, 0x00, 0x00]);
    assert_eq!(roundtrip(-0.0f64, 9)[1], 0x80);
    assert_eq!(roundtrip(0.0f64, 9)[1..], [0u8; 8]);
    roundtrip(f64::INFINITY, 9);
    roundtrip(f32::MIN_POSITIVE, 5);

    let bytes = encode(&f64::NAN).unwrap();
    let decoded: f64 = decode(bytes).unwrap();
    assert_eq!(decoded.to_bits(), f64::NAN.to_bits());

    // A float_32 widens into an f64, not the other way round.
    let bytes = encode(&0.25f32).unwrap();
    assert_eq!(decode::<f64>(bytes).unwrap(), 0.25);
    let bytes = encode(&0.25f64).unwrap();
    assert!(decode::<f32>(bytes).is_err());
}

#[test]
fn test_string_header_sizes() {
    let cases: &[(usize, usize, u8)] = &[
        (0, 1, FIXSTR_MIN),
        (31, 1, FIXSTR_MAX),
        (32, 2, STR_8),
        (255, 2, STR_8),
        (256, 3, STR_16),
        (65535, 3, STR_16),
        (65536, 5, STR_32),
    ];
    for &(len, header, code) in cases {
        let value = "a".repeat(len);
        let bytes = roundtrip(value, header + len);
        assert_eq!(bytes[0], code, "typecode for length {}", len);
    }
}

#[test]
fn test_string_rejects_invalid_utf8() {
    let mut is = InputStream::from_slice(&[0xa2, 0xff, 0xfe]);
    assert_eq!(
        is.read_as::<String>().unwrap_err().kind(),
        bstream::ErrorKind::Type
    );
}

#[test]
fn test_char() {
    assert_eq!(roundtrip('A', 1), vec![0x41]);
    roundtrip('\u{1F980}', 5);
    let bytes = encode(&0xD800u32).unwrap();
    assert!(decode::<char>(bytes).is_err());
}

#[test]
fn test_container_header_boundaries() {
    let cases: &[(usize, &[u8])] = &[
        (0, &[0x90]),
        (15, &[0x9f]),
        (16, &[ARRAY_16, 0x00, 0x10]),
        (65535, &[ARRAY_16, 0xff, 0xff]),
        (65536, &[ARRAY_32, 0x00, 0x01, 0x00, 0x00]),
    ];
    for &(count, expected) in cases {
        let mut os = OutputStream::new();
        os.write_array_header(count).unwrap();
        assert_eq!(os.as_slice(), expected);
        let mut is = InputStream::from(os);
        assert_eq!(is.read_array_header().unwrap(), count);
    }

    let cases: &[(usize, &[u8])] = &[
        (0, &[0x80]),
        (15, &[0x8f]),
        (16, &[MAP_16, 0x00, 0x10]),
        (65535, &[MAP_16, 0xff, 0xff]),
        (65536, &[MAP_32, 0x00, 0x01, 0x00, 0x00]),
    ];
    for &(count, expected) in cases {
        let mut os = OutputStream::new();
        os.write_map_header(count).unwrap();
        assert_eq!(os.as_slice(), expected);
        let mut is = InputStream::from(os);
        assert_eq!(is.read_map_header().unwrap(), count);
    }
}

#[test]
fn test_blob_header_boundaries() {
    let cases: &[(usize, &[u8])] = &[
        (0, &[BIN_8, 0x00]),
        (255, &[BIN_8, 0xff]),
        (256, &[BIN_16, 0x01, 0x00]),
        (65535, &[BIN_16, 0xff, 0xff]),
        (65536, &[BIN_32, 0x00, 0x01, 0x00, 0x00]),
    ];
    for &(len, expected) in cases {
        let mut os = OutputStream::new();
        os.write_blob_header(len).unwrap();
        assert_eq!(os.as_slice(), expected);
    }
}

#[test]
fn test_lenient_decode_of_wider_headers() {
    // A 3-element array framed with array_32 still decodes.
    let mut is = InputStream::from_slice(&[ARRAY_32, 0, 0, 0, 3, 1, 2, 3]);
    assert_eq!(is.read_as::<Vec<u8>>().unwrap(), vec![1, 2, 3]);

    let mut is = InputStream::from_slice(&[STR_16, 0, 2, b'o', b'k']);
    assert_eq!(is.read_as::<String>().unwrap(), "ok");
}

#[test]
fn test_little_endian_context() {
    let context = Context::builder().byte_order(ByteOrder::LittleEndian).build();
    let mut os = OutputStream::with_context(context.clone());
    os.try_write(&300u16).unwrap();
    os.try_write(&"x".repeat(256)).unwrap();
    assert_eq!(&os.as_slice()[..3], &[UINT_16, 0x2c, 0x01]);
    assert_eq!(&os.as_slice()[3..6], &[STR_16, 0x00, 0x01]);

    let mut is = InputStream::from(os);
    assert_eq!(is.read_as::<u16>().unwrap(), 300);
    assert_eq!(is.read_as::<String>().unwrap().len(), 256);

    let big = encode(&300u16).unwrap();
    assert_eq!(&big[..], &[UINT_16, 0x01, 0x2c]);
}
