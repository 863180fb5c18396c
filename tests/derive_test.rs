//! `#[derive(Encode, Decode)]` on structs and enums, with field attributes.

use bstream::{
    decode, encode, EncoderError, EnumDecodeError, ErrorKind, InputStream, OutputStream,
    StructDecodeError,
};

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq, Clone)]
struct Header {
    id: u32,
    version: u8,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
struct Message {
    #[bstream(base)]
    header: Header,
    body: String,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
struct Point(i32, i32);

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
struct Marker;

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
struct Pair<T> {
    first: T,
    second: T,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
#[bstream(as_map)]
struct Config {
    name: String,
    retries: u8,
    tags: Option<Vec<String>>,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
#[bstream(as_map)]
struct Entry {
    r#type: u8,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
struct Packet {
    kind: u8,
    #[bstream(with = "bstream::core::blob")]
    payload: Vec<u8>,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq, Clone, Copy)]
enum Level {
    Low = 1,
    Medium,
    High = -5,
}

#[derive(bstream::Encode, bstream::Decode, Debug, PartialEq)]
enum Command {
    Stop,
    Move { x: i32, y: i32 },
    Say(String),
}

#[test]
fn test_named_struct_is_fixed_array() {
    let header = Header { id: 7, version: 1 };
    let bytes = encode(&header).unwrap();
    assert_eq!(&bytes[..], &[0x92, 0x07, 0x01]);
    assert_eq!(decode::<Header>(bytes).unwrap(), header);
}

#[test]
fn test_base_fields_are_flattened() {
    let message = Message {
        header: Header { id: 7, version: 1 },
        body: "hi".to_string(),
    };
    let bytes = encode(&message).unwrap();
    assert_eq!(&bytes[..], &[0x93, 0x07, 0x01, 0xa2, b'h', b'i']);
    assert_eq!(decode::<Message>(bytes).unwrap(), message);
}

#[test]
fn test_tuple_and_unit_structs() {
    let bytes = encode(&Point(-1, 300)).unwrap();
    assert_eq!(&bytes[..], &[0x92, 0xff, 0xcd, 0x01, 0x2c]);
    assert_eq!(decode::<Point>(bytes).unwrap(), Point(-1, 300));

    let bytes = encode(&Marker).unwrap();
    assert_eq!(&bytes[..], &[0x90]);
    assert_eq!(decode::<Marker>(bytes).unwrap(), Marker);
}

#[test]
fn test_generic_struct() {
    let pair = Pair {
        first: "a".to_string(),
        second: "b".to_string(),
    };
    let bytes = encode(&pair).unwrap();
    assert_eq!(decode::<Pair<String>>(bytes).unwrap(), pair);
}

#[test]
fn test_struct_field_count_mismatch() {
    let bytes = encode(&(1u32, 2u8, 3u8)).unwrap();
    let err = decode::<Header>(bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    assert!(matches!(
        err,
        EncoderError::StructDecode(StructDecodeError::FieldCountMismatch {
            expected: 2,
            actual: 3,
            ..
        })
    ));

    // The shape is all that is checked; any matching array decodes.
    let bytes = encode(&(9u64, 2u16)).unwrap();
    assert_eq!(decode::<Header>(bytes).unwrap(), Header { id: 9, version: 2 });
}

#[test]
fn test_as_map_layout() {
    let config = Config {
        name: "x".to_string(),
        retries: 3,
        tags: None,
    };
    let bytes = encode(&config).unwrap();
    let mut expected = vec![0x83, 0xa4];
    expected.extend_from_slice(b"name");
    expected.extend_from_slice(&[0xa1, b'x', 0xa7]);
    expected.extend_from_slice(b"retries");
    expected.extend_from_slice(&[0x03, 0xa4]);
    expected.extend_from_slice(b"tags");
    expected.push(0xc0);
    assert_eq!(&bytes[..], &expected[..]);
    assert_eq!(decode::<Config>(bytes).unwrap(), config);
}

#[test]
fn test_as_map_accepts_any_key_order() {
    let mut os = OutputStream::new();
    os.write_map_header(3).unwrap();
    os.write_str("tags").unwrap();
    os.try_write(&Some(vec!["a".to_string()])).unwrap();
    os.write_str("retries").unwrap();
    os.try_write(&5u8).unwrap();
    os.write_str("name").unwrap();
    os.try_write("srv").unwrap();

    let mut is = InputStream::from(os);
    let config: Config = is.read_as().unwrap();
    assert_eq!(
        config,
        Config {
            name: "srv".to_string(),
            retries: 5,
            tags: Some(vec!["a".to_string()]),
        }
    );
}

#[test]
fn test_as_map_unknown_and_missing_fields() {
    let mut os = OutputStream::new();
    os.write_map_header(3).unwrap();
    os.write_str("name").unwrap();
    os.try_write("x").unwrap();
    os.write_str("bogus").unwrap();
    os.try_write(&1u8).unwrap();
    os.write_str("tags").unwrap();
    os.write_nil().unwrap();
    let err = InputStream::from(os).read_as::<Config>().unwrap_err();
    assert!(matches!(
        err,
        EncoderError::StructDecode(StructDecodeError::UnknownField { ref field, .. }) if field == "bogus"
    ));

    let mut os = OutputStream::new();
    os.write_map_header(3).unwrap();
    os.write_str("name").unwrap();
    os.try_write("x").unwrap();
    os.write_str("name").unwrap();
    os.try_write("y").unwrap();
    os.write_str("tags").unwrap();
    os.write_nil().unwrap();
    let err = InputStream::from(os).read_as::<Config>().unwrap_err();
    assert!(matches!(
        err,
        EncoderError::StructDecode(StructDecodeError::MissingRequiredField { .. })
    ));

    let mut os = OutputStream::new();
    os.write_map_header(1).unwrap();
    os.write_str("name").unwrap();
    os.try_write("x").unwrap();
    let err = InputStream::from(os).read_as::<Config>().unwrap_err();
    assert!(matches!(
        err,
        EncoderError::StructDecode(StructDecodeError::FieldCountMismatch { .. })
    ));
}

#[test]
fn test_as_map_keys_drop_raw_prefix() {
    let entry = Entry { r#type: 4 };
    let bytes = encode(&entry).unwrap();
    assert_eq!(&bytes[..], &[0x81, 0xa4, b't', b'y', b'p', b'e', 0x04]);
    assert_eq!(decode::<Entry>(bytes).unwrap(), entry);
}

#[test]
fn test_with_module_writes_blob() {
    let packet = Packet {
        kind: 2,
        payload: vec![1, 2, 3],
    };
    let bytes = encode(&packet).unwrap();
    assert_eq!(&bytes[..], &[0x92, 0x02, 0xc4, 0x03, 0x01, 0x02, 0x03]);
    assert_eq!(decode::<Packet>(bytes).unwrap(), packet);
}

#[test]
fn test_fieldless_enum_uses_discriminants() {
    assert_eq!(&encode(&Level::Low).unwrap()[..], &[0x01]);
    assert_eq!(&encode(&Level::Medium).unwrap()[..], &[0x02]);
    assert_eq!(&encode(&Level::High).unwrap()[..], &[0xfb]);
    for level in [Level::Low, Level::Medium, Level::High] {
        let bytes = encode(&level).unwrap();
        assert_eq!(decode::<Level>(bytes).unwrap(), level);
    }

    let err = decode::<Level>(encode(&7i32).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        EncoderError::EnumDecode(EnumDecodeError::UnknownDiscriminant { value: 7, .. })
    ));
}

#[test]
fn test_data_enum_layout() {
    assert_eq!(&encode(&Command::Stop).unwrap()[..], &[0x91, 0x00]);
    assert_eq!(
        &encode(&Command::Move { x: 1, y: -1 }).unwrap()[..],
        &[0x93, 0x01, 0x01, 0xff]
    );
    assert_eq!(
        &encode(&Command::Say("ok".into())).unwrap()[..],
        &[0x92, 0x02, 0xa2, b'o', b'k']
    );
    for command in [
        Command::Stop,
        Command::Move { x: 10, y: 20 },
        Command::Say("hello".into()),
    ] {
        let bytes = encode(&command).unwrap();
        assert_eq!(decode::<Command>(bytes).unwrap(), command);
    }
}

#[test]
fn test_data_enum_errors() {
    let err = decode::<Command>(encode(&(9u8,)).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        EncoderError::EnumDecode(EnumDecodeError::UnknownVariant { index: 9, .. })
    ));

    let err = decode::<Command>(encode(&(1u8, 5i32)).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        EncoderError::EnumDecode(EnumDecodeError::FieldCountMismatch {
            expected: 2,
            actual: 1,
            ..
        })
    ));

    let err = decode::<Command>(encode(&()).unwrap()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_nested_derived_types() {
    let history = vec![
        (Level::Low, Command::Stop),
        (Level::High, Command::Move { x: -3, y: 4 }),
    ];
    let bytes = encode(&history).unwrap();
    assert_eq!(decode::<Vec<(Level, Command)>>(bytes).unwrap(), history);
}
