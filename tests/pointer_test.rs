//! Polymorphic pointers, the type registry and shared-object deduplication.

use bstream::{
    Context, Decode, Encode, ErrorKind, InputStream, OutputStream, Polymorphic, TypeRegistry,
    TypeTag,
};
use std::fmt::Debug;
use std::sync::Arc;

trait Shape: Polymorphic + Debug {
    fn area(&self) -> f64;
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Circle {
    radius: f64,
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Square {
    side: f64,
}

#[derive(Encode, Decode, Debug, PartialEq)]
struct Triangle {
    base: f64,
    height: f64,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        3.0 * self.radius * self.radius
    }
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

impl Shape for Triangle {
    fn area(&self) -> f64 {
        self.base * self.height / 2.0
    }
}

#[derive(Encode, Decode, Debug)]
struct Drawing {
    layers: Vec<Arc<dyn Shape>>,
    highlight: Option<Arc<dyn Shape>>,
}

fn shape_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Circle>(TypeTag::new(1))
        .unwrap()
        .register::<Square>(TypeTag::new(2))
        .unwrap()
        .register_as::<Circle, dyn Shape>(|c| c as Box<dyn Shape>)
        .unwrap()
        .register_as::<Square, dyn Shape>(|s| s as Box<dyn Shape>)
        .unwrap();
    registry
}

fn shape_context(dedup: bool) -> Arc<Context> {
    Context::builder()
        .dedup(dedup)
        .registry(shape_registry())
        .build()
}

fn write_all<T: bstream::Encoder + ?Sized>(context: &Arc<Context>, value: &T) -> OutputStream {
    let mut os = OutputStream::with_context(context.clone());
    os.try_write(value).unwrap();
    os
}

#[test]
fn test_null_pointer_shape() {
    let context = shape_context(false);
    let none: Option<Arc<dyn Shape>> = None;
    let os = write_all(&context, &none);
    assert_eq!(os.as_slice(), &[0x92, 0x00, 0xc0]);
    let mut is = InputStream::from(os);
    assert!(is.read_as::<Option<Arc<dyn Shape>>>().unwrap().is_none());
    assert_eq!(is.remaining(), 0);

    let none: Option<Box<dyn Shape>> = None;
    let os = write_all(&context, &none);
    assert_eq!(os.as_slice(), &[0x92, 0x00, 0xc0]);
    let mut is = InputStream::from(os);
    assert!(is.read_as::<Option<Box<dyn Shape>>>().unwrap().is_none());
}

#[test]
fn test_null_into_required_pointer_is_type_error() {
    let mut is = InputStream::with_context(
        bytes::Bytes::from_static(&[0x92, 0x00, 0xc0]),
        shape_context(false),
    );
    let err = is.read_as::<Arc<dyn Shape>>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_shared_pointer_roundtrip_through_trait_object() {
    let context = shape_context(false);
    let shapes: Vec<Arc<dyn Shape>> = vec![
        Arc::new(Circle { radius: 2.0 }),
        Arc::new(Square { side: 3.0 }),
    ];
    let os = write_all(&context, &shapes);
    // [tag 1, Circle[2.0]]
    assert_eq!(&os.as_slice()[1..4], &[0x92, 0x01, 0x91]);

    let mut is = InputStream::from(os);
    let decoded: Vec<Arc<dyn Shape>> = is.read_as().unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].area(), 12.0);
    assert_eq!(decoded[1].area(), 9.0);
    assert_eq!(format!("{:?}", decoded[1]), "Square { side: 3.0 }");
}

#[test]
fn test_concrete_pointer_roundtrip() {
    let context = shape_context(false);
    let circle = Arc::new(Circle { radius: 1.5 });
    let os = write_all(&context, &circle);
    let mut is = InputStream::from(os);
    let decoded: Arc<Circle> = is.read_as().unwrap();
    assert_eq!(*decoded, Circle { radius: 1.5 });
}

#[test]
fn test_dedup_shares_decoded_instances() {
    let context = shape_context(true);
    let circle: Arc<dyn Shape> = Arc::new(Circle { radius: 1.0 });
    let square: Arc<dyn Shape> = Arc::new(Square { side: 1.0 });
    let shapes = vec![circle.clone(), square.clone(), circle.clone(), square];
    let os = write_all(&context, &shapes);
    // Third element refers back to serial 0.
    assert!(os.as_slice().ends_with(&[0x92, 0x01, 0x00, 0x92, 0x02, 0x01]));

    let mut is = InputStream::from(os);
    let decoded: Vec<Arc<dyn Shape>> = is.read_as().unwrap();
    assert!(Arc::ptr_eq(&decoded[0], &decoded[2]));
    assert!(Arc::ptr_eq(&decoded[1], &decoded[3]));
    assert!(!Arc::ptr_eq(&decoded[0], &decoded[1]));
}

#[test]
fn test_dedup_across_struct_fields() {
    let context = shape_context(true);
    let focus: Arc<dyn Shape> = Arc::new(Square { side: 4.0 });
    let drawing = Drawing {
        layers: vec![focus.clone(), Arc::new(Circle { radius: 1.0 })],
        highlight: Some(focus),
    };
    let os = write_all(&context, &drawing);
    let mut is = InputStream::from(os);
    let decoded: Drawing = is.read_as().unwrap();
    let highlight = decoded.highlight.unwrap();
    assert!(Arc::ptr_eq(&decoded.layers[0], &highlight));
    assert_eq!(highlight.area(), 16.0);
}

#[test]
fn test_without_dedup_objects_are_copied() {
    let context = shape_context(false);
    let circle: Arc<dyn Shape> = Arc::new(Circle { radius: 1.0 });
    let shapes = vec![circle.clone(), circle];
    let os = write_all(&context, &shapes);
    let len = os.len();
    // Array header plus two complete [tag, body] entries.
    assert_eq!(len, 1 + 2 * (1 + 1 + 1 + 9));

    let mut is = InputStream::from(os);
    let decoded: Vec<Arc<dyn Shape>> = is.read_as().unwrap();
    assert!(!Arc::ptr_eq(&decoded[0], &decoded[1]));
    assert_eq!(decoded[0].area(), decoded[1].area());
}

#[test]
fn test_unique_pointers_never_dedup() {
    let context = shape_context(true);
    let boxes: Vec<Box<dyn Shape>> = vec![
        Box::new(Square { side: 2.0 }),
        Box::new(Square { side: 2.0 }),
    ];
    let os = write_all(&context, &boxes);
    assert_eq!(os.len(), 1 + 2 * 12);
    let mut is = InputStream::from(os);
    let decoded: Vec<Box<dyn Shape>> = is.read_as().unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[1].area(), 4.0);
}

#[test]
fn test_clear_resets_dedup_table() {
    let context = shape_context(true);
    let circle: Arc<dyn Shape> = Arc::new(Circle { radius: 1.0 });
    let mut os = OutputStream::with_context(context);
    os.try_write(&circle).unwrap();
    let first = os.as_slice().to_vec();
    os.clear();
    os.try_write(&circle).unwrap();
    assert_eq!(os.as_slice(), &first[..]);
}

#[test]
fn test_unregistered_type_on_encode() {
    let context = shape_context(false);
    let triangle: Arc<dyn Shape> = Arc::new(Triangle {
        base: 1.0,
        height: 1.0,
    });
    let mut os = OutputStream::with_context(context);
    let err = os.try_write(&triangle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnregisteredType);
    assert!(err.to_string().contains("Triangle"));
}

#[test]
fn test_unregistered_tag_on_decode() {
    let mut is = InputStream::with_context(
        bytes::Bytes::from_static(&[0x92, 0x07, 0x91, 0x00]),
        shape_context(false),
    );
    let err = is.read_as::<Arc<dyn Shape>>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnregisteredType);
}

#[test]
fn test_tag_registered_without_upcast() {
    let mut registry = TypeRegistry::new();
    registry.register::<Circle>(TypeTag::new(1)).unwrap();
    let context = Context::builder().registry(registry).build();
    let circle: Arc<dyn Shape> = Arc::new(Circle { radius: 1.0 });
    let os = write_all(&context, &circle);
    let mut is = InputStream::from(os);
    // Encodes fine, but nothing constructs a `dyn Shape` from tag 1.
    let err = is.read_as::<Arc<dyn Shape>>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnregisteredType);
}

#[test]
fn test_registry_rejects_conflicts() {
    let mut registry = TypeRegistry::new();
    assert!(registry.register::<Circle>(bstream::INVALID_TAG).is_err());
    registry.register::<Circle>(TypeTag::new(5)).unwrap();
    let err = registry.register::<Square>(TypeTag::new(5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(registry.register::<Circle>(TypeTag::new(6)).is_err());
    assert!(registry
        .register_as::<Triangle, dyn Shape>(|t| t as Box<dyn Shape>)
        .is_err());
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(TypeTag::new(5)));
}

#[test]
fn test_integer_bodies_cannot_be_shared_with_dedup() {
    let mut registry = TypeRegistry::new();
    registry.register::<u32>(TypeTag::new(9)).unwrap();

    let counter = Arc::new(7u32);
    let plain = Context::builder().registry(shape_registry()).build();
    let mut os = OutputStream::with_context(plain);
    // Unregistered in this context.
    assert!(os.try_write(&counter).is_err());

    let context = Context::builder().registry(registry).build();
    let os = write_all(&context, &counter);
    assert_eq!(os.as_slice(), &[0x92, 0x09, 0x07]);

    let mut registry = TypeRegistry::new();
    registry.register::<u32>(TypeTag::new(9)).unwrap();
    let dedup = Context::builder().dedup(true).registry(registry).build();
    let mut os = OutputStream::with_context(dedup);
    let err = os.try_write(&counter).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_back_reference_to_unknown_serial() {
    let mut is = InputStream::with_context(
        bytes::Bytes::from_static(&[0x92, 0x01, 0x03]),
        shape_context(true),
    );
    let err = is.read_as::<Arc<dyn Shape>>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

#[test]
fn test_rewind_forgets_shared_objects() {
    let context = shape_context(true);
    let circle: Arc<dyn Shape> = Arc::new(Circle { radius: 1.0 });
    let os = write_all(&context, &vec![circle.clone(), circle]);
    let mut is = InputStream::from(os);
    let first: Vec<Arc<dyn Shape>> = is.read_as().unwrap();
    is.rewind();
    let second: Vec<Arc<dyn Shape>> = is.read_as().unwrap();
    assert!(Arc::ptr_eq(&second[0], &second[1]));
    assert!(!Arc::ptr_eq(&first[0], &second[0]));
}

#[test]
fn test_set_position_forgets_objects_written_past_it() {
    let context = shape_context(true);
    let circle: Arc<dyn Shape> = Arc::new(Circle { radius: 1.0 });
    let square: Arc<dyn Shape> = Arc::new(Square { side: 2.0 });
    let mut os = OutputStream::with_context(context);
    os.try_write(&circle).unwrap();
    let mark = os.position();
    os.try_write(&square).unwrap();
    os.set_position(mark).unwrap();

    // The square's body was discarded, so it is written out again.
    os.try_write(&square).unwrap();
    assert!(os.len() > mark + 3);
    os.try_write(&circle).unwrap().try_write(&square).unwrap();
    assert!(os.as_slice().ends_with(&[0x92, 0x01, 0x00, 0x92, 0x02, 0x01]));

    let mut is = InputStream::from(os);
    let shapes: Vec<Arc<dyn Shape>> = (0..4).map(|_| is.read_as().unwrap()).collect();
    assert!(Arc::ptr_eq(&shapes[0], &shapes[2]));
    assert!(Arc::ptr_eq(&shapes[1], &shapes[3]));
    assert_eq!(format!("{:?}", shapes[1]), "Square { side: 2.0 }");
    assert_eq!(is.remaining(), 0);
}
