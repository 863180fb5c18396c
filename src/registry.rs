//! Type tags for polymorphic pointers.
//!
//! A pointer whose static type may hold several concrete types (`Arc<dyn Shape>`)
//! is written as `[tag, body]`, where the tag names the concrete type. The
//! [`TypeRegistry`] maps concrete types to tags on the way out and tags to
//! constructors on the way in.

use crate::{Decoder, Encoder, EncoderError, InputStream, OutputStream, Result};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Small integer naming a concrete type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(u32);

/// The tag written for null pointers. Never assigned to a type.
pub const INVALID_TAG: TypeTag = TypeTag(0);

impl TypeTag {
    pub const fn new(value: u32) -> Self {
        TypeTag(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != INVALID_TAG
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Encoder for TypeTag {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        self.0.encode(os)
    }
}

impl Decoder for TypeTag {
    fn decode(is: &mut InputStream) -> Result<Self> {
        u32::decode(is).map(TypeTag)
    }
}

/// A value that can sit behind a polymorphic pointer.
///
/// Implemented for every sized `Encoder + Send + Sync + 'static` type. To put
/// trait objects behind pointers, make the trait extend `Polymorphic`:
///
/// ```rust
/// use bstream::Polymorphic;
///
/// trait Shape: Polymorphic {
///     fn area(&self) -> f64;
/// }
/// ```
pub trait Polymorphic: Send + Sync + 'static {
    /// `TypeId` of the concrete type, even when called through a trait object.
    fn concrete_type_id(&self) -> TypeId;

    fn concrete_type_name(&self) -> &'static str;

    /// Writes the value itself, without tag framing.
    fn encode_body(&self, os: &mut OutputStream) -> Result<()>;
}

impl<T: Encoder + Send + Sync + 'static> Polymorphic for T {
    fn concrete_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn concrete_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn encode_body(&self, os: &mut OutputStream) -> Result<()> {
        self.encode(os)
    }
}

/// Identity of a shared object, taken from its `Arc` handle.
///
/// Only meaningful while a handle to the object is alive; the output stream
/// keeps one for every identity it records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn of<P: ?Sized>(ptr: &Arc<P>) -> Self {
        ObjectId(Arc::as_ptr(ptr).cast::<()>() as usize)
    }
}

type Constructor<P> = Box<dyn Fn(&mut InputStream) -> Result<Box<P>> + Send + Sync>;

/// Maps concrete types to tags and tags to constructors.
///
/// Built once during setup and shared read-only through a
/// [`Context`](crate::Context).
#[derive(Default)]
pub struct TypeRegistry {
    tags: HashMap<TypeId, TypeTag>,
    names: HashMap<TypeTag, &'static str>,
    // Keyed by tag and the `TypeId` of the pointee the constructor produces;
    // each value is a `Constructor<P>` for that pointee.
    constructors: HashMap<(TypeTag, TypeId), Box<dyn Any + Send + Sync>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `tag` to `T` and registers a constructor producing `Box<T>`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for [`INVALID_TAG`], a tag already in use, or a type already registered.
    pub fn register<T>(&mut self, tag: TypeTag) -> Result<&mut Self>
    where
        T: Encoder + Decoder + Send + Sync + 'static,
    {
        if !tag.is_valid() {
            return Err(EncoderError::InvalidArgument(format!(
                "tag {} is reserved for null pointers",
                tag
            )));
        }
        if let Some(existing) = self.names.get(&tag) {
            return Err(EncoderError::InvalidArgument(format!(
                "tag {} is already assigned to {}",
                tag, existing
            )));
        }
        if let Some(existing) = self.tags.get(&TypeId::of::<T>()) {
            return Err(EncoderError::InvalidArgument(format!(
                "{} is already registered with tag {}",
                type_name::<T>(),
                existing
            )));
        }
        self.tags.insert(TypeId::of::<T>(), tag);
        self.names.insert(tag, type_name::<T>());
        let constructor: Constructor<T> =
            Box::new(|is: &mut InputStream| T::decode(is).map(Box::new));
        self.constructors
            .insert((tag, TypeId::of::<T>()), Box::new(constructor));
        tracing::debug!(tag = tag.get(), type_name = type_name::<T>(), "registered type");
        Ok(self)
    }

    /// Lets pointers to `P` (usually a trait object) hold a registered `T`.
    ///
    /// `upcast` converts the freshly decoded value, e.g. `|c| c as Box<dyn Shape>`.
    ///
    /// # Errors
    /// Returns `UnregisteredType` if `T` has no tag yet.
    pub fn register_as<T, P>(&mut self, upcast: fn(Box<T>) -> Box<P>) -> Result<&mut Self>
    where
        T: Decoder + 'static,
        P: ?Sized + 'static,
    {
        let tag = self.tag_for(TypeId::of::<T>()).ok_or_else(|| {
            EncoderError::UnregisteredType {
                type_name: type_name::<T>().to_string(),
            }
        })?;
        let constructor: Constructor<P> =
            Box::new(move |is: &mut InputStream| T::decode(is).map(|v| upcast(Box::new(v))));
        self.constructors
            .insert((tag, TypeId::of::<P>()), Box::new(constructor));
        tracing::debug!(
            tag = tag.get(),
            type_name = type_name::<T>(),
            target = type_name::<P>(),
            "registered upcast"
        );
        Ok(self)
    }

    /// Tag assigned to the type with `type_id`.
    pub fn tag_for(&self, type_id: TypeId) -> Option<TypeTag> {
        self.tags.get(&type_id).copied()
    }

    /// Tag of the runtime type of `value`.
    ///
    /// # Errors
    /// Returns `UnregisteredType` if the concrete type has no tag.
    pub fn tag_of<P: ?Sized + Polymorphic>(&self, value: &P) -> Result<TypeTag> {
        self.tag_for(value.concrete_type_id())
            .ok_or_else(|| EncoderError::UnregisteredType {
                type_name: value.concrete_type_name().to_string(),
            })
    }

    /// Name of the type registered under `tag`.
    pub fn name_of(&self, tag: TypeTag) -> Option<&'static str> {
        self.names.get(&tag).copied()
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.names.contains_key(&tag)
    }

    /// Decodes the body of a `tag` value from `is` as a `Box<P>`.
    ///
    /// # Errors
    /// Returns `UnregisteredTag` if nothing constructs `P` from `tag`, or the body's decode error.
    pub fn construct<P: ?Sized + 'static>(
        &self,
        tag: TypeTag,
        is: &mut InputStream,
    ) -> Result<Box<P>> {
        let constructor = self
            .constructors
            .get(&(tag, TypeId::of::<P>()))
            .and_then(|c| (**c).downcast_ref::<Constructor<P>>())
            .ok_or(EncoderError::UnregisteredTag {
                tag,
                target: type_name::<P>(),
            })?;
        tracing::trace!(tag = tag.get(), target = type_name::<P>(), "constructing");
        constructor(is)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.names.iter().collect();
        entries.sort();
        f.debug_map().entries(entries).finish()
    }
}
