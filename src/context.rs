//! Serialization context shared by output and input streams.
//!
//! A writer and the reader of its bytes must use equivalent contexts: the
//! same byte order, the same dedup setting, and registries and category
//! indexes that agree on every tag and index. Nothing on the wire checks
//! this; a mismatch shows up as garbled tags or numbers.

use crate::{ByteOrder, ErrorCategoryIndex, TypeRegistry};
use std::sync::{Arc, OnceLock};

/// Immutable settings and lookup tables for a family of streams.
#[derive(Debug, Default)]
pub struct Context {
    byte_order: ByteOrder,
    dedup: bool,
    registry: Arc<TypeRegistry>,
    categories: Arc<ErrorCategoryIndex>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// The process-wide default context: big-endian, no dedup, empty registry, standard categories.
    pub fn shared_default() -> Arc<Context> {
        static DEFAULT: OnceLock<Arc<Context>> = OnceLock::new();
        Arc::clone(DEFAULT.get_or_init(|| Arc::new(Context::default())))
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Whether shared pointers are written once and referenced afterwards.
    pub fn dedup_enabled(&self) -> bool {
        self.dedup
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn categories(&self) -> &ErrorCategoryIndex {
        &self.categories
    }
}

/// Builder for [`Context`].
///
/// ```rust
/// use bstream::{ByteOrder, Context, TypeRegistry, TypeTag};
///
/// let mut registry = TypeRegistry::new();
/// registry.register::<String>(TypeTag::new(1)).unwrap();
/// let context = Context::builder()
///     .byte_order(ByteOrder::BigEndian)
///     .dedup(true)
///     .registry(registry)
///     .build();
/// assert!(context.dedup_enabled());
/// ```
#[derive(Debug, Default)]
pub struct ContextBuilder {
    byte_order: ByteOrder,
    dedup: bool,
    registry: Option<Arc<TypeRegistry>>,
    categories: Option<Arc<ErrorCategoryIndex>>,
}

impl ContextBuilder {
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn dedup(mut self, enabled: bool) -> Self {
        self.dedup = enabled;
        self
    }

    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Uses a registry that is already shared with other contexts.
    pub fn shared_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn categories(mut self, categories: ErrorCategoryIndex) -> Self {
        self.categories = Some(Arc::new(categories));
        self
    }

    pub fn build(self) -> Arc<Context> {
        let context = Context {
            byte_order: self.byte_order,
            dedup: self.dedup,
            registry: self.registry.unwrap_or_default(),
            categories: self.categories.unwrap_or_default(),
        };
        tracing::debug!(
            byte_order = ?context.byte_order,
            dedup = context.dedup,
            types = context.registry.len(),
            categories = context.categories.len(),
            "built serialization context"
        );
        Arc::new(context)
    }
}
