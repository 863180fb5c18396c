//! Error categories and portable error codes.
//!
//! An [`ErrorCode`] is a numeric value qualified by the category that gives
//! it meaning. On the wire the category travels as its index in the
//! context's [`ErrorCategoryIndex`], so both ends must register the same
//! categories in the same order.

use crate::{Decoder, Encoder, EncoderError, InputStream, OutputStream, Result};
use std::fmt;
use std::io;

/// A family of error values.
pub trait ErrorCategory: Send + Sync + 'static {
    /// Unique name of the category.
    fn name(&self) -> &'static str;

    /// Describes `code` within this category.
    fn message(&self, code: i32) -> String;
}

/// Portable errors without an OS-specific meaning.
#[derive(Debug)]
pub struct GenericCategory;

impl ErrorCategory for GenericCategory {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn message(&self, code: i32) -> String {
        format!("generic error {}", code)
    }
}

/// Raw operating system error numbers.
#[derive(Debug)]
pub struct SystemCategory;

impl ErrorCategory for SystemCategory {
    fn name(&self) -> &'static str {
        "system"
    }

    fn message(&self, code: i32) -> String {
        io::Error::from_raw_os_error(code).to_string()
    }
}

pub static GENERIC_CATEGORY: GenericCategory = GenericCategory;
pub static SYSTEM_CATEGORY: SystemCategory = SystemCategory;

/// A numeric error value together with its category.
#[derive(Clone, Copy)]
pub struct ErrorCode {
    category: &'static dyn ErrorCategory,
    value: i32,
}

impl ErrorCode {
    pub fn new(category: &'static dyn ErrorCategory, value: i32) -> Self {
        Self { category, value }
    }

    /// An OS error number.
    pub fn system(value: i32) -> Self {
        Self::new(&SYSTEM_CATEGORY, value)
    }

    pub fn category(&self) -> &'static dyn ErrorCategory {
        self.category
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn message(&self) -> String {
        self.category.message(self.value)
    }

    /// Captures the OS error number of `err`, if it carries one.
    pub fn from_io_error(err: &io::Error) -> Option<Self> {
        err.raw_os_error().map(Self::system)
    }

    /// Rebuilds an `io::Error` for system codes.
    pub fn to_io_error(&self) -> Option<io::Error> {
        (self.category.name() == SYSTEM_CATEGORY.name())
            .then(|| io::Error::from_raw_os_error(self.value))
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.category.name() == other.category.name()
    }
}

impl Eq for ErrorCode {}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCode")
            .field("category", &self.category.name())
            .field("value", &self.value)
            .finish()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.category.name(), self.value, self.message())
    }
}

/// Bidirectional mapping between categories and small integers.
pub struct ErrorCategoryIndex {
    categories: Vec<&'static dyn ErrorCategory>,
}

impl ErrorCategoryIndex {
    /// An index with no categories at all.
    pub fn empty() -> Self {
        Self {
            categories: Vec::new(),
        }
    }

    /// Appends `category` and returns its index. Adding a known category returns the existing index.
    pub fn add(&mut self, category: &'static dyn ErrorCategory) -> u32 {
        if let Ok(index) = self.index_of(category) {
            return index;
        }
        self.categories.push(category);
        (self.categories.len() - 1) as u32
    }

    pub fn index_of(&self, category: &dyn ErrorCategory) -> Result<u32> {
        self.categories
            .iter()
            .position(|c| c.name() == category.name())
            .map(|i| i as u32)
            .ok_or_else(|| EncoderError::UnregisteredType {
                type_name: format!("error category '{}'", category.name()),
            })
    }

    pub fn category_of(&self, index: u32) -> Result<&'static dyn ErrorCategory> {
        self.categories
            .get(index as usize)
            .copied()
            .ok_or_else(|| EncoderError::UnregisteredType {
                type_name: format!("error category #{}", index),
            })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Index 0 is the generic category, index 1 the system category.
impl Default for ErrorCategoryIndex {
    fn default() -> Self {
        let mut index = Self::empty();
        index.add(&GENERIC_CATEGORY);
        index.add(&SYSTEM_CATEGORY);
        index
    }
}

impl fmt::Debug for ErrorCategoryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.categories.iter().map(|c| c.name()))
            .finish()
    }
}

/// Encodes an `ErrorCode` as `[category_index, value]`.
impl Encoder for ErrorCode {
    fn encode(&self, os: &mut OutputStream) -> Result<()> {
        let index = os.context().categories().index_of(self.category)?;
        os.write_array_header(2)?;
        index.encode(os)?;
        self.value.encode(os)
    }
}

impl Decoder for ErrorCode {
    fn decode(is: &mut InputStream) -> Result<Self> {
        is.check_array_header(2)?;
        let index = u32::decode(is)?;
        let value = i32::decode(is)?;
        let category = is.context().categories().category_of(index)?;
        Ok(ErrorCode::new(category, value))
    }
}
