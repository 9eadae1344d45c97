//! Immutable heap string storage

use std::fmt;

/// UTF-8 string data stored in the heap
///
/// Strings are the universal value of the language so literals,
/// variable values, numbers and results all live here.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HeapString {
    data: Box<str>,
}

impl HeapString {
    pub fn as_str(&self) -> &str {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<&str> for HeapString {
    fn from(source: &str) -> Self {
        HeapString {
            data: source.into(),
        }
    }
}

impl From<String> for HeapString {
    fn from(source: String) -> Self {
        HeapString {
            data: source.into_boxed_str(),
        }
    }
}

impl fmt::Debug for HeapString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.data)
    }
}
