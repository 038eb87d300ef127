//! Session item collection.
//!
//! An ordered set of named values. Each value is an opaque byte payload with
//! a one-byte type tag telling readers how to interpret it. Order is
//! insertion order; replacing a value keeps its position.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// How an item's payload should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(pub u8);

impl TypeTag {
    /// Raw bytes.
    pub const BYTES: Self = Self(0);
    /// UTF-8 text.
    pub const STRING: Self = Self(1);
    /// Big-endian `i64`.
    pub const INT: Self = Self(2);
    /// Single byte, 0 or 1.
    pub const BOOL: Self = Self(3);
    /// JSON document.
    pub const JSON: Self = Self(4);
}

/// One named session value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionItem {
    /// Item name, unique within a collection.
    pub name: String,
    /// Payload interpretation.
    pub tag: TypeTag,
    /// Payload bytes.
    pub value: Vec<u8>,
}

/// Ordered collection of session items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionItems {
    items: Vec<SessionItem>,
}

impl SessionItems {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SessionItem> {
        self.items.iter()
    }

    /// Item names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.name.as_str())
    }

    /// Check if an item exists.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Look up an item.
    pub fn get(&self, name: &str) -> Option<&SessionItem> {
        self.items.iter().find(|i| i.name == name)
    }

    /// Insert or replace an item. A replaced item keeps its position.
    pub fn set(&mut self, name: impl Into<String>, tag: TypeTag, value: Vec<u8>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => {
                let item = &mut self.items[idx];
                item.tag = tag;
                item.value = value;
            }
            None => self.items.push(SessionItem { name, tag, value }),
        }
    }

    /// Remove an item, returning it.
    pub fn remove(&mut self, name: &str) -> Option<SessionItem> {
        self.position(name).map(|idx| self.items.remove(idx))
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Store a string.
    pub fn set_str(&mut self, name: impl Into<String>, value: &str) {
        self.set(name, TypeTag::STRING, value.as_bytes().to_vec());
    }

    /// Read a string item. `None` if absent or not a valid string item.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)
            .filter(|i| i.tag == TypeTag::STRING)
            .and_then(|i| std::str::from_utf8(&i.value).ok())
    }

    /// Store an integer.
    pub fn set_i64(&mut self, name: impl Into<String>, value: i64) {
        self.set(name, TypeTag::INT, value.to_be_bytes().to_vec());
    }

    /// Read an integer item. `None` if absent or not an integer item.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name)
            .filter(|i| i.tag == TypeTag::INT)
            .and_then(|i| <[u8; 8]>::try_from(i.value.as_slice()).ok())
            .map(i64::from_be_bytes)
    }

    /// Store a boolean.
    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        self.set(name, TypeTag::BOOL, vec![u8::from(value)]);
    }

    /// Read a boolean item.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(item) if item.tag == TypeTag::BOOL => match item.value.as_slice() {
                [0] => Some(false),
                [1] => Some(true),
                _ => None,
            },
            _ => None,
        }
    }

    /// Store any serializable value as JSON.
    pub fn set_json<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(name, TypeTag::JSON, bytes);
        Ok(())
    }

    /// Read a JSON item. `Ok(None)` if absent or not a JSON item.
    pub fn get_json<T: DeserializeOwned>(&self, name: &str) -> serde_json::Result<Option<T>> {
        match self.get(name) {
            Some(item) if item.tag == TypeTag::JSON => serde_json::from_slice(&item.value).map(Some),
            _ => Ok(None),
        }
    }

    pub(crate) fn push_unchecked(&mut self, item: SessionItem) {
        self.items.push(item);
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|i| i.name == name)
    }
}

impl<'a> IntoIterator for &'a SessionItems {
    type Item = &'a SessionItem;
    type IntoIter = std::slice::Iter<'a, SessionItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
