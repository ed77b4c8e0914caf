//! Cache entry.

use bytes::Bytes;

/// A cached response body and the key it was stored under.
///
/// Cloning is cheap: the body is reference-counted, so a handler that holds an
/// entry keeps the bytes alive even after the cache has evicted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    key: String,
    body: Bytes,
}

impl CacheEntry {
    pub(crate) fn new(key: String, body: Bytes) -> Self {
        Self { key, body }
    }

    /// The key this entry is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The full response payload captured after the header block.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Size of the body in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }
}
