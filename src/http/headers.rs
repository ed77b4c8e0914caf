//! Header storage and raw header-line inspection.
//!
//! The proxy never decodes the header blocks it relays. It looks at each raw
//! line only long enough to classify it, so the helpers here operate on byte
//! slices and leave the line untouched. [`Headers`] is the owned, ordered map
//! used when this crate builds or parses a message itself.

use std::fmt;

/// An ordered, multi-value HTTP header map with case-insensitive lookup.
///
/// Insertion order is preserved on the wire, which matters for HTTP/1.0 peers
/// that expect `Content-length` in a particular position.
///
/// # Examples
///
/// ```
/// use cacheproxy::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Server", "Tiny Web Server");
/// headers.insert("Content-length", "5");
///
/// assert_eq!(headers.get("content-length"), Some("5"));
/// assert_eq!(headers.to_string(), "Server: Tiny Web Server\r\nContent-length: 5\r\n");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

/// Returns `true` if `line` is the empty line that terminates a header block.
///
/// Bare `\n` is accepted alongside `\r\n` for lenient peers.
pub fn is_blank_line(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

/// Returns the header-name portion of a raw header line: everything before the
/// first `:`, or the whole line (minus its terminator) when there is no colon.
pub fn line_name(line: &[u8]) -> &[u8] {
    match line.iter().position(|&b| b == b':') {
        Some(colon) => &line[..colon],
        None => trim_line_end(line),
    }
}

/// Returns the trimmed value portion of a raw header line, if it has a colon.
pub fn line_value(line: &[u8]) -> Option<&[u8]> {
    let colon = line.iter().position(|&b| b == b':')?;
    Some(line[colon + 1..].trim_ascii())
}

/// Extracts a declared body length from a raw response header line.
///
/// The header name is matched case-insensitively. A value that does not parse
/// as an unsigned integer yields `None`, the same as a missing header.
///
/// ```
/// use cacheproxy::http::headers::content_length;
///
/// assert_eq!(content_length(b"Content-length: 42\r\n"), Some(42));
/// assert_eq!(content_length(b"CONTENT-LENGTH:7\r\n"), Some(7));
/// assert_eq!(content_length(b"Content-Type: text/html\r\n"), None);
/// ```
pub fn content_length(line: &[u8]) -> Option<usize> {
    if !line_name(line).trim_ascii().eq_ignore_ascii_case(b"content-length") {
        return None;
    }
    std::str::from_utf8(line_value(line)?).ok()?.parse().ok()
}

/// Case-sensitive substring search over bytes.
pub(crate) fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(h.contains("Content-type"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn display_preserves_order() {
        let mut h = Headers::with_capacity(2);
        h.insert("B", "2");
        h.insert("A", "1");
        assert_eq!(h.len(), 2);
        assert_eq!(h.to_string(), "B: 2\r\nA: 1\r\n");
    }

    #[test]
    fn blank_line_detection() {
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"\n"));
        assert!(!is_blank_line(b"Host: a\r\n"));
        assert!(!is_blank_line(b""));
    }

    #[test]
    fn name_and_value_split() {
        assert_eq!(line_name(b"Host: example.com\r\n"), b"Host");
        assert_eq!(line_value(b"Host:   example.com \r\n"), Some(&b"example.com"[..]));
        assert_eq!(line_name(b"garbage\r\n"), b"garbage");
        assert_eq!(line_value(b"garbage\r\n"), None);
    }

    #[test]
    fn content_length_variants() {
        assert_eq!(content_length(b"Content-Length: 100\r\n"), Some(100));
        assert_eq!(content_length(b"content-length:0\r\n"), Some(0));
        assert_eq!(content_length(b"Content-Length: lots\r\n"), None);
        assert_eq!(content_length(b"Content-Length: -1\r\n"), None);
        assert_eq!(content_length(b"X-Content-Length: 5\r\n"), None);
    }

    #[test]
    fn substring_search() {
        assert!(contains_bytes(b"Proxy-Connection", b"Connection"));
        assert!(!contains_bytes(b"connection", b"Connection"));
    }
}
