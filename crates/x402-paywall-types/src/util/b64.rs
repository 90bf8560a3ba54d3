//! Base64 encoding and decoding of header values.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use std::borrow::Cow;
use std::fmt::Display;

/// Bytes of a base64-encoded header value.
///
/// Borrows the header bytes when decoding an inbound request and owns the
/// encoded string when producing one.
///
/// ```rust
/// use x402_paywall_types::util::Base64Bytes;
///
/// let encoded = Base64Bytes::encode(b"paid");
/// assert_eq!(encoded.to_string(), "cGFpZA==");
/// assert_eq!(encoded.decode().unwrap(), b"paid");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes<'a>(pub Cow<'a, [u8]>);

impl Base64Bytes<'_> {
    /// Decodes to raw bytes. Surrounding ASCII whitespace is ignored.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(self.0.trim_ascii())
    }

    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64Bytes<'static> {
        let encoded = b64.encode(input.as_ref());
        Base64Bytes(Cow::Owned(encoded.into_bytes()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim_ascii().is_empty()
    }
}

impl AsRef<[u8]> for Base64Bytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64Bytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64Bytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64Bytes<'a> {
    fn from(s: &'a str) -> Self {
        Base64Bytes(Cow::Borrowed(s.as_bytes()))
    }
}

impl Display for Base64Bytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ignores_surrounding_whitespace() {
        let bytes = Base64Bytes::from("  aGVsbG8=\n");
        assert_eq!(bytes.decode().unwrap(), b"hello");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(Base64Bytes::from(" \t").is_empty());
        assert!(!Base64Bytes::from("aA==").is_empty());
    }
}
