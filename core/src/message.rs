//! The transport-neutral message shape.
//!
//! Broker adapters convert their native records into [`Message`] at the
//! edge, so nothing above the transport layer depends on a particular
//! client's representation.

use std::borrow::Cow;
use std::collections::HashMap;

/// Message headers as plain strings.
pub type Headers = HashMap<String, String>;

/// A single data-plane message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Routing/partitioning key
    pub key: Vec<u8>,
    /// Opaque payload
    pub value: Vec<u8>,
    /// String headers
    pub headers: Headers,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, headers: Headers) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            headers,
        }
    }

    /// The key decoded as UTF-8, with invalid sequences replaced.
    #[must_use]
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    /// Look up a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Convert broker-native header pairs into [`Headers`].
///
/// Values are decoded lossily as UTF-8 and a missing value becomes the empty
/// string. When a name repeats, the last value wins.
pub fn normalize_headers<'a, I>(pairs: I) -> Headers
where
    I: IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| {
            let value = value
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            (name.to_string(), value)
        })
        .collect()
}
