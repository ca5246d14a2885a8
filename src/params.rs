//! Ordered optional parameters and their query / form encoding

use bytes::Bytes;
use url::form_urlencoded;

/// Ordered list of named parameters whose values may be absent.
///
/// Absent values are dropped at encoding time, so callers can push every
/// parameter an operation understands and let `None` fall out. Order of the
/// present entries is preserved in the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(&'static str, Option<String>)>,
}

impl Params {
    /// Create an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter that is encoded only when `value` is `Some`
    pub fn opt<V: ToString>(mut self, name: &'static str, value: Option<V>) -> Self {
        self.pairs.push((name, value.map(|v| v.to_string())));
        self
    }

    /// Append a parameter that is always encoded, even when empty
    pub fn value<V: ToString>(mut self, name: &'static str, value: V) -> Self {
        self.pairs.push((name, Some(value.to_string())));
        self
    }

    /// Append a boolean flag. `true` encodes as `name=true`, `false` is omitted.
    pub fn flag(mut self, name: &'static str, on: bool) -> Self {
        self.pairs.push((name, on.then(|| "true".to_string())));
        self
    }

    /// Present entries in insertion order
    pub fn present(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (*name, v)))
    }

    /// Returns true if no entry would be encoded
    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }

    /// `application/x-www-form-urlencoded` serialization of the present entries
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.present() {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }

    /// Query string for read-style requests, without the leading `?`
    pub fn to_query(&self) -> String {
        self.encode()
    }

    /// Form body for write-style requests
    pub fn to_body(&self) -> Bytes {
        Bytes::from(self.encode())
    }
}
