//! Query-string parameter codec.
//!
//! Each endpoint declares a plain `Serialize` struct for its filters
//! (see `ListHostsParams` in [`crate::hosts`]). [`QueryParams::from_struct`]
//! is the single function that turns any such struct into wire pairs:
//!
//! - field renaming comes from `#[serde(rename = "...")]`;
//! - exclusion comes from `#[serde(skip_serializing_if = "...")]`, plus
//!   `None` and empty strings/lists are always dropped;
//! - booleans become `"true"`/`"false"`, numbers their decimal form, and
//!   lists a comma-separated string.
//!
//! [`QueryParams::encode`] percent-encodes every key and value on its own,
//! keeping only RFC 3986 unreserved characters literal.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde_json::Value;

use crate::error::{FleetError, Result};

/// Everything except `A-Z a-z 0-9 - . _ ~` is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes one path segment (an identifier, serial, or name that is
/// interpolated into an endpoint path).
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, COMPONENT).to_string()
}

/// Ordered list of wire-level query parameters.
///
/// Keys are unique: inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a parameter struct into wire pairs.
    ///
    /// The struct must serialize to a JSON object of scalars or lists of
    /// scalars; nested objects are rejected with `InvalidRequest`.
    pub fn from_struct<T: Serialize + ?Sized>(params: &T) -> Result<Self> {
        let value = serde_json::to_value(params)
            .map_err(|e| FleetError::InvalidRequest(format!("cannot encode parameters: {e}")))?;
        let fields = match value {
            Value::Object(fields) => fields,
            Value::Null => return Ok(Self::new()),
            other => {
                return Err(FleetError::InvalidRequest(format!(
                    "parameters must be a struct, got {other}"
                )));
            }
        };

        let mut out = Self::new();
        for (key, value) in fields {
            if let Some(encoded) = normalize(&key, value)? {
                out.insert(key, encoded);
            }
        }
        Ok(out)
    }

    /// Sets `key` to `value`, replacing any previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `true` when no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders `k1=v1&k2=v2` with every key and value percent-encoded.
    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, COMPONENT),
                    utf8_percent_encode(v, COMPONENT)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Appends the encoded parameters to `endpoint`, using `?` or `&`
    /// depending on whether the endpoint already carries a query string.
    pub fn append_to(&self, endpoint: &str) -> String {
        if self.is_empty() {
            return endpoint.to_string();
        }
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        format!("{endpoint}{separator}{}", self.encode())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

/// Normalizes one serialized field. `Ok(None)` means "leave it out".
fn normalize(key: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match scalar(item) {
                    Some(Some(s)) => parts.push(s),
                    Some(None) => {}
                    None => {
                        return Err(FleetError::InvalidRequest(format!(
                            "parameter '{key}' contains a nested value"
                        )));
                    }
                }
            }
            Ok((!parts.is_empty()).then(|| parts.join(",")))
        }
        other => scalar(other).ok_or_else(|| {
            FleetError::InvalidRequest(format!("parameter '{key}' must be a scalar or a list"))
        }),
    }
}

/// `None` for non-scalars, `Some(None)` for values that encode to nothing.
fn scalar(value: Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::Bool(b) => Some(Some(b.to_string())),
        Value::Number(n) => Some(Some(n.to_string())),
        Value::String(s) if s.is_empty() => Some(None),
        Value::String(s) => Some(Some(s)),
        Value::Array(_) | Value::Object(_) => None,
    }
}
