//! # Formations: query strings and header blocks
//!
//! A formation is a small ordered key/value collection that can be read from
//! and written to a canonical text form. Two codecs exist:
//!
//! - [`QueryString`]: `application/x-www-form-urlencoded` (`a=1&b=two+words`)
//! - [`HeaderFormation`]: one `Key: value` pair per line
//!
//! Both keep keys in first-insertion order; assigning an existing key replaces
//! its value in place.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Errors raised while building a formation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormationError {
    #[error("query string segment '{segment}' is not valid percent-encoded UTF-8")]
    InvalidEncoding { segment: String },

    #[error("header name '{0}' must be non-empty and contain no ':' or line breaks")]
    InvalidHeaderName(String),

    #[error("header '{name}' has a value containing a line break")]
    InvalidHeaderValue { name: String },
}

/// Capability shared by every formation codec.
pub trait Formation {
    /// Key/value view. Duplicate keys have already been collapsed.
    fn to_key_value_map(&self) -> BTreeMap<String, String>;

    /// Canonical text form, re-serialised from the entries.
    fn to_canonical_string(&self) -> String;

    /// Keys in first-insertion order.
    fn list_keys(&self) -> Vec<String>;
}

/// Ordered entries with replace-in-place semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entries(Vec<(String, String)>);

impl Entries {
    fn insert(&mut self, key: String, value: String) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn to_map(&self) -> BTreeMap<String, String> {
        self.0.iter().cloned().collect()
    }

    fn keys(&self) -> Vec<String> {
        self.0.iter().map(|(k, _)| k.clone()).collect()
    }

    fn serialize_as_map<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ============================================================================
// QUERY STRING
// ============================================================================

/// URL query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    entries: Entries,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value&...`. A leading `?` is ignored, `+` decodes to a space
    /// and a segment without `=` becomes a key with an empty value.
    pub fn parse(input: &str) -> Result<Self, FormationError> {
        let mut query = Self::new();
        let trimmed = input.strip_prefix('?').unwrap_or(input);

        for segment in trimmed.split('&').filter(|s| !s.is_empty()) {
            let (raw_key, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
            let key = decode_component(raw_key, segment)?;
            let value = decode_component(raw_value, segment)?;
            query.entries.insert(key, value);
        }

        Ok(query)
    }

    /// Builds a query from pairs; values are stored verbatim and encoded on output.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut query = Self::new();
        for (k, v) in pairs {
            query.entries.insert(k.into(), v.into());
        }
        query
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.0.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Formation for QueryString {
    fn to_key_value_map(&self) -> BTreeMap<String, String> {
        self.entries.to_map()
    }

    fn to_canonical_string(&self) -> String {
        self.entries
            .0
            .iter()
            .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn list_keys(&self) -> Vec<String> {
        self.entries.keys()
    }
}

impl Serialize for QueryString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize_as_map(serializer)
    }
}

fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}

fn decode_component(raw: &str, segment: &str) -> Result<String, FormationError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| FormationError::InvalidEncoding {
            segment: segment.to_string(),
        })
}

// ============================================================================
// HEADERS
// ============================================================================

const HEADER_SEPARATOR: &str = ": ";

/// Block of `Key: value` header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFormation {
    entries: Entries,
}

impl HeaderFormation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses newline-separated `Key: value` lines. Lines without `": "` are
    /// skipped and the value is trimmed.
    ///
    /// Only the first `": "` splits, so everything after it is the value:
    ///
    /// ```text
    /// X-Trace: a: b   →   ("X-Trace", "a: b")
    /// ```
    pub fn parse(input: &str) -> Self {
        let mut headers = Self::new();
        for line in input.lines() {
            if let Some((key, value)) = line.split_once(HEADER_SEPARATOR) {
                headers.entries.insert(key.to_string(), value.trim().to_string());
            }
        }
        headers
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, FormationError>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut headers = Self::new();
        for (k, v) in pairs {
            headers.set(k, v)?;
        }
        Ok(headers)
    }

    /// Inserts or replaces a header after checking it survives a text round trip.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), FormationError> {
        let key = key.into();
        let value = value.into();

        if key.is_empty() || key.contains(':') || key.contains(['\n', '\r']) {
            return Err(FormationError::InvalidHeaderName(key));
        }
        if value.contains(['\n', '\r']) {
            return Err(FormationError::InvalidHeaderValue { name: key });
        }

        self.entries.insert(key, value.trim().to_string());
        Ok(())
    }

    /// Case-insensitive lookup, as HTTP header names are case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.0.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Formation for HeaderFormation {
    fn to_key_value_map(&self) -> BTreeMap<String, String> {
        self.entries.to_map()
    }

    fn to_canonical_string(&self) -> String {
        self.entries
            .0
            .iter()
            .map(|(k, v)| format!("{}{}{}", k, HEADER_SEPARATOR, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn list_keys(&self) -> Vec<String> {
        self.entries.keys()
    }
}

impl Serialize for HeaderFormation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize_as_map(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // Query strings
    // ------------------------------------------------------------------------

    #[test]
    fn test_query_parse_basic() {
        let query = QueryString::parse("key1=value1&key2=value2").unwrap();
        assert_eq!(query.get("key1"), Some("value1"));
        assert_eq!(query.list_keys(), vec!["key1", "key2"]);
    }

    #[test]
    fn test_query_parse_decodes_plus_and_percent() {
        let query = QueryString::parse("?q=two+words&path=%2Fapi%2Fusers").unwrap();
        assert_eq!(query.get("q"), Some("two words"));
        assert_eq!(query.get("path"), Some("/api/users"));
    }

    #[test]
    fn test_query_key_without_value() {
        let query = QueryString::parse("flag&x=1").unwrap();
        assert_eq!(query.get("flag"), Some(""));
        assert_eq!(query.to_canonical_string(), "flag=&x=1");
    }

    #[test]
    fn test_query_duplicate_key_replaces_in_place() {
        let query = QueryString::parse("a=1&b=2&a=3").unwrap();
        assert_eq!(query.list_keys(), vec!["a", "b"]);
        assert_eq!(query.get("a"), Some("3"));
    }

    #[test]
    fn test_query_invalid_encoding() {
        let err = QueryString::parse("bad=%FF%FE").unwrap_err();
        assert!(matches!(err, FormationError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_query_canonical_string_encodes() {
        let query = QueryString::from_pairs([("name", "John Doe"), ("tag", "a&b")]);
        assert_eq!(query.to_canonical_string(), "name=John+Doe&tag=a%26b");
    }

    #[test]
    fn test_query_map_view() {
        let query = QueryString::from_pairs([("z", "1"), ("a", "2")]);
        let map = query.to_key_value_map();
        assert_eq!(map.get("z").map(String::as_str), Some("1"));
        assert_eq!(map.len(), 2);
    }

    // ------------------------------------------------------------------------
    // Headers
    // ------------------------------------------------------------------------

    #[test]
    fn test_header_parse_from_string() {
        let text = "Content-Type: application/json\nAuthentication: Basic asd123\n\t\t";
        let headers = HeaderFormation::parse(text);
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
        assert_eq!(headers.list_keys().len(), 2);
    }

    #[test]
    fn test_header_canonical_string_from_pairs() {
        let headers = HeaderFormation::from_pairs([
            ("Content-Type", "application/json"),
            ("Authentication", "Basic asd123"),
        ])
        .unwrap();

        assert_eq!(
            headers.to_canonical_string(),
            "Content-Type: application/json\nAuthentication: Basic asd123"
        );
        assert_eq!(headers.list_keys(), vec!["Content-Type", "Authentication"]);
    }

    #[test]
    fn test_header_ignores_lines_without_separator() {
        let headers = HeaderFormation::parse("garbage\nX-Id:no-space\nX-Ok: yes");
        assert_eq!(headers.list_keys(), vec!["X-Ok"]);
    }

    #[test]
    fn test_header_splits_on_first_separator() {
        let headers = HeaderFormation::parse("X-Trace: a: b  ");
        assert_eq!(headers.get("x-trace"), Some("a: b"));
    }

    #[test]
    fn test_header_rejects_invalid_name() {
        let err = HeaderFormation::from_pairs([("Bad: Name", "v")]).unwrap_err();
        assert!(matches!(err, FormationError::InvalidHeaderName(_)));

        let err = HeaderFormation::from_pairs([("X-Multi", "a\nb")]).unwrap_err();
        assert!(matches!(err, FormationError::InvalidHeaderValue { .. }));
    }

    #[test]
    fn test_formation_serializes_as_ordered_map() {
        let headers = HeaderFormation::from_pairs([("B", "2"), ("A", "1")]).unwrap();
        let json = serde_json::to_string(&headers).unwrap();
        assert_eq!(json, r#"{"B":"2","A":"1"}"#);
    }
}
