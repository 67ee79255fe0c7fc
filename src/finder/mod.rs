//! # Finders: pulling the value under test out of a response
//!
//! A [`Finder`] is a pure function `&Response -> Value`. Assertions call it to
//! obtain the actual value they compare against their reference.
//!
//! Finders are total: a path that does not resolve yields `Value::Null`, which
//! then simply fails whatever comparison the assertion performs.
//!
//! ## Path syntax
//!
//! | Path               | Meaning                              |
//! |--------------------|--------------------------------------|
//! | `$.data.token`     | nested object field                  |
//! | `data.token`       | same, `$.` is optional               |
//! | `$.users[0].id`    | array index                          |
//! | `$.items[*]`       | every element (returns the array)    |
//! | `$`                | the whole body                       |

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::Response;

/// Extracts the actual value an assertion compares.
#[derive(Clone)]
pub struct Finder(Arc<dyn Fn(&Response) -> Value + Send + Sync>);

impl Finder {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Response) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn find(&self, response: &Response) -> Value {
        (self.0)(response)
    }

    /// The whole response body.
    pub fn body() -> Self {
        Self::from_fn(|response| response.body.clone())
    }

    /// HTTP status code as a JSON number.
    pub fn status_code() -> Self {
        Self::from_fn(|response| Value::from(response.status_code))
    }

    /// Response header value (case-insensitive name), `null` if absent.
    pub fn header(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::from_fn(move |response| {
            response
                .headers
                .get(&name)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null)
        })
    }

    /// Value at `path` inside the body, `null` if the path does not resolve.
    pub fn json_path(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::from_fn(move |response| lookup(&response.body, &path).unwrap_or(Value::Null))
    }

    /// First capture group (or whole match) of `pattern` against the body text.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let re = Regex::new(pattern)?;
        Ok(Self::from_fn(move |response| {
            let text = match &response.body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            re.captures(&text)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null)
        }))
    }
}

impl fmt::Debug for Finder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Finder(..)")
    }
}

// ============================================================================
// PATH NAVIGATION
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("field '{0}' not found")]
    MissingField(String),

    #[error("index {index} out of bounds (array has {len} elements)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("invalid array index '{0}'")]
    InvalidIndex(String),

    #[error("expected {expected} at '{segment}', found {found}")]
    WrongType {
        segment: String,
        expected: &'static str,
        found: String,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(String),
}

/// Resolves `path` against `value`.
pub fn lookup(value: &Value, path: &str) -> Result<Value, PathError> {
    let clean = path.strip_prefix('$').unwrap_or(path);
    let clean = clean.strip_prefix('.').unwrap_or(clean);

    let mut current = value;
    for segment in split_path(clean) {
        match segment {
            Segment::Field(name) => {
                current = match current {
                    Value::Object(map) => map
                        .get(&name)
                        .ok_or_else(|| PathError::MissingField(name.clone()))?,
                    other => {
                        return Err(PathError::WrongType {
                            segment: name,
                            expected: "object",
                            found: type_name(other).to_string(),
                        })
                    }
                };
            }
            Segment::Index(raw) => {
                let items = match current {
                    Value::Array(items) => items,
                    other => {
                        return Err(PathError::WrongType {
                            segment: format!("[{}]", raw),
                            expected: "array",
                            found: type_name(other).to_string(),
                        })
                    }
                };
                if raw == "*" {
                    continue;
                }
                let index: usize = raw.parse().map_err(|_| PathError::InvalidIndex(raw))?;
                current = items.get(index).ok_or(PathError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                })?;
            }
        }
    }

    Ok(current.clone())
}

/// `users[0].name` → `[Field(users), Index(0), Field(name)]`.
fn split_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut field = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !field.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                }
            }
            '[' => {
                if !field.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                }
                let index: String = chars.by_ref().take_while(|&c| c != ']').collect();
                segments.push(Segment::Index(index));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() {
        segments.push(Segment::Field(field));
    }

    segments
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
