use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::errors::ErrorCode;
use crate::finder::type_name;

/// Named binary predicate applied as `actual <comparator> reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Comparator {
    /// Loose equality: `1 == 1.0`, `"42" == 42`.
    Equal,
    NotEqual,
    /// Same JSON type and same value.
    StrictEqual,
    /// Structural equality of whole JSON trees.
    DeepEqual,
    IsAbove,
    IsAtLeast,
    IsBelow,
    IsAtMost,
    /// Substring, array member or object key.
    Include,
    NotInclude,
    /// String matched against a regex reference.
    Match,
    /// Length of an array, string or object equals the reference number.
    LengthOf,
}

static COMPARATOR_NAMES: Lazy<HashMap<&'static str, Comparator>> = Lazy::new(|| {
    use Comparator::*;
    HashMap::from([
        ("equal", Equal),
        ("equals", Equal),
        ("eq", Equal),
        ("notequal", NotEqual),
        ("not-equal", NotEqual),
        ("not_equal", NotEqual),
        ("neq", NotEqual),
        ("strictequal", StrictEqual),
        ("deepequal", DeepEqual),
        ("isabove", IsAbove),
        ("greater-than", IsAbove),
        ("gt", IsAbove),
        ("isatleast", IsAtLeast),
        ("gte", IsAtLeast),
        ("isbelow", IsBelow),
        ("less-than", IsBelow),
        ("lt", IsBelow),
        ("isatmost", IsAtMost),
        ("lte", IsAtMost),
        ("include", Include),
        ("contains", Include),
        ("notinclude", NotInclude),
        ("not-contains", NotInclude),
        ("match", Match),
        ("regex", Match),
        ("lengthof", LengthOf),
        ("length", LengthOf),
    ])
});

/// Reasons a comparison could not be evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComparisonError {
    #[error("{comparator} cannot compare {actual} with {reference}")]
    TypeMismatch {
        comparator: &'static str,
        actual: &'static str,
        reference: &'static str,
    },

    #[error("unknown comparator '{0}'")]
    UnknownComparator(String),

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("assertion has no {0} configured")]
    NotConfigured(&'static str),
}

impl ComparisonError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TypeMismatch { .. } => ErrorCode::ASSERTION_TYPE_MISMATCH,
            Self::UnknownComparator(_) => ErrorCode::ASSERTION_UNKNOWN_COMPARATOR,
            Self::InvalidPattern { .. } => ErrorCode::ASSERTION_INVALID_PATTERN,
            Self::NotConfigured(_) => ErrorCode::ASSERTION_NOT_CONFIGURED,
        }
    }
}

impl Comparator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::NotEqual => "notEqual",
            Self::StrictEqual => "strictEqual",
            Self::DeepEqual => "deepEqual",
            Self::IsAbove => "isAbove",
            Self::IsAtLeast => "isAtLeast",
            Self::IsBelow => "isBelow",
            Self::IsAtMost => "isAtMost",
            Self::Include => "include",
            Self::NotInclude => "notInclude",
            Self::Match => "match",
            Self::LengthOf => "lengthOf",
        }
    }

    pub fn apply(&self, actual: &Value, reference: &Value) -> Result<bool, ComparisonError> {
        match self {
            Self::Equal => Ok(loosely_equal(actual, reference)),
            Self::NotEqual => Ok(!loosely_equal(actual, reference)),
            Self::StrictEqual => Ok(strictly_equal(actual, reference)),
            Self::DeepEqual => Ok(actual == reference),
            Self::IsAbove => self.order(actual, reference).map(Ordering::is_gt),
            Self::IsAtLeast => self.order(actual, reference).map(Ordering::is_ge),
            Self::IsBelow => self.order(actual, reference).map(Ordering::is_lt),
            Self::IsAtMost => self.order(actual, reference).map(Ordering::is_le),
            Self::Include => self.includes(actual, reference),
            Self::NotInclude => self.includes(actual, reference).map(|found| !found),
            Self::Match => self.matches(actual, reference),
            Self::LengthOf => self.length_of(actual, reference),
        }
    }

    fn mismatch(&self, actual: &Value, reference: &Value) -> ComparisonError {
        ComparisonError::TypeMismatch {
            comparator: self.name(),
            actual: type_name(actual),
            reference: type_name(reference),
        }
    }

    fn order(&self, actual: &Value, reference: &Value) -> Result<Ordering, ComparisonError> {
        match (actual, reference) {
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b))
                .ok_or_else(|| self.mismatch(actual, reference)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(self.mismatch(actual, reference)),
        }
    }

    fn includes(&self, actual: &Value, reference: &Value) -> Result<bool, ComparisonError> {
        match (actual, reference) {
            (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
            (Value::Array(items), needle) => Ok(items.iter().any(|item| item == needle)),
            (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
            _ => Err(self.mismatch(actual, reference)),
        }
    }

    fn matches(&self, actual: &Value, reference: &Value) -> Result<bool, ComparisonError> {
        match (actual, reference) {
            (Value::String(text), Value::String(pattern)) => Regex::new(pattern)
                .map(|re| re.is_match(text))
                .map_err(|e| ComparisonError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                }),
            _ => Err(self.mismatch(actual, reference)),
        }
    }

    fn length_of(&self, actual: &Value, reference: &Value) -> Result<bool, ComparisonError> {
        let expected = reference
            .as_u64()
            .ok_or_else(|| self.mismatch(actual, reference))?;
        let len = match actual {
            Value::Array(items) => items.len(),
            Value::String(s) => s.chars().count(),
            Value::Object(map) => map.len(),
            _ => return Err(self.mismatch(actual, reference)),
        };
        Ok(len as u64 == expected)
    }
}

impl FromStr for Comparator {
    type Err = ComparisonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        COMPARATOR_NAMES
            .get(s.trim().to_lowercase().as_str())
            .copied()
            .ok_or_else(|| ComparisonError::UnknownComparator(s.to_string()))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        _ => a == b,
    }
}

fn strictly_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("equal".parse::<Comparator>().unwrap(), Comparator::Equal);
        assert_eq!("notEqual".parse::<Comparator>().unwrap(), Comparator::NotEqual);
        assert_eq!("not-equal".parse::<Comparator>().unwrap(), Comparator::NotEqual);
        assert_eq!("greater-than".parse::<Comparator>().unwrap(), Comparator::IsAbove);
        assert_eq!(" GTE ".parse::<Comparator>().unwrap(), Comparator::IsAtLeast);
        assert!(matches!(
            "roughly".parse::<Comparator>(),
            Err(ComparisonError::UnknownComparator(name)) if name == "roughly"
        ));
    }

    #[test]
    fn test_loose_versus_strict_equality() {
        assert!(Comparator::Equal.apply(&json!(42), &json!("42")).unwrap());
        assert!(!Comparator::StrictEqual.apply(&json!(42), &json!("42")).unwrap());
        assert!(Comparator::StrictEqual.apply(&json!(1), &json!(1.0)).unwrap());
        assert!(Comparator::NotEqual.apply(&json!("asd"), &json!("asdd")).unwrap());
    }

    #[test]
    fn test_deep_equal_objects() {
        let a = json!({"user": {"id": 1, "tags": ["a"]}});
        assert!(Comparator::DeepEqual.apply(&a, &a.clone()).unwrap());
        assert!(!Comparator::DeepEqual
            .apply(&a, &json!({"user": {"id": 1}}))
            .unwrap());
    }

    #[test]
    fn test_ordering() {
        assert!(Comparator::IsAbove.apply(&json!(201), &json!(200)).unwrap());
        assert!(Comparator::IsAtMost.apply(&json!(200), &json!(200)).unwrap());
        assert!(Comparator::IsBelow.apply(&json!("abc"), &json!("abd")).unwrap());
    }

    #[test]
    fn test_ordering_type_mismatch_is_an_error() {
        let err = Comparator::IsAbove.apply(&json!("asd"), &json!(3)).unwrap_err();
        assert_eq!(
            err,
            ComparisonError::TypeMismatch {
                comparator: "isAbove",
                actual: "string",
                reference: "number",
            }
        );
        assert_eq!(err.code(), ErrorCode::ASSERTION_TYPE_MISMATCH);
    }

    #[test]
    fn test_include() {
        assert!(Comparator::Include.apply(&json!("server reply"), &json!("reply")).unwrap());
        assert!(Comparator::Include.apply(&json!([1, 2, 3]), &json!(2)).unwrap());
        assert!(Comparator::Include.apply(&json!({"id": 1}), &json!("id")).unwrap());
        assert!(Comparator::NotInclude.apply(&json!([1, 2]), &json!(5)).unwrap());
        assert!(Comparator::Include.apply(&json!(12), &json!(1)).is_err());
    }

    #[test]
    fn test_match_and_invalid_pattern() {
        assert!(Comparator::Match
            .apply(&json!("order-1234"), &json!(r"^order-\d+$"))
            .unwrap());
        assert!(matches!(
            Comparator::Match.apply(&json!("x"), &json!("(")),
            Err(ComparisonError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_length_of() {
        assert!(Comparator::LengthOf.apply(&json!([1, 2, 3]), &json!(3)).unwrap());
        assert!(Comparator::LengthOf.apply(&json!("héllo"), &json!(5)).unwrap());
        assert!(Comparator::LengthOf.apply(&json!(true), &json!(1)).is_err());
    }
}
