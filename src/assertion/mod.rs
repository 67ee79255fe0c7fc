//! # Assertions
//!
//! An assertion checks one value extracted from a response against a reference
//! value:
//!
//! ```text
//! finder(response)  <comparator>  reference
//!   "server reply"     equal      "server reply"   → success
//! ```
//!
//! Comparisons never fail outward. A comparator that cannot evaluate its
//! operands (type mismatch, broken regex, missing configuration) produces a
//! report with `success = false` and the reason in `error`.
//!
//! ## Severity
//!
//! Severity classifies the assertion in reports and sets the log level used
//! when it fails. It does not change whether the owning node succeeds: any
//! failed assertion fails the node.
//!
//! | Severity | Log level on failure |
//! |----------|----------------------|
//! | ERROR    | error                |
//! | WARNING  | warn                 |
//! | LOG      | info                 |
//! | IGNORE   | debug                |

mod comparator;

pub use comparator::{Comparator, ComparisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::finder::Finder;
use crate::protocol::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Log,
    Ignore,
}

/// Outcome of a single comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionReport {
    pub severity: Severity,
    /// `"<actual> <comparator> <reference>"`.
    pub comparison: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// One configured response check.
#[derive(Debug, Clone)]
pub struct Assertion {
    severity: Severity,
    reference: Option<Value>,
    comparator: Option<Comparator>,
    finder: Option<Finder>,
    last_report: Option<AssertionReport>,
}

impl Assertion {
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            reference: None,
            comparator: None,
            finder: None,
            last_report: None,
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn set_reference_value(&mut self, reference: Value) {
        self.reference = Some(reference);
    }

    pub fn set_comparator(&mut self, comparator: Comparator) {
        self.comparator = Some(comparator);
    }

    pub fn set_finder(&mut self, finder: Finder) {
        self.finder = Some(finder);
    }

    pub fn with_reference_value(mut self, reference: Value) -> Self {
        self.set_reference_value(reference);
        self
    }

    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.set_comparator(comparator);
        self
    }

    pub fn with_finder(mut self, finder: Finder) -> Self {
        self.set_finder(finder);
        self
    }

    /// Most recent report; `None` until the first comparison.
    pub fn report(&self) -> Option<&AssertionReport> {
        self.last_report.as_ref()
    }

    /// Compares `actual` with the configured comparator and reference.
    pub fn compare(&mut self, actual: &Value) -> AssertionReport {
        let report = match (self.comparator, self.reference.as_ref()) {
            (Some(comparator), Some(reference)) => build_report(
                self.severity,
                actual,
                comparator.name(),
                reference,
                comparator.apply(actual, reference),
            ),
            (None, _) => self.unconfigured(actual, "comparator"),
            (_, None) => self.unconfigured(actual, "reference value"),
        };
        self.record(report)
    }

    /// Runs the finder on `response` and compares the result.
    pub fn compare_value_from_result(&mut self, response: &Response) -> AssertionReport {
        match self.finder.clone() {
            Some(finder) => {
                let actual = finder.find(response);
                self.compare(&actual)
            }
            None => {
                let report = self.unconfigured(&Value::Null, "finder");
                self.record(report)
            }
        }
    }

    /// Ad-hoc comparison that ignores the configured finder, comparator and
    /// reference. The comparator is looked up by name (`"equal"`, `"gt"`, ...).
    pub fn direct_compare(
        &mut self,
        actual: &Value,
        comparator_name: &str,
        reference: &Value,
    ) -> AssertionReport {
        let outcome = comparator_name
            .parse::<Comparator>()
            .and_then(|comparator| comparator.apply(actual, reference));
        let report = build_report(self.severity, actual, comparator_name, reference, outcome);
        self.record(report)
    }

    fn unconfigured(&self, actual: &Value, missing: &'static str) -> AssertionReport {
        let err = ComparisonError::NotConfigured(missing);
        AssertionReport {
            severity: self.severity,
            comparison: format!("{} <unconfigured>", render(actual)),
            success: false,
            error: Some(err.to_string()),
            error_code: Some(err.code().formatted()),
        }
    }

    fn record(&mut self, report: AssertionReport) -> AssertionReport {
        if !report.success {
            log_failure(&report);
        }
        self.last_report = Some(report.clone());
        report
    }
}

fn build_report(
    severity: Severity,
    actual: &Value,
    comparator: &str,
    reference: &Value,
    outcome: Result<bool, ComparisonError>,
) -> AssertionReport {
    let comparison = format!("{} {} {}", render(actual), comparator, render(reference));
    match outcome {
        Ok(success) => AssertionReport {
            severity,
            comparison,
            success,
            error: None,
            error_code: None,
        },
        Err(err) => AssertionReport {
            severity,
            comparison,
            success: false,
            error: Some(err.to_string()),
            error_code: Some(err.code().formatted()),
        },
    }
}

/// Strings render bare, everything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn log_failure(report: &AssertionReport) {
    let reason = report.error.as_deref().unwrap_or("comparison is false");
    match report.severity {
        Severity::Error => error!(comparison = %report.comparison, reason, "Assertion failed"),
        Severity::Warning => warn!(comparison = %report.comparison, reason, "Assertion failed"),
        Severity::Log => info!(comparison = %report.comparison, reason, "Assertion failed"),
        Severity::Ignore => debug!(comparison = %report.comparison, reason, "Assertion failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_is_empty_before_comparison() {
        let assertion = Assertion::new(Severity::Error);
        assert!(assertion.report().is_none());
    }

    #[test]
    fn test_direct_compare_success() {
        let mut assertion = Assertion::new(Severity::Log);
        let report = assertion.direct_compare(&json!(1), "equal", &json!(1));

        assert!(report.success);
        assert_eq!(report.comparison, "1 equal 1");
        assert_eq!(assertion.report(), Some(&report));
    }

    #[test]
    fn test_direct_compare_failure_does_not_raise() {
        let mut assertion = Assertion::new(Severity::Error);
        let report = assertion.direct_compare(&json!("asd"), "equal", &json!("asdd"));

        assert!(!report.success);
        assert_eq!(report.comparison, "asd equal asdd");
        assert!(report.error.is_none());
    }

    #[test]
    fn test_direct_compare_unknown_comparator() {
        let mut assertion = Assertion::new(Severity::Warning);
        let report = assertion.direct_compare(&json!(1), "roughly", &json!(1));

        assert!(!report.success);
        assert_eq!(report.comparison, "1 roughly 1");
        assert_eq!(report.error_code.as_deref(), Some("E3002"));
    }

    #[test]
    fn test_type_mismatch_becomes_failed_report() {
        let mut assertion = Assertion::new(Severity::Error)
            .with_comparator(Comparator::IsAbove)
            .with_reference_value(json!(10));

        let report = assertion.compare(&json!({"not": "a number"}));
        assert!(!report.success);
        assert_eq!(report.error_code.as_deref(), Some("E3001"));
        assert!(report.error.unwrap().contains("isAbove"));
    }

    #[test]
    fn test_finder_based_comparison() {
        let response = Response::new(200, json!({"key_one": {"key_two": "value"}}));
        let mut assertion = Assertion::new(Severity::Log)
            .with_finder(Finder::json_path("key_one.key_two"))
            .with_comparator(Comparator::Equal)
            .with_reference_value(json!("value"));

        let report = assertion.compare_value_from_result(&response);
        assert!(report.success);
        assert_eq!(report.comparison, "value equal value");
    }

    #[test]
    fn test_setters_configure_assertion() {
        let mut assertion = Assertion::new(Severity::Ignore);
        assertion.set_finder(Finder::status_code());
        assertion.set_comparator(Comparator::IsBelow);
        assertion.set_reference_value(json!(400));

        let report = assertion.compare_value_from_result(&Response::new(204, Value::Null));
        assert!(report.success);
        assert_eq!(report.severity, Severity::Ignore);
    }

    #[test]
    fn test_unconfigured_fields_fail() {
        let mut assertion = Assertion::new(Severity::Error).with_reference_value(json!(1));
        let report = assertion.compare(&json!(1));
        assert!(!report.success);
        assert!(report.error.unwrap().contains("comparator"));

        let mut assertion = Assertion::new(Severity::Error)
            .with_comparator(Comparator::Equal)
            .with_reference_value(json!(1));
        let report = assertion.compare_value_from_result(&Response::new(200, json!(1)));
        assert!(!report.success);
        assert_eq!(report.error_code.as_deref(), Some("E3004"));
    }

    #[test]
    fn test_each_comparison_produces_fresh_report() {
        let mut assertion = Assertion::new(Severity::Log)
            .with_comparator(Comparator::Equal)
            .with_reference_value(json!("ok"));

        assert!(!assertion.compare(&json!("nope")).success);
        assert!(assertion.compare(&json!("ok")).success);
        assert!(assertion.report().unwrap().success);
    }

    #[test]
    fn test_severity_serialization() {
        let report = AssertionReport {
            severity: Severity::Warning,
            comparison: "1 equal 2".to_string(),
            success: false,
            error: None,
            error_code: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["severity"], "warning");
        assert!(json.get("error").is_none());
    }
}
