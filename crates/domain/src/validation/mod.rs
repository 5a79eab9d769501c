//! Order validation: structured results and the rule engine.

mod engine;

pub use engine::{OrderValidator, ValidationSettings, business_days_between};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::order::Money;

/// Machine-readable validation error codes.
pub mod codes {
    pub const REQUIRED: &str = "REQUIRED";
    pub const INVALID_DATE: &str = "INVALID_DATE";
    pub const CUSTOMER_NOT_FOUND: &str = "CUSTOMER_NOT_FOUND";
    pub const CUSTOMER_INACTIVE: &str = "CUSTOMER_INACTIVE";
    pub const CUSTOMER_VALIDATION_ERROR: &str = "CUSTOMER_VALIDATION_ERROR";
    pub const INVALID_QUANTITY: &str = "INVALID_QUANTITY";
    pub const INVALID_PRICE: &str = "INVALID_PRICE";
    pub const PRODUCT_NOT_FOUND: &str = "PRODUCT_NOT_FOUND";
    pub const PRODUCT_INACTIVE: &str = "PRODUCT_INACTIVE";
    pub const PRICE_MISMATCH: &str = "PRICE_MISMATCH";
    pub const PRODUCT_VALIDATION_ERROR: &str = "PRODUCT_VALIDATION_ERROR";
    pub const ORDER_VALUE_EXCEEDED: &str = "ORDER_VALUE_EXCEEDED";
    pub const TOO_MANY_ITEMS: &str = "TOO_MANY_ITEMS";
    pub const INSUFFICIENT_LEAD_TIME: &str = "INSUFFICIENT_LEAD_TIME";
    pub const VALIDATION_EXCEPTION: &str = "VALIDATION_EXCEPTION";
}

/// Error codes that escalate a failed order regardless of its value.
pub const CRITICAL_ERROR_CODES: [&str; 4] = [
    codes::CUSTOMER_NOT_FOUND,
    codes::PRODUCT_NOT_FOUND,
    codes::PRICE_MISMATCH,
    codes::ORDER_VALUE_EXCEEDED,
];

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_value: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.to_string(),
            message: message.into(),
            attempted_value: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_attempted_value(mut self, value: impl Into<Value>) -> Self {
        self.attempted_value = Some(value.into());
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of validating one order.
///
/// A rejected order is an expected business outcome carried in this value,
/// never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default)]
    pub validation_data: BTreeMap<String, Value>,
    pub validated_at: DateTime<Utc>,
    #[serde(default)]
    pub validated_by: String,
}

impl ValidationResult {
    pub(crate) fn started(validated_by: &str) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            validation_data: BTreeMap::new(),
            validated_at: Utc::now(),
            validated_by: validated_by.to_string(),
        }
    }

    /// Result describing a validation run that could not complete.
    pub fn exception(validated_by: &str, detail: impl Into<String>) -> Self {
        let mut result = Self::started(validated_by);
        result.push(
            ValidationError::new(
                "System",
                codes::VALIDATION_EXCEPTION,
                "An unexpected error occurred during validation",
            )
            .with_context("Exception", detail.into()),
        );
        result.is_valid = false;
        result
    }

    pub(crate) fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn error_codes(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.code.as_str()).collect()
    }

    /// Returns every error message, in rule order.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    /// Joined error messages, used as a failure reason.
    pub fn summary(&self) -> String {
        self.error_messages().join("; ")
    }

    /// Returns true if this failure warrants escalation: the order is worth more
    /// than `threshold`, or one of the errors is in [`CRITICAL_ERROR_CODES`].
    pub fn is_high_value_failure(&self, order_total: Money, threshold: Money) -> bool {
        if self.is_valid {
            return false;
        }
        order_total.cents() > threshold.cents()
            || self
                .errors
                .iter()
                .any(|e| CRITICAL_ERROR_CODES.contains(&e.code.as_str()))
    }

    /// The most significant error code, for escalation categories.
    pub fn primary_error_code(&self) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| CRITICAL_ERROR_CODES.contains(&e.code.as_str()))
            .or_else(|| self.errors.first())
            .map(|e| e.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_with(code: &str) -> ValidationResult {
        let mut result = ValidationResult::started("test");
        result.push(ValidationError::new("Field", code, "broken"));
        result.is_valid = false;
        result
    }

    #[test]
    fn valid_results_are_never_high_value_failures() {
        let result = ValidationResult::started("test");
        assert!(!result.is_high_value_failure(Money::from_dollars(50_000), Money::from_dollars(1000)));
    }

    #[test]
    fn high_value_by_total_or_critical_code() {
        let threshold = Money::from_dollars(1000);

        let minor = failed_with(codes::INVALID_QUANTITY);
        assert!(!minor.is_high_value_failure(Money::from_dollars(10), threshold));
        assert!(minor.is_high_value_failure(Money::from_dollars(1001), threshold));

        let critical = failed_with(codes::PRODUCT_NOT_FOUND);
        assert!(critical.is_high_value_failure(Money::from_dollars(10), threshold));
    }

    #[test]
    fn primary_error_prefers_critical_codes() {
        let mut result = failed_with(codes::INVALID_QUANTITY);
        result.push(ValidationError::new("Items[1].UnitPrice", codes::PRICE_MISMATCH, "x"));
        assert_eq!(result.primary_error_code(), Some(codes::PRICE_MISMATCH));
    }

    #[test]
    fn exception_result_uses_system_field() {
        let result = ValidationResult::exception("test", "order total overflow");
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].field, "System");
        assert_eq!(result.errors[0].code, codes::VALIDATION_EXCEPTION);
        assert_eq!(result.errors[0].context["Exception"], "order total overflow");
    }

    #[test]
    fn serializes_camel_case_and_skips_empty_context() {
        let error = ValidationError::new("CustomerId", codes::REQUIRED, "Customer ID is required");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "REQUIRED");
        assert!(json.get("context").is_none());
        assert!(json.get("attemptedValue").is_none());
    }
}
