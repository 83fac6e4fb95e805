//! Argument schemas and field validation for catalog tools.
//!
//! The JSON Schema advertised by `tools/list` is generated from the argument
//! struct with schemars; the same constraints are enforced here before a
//! handler runs, since the schema alone is only advisory to callers.

use std::sync::LazyLock;

use parley_types::error::FieldViolation;
use regex::Regex;
use schemars::JsonSchema;
use serde_json::Value;

/// Field-level validation of deserialized tool arguments.
pub trait ValidateArgs {
    /// Every violated constraint; empty when the arguments are acceptable.
    fn validate(&self) -> Vec<FieldViolation>;
}

// local@domain.tld, no whitespace, no quoting.
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// Character length (not bytes) within `[min, max]`.
pub fn check_length(
    violations: &mut Vec<FieldViolation>,
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.chars().count();
    if len < min || len > max {
        violations.push(FieldViolation::new(
            field,
            format!("must be between {min} and {max} characters"),
        ));
    }
}

pub fn check_email(violations: &mut Vec<FieldViolation>, field: &str, value: &str) {
    let local = value.split('@').next().unwrap_or_default();
    let valid = EMAIL.is_match(value)
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !value.contains("..");
    if !valid {
        violations.push(FieldViolation::new(field, "must be a valid email address"));
    }
}

/// JSON Schema for `T` as a plain object schema (no `$schema`/`title`).
pub fn input_schema<T: JsonSchema>() -> Value {
    let mut value = schemars::schema_for!(T).to_value();
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    value
}
