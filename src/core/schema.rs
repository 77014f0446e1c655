//! Schema validation for capability parameters and return values.
//!
//! A deliberately small JSON Schema subset: `required` lists, the seven
//! core types, inclusive `minimum`/`maximum` on numerics, and `pattern` on
//! strings. The absence of a schema means "no constraint". A malformed
//! regex pattern is logged and skipped rather than failing closed.

use regex::Regex;
use serde_json::Value;

use crate::errors::{ErrorCode, HostlinkError};

/// Validates parameters and return values against declared schemas.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate request parameters against a capability's parameter schema.
    pub fn validate_parameters(
        &self,
        capability_id: &str,
        schema: Option<&Value>,
        parameters: &Value,
    ) -> Result<(), HostlinkError> {
        let Some(schema) = schema else {
            return Ok(());
        };
        let Some(schema_obj) = schema.as_object() else {
            return Ok(());
        };

        // Required names must all be present.
        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if parameters.get(name).is_none() {
                    return Err(HostlinkError::parameter_required(format!(
                        "required parameter '{name}' is missing for capability {capability_id}"
                    )));
                }
            }
        }

        // Each declared property present in the parameters is checked.
        if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
            for (name, property_schema) in properties {
                if let Some(value) = parameters.get(name) {
                    self.check_property(name, value, property_schema)?;
                }
            }
        }

        tracing::debug!(capability_id, "parameters validated");
        Ok(())
    }

    /// Validate a return value against a capability's return schema.
    ///
    /// Only the top-level declared type is checked; return values are
    /// produced by trusted in-process handlers, not remote input.
    pub fn validate_return(
        &self,
        capability_id: &str,
        schema: Option<&Value>,
        value: &Value,
    ) -> Result<(), HostlinkError> {
        let Some(schema) = schema else {
            return Ok(());
        };
        if let Some(expected) = schema.get("type").and_then(Value::as_str) {
            self.check_type("return value", value, expected)
                .map_err(|err| HostlinkError::Validation {
                    code: ErrorCode::SchemaValidationFailed,
                    message: format!("{err} for capability {capability_id}"),
                })?;
        }
        tracing::debug!(capability_id, "return value validated");
        Ok(())
    }

    fn check_property(
        &self,
        name: &str,
        value: &Value,
        property_schema: &Value,
    ) -> Result<(), HostlinkError> {
        if let Some(expected) = property_schema.get("type").and_then(Value::as_str) {
            self.check_type(name, value, expected)
                .map_err(HostlinkError::parameter_invalid)?;
        }

        // Inclusive numeric bounds.
        if let Some(number) = value.as_f64() {
            if let Some(minimum) = property_schema.get("minimum").and_then(Value::as_f64) {
                if number < minimum {
                    return Err(HostlinkError::parameter_invalid(format!(
                        "parameter '{name}' must be at least {minimum}"
                    )));
                }
            }
            if let Some(maximum) = property_schema.get("maximum").and_then(Value::as_f64) {
                if number > maximum {
                    return Err(HostlinkError::parameter_invalid(format!(
                        "parameter '{name}' must be at most {maximum}"
                    )));
                }
            }
        }

        // String pattern; a malformed pattern is skipped, not failed closed.
        if let (Some(text), Some(pattern)) = (
            value.as_str(),
            property_schema.get("pattern").and_then(Value::as_str),
        ) {
            match Regex::new(pattern) {
                Ok(regex) => {
                    if !regex.is_match(text) {
                        return Err(HostlinkError::parameter_invalid(format!(
                            "parameter '{name}' does not match pattern: {pattern}"
                        )));
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        parameter = name,
                        pattern,
                        %err,
                        "invalid regex pattern in schema, skipping"
                    );
                }
            }
        }

        Ok(())
    }

    fn check_type(&self, name: &str, value: &Value, expected: &str) -> Result<(), String> {
        let ok = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            other => {
                tracing::debug!(name, expected = other, "unknown schema type, skipping");
                true
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{name} must be a {expected}"))
        }
    }
}
