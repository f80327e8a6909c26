//! Configuration validation against a declared schema
//!
//! Validation never fails hard: problems are returned as structured issues
//! and the caller decides whether to reject the configuration or go on with
//! the processed (defaulted) copy.

use dashmap::DashMap;
use nautilus_extension_api::{
    ExtensionCapabilities, ExtensionConfig, ExtensionConfigPatch, FieldSchema, FieldType,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Category of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationErrorKind {
    /// Required value missing
    Required,
    /// Value has the wrong JSON type
    Type,
    /// String does not match the pattern
    Format,
    /// Value, length or item count out of bounds
    Range,
    /// Value not among the allowed ones
    Enum,
    /// Anything else, e.g. an unusable pattern in the schema
    Custom,
}

/// A single validation issue
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationIssue {
    /// Offending field
    pub field: String,

    /// Issue category
    pub kind: ValidationErrorKind,

    /// Human readable message
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &str, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of [`ConfigValidator::validate`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// True iff there are no errors
    pub valid: bool,

    /// Errors
    pub errors: Vec<ValidationIssue>,

    /// Warnings; never affect validity
    pub warnings: Vec<String>,

    /// Input with schema defaults applied
    pub processed_config: ExtensionConfig,
}

impl ValidationResult {
    /// Errors joined into one line
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates extension configuration against declared capabilities
///
/// Compiled patterns are cached, so one validator should be shared.
#[derive(Debug, Clone, Default)]
pub struct ConfigValidator {
    patterns: Arc<DashMap<String, Regex>>,
}

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config` and apply schema defaults
    pub fn validate(
        &self,
        capabilities: &ExtensionCapabilities,
        config: &ExtensionConfig,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut processed = config.clone();

        if !config.enabled {
            warnings.push("extension is disabled".to_string());
        }

        let schema = &capabilities.config_schema;
        for (name, field) in schema {
            match config.settings.get(name) {
                None | Some(Value::Null) => {
                    if field.required {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Required,
                            "value is required",
                        ));
                    }
                    if let Some(default) = &field.default {
                        processed.settings.insert(name.clone(), default.clone());
                    }
                }
                Some(value) => self.check_field(name, field, value, &mut errors),
            }
        }

        if !schema.is_empty() {
            for key in config.settings.keys() {
                if !schema.contains_key(key) {
                    warnings.push(format!("setting {key} is not declared in the schema"));
                }
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
            processed_config: processed,
        }
    }

    fn check_field(
        &self,
        name: &str,
        field: &FieldSchema,
        value: &Value,
        errors: &mut Vec<ValidationIssue>,
    ) {
        let type_error = |errors: &mut Vec<ValidationIssue>| {
            errors.push(ValidationIssue::new(
                name,
                ValidationErrorKind::Type,
                format!("expected {}, got {}", field.field_type, json_type(value)),
            ));
        };

        match field.field_type {
            FieldType::String => {
                let Some(s) = value.as_str() else {
                    return type_error(errors);
                };
                let len = s.chars().count();
                if let Some(min) = field.min_length {
                    if len < min {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Range,
                            format!("must be at least {min} characters"),
                        ));
                    }
                }
                if let Some(max) = field.max_length {
                    if len > max {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Range,
                            format!("must be at most {max} characters"),
                        ));
                    }
                }
                if let Some(pattern) = &field.pattern {
                    match self.matches(pattern, s) {
                        Ok(true) => {}
                        Ok(false) => errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Format,
                            format!("does not match pattern {pattern}"),
                        )),
                        Err(e) => errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Custom,
                            format!("invalid pattern {pattern}: {e}"),
                        )),
                    }
                }
                check_enum(name, field, value, errors);
            }
            FieldType::Number => {
                let Some(n) = value.as_f64() else {
                    return type_error(errors);
                };
                if n.is_nan() {
                    return type_error(errors);
                }
                if let Some(min) = field.min {
                    if n < min {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Range,
                            format!("must be >= {min}"),
                        ));
                    }
                }
                if let Some(max) = field.max {
                    if n > max {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Range,
                            format!("must be <= {max}"),
                        ));
                    }
                }
                check_enum(name, field, value, errors);
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    type_error(errors);
                }
            }
            FieldType::Array => {
                let Some(items) = value.as_array() else {
                    return type_error(errors);
                };
                let count = items.len() as f64;
                if let Some(min) = field.min {
                    if count < min {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Range,
                            format!("must contain at least {min} items"),
                        ));
                    }
                }
                if let Some(max) = field.max {
                    if count > max {
                        errors.push(ValidationIssue::new(
                            name,
                            ValidationErrorKind::Range,
                            format!("must contain at most {max} items"),
                        ));
                    }
                }
            }
            FieldType::Object => {
                if !value.is_object() {
                    type_error(errors);
                }
            }
        }
    }

    fn matches(&self, pattern: &str, value: &str) -> Result<bool, regex::Error> {
        if let Some(re) = self.patterns.get(pattern) {
            return Ok(re.is_match(value));
        }
        let re = Regex::new(pattern)?;
        let matched = re.is_match(value);
        self.patterns.insert(pattern.to_string(), re);
        Ok(matched)
    }
}

fn check_enum(name: &str, field: &FieldSchema, value: &Value, errors: &mut Vec<ValidationIssue>) {
    if let Some(allowed) = &field.allowed {
        if !allowed.contains(value) {
            let choices = allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            errors.push(ValidationIssue::new(
                name,
                ValidationErrorKind::Enum,
                format!("must be one of {choices}"),
            ));
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Apply a partial update to a configuration
///
/// `patch.settings` keys win over `base.settings`; `enabled` and `priority`
/// fall back to `base` when absent.
pub fn merge_configs(base: &ExtensionConfig, patch: &ExtensionConfigPatch) -> ExtensionConfig {
    let mut settings = base.settings.clone();
    if let Some(overlay) = &patch.settings {
        for (key, value) in overlay {
            settings.insert(key.clone(), value.clone());
        }
    }

    ExtensionConfig {
        enabled: patch.enabled.unwrap_or(base.enabled),
        priority: patch.priority.unwrap_or(base.priority),
        settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps(name: &str, field: FieldSchema) -> ExtensionCapabilities {
        ExtensionCapabilities::new().field(name, field)
    }

    fn config(settings: Value) -> ExtensionConfig {
        serde_json::from_value(json!({ "settings": settings })).unwrap()
    }

    #[test]
    fn test_default_applied() {
        let validator = ConfigValidator::new();
        let result = validator.validate(
            &caps("pool_size", FieldSchema::number().default_value(20)),
            &config(json!({})),
        );

        assert!(result.valid);
        assert_eq!(result.processed_config.settings["pool_size"], json!(20));
    }

    #[test]
    fn test_required_missing() {
        let validator = ConfigValidator::new();
        let result = validator.validate(
            &caps("name", FieldSchema::string().required()),
            &config(json!({})),
        );

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ValidationErrorKind::Required);
    }

    #[test]
    fn test_min_length() {
        let validator = ConfigValidator::new();
        let result = validator.validate(
            &caps("name", FieldSchema::string().required().length(Some(3), None)),
            &config(json!({ "name": "ab" })),
        );

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ValidationErrorKind::Range);
        assert_eq!(result.errors[0].field, "name");
    }

    #[test]
    fn test_string_checks() {
        let validator = ConfigValidator::new();
        let field = FieldSchema::string()
            .length(None, Some(8))
            .pattern("^[a-z]+$")
            .one_of(["redis", "memory"]);

        let result = validator.validate(&caps("backend", field.clone()), &config(json!({ "backend": "redis" })));
        assert!(result.valid);

        let result = validator.validate(&caps("backend", field.clone()), &config(json!({ "backend": "Disk" })));
        let kinds: Vec<_> = result.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ValidationErrorKind::Format, ValidationErrorKind::Enum]);

        let result = validator.validate(&caps("backend", field), &config(json!({ "backend": "memcached" })));
        assert!(result.errors.iter().any(|e| e.kind == ValidationErrorKind::Range));
    }

    #[test]
    fn test_invalid_pattern_is_custom() {
        let validator = ConfigValidator::new();
        let result = validator.validate(
            &caps("name", FieldSchema::string().pattern("(")),
            &config(json!({ "name": "x" })),
        );
        assert_eq!(result.errors[0].kind, ValidationErrorKind::Custom);
    }

    #[test]
    fn test_number_checks() {
        let validator = ConfigValidator::new();
        let field = FieldSchema::number().range(Some(1.0), Some(10.0));

        assert!(validator.validate(&caps("n", field.clone()), &config(json!({ "n": 5 }))).valid);

        let result = validator.validate(&caps("n", field.clone()), &config(json!({ "n": 11 })));
        assert_eq!(result.errors[0].kind, ValidationErrorKind::Range);

        let result = validator.validate(&caps("n", field), &config(json!({ "n": "5" })));
        assert_eq!(result.errors[0].kind, ValidationErrorKind::Type);
    }

    #[test]
    fn test_boolean_is_strict() {
        let validator = ConfigValidator::new();
        let result = validator.validate(
            &caps("flag", FieldSchema::boolean()),
            &config(json!({ "flag": "true" })),
        );
        assert_eq!(result.errors[0].kind, ValidationErrorKind::Type);
    }

    #[test]
    fn test_array_and_object() {
        let validator = ConfigValidator::new();
        let capabilities = ExtensionCapabilities::new()
            .field("hosts", FieldSchema::array().range(Some(1.0), Some(2.0)))
            .field("options", FieldSchema::object());

        let result = validator.validate(
            &capabilities,
            &config(json!({ "hosts": ["a", "b", "c"], "options": ["not", "object"] })),
        );
        let kinds: Vec<_> = result.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ValidationErrorKind::Range, ValidationErrorKind::Type]);

        let result = validator.validate(
            &capabilities,
            &config(json!({ "hosts": ["a"], "options": {} })),
        );
        assert!(result.valid);
    }

    #[test]
    fn test_warnings_do_not_affect_validity() {
        let validator = ConfigValidator::new();
        let mut cfg = config(json!({ "unknown": 1 }));
        cfg.enabled = false;

        let result = validator.validate(&caps("known", FieldSchema::number()), &cfg);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_merge_configs() {
        let base = ExtensionConfig::default()
            .with_priority(10)
            .with_setting("a", 1)
            .with_setting("b", 2);

        let merged = merge_configs(&base, &ExtensionConfigPatch::new().setting("b", 3).setting("c", 4));
        assert!(merged.enabled);
        assert_eq!(merged.priority, 10);
        assert_eq!(merged.settings["a"], json!(1));
        assert_eq!(merged.settings["b"], json!(3));
        assert_eq!(merged.settings["c"], json!(4));

        let merged = merge_configs(&base, &ExtensionConfigPatch::new().enabled(false).priority(5));
        assert!(!merged.enabled);
        assert_eq!(merged.priority, 5);
        assert_eq!(merged.settings, base.settings);
    }
}
