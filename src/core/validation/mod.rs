//! Declarative validation of deserialized resources
//!
//! Rules are declared per resource class and field in configuration and
//! compiled once into a [`RuleValidator`]. The validate stage of the
//! provider chain calls the [`Validator`] with the denormalized object and
//! turns violations into a 422 response.

pub mod validators;

use crate::core::error::{ConfigError, FieldViolation, PlatformResult, ValidationError};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use validators::FieldValidator;

/// Validates a denormalized resource before it is written
pub trait Validator: Send + Sync {
    fn validate(&self, resource_class: &str, object: &Value) -> PlatformResult<()>;
}

/// One configured field rule
///
/// Configuration reads rules with `serde_yaml::with::singleton_map_recursive`,
/// so a rule with arguments is a single-key map rather than a YAML tag:
///
/// ```yaml
/// title: [required, { length: { min: 1, max: 200 } }]
/// status: [{ one_of: [draft, published] }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    Required,
    Positive,
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Max(f64),
    OneOf(Vec<String>),
    Pattern(String),
    DateFormat(String),
}

impl ValidationRule {
    fn compile(&self, class: &str, field: &str) -> PlatformResult<FieldValidator> {
        let validator: FieldValidator = match self {
            ValidationRule::Required => Box::new(validators::required()),
            ValidationRule::Positive => Box::new(validators::positive()),
            ValidationRule::Length { min, max } => Box::new(validators::string_length(*min, *max)),
            ValidationRule::Max(max) => Box::new(validators::max_value(*max)),
            ValidationRule::OneOf(allowed) => Box::new(validators::in_list(allowed.clone())),
            ValidationRule::Pattern(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                    field: format!("validation.{}.{}", class, field),
                    value: pattern.clone(),
                    message: e.to_string(),
                })?;
                Box::new(validators::pattern(regex))
            }
            ValidationRule::DateFormat(format) => Box::new(validators::date_format(format.clone())),
        };
        Ok(validator)
    }
}

/// Configured rules: class => field => rules
pub type ValidationRules = HashMap<String, IndexMap<String, Vec<ValidationRule>>>;

/// Validator built from configured per-field rules
#[derive(Default)]
pub struct RuleValidator {
    classes: HashMap<String, Vec<(String, Vec<FieldValidator>)>>,
}

impl RuleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile configured rules; an invalid pattern is a configuration error
    pub fn from_rules(rules: &ValidationRules) -> PlatformResult<Self> {
        let mut validator = Self::new();
        for (class, fields) in rules {
            for (field, field_rules) in fields {
                for rule in field_rules {
                    validator.add(class, field, rule.compile(class, field)?);
                }
            }
        }
        Ok(validator)
    }

    /// Register a field validator
    pub fn add(&mut self, class: &str, field: &str, validator: FieldValidator) {
        let fields = self.classes.entry(class.to_string()).or_default();
        match fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, validators)) => validators.push(validator),
            None => fields.push((field.to_string(), vec![validator])),
        }
    }
}

impl Validator for RuleValidator {
    fn validate(&self, resource_class: &str, object: &Value) -> PlatformResult<()> {
        let Some(fields) = self.classes.get(resource_class) else {
            return Ok(());
        };

        let mut violations = Vec::new();
        for (field, validators) in fields {
            let value = object.get(field).unwrap_or(&Value::Null);
            for validator in validators {
                if let Err(message) = validator(field, value) {
                    violations.push(FieldViolation {
                        field: field.clone(),
                        message,
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            tracing::debug!(resource_class, count = violations.len(), "validation failed");
            Err(ValidationError::FieldErrors(violations).into())
        }
    }
}
