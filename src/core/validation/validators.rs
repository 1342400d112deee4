//! Reusable field validators
//!
//! Each factory returns a closure `(field, value) -> Result<(), message>`.
//! Validators other than [`required`] let values of another JSON type pass,
//! so rules can be combined freely.

use regex::Regex;
use serde_json::Value;

pub type FieldValidator = Box<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Validator: field is required (present and not null)
pub fn required() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| {
        if value.is_null() {
            Err(format!("'{}' is required", field))
        } else {
            Ok(())
        }
    }
}

/// Validator: number must be positive
pub fn positive() -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num <= 0.0 => Err(format!("'{}' must be positive (got {})", field, num)),
        _ => Ok(()),
    }
}

/// Validator: string length (in characters) must be within range
pub fn string_length(
    min: Option<usize>,
    max: Option<usize>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let Some(s) = value.as_str() else {
            return Ok(());
        };
        let len = s.chars().count();
        match (min, max) {
            (Some(min), _) if len < min => Err(format!(
                "'{}' must be at least {} characters long (got {})",
                field, min, len
            )),
            (_, Some(max)) if len > max => Err(format!(
                "'{}' must be at most {} characters long (got {})",
                field, max, len
            )),
            _ => Ok(()),
        }
    }
}

/// Validator: number must not exceed maximum
pub fn max_value(max: f64) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_f64() {
        Some(num) if num > max => Err(format!("'{}' must not exceed {} (got {})", field, max, num)),
        _ => Ok(()),
    }
}

/// Validator: value must be in allowed list
pub fn in_list(allowed: Vec<String>) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !allowed.iter().any(|a| a == s) => Err(format!(
            "'{}' must be one of {:?} (got {})",
            field, allowed, s
        )),
        _ => Ok(()),
    }
}

/// Validator: string must match a regular expression
pub fn pattern(regex: Regex) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_str() {
        Some(s) if !regex.is_match(s) => Err(format!(
            "'{}' must match {} (got {})",
            field,
            regex.as_str(),
            s
        )),
        _ => Ok(()),
    }
}

/// Validator: date must match a chrono format
pub fn date_format(format: String) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| match value.as_str() {
        Some(s) if chrono::NaiveDate::parse_from_str(s, &format).is_err() => Err(format!(
            "'{}' must use the date format {} (got {})",
            field, format, s
        )),
        _ => Ok(()),
    }
}
