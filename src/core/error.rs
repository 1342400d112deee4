//! Typed error handling for the platform
//!
//! Every failure raised while building queries or running the state pipeline
//! is a [`PlatformError`]. Each category knows its HTTP status and a stable
//! error code so the outer error-mapping step can render it without
//! inspecting messages.
//!
//! # Error Categories
//!
//! - [`ConfigError`]: raised eagerly while building the platform, fatal
//! - [`ArgumentError`]: invalid client input (page, limit, identifiers)
//! - [`NotFoundError`]: resource class, operation or item lookups that miss
//! - [`QueryError`]: failures inside query extensions or the executor
//! - [`ValidationError`]: body decoding and field validation
//! - [`RequestError`]: negotiation and access control
//! - [`StorageError`]: persistence backend failures
//!
//! # Example
//!
//! ```rust,ignore
//! match host.handle(request).await {
//!     Ok(response) => response,
//!     Err(PlatformError::NotFound(NotFoundError::Item { resource_class, .. })) => {
//!         tracing::debug!("{} not found", resource_class);
//!         ResourceResponse::empty(StatusCode::NOT_FOUND)
//!     }
//!     Err(e) => host.error_mapper().map(&e),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The main error type of the platform
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl PlatformError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PlatformError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PlatformError::Argument(_) => StatusCode::BAD_REQUEST,
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PlatformError::Validation(e) => e.status_code(),
            PlatformError::Request(e) => e.status_code(),
            PlatformError::Storage(StorageError::Conflict { .. }) => StatusCode::CONFLICT,
            PlatformError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PlatformError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            PlatformError::Config(_) => "CONFIG_ERROR",
            PlatformError::Argument(_) => "INVALID_ARGUMENT",
            PlatformError::NotFound(e) => e.error_code(),
            PlatformError::Query(_) => "QUERY_ERROR",
            PlatformError::Validation(e) => e.error_code(),
            PlatformError::Request(e) => e.error_code(),
            PlatformError::Storage(StorageError::Conflict { .. }) => "CONFLICT",
            PlatformError::Storage(_) => "STORAGE_ERROR",
            PlatformError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            PlatformError::NotFound(NotFoundError::Item {
                resource_class,
                identifiers,
            }) => Some(serde_json::json!({
                "resource_class": resource_class,
                "identifiers": identifiers,
            })),
            PlatformError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "violations": errors }))
            }
            PlatformError::Storage(StorageError::Conflict { class, identifiers }) => Some(serde_json::json!({
                "resource_class": class,
                "identifiers": identifiers,
            })),
            PlatformError::Argument(ArgumentError::InvalidParameter { parameter, .. }) => {
                Some(serde_json::json!({ "parameter": parameter }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors raised while loading configuration or assembling pipelines
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config{}: {message}", .file.as_ref().map(|f| format!(" file '{f}'")).unwrap_or_default())]
    ParseError {
        file: Option<String>,
        message: String,
    },

    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    #[error("Invalid value '{value}' for field '{field}': {message}")]
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    #[error("Unknown filter '{filter}' referenced by operation '{operation}'")]
    UnknownFilter { filter: String, operation: String },

    #[error("Unknown entity class '{class}' referenced by {context}")]
    UnknownEntity { class: String, context: String },

    #[error("Stage '{name}' is registered twice as a {tag}")]
    DuplicateStage { name: String, tag: String },

    #[error("IO error: {message}")]
    IoError { message: String },
}

// =============================================================================
// Argument Errors
// =============================================================================

/// Invalid client-supplied values, raised per request
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("Page should not be less than 1")]
    PageTooSmall,

    #[error("Limit should not be less than 0")]
    NegativeLimit,

    #[error("Page should not be greater than 1 if limit is equal to 0")]
    PageWithZeroLimit,

    #[error("Invalid value '{value}' for parameter '{parameter}': {message}")]
    InvalidParameter {
        parameter: String,
        value: String,
        message: String,
    },

    #[error("Invalid identifier '{value}' for '{field}': {message}")]
    InvalidIdentifier {
        field: String,
        value: String,
        message: String,
    },
}

// =============================================================================
// Not Found Errors
// =============================================================================

/// Lookups that miss
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("Resource class '{resource_class}' is not declared")]
    ResourceClass { resource_class: String },

    #[error("Operation '{operation}' not found on resource '{resource_class}'")]
    Operation {
        resource_class: String,
        operation: String,
    },

    #[error("{resource_class} not found")]
    Item {
        resource_class: String,
        identifiers: serde_json::Value,
    },
}

impl NotFoundError {
    pub fn error_code(&self) -> &'static str {
        match self {
            NotFoundError::ResourceClass { .. } => "RESOURCE_CLASS_NOT_FOUND",
            NotFoundError::Operation { .. } => "OPERATION_NOT_FOUND",
            NotFoundError::Item { .. } => "ITEM_NOT_FOUND",
        }
    }
}

// =============================================================================
// Query Errors
// =============================================================================

/// Failures while composing or executing a query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Alias '{alias}' is not declared in the query")]
    UnknownAlias { alias: String },

    #[error("Association '{association}' does not exist on '{class}'")]
    UnknownAssociation { class: String, association: String },

    #[error(
        "The total number of joined relations has exceeded the specified maximum ({max_joins}). Raise the limit with the \"eager_loading.max_joins\" configuration key, or limit the maximum serialization depth"
    )]
    TooManyJoins { max_joins: usize },

    #[error("Parameter ':{name}' is not bound")]
    UnboundParameter { name: String },

    #[error("Unsupported query: {message}")]
    Unsupported { message: String },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to input decoding and validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validation errors: {}", .0.iter().map(|e| format!("{}: {}", e.field, e.message)).collect::<Vec<_>>().join(", "))]
    FieldErrors(Vec<FieldViolation>),

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// A single field violation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidationError::FieldErrors(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ValidationError::InvalidJson { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::FieldErrors(_) => "VALIDATION_FAILED",
            ValidationError::InvalidJson { .. } => "INVALID_JSON",
        }
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to the incoming request
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },

    #[error("Requested format \"{accept}\" is not supported. Supported MIME types are \"{supported}\"")]
    NotAcceptable { accept: String, supported: String },

    #[error("The content-type \"{content_type}\" is not supported. Supported MIME types are \"{supported}\"")]
    UnsupportedMediaType {
        content_type: String,
        supported: String,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            RequestError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::NotAcceptable { .. } => "NOT_ACCEPTABLE",
            RequestError::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    #[error("Data integrity error: {message}")]
    IntegrityError { message: String },

    #[error("{class} {identifiers} already exists")]
    Conflict { class: String, identifiers: serde_json::Value },

    #[error("Storage backend '{backend}' is unavailable: {message}")]
    Unavailable { backend: String, message: String },
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for PlatformError {
    fn from(err: serde_yaml::Error) -> Self {
        PlatformError::Config(ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PlatformError>() {
            Ok(platform_err) => platform_err,
            Err(err) => PlatformError::Internal(err.to_string()),
        }
    }
}

/// A specialized Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_errors_are_client_errors() {
        let err: PlatformError = ArgumentError::PageTooSmall.into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert_eq!(err.to_string(), "Page should not be less than 1");
    }

    #[test]
    fn test_not_found_item_details() {
        let err: PlatformError = NotFoundError::Item {
            resource_class: "Book".to_string(),
            identifiers: serde_json::json!({ "id": 42 }),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let response = err.to_response();
        assert_eq!(response.code, "ITEM_NOT_FOUND");
        assert_eq!(response.details.unwrap()["identifiers"]["id"], 42);
    }

    #[test]
    fn test_field_violations_are_unprocessable() {
        let err: PlatformError = ValidationError::FieldErrors(vec![
            FieldViolation {
                field: "title".to_string(),
                message: "required".to_string(),
            },
            FieldViolation {
                field: "price".to_string(),
                message: "must be positive".to_string(),
            },
        ])
        .into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("title: required"));
        assert!(err.to_string().contains("price: must be positive"));
    }

    #[test]
    fn test_request_error_status_codes() {
        assert_eq!(
            RequestError::Unauthorized {
                message: "test".to_string()
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            RequestError::NotAcceptable {
                accept: "text/csv".to_string(),
                supported: "application/json".to_string()
            }
            .status_code(),
            StatusCode::NOT_ACCEPTABLE
        );
    }

    #[test]
    fn test_config_parse_error_mentions_file() {
        let err = ConfigError::ParseError {
            file: Some("resources.yaml".to_string()),
            message: "bad indent".to_string(),
        };
        assert!(err.to_string().contains("resources.yaml"));

        let err = ConfigError::ParseError {
            file: None,
            message: "bad indent".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to parse config: bad indent");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: PlatformError = json_err.into();
        assert!(matches!(
            err,
            PlatformError::Validation(ValidationError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_anyhow_roundtrip_keeps_category() {
        let err = anyhow::Error::new(PlatformError::from(ArgumentError::NegativeLimit));
        let err: PlatformError = err.into();
        assert!(matches!(
            err,
            PlatformError::Argument(ArgumentError::NegativeLimit)
        ));
    }
}
