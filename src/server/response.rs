//! Mapping of platform errors to responses

use crate::core::error::{ConfigError, PlatformError, PlatformResult};
use crate::state::ResourceResponse;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Renders errors as `{code, message, details}` bodies
///
/// The status comes from the error category unless configuration overrides
/// it for the error code.
#[derive(Debug, Clone, Default)]
pub struct ErrorMapper {
    overrides: HashMap<String, StatusCode>,
}

impl ErrorMapper {
    pub fn new(overrides: &IndexMap<String, u16>) -> PlatformResult<Self> {
        let mut mapped = HashMap::new();
        for (code, status) in overrides {
            let status = StatusCode::from_u16(*status).map_err(|e| ConfigError::InvalidValue {
                field: format!("errors.{code}"),
                value: status.to_string(),
                message: e.to_string(),
            })?;
            mapped.insert(code.clone(), status);
        }
        Ok(Self { overrides: mapped })
    }

    pub fn status_for(&self, err: &PlatformError) -> StatusCode {
        self.overrides
            .get(err.error_code())
            .copied()
            .unwrap_or_else(|| err.status_code())
    }

    pub fn map(&self, err: &PlatformError) -> ResourceResponse {
        let status = self.status_for(err);
        let body = serde_json::to_value(err.to_response()).ok();
        let mut response = ResourceResponse::new(status, body);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
