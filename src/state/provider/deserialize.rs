//! Deserialize stage: turns the request body into the object to write
//!
//! `POST` takes the body as the new object, `PUT` replaces the read object
//! and `PATCH` merge-patches it (RFC 7396). Identifiers of the read object
//! always survive.

use crate::core::error::{PlatformResult, RequestError};
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::{HttpMethod, Operation};
use crate::state::{Provider, ProviderNext, ResourceData, StateContext, UriVariables};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct DeserializeProvider {
    classes: Arc<dyn ClassMetadataFactory>,
}

impl DeserializeProvider {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>) -> Self {
        Self { classes }
    }
}

/// Apply a JSON merge patch; `null` removes a member
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn parse_body(context: &StateContext) -> PlatformResult<Value> {
    let body = context
        .request
        .body
        .as_ref()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| RequestError::InvalidBody {
            message: "a request body is required".to_string(),
        })?;
    let value: Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(RequestError::InvalidBody {
            message: "expected a JSON object".to_string(),
        }
        .into());
    }
    Ok(value)
}

#[async_trait]
impl Provider for DeserializeProvider {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()> {
        if operation.can_deserialize() {
            let input = parse_body(context)?;
            let mut object = match (operation.method, context.previous_data.clone()) {
                (HttpMethod::Patch, Some(mut previous)) => {
                    merge_patch(&mut previous, &input);
                    previous
                }
                _ => input,
            };

            if let (Some(previous), Value::Object(fields)) = (&context.previous_data, &mut object) {
                let metadata = self.classes.get(&operation.resource_class)?;
                for id in &metadata.identifier {
                    match previous.get(id) {
                        Some(value) => fields.insert(id.clone(), value.clone()),
                        None => fields.remove(id),
                    };
                }
            }

            tracing::debug!(operation = %operation.name, "deserialized request body");
            context.data = ResourceData::Item(object);
        }
        next.run(operation, uri_variables, context).await
    }
}
