//! Read stage: runs the extension pipeline against the query executor

use crate::core::error::{ArgumentError, PlatformResult};
use crate::core::metadata::{ClassMetadata, ClassMetadataFactory};
use crate::core::operation::Operation;
use crate::core::service::QueryExecutor;
use crate::extension::{ExtensionPipeline, Identifiers};
use crate::query::QueryContext;
use crate::state::{Provider, ProviderNext, ResourceData, StateContext, UriVariables};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct ReadProvider {
    extensions: Arc<ExtensionPipeline>,
    executor: Arc<dyn QueryExecutor>,
    classes: Arc<dyn ClassMetadataFactory>,
    /// Hints copied into every query context
    hints: Map<String, Value>,
}

impl ReadProvider {
    pub fn new(
        extensions: Arc<ExtensionPipeline>,
        executor: Arc<dyn QueryExecutor>,
        classes: Arc<dyn ClassMetadataFactory>,
    ) -> Self {
        Self {
            extensions,
            executor,
            classes,
            hints: Map::new(),
        }
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: Value) -> Self {
        self.hints.insert(key.into(), value);
        self
    }

    fn query_context(&self, resource_class: &str, filters: &Map<String, Value>) -> QueryContext {
        let mut ctx = QueryContext::new(resource_class).with_filters(filters.clone());
        for (key, value) in &self.hints {
            ctx.set_hint(key.clone(), value.clone());
        }
        ctx
    }
}

/// Typed identifiers of an item from its URI variables
///
/// A single-field identifier may also be given as `id`.
pub fn identifiers_from_uri(metadata: &ClassMetadata, uri_variables: &UriVariables) -> PlatformResult<Identifiers> {
    let mut identifiers = Identifiers::new();
    for field in &metadata.identifier {
        let raw = uri_variables.get(field).or_else(|| match metadata.identifier.len() {
            1 => uri_variables.get("id"),
            _ => None,
        });
        let Some(raw) = raw else {
            return Err(ArgumentError::InvalidIdentifier {
                field: field.clone(),
                value: String::new(),
                message: "missing from the URI".to_string(),
            }
            .into());
        };
        identifiers.insert(
            field.clone(),
            metadata.field_type(field).parse_identifier(field, raw)?,
        );
    }
    Ok(identifiers)
}

#[async_trait]
impl Provider for ReadProvider {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()> {
        if operation.can_read() {
            let resource_class = operation.resource_class.as_str();
            let ctx = self.query_context(resource_class, &context.filters);

            if operation.is_collection() {
                let result = self
                    .extensions
                    .collection(ctx, resource_class, operation, self.executor.as_ref())
                    .await?;
                context.data = ResourceData::Collection(result);
            } else {
                let metadata = self.classes.get(resource_class)?;
                let identifiers = identifiers_from_uri(&metadata, uri_variables)?;
                let item = self
                    .extensions
                    .item(ctx, resource_class, &identifiers, operation, self.executor.as_ref())
                    .await?;
                context.previous_data = Some(item.clone());
                context.data = ResourceData::Item(item);
            }
        }
        next.run(operation, uri_variables, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PlatformError;
    use crate::core::metadata::FieldType;

    #[test]
    fn test_identifiers_are_typed() {
        let metadata = ClassMetadata::new("Book", &["id"]).with_field("id", FieldType::Integer);
        let mut uri = UriVariables::new();
        uri.insert("id".to_string(), "7".to_string());

        let identifiers = identifiers_from_uri(&metadata, &uri).unwrap();
        assert_eq!(identifiers["id"], Value::from(7));

        uri.insert("id".to_string(), "seven".to_string());
        assert!(matches!(
            identifiers_from_uri(&metadata, &uri),
            Err(PlatformError::Argument(ArgumentError::InvalidIdentifier { .. }))
        ));
    }

    #[test]
    fn test_composite_identifiers_need_every_field() {
        let metadata = ClassMetadata::new("Line", &["order_id", "position"])
            .with_field("order_id", FieldType::Integer)
            .with_field("position", FieldType::Integer);
        let mut uri = UriVariables::new();
        uri.insert("order_id".to_string(), "3".to_string());
        assert!(identifiers_from_uri(&metadata, &uri).is_err());

        uri.insert("position".to_string(), "2".to_string());
        let identifiers = identifiers_from_uri(&metadata, &uri).unwrap();
        assert_eq!(identifiers.len(), 2);
    }
}
