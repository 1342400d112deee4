//! Response headers

use crate::core::error::PlatformResult;
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::{HttpMethod, Operation};
use crate::state::{Processor, ProcessorNext, ResourceData, StateContext, UriVariables};
use async_trait::async_trait;
use axum::http::HeaderValue;
use axum::http::header::{CONTENT_TYPE, LOCATION, VARY, X_CONTENT_TYPE_OPTIONS};
use serde_json::Value;
use std::sync::Arc;

pub struct AddHeadersProcessor {
    classes: Arc<dyn ClassMetadataFactory>,
}

impl AddHeadersProcessor {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>) -> Self {
        Self { classes }
    }

    /// `path/id` of a created item with a single-field identifier
    fn location(&self, operation: &Operation, item: &Value) -> Option<String> {
        let metadata = self.classes.metadata_for(&operation.resource_class)?;
        let [field] = metadata.identifier.as_slice() else {
            return None;
        };
        let id = match item.get(field)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(format!("{}/{}", operation.path.trim_end_matches('/'), id))
    }
}

#[async_trait]
impl Processor for AddHeadersProcessor {
    async fn process(
        &self,
        data: ResourceData,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProcessorNext<'_>,
    ) -> PlatformResult<ResourceData> {
        let data = next.run(data, operation, uri_variables, context).await?;

        let mime = context
            .format
            .as_ref()
            .map(|f| f.mime_type.as_str())
            .unwrap_or("application/json");
        let headers = &mut context.response_headers;
        if let Ok(value) = HeaderValue::from_str(mime) {
            headers.insert(CONTENT_TYPE, value);
        }
        headers.insert(VARY, HeaderValue::from_static("Accept"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

        if operation.method == HttpMethod::Post {
            let location = data.as_item().and_then(|item| self.location(operation, item));
            if let Some(value) = location.and_then(|l| HeaderValue::from_str(&l).ok()) {
                headers.insert(LOCATION, value);
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AuthContext;
    use crate::core::metadata::{ClassMetadata, EntityMetadataRegistry};
    use crate::core::operation::OperationKind;
    use crate::state::{Format, ResourceRequest};
    use serde_json::json;

    fn processor() -> AddHeadersProcessor {
        AddHeadersProcessor::new(Arc::new(
            EntityMetadataRegistry::new().with(ClassMetadata::new("Book", &["id"])),
        ))
    }

    #[tokio::test]
    async fn test_created_item_gets_location() {
        let mut op = Operation::new("post", "Book", HttpMethod::Post, OperationKind::Collection);
        op.path = "/books".to_string();
        let mut ctx = StateContext::new(ResourceRequest::new(HttpMethod::Post), AuthContext::Anonymous);
        ctx.format = Some(Format {
            name: "jsonld".to_string(),
            mime_type: "application/ld+json".to_string(),
        });

        processor()
            .process(
                ResourceData::Item(json!({ "id": 8 })),
                &op,
                &UriVariables::new(),
                &mut ctx,
                ProcessorNext::new(&[]),
            )
            .await
            .unwrap();

        let headers = &ctx.response_headers;
        assert_eq!(headers[LOCATION], "/books/8");
        assert_eq!(headers[CONTENT_TYPE], "application/ld+json");
        assert_eq!(headers[VARY], "Accept");
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn test_reads_have_no_location() {
        let mut ctx = StateContext::new(ResourceRequest::new(HttpMethod::Get), AuthContext::Anonymous);
        processor()
            .process(
                ResourceData::Item(json!({ "id": 8 })),
                &Operation::get("Book"),
                &UriVariables::new(),
                &mut ctx,
                ProcessorNext::new(&[]),
            )
            .await
            .unwrap();

        assert!(ctx.response_headers.get(LOCATION).is_none());
        assert_eq!(ctx.response_headers[CONTENT_TYPE], "application/json");
    }
}
