//! Serialize stage
//!
//! Items are written as they are. Collections are wrapped:
//!
//! ```json
//! {
//!   "member": [...],
//!   "totalItems": 7,
//!   "view": { "first": "/books?page=1", "last": "/books?page=3", "next": "/books?page=2" }
//! }
//! ```
//!
//! Partial collections have no `totalItems`, and their view only links to
//! the previous and next pages.

use crate::core::error::{PlatformError, PlatformResult};
use crate::core::operation::Operation;
use crate::core::paginator::CollectionResult;
use crate::state::{Processor, ProcessorNext, ResourceData, StateContext, UriVariables};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Turns pipeline data into a response body
pub trait ResourceSerializer: Send + Sync {
    fn serialize(
        &self,
        data: &ResourceData,
        operation: &Operation,
        context: &StateContext,
    ) -> PlatformResult<Option<Value>>;
}

/// Plain JSON items and `member`/`totalItems`/`view` collections
pub struct CollectionSerializer {
    page_parameter_name: String,
}

impl CollectionSerializer {
    pub fn new(page_parameter_name: impl Into<String>) -> Self {
        Self {
            page_parameter_name: page_parameter_name.into(),
        }
    }

    /// Link to `page`, keeping every other query parameter
    fn page_link(&self, operation: &Operation, context: &StateContext, page: u64) -> PlatformResult<String> {
        let mut pairs: Vec<(String, String)> = match context.request.query.as_deref() {
            Some(query) => serde_urlencoded::from_str(query).map_err(|e| PlatformError::Internal(e.to_string()))?,
            None => Vec::new(),
        };
        pairs.retain(|(key, _)| *key != self.page_parameter_name);
        pairs.push((self.page_parameter_name.clone(), page.to_string()));
        let query = serde_urlencoded::to_string(&pairs).map_err(|e| PlatformError::Internal(e.to_string()))?;
        Ok(format!("{}?{}", operation.path, query))
    }

    fn collection(
        &self,
        result: &CollectionResult,
        operation: &Operation,
        context: &StateContext,
    ) -> PlatformResult<Value> {
        let mut body = Map::new();
        body.insert("member".to_string(), Value::Array(result.items().to_vec()));

        let mut view = Map::new();
        match result {
            CollectionResult::Paginated(paginator) => {
                body.insert("totalItems".to_string(), json!(paginator.total_items()));
                let current = paginator.current_page();
                view.insert("first".to_string(), json!(self.page_link(operation, context, 1)?));
                view.insert(
                    "last".to_string(),
                    json!(self.page_link(operation, context, paginator.last_page())?),
                );
                if paginator.has_previous() {
                    view.insert("previous".to_string(), json!(self.page_link(operation, context, current - 1)?));
                }
                if paginator.has_next() {
                    view.insert("next".to_string(), json!(self.page_link(operation, context, current + 1)?));
                }
            }
            CollectionResult::Partial(paginator) => {
                let current = paginator.current_page();
                if paginator.has_previous() {
                    view.insert("previous".to_string(), json!(self.page_link(operation, context, current - 1)?));
                }
                if paginator.has_next() {
                    view.insert("next".to_string(), json!(self.page_link(operation, context, current + 1)?));
                }
            }
            CollectionResult::Items(items) => {
                body.insert("totalItems".to_string(), json!(items.len()));
            }
        }

        if !matches!(result, CollectionResult::Items(_)) {
            body.insert("view".to_string(), Value::Object(view));
        }
        Ok(Value::Object(body))
    }
}

impl Default for CollectionSerializer {
    fn default() -> Self {
        Self::new("page")
    }
}

impl ResourceSerializer for CollectionSerializer {
    fn serialize(
        &self,
        data: &ResourceData,
        operation: &Operation,
        context: &StateContext,
    ) -> PlatformResult<Option<Value>> {
        Ok(match data {
            ResourceData::None => None,
            ResourceData::Item(item) => Some(item.clone()),
            ResourceData::Collection(result) => Some(self.collection(result, operation, context)?),
        })
    }
}

pub struct SerializeProcessor {
    serializer: Arc<dyn ResourceSerializer>,
}

impl SerializeProcessor {
    pub fn new(serializer: Arc<dyn ResourceSerializer>) -> Self {
        Self { serializer }
    }
}

#[async_trait]
impl Processor for SerializeProcessor {
    async fn process(
        &self,
        data: ResourceData,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProcessorNext<'_>,
    ) -> PlatformResult<ResourceData> {
        let data = next.run(data, operation, uri_variables, context).await?;
        if operation.can_serialize() {
            context.output = self.serializer.serialize(&data, operation, context)?;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::AuthContext;
    use crate::core::operation::HttpMethod;
    use crate::core::paginator::{Paginator, PartialPaginator};
    use crate::state::ResourceRequest;

    fn operation() -> Operation {
        let mut op = Operation::get_collection("Book");
        op.path = "/books".to_string();
        op
    }

    fn context(query: Option<&str>) -> StateContext {
        let mut request = ResourceRequest::new(HttpMethod::Get);
        request.query = query.map(str::to_string);
        StateContext::new(request, AuthContext::Anonymous)
    }

    fn serialize(result: CollectionResult, query: Option<&str>) -> Value {
        CollectionSerializer::default()
            .serialize(&ResourceData::Collection(result), &operation(), &context(query))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_paginated_envelope() {
        let items = vec![json!({ "id": 4 }), json!({ "id": 5 }), json!({ "id": 6 })];
        let body = serialize(
            CollectionResult::Paginated(Paginator::new(items, 2, 3, 7)),
            Some("title=Dune&page=2"),
        );

        assert_eq!(body["totalItems"], 7);
        assert_eq!(body["member"].as_array().unwrap().len(), 3);
        assert_eq!(
            body["view"],
            json!({
                "first": "/books?title=Dune&page=1",
                "last": "/books?title=Dune&page=3",
                "previous": "/books?title=Dune&page=1",
                "next": "/books?title=Dune&page=3",
            })
        );
    }

    #[test]
    fn test_partial_envelope_has_no_totals() {
        let body = serialize(
            CollectionResult::Partial(PartialPaginator::new(vec![json!({ "id": 1 })], 1, 3, true)),
            None,
        );
        assert!(body.get("totalItems").is_none());
        assert_eq!(body["view"], json!({ "next": "/books?page=2" }));
    }

    #[test]
    fn test_unpaginated_collection() {
        let body = serialize(CollectionResult::Items(vec![json!({ "id": 1 })]), None);
        assert_eq!(body, json!({ "member": [{ "id": 1 }], "totalItems": 1 }));
    }

    #[test]
    fn test_items_pass_through() {
        let item = json!({ "id": 1, "title": "Dune" });
        let body = CollectionSerializer::default()
            .serialize(&ResourceData::Item(item.clone()), &Operation::get("Book"), &context(None))
            .unwrap();
        assert_eq!(body, Some(item));
    }
}
