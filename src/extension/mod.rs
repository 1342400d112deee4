//! Query extensions
//!
//! Extensions are independent strategies that each contribute a part of a
//! query (joins, conditions, ordering, a result window). The
//! [`ExtensionPipeline`] invokes them in priority order against one
//! [`QueryContext`], then runs the query:
//!
//! ```text
//! eager_loading (64) -> filter (32) -> filter_eager_loading (-17)
//!                    -> order (-32) -> pagination (-64) -> result
//! ```

pub mod eager_loading;
pub mod filter;
pub mod filter_eager_loading;
pub mod order;
pub mod pagination;

pub use eager_loading::EagerLoadingExtension;
pub use filter::FilterExtension;
pub use filter_eager_loading::FilterEagerLoadingExtension;
pub use order::OrderExtension;
pub use pagination::{Pagination, PaginationExtension};

use crate::core::error::{NotFoundError, PlatformResult};
use crate::core::operation::Operation;
use crate::core::paginator::CollectionResult;
use crate::core::priority::{PriorityTable, Registration};
use crate::core::service::QueryExecutor;
use crate::query::{Expr, QueryContext};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Typed identifier values of an item (field => value)
pub type Identifiers = IndexMap<String, Value>;

/// Contributes to collection queries
pub trait CollectionExtension: Send + Sync {
    fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()>;

    /// The result-producing side of this extension, if it has one
    fn as_result_extension(&self) -> Option<&dyn ResultCollectionExtension> {
        None
    }
}

/// Contributes to item queries
pub trait ItemExtension: Send + Sync {
    fn apply_to_item(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        identifiers: &Identifiers,
        operation: &Operation,
    ) -> PlatformResult<()>;
}

/// Collection extension that can also produce the result
#[async_trait]
pub trait ResultCollectionExtension: Send + Sync {
    fn supports_result(&self, resource_class: &str, operation: &Operation, ctx: &QueryContext) -> bool;

    async fn get_result(
        &self,
        ctx: &QueryContext,
        resource_class: &str,
        operation: &Operation,
        executor: &dyn QueryExecutor,
    ) -> PlatformResult<CollectionResult>;
}

/// Ordered collection and item extensions
pub struct ExtensionPipeline {
    collection: Vec<Registration<Arc<dyn CollectionExtension>>>,
    item: Vec<Registration<Arc<dyn ItemExtension>>>,
}

impl ExtensionPipeline {
    pub fn new(
        collection: PriorityTable<Arc<dyn CollectionExtension>>,
        item: PriorityTable<Arc<dyn ItemExtension>>,
    ) -> Self {
        Self {
            collection: collection.into_sorted(),
            item: item.into_sorted(),
        }
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collection.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn item_names(&self) -> Vec<&str> {
        self.item.iter().map(|r| r.name.as_str()).collect()
    }

    /// Apply every collection extension in order
    pub fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()> {
        for registration in &self.collection {
            tracing::debug!(extension = %registration.name, resource_class, "applying collection extension");
            registration
                .item
                .apply_to_collection(ctx, resource_class, operation)?;
        }
        Ok(())
    }

    /// Build and run a collection query
    ///
    /// The first extension supporting the result produces it; without one
    /// every matching item is returned.
    pub async fn collection(
        &self,
        mut ctx: QueryContext,
        resource_class: &str,
        operation: &Operation,
        executor: &dyn QueryExecutor,
    ) -> PlatformResult<CollectionResult> {
        self.apply_to_collection(&mut ctx, resource_class, operation)?;
        tracing::debug!(query = %ctx.query, "collection query composed");

        let result_extension = self
            .collection
            .iter()
            .filter_map(|registration| registration.item.as_result_extension())
            .find(|extension| extension.supports_result(resource_class, operation, &ctx));

        match result_extension {
            Some(extension) => {
                extension
                    .get_result(&ctx, resource_class, operation, executor)
                    .await
            }
            None => Ok(CollectionResult::Items(executor.fetch_all(&ctx.query).await?)),
        }
    }

    /// Build and run an item query
    ///
    /// Identifiers are bound as `root.field = :field_pN` before the item
    /// extensions run. A missing item is a not-found error.
    pub async fn item(
        &self,
        mut ctx: QueryContext,
        resource_class: &str,
        identifiers: &Identifiers,
        operation: &Operation,
        executor: &dyn QueryExecutor,
    ) -> PlatformResult<Value> {
        let root = ctx.root_alias();
        for (field, value) in identifiers {
            let name = ctx.bind(field, value.clone());
            ctx.query
                .and_where(Expr::eq(Expr::field(&root, field.clone()), Expr::param(name)));
        }

        for registration in &self.item {
            tracing::debug!(extension = %registration.name, resource_class, "applying item extension");
            registration
                .item
                .apply_to_item(&mut ctx, resource_class, identifiers, operation)?;
        }
        tracing::debug!(query = %ctx.query, "item query composed");

        executor.fetch_one(&ctx.query).await?.ok_or_else(|| {
            NotFoundError::Item {
                resource_class: resource_class.to_string(),
                identifiers: Value::Object(identifiers.clone().into_iter().collect()),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::priority::StageTag;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CollectionExtension for Recorder {
        fn apply_to_collection(&self, _: &mut QueryContext, _: &str, _: &Operation) -> PlatformResult<()> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    #[test]
    fn test_collection_extensions_run_by_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table: PriorityTable<Arc<dyn CollectionExtension>> =
            PriorityTable::new(StageTag::CollectionExtension);
        for (name, priority) in [("pagination", -64), ("eager_loading", 64), ("filter", 32), ("order", -32)] {
            table
                .register(name, priority, Arc::new(Recorder { name, log: log.clone() }))
                .unwrap();
        }
        let pipeline = ExtensionPipeline::new(table, PriorityTable::new(StageTag::ItemExtension));

        let mut ctx = QueryContext::new("Book");
        pipeline
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["eager_loading", "filter", "order", "pagination"]
        );
        assert_eq!(
            pipeline.collection_names(),
            vec!["eager_loading", "filter", "order", "pagination"]
        );
    }
}
