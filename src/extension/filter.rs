//! Applies the filters enabled on an operation

use crate::core::error::PlatformResult;
use crate::core::operation::Operation;
use crate::extension::CollectionExtension;
use crate::filter::{FilterRegistry, RegisteredFilter};
use crate::query::QueryContext;
use std::sync::Arc;

pub struct FilterExtension {
    registry: Arc<FilterRegistry>,
}

impl FilterExtension {
    pub fn new(registry: Arc<FilterRegistry>) -> Self {
        Self { registry }
    }
}

impl CollectionExtension for FilterExtension {
    fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()> {
        for id in &operation.filters {
            match self.registry.get(id) {
                Some(RegisteredFilter::Query(filter)) => {
                    filter.apply(ctx, resource_class, operation)?;
                }
                Some(RegisteredFilter::Unsupported { kind }) => {
                    tracing::warn!(filter = %id, kind = %kind, "filter does not apply to queries, skipped");
                }
                None => {
                    tracing::warn!(filter = %id, operation = %operation.name, "unknown filter, skipped");
                }
            }
        }
        Ok(())
    }
}
