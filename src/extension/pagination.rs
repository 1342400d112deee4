//! Pagination of collections
//!
//! [`Pagination`] reads page, limit and switches from the request;
//! [`PaginationExtension`] windows the query and, as the result extension,
//! decides how the executor must paginate it.
//!
//! # Strategy
//!
//! A composite root identifier always uses output walkers without the
//! fetch-join collection window. Otherwise an operation override wins, and
//! output walkers are needed when the query has a HAVING clause, the root
//! identifier is a foreign key, or a windowed query is ordered through a
//! to-many join. The fetch-join collection window is used when a to-many
//! association is joined.

use crate::config::PaginationConfig;
use crate::core::error::{ArgumentError, PlatformResult};
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::Operation;
use crate::core::paginator::{CollectionResult, Paginator, PartialPaginator};
use crate::core::service::{PageRequest, PaginationStrategy, QueryExecutor};
use crate::extension::{CollectionExtension, ResultCollectionExtension};
use crate::filter::scalar_to_string;
use crate::query::{QueryBuilder, QueryContext, checker};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Page and limit resolution from request values
#[derive(Debug, Clone)]
pub struct Pagination {
    options: PaginationConfig,
}

impl Pagination {
    pub fn new(options: PaginationConfig) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PaginationConfig {
        &self.options
    }

    fn flag(filters: &Map<String, Value>, name: &str) -> Option<bool> {
        match filters.get(name).and_then(scalar_to_string)?.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    fn integer(filters: &Map<String, Value>, name: &str) -> PlatformResult<Option<i64>> {
        let Some(value) = filters.get(name) else {
            return Ok(None);
        };
        let raw = scalar_to_string(value).unwrap_or_else(|| value.to_string());
        raw.parse::<i64>().map(Some).map_err(|_| {
            ArgumentError::InvalidParameter {
                parameter: name.to_string(),
                value: raw.clone(),
                message: "expected an integer".to_string(),
            }
            .into()
        })
    }

    pub fn is_enabled(&self, operation: &Operation, filters: &Map<String, Value>) -> bool {
        let enabled = operation.pagination.enabled.unwrap_or(self.options.enabled);
        let client_enabled = operation
            .pagination
            .client_enabled
            .unwrap_or(self.options.client_enabled);
        if client_enabled {
            if let Some(requested) = Self::flag(filters, &self.options.enabled_parameter_name) {
                return requested;
            }
        }
        enabled
    }

    pub fn is_partial_enabled(&self, operation: &Operation, filters: &Map<String, Value>) -> bool {
        let partial = operation.pagination.partial.unwrap_or(self.options.partial);
        let client_partial = operation
            .pagination
            .client_partial
            .unwrap_or(self.options.client_partial);
        if client_partial {
            if let Some(requested) = Self::flag(filters, &self.options.partial_parameter_name) {
                return requested;
            }
        }
        partial
    }

    /// Requested page, 1 when absent
    pub fn get_page(&self, filters: &Map<String, Value>) -> PlatformResult<i64> {
        Ok(Self::integer(filters, &self.options.page_parameter_name)?.unwrap_or(1))
    }

    /// Items per page; the client value is clamped to the maximum
    pub fn get_limit(&self, operation: &Operation, filters: &Map<String, Value>) -> PlatformResult<i64> {
        let mut limit = operation
            .pagination
            .items_per_page
            .unwrap_or(self.options.items_per_page);

        let client_items_per_page = operation
            .pagination
            .client_items_per_page
            .unwrap_or(self.options.client_items_per_page);
        if client_items_per_page {
            if let Some(requested) = Self::integer(filters, &self.options.items_per_page_parameter_name)? {
                limit = requested;
                let maximum = operation
                    .pagination
                    .maximum_items_per_page
                    .or(self.options.maximum_items_per_page);
                if let Some(maximum) = maximum {
                    limit = limit.min(maximum);
                }
            }
        }

        Ok(limit)
    }

    /// `(page, offset, limit)`
    pub fn get_pagination(
        &self,
        operation: &Operation,
        filters: &Map<String, Value>,
    ) -> PlatformResult<(u64, u64, u64)> {
        let page = self.get_page(filters)?;
        if page < 1 {
            return Err(ArgumentError::PageTooSmall.into());
        }

        let limit = self.get_limit(operation, filters)?;
        if limit < 0 {
            return Err(ArgumentError::NegativeLimit.into());
        }
        if limit == 0 && page > 1 {
            return Err(ArgumentError::PageWithZeroLimit.into());
        }

        let offset = (page - 1).checked_mul(limit).ok_or_else(|| ArgumentError::InvalidParameter {
            parameter: self.options.page_parameter_name.clone(),
            value: page.to_string(),
            message: "page is out of range".to_string(),
        })?;

        Ok((page as u64, offset as u64, limit as u64))
    }
}

pub struct PaginationExtension {
    pagination: Pagination,
    classes: Arc<dyn ClassMetadataFactory>,
}

impl PaginationExtension {
    pub fn new(pagination: Pagination, classes: Arc<dyn ClassMetadataFactory>) -> Self {
        Self { pagination, classes }
    }

    /// How the executor must paginate `query`
    pub fn strategy(&self, query: &QueryBuilder, operation: &Operation) -> PlatformResult<PaginationStrategy> {
        let classes = self.classes.as_ref();

        if checker::has_root_entity_with_composite_identifier(query, classes)? {
            return Ok(PaginationStrategy {
                use_output_walkers: true,
                fetch_join_collection: false,
            });
        }

        let use_output_walkers = match operation.pagination.use_output_walkers {
            Some(forced) => forced,
            None => {
                checker::has_having_clause(query)
                    || checker::has_root_entity_with_foreign_key_identifier(query, classes)?
                    || (checker::has_max_results(query)
                        && checker::has_order_by_on_to_many_join(query, classes)?)
            }
        };
        let fetch_join_collection = match operation.pagination.fetch_join_collection {
            Some(forced) => forced,
            None => checker::has_joined_to_many_association(query, classes)?,
        };

        Ok(PaginationStrategy {
            use_output_walkers,
            fetch_join_collection,
        })
    }
}

impl CollectionExtension for PaginationExtension {
    fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        _resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()> {
        if !self.pagination.is_enabled(operation, ctx.filters()) {
            return Ok(());
        }

        let (_, offset, limit) = self.pagination.get_pagination(operation, ctx.filters())?;
        ctx.query
            .set_first_result(Some(offset))
            .set_max_results(Some(limit));
        Ok(())
    }

    fn as_result_extension(&self) -> Option<&dyn ResultCollectionExtension> {
        Some(self)
    }
}

#[async_trait]
impl ResultCollectionExtension for PaginationExtension {
    fn supports_result(&self, _resource_class: &str, operation: &Operation, ctx: &QueryContext) -> bool {
        self.pagination.is_enabled(operation, ctx.filters())
    }

    async fn get_result(
        &self,
        ctx: &QueryContext,
        resource_class: &str,
        operation: &Operation,
        executor: &dyn QueryExecutor,
    ) -> PlatformResult<CollectionResult> {
        let (page, _, limit) = self.pagination.get_pagination(operation, ctx.filters())?;
        let partial = self.pagination.is_partial_enabled(operation, ctx.filters());
        let strategy = self.strategy(&ctx.query, operation)?;
        tracing::debug!(
            resource_class,
            page,
            limit,
            partial,
            use_output_walkers = strategy.use_output_walkers,
            fetch_join_collection = strategy.fetch_join_collection,
            "paginating collection"
        );

        let slice = executor
            .paginate(
                &ctx.query,
                PageRequest {
                    strategy,
                    count: !partial,
                },
            )
            .await?;

        Ok(if partial {
            CollectionResult::Partial(PartialPaginator::new(slice.items, page, limit, slice.has_more))
        } else {
            CollectionResult::Paginated(Paginator::new(
                slice.items,
                page,
                limit,
                slice.total.unwrap_or_default(),
            ))
        })
    }
}
