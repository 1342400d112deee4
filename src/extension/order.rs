//! Default ordering of collections

use crate::config::OrderConfig;
use crate::core::error::PlatformResult;
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::Operation;
use crate::extension::CollectionExtension;
use crate::filter::resolve_property;
use crate::query::{Expr, JoinKind, OrderBy, QueryContext};
use std::sync::Arc;

/// Applies the operation's default order when nothing ordered the query yet
///
/// Without a declared order, and with `order.default_direction` configured,
/// collections are ordered by their identifier fields.
pub struct OrderExtension {
    classes: Arc<dyn ClassMetadataFactory>,
    config: OrderConfig,
}

impl OrderExtension {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>, config: OrderConfig) -> Self {
        Self { classes, config }
    }
}

impl CollectionExtension for OrderExtension {
    fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()> {
        if !ctx.query.order_by().is_empty() {
            return Ok(());
        }

        let nulls = self.config.nulls_comparison;
        if !operation.order.is_empty() {
            for (property, direction) in &operation.order {
                let Some(target) = resolve_property(
                    ctx,
                    self.classes.as_ref(),
                    resource_class,
                    property,
                    JoinKind::Left,
                )?
                else {
                    tracing::warn!(property, resource_class, "default order on unknown property, skipped");
                    continue;
                };
                ctx.query.add_order_by(OrderBy {
                    expr: Expr::field(&target.alias, target.field),
                    direction: *direction,
                    nulls: nulls.map(|n| n.nulls_order(*direction)),
                });
            }
            return Ok(());
        }

        if let Some(direction) = self.config.default_direction {
            let root = ctx.root_alias();
            for identifier in &self.classes.get(resource_class)?.identifier {
                ctx.query.add_order_by(OrderBy {
                    expr: Expr::field(&root, identifier.clone()),
                    direction,
                    nulls: None,
                });
            }
        }
        Ok(())
    }
}
