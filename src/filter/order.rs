//! Order filter: `?order[title]=desc&order[author.name]=asc`

use crate::core::error::PlatformResult;
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::{Operation, OrderDirection};
use crate::filter::{QueryFilter, resolve_property, scalar_to_string};
use crate::query::{Expr, HINT_NULLS_COMPARISON, JoinKind, NullsOrder, OrderBy, QueryContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Where NULL values land when ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullsComparison {
    /// NULL is the smallest value
    NullsSmallest,
    /// NULL is the largest value
    NullsLargest,
    NullsAlwaysFirst,
    NullsAlwaysLast,
}

impl NullsComparison {
    pub fn nulls_order(&self, direction: OrderDirection) -> NullsOrder {
        match (self, direction) {
            (NullsComparison::NullsSmallest, OrderDirection::Asc)
            | (NullsComparison::NullsLargest, OrderDirection::Desc)
            | (NullsComparison::NullsAlwaysFirst, _) => NullsOrder::First,
            _ => NullsOrder::Last,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NullsComparison::NullsSmallest => "nulls_smallest",
            NullsComparison::NullsLargest => "nulls_largest",
            NullsComparison::NullsAlwaysFirst => "nulls_always_first",
            NullsComparison::NullsAlwaysLast => "nulls_always_last",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "nulls_smallest" => Some(NullsComparison::NullsSmallest),
            "nulls_largest" => Some(NullsComparison::NullsLargest),
            "nulls_always_first" => Some(NullsComparison::NullsAlwaysFirst),
            "nulls_always_last" => Some(NullsComparison::NullsAlwaysLast),
            _ => None,
        }
    }
}

pub struct OrderFilter {
    classes: Arc<dyn ClassMetadataFactory>,
    parameter_name: String,
    properties: Vec<String>,
    nulls_comparison: Option<NullsComparison>,
}

impl OrderFilter {
    pub fn new(
        classes: Arc<dyn ClassMetadataFactory>,
        parameter_name: impl Into<String>,
        properties: Vec<String>,
        nulls_comparison: Option<NullsComparison>,
    ) -> Self {
        Self {
            classes,
            parameter_name: parameter_name.into(),
            properties,
            nulls_comparison,
        }
    }
}

impl QueryFilter for OrderFilter {
    fn apply(&self, ctx: &mut QueryContext, resource_class: &str, _operation: &Operation) -> PlatformResult<()> {
        let Some(Value::Object(requested)) = ctx.filter(&self.parameter_name).cloned() else {
            return Ok(());
        };

        let nulls_comparison = self.nulls_comparison.or_else(|| {
            ctx.hint(HINT_NULLS_COMPARISON)
                .and_then(Value::as_str)
                .and_then(NullsComparison::parse)
        });

        // configured order decides precedence between properties
        for property in &self.properties {
            let Some(raw) = requested.get(property).and_then(scalar_to_string) else {
                continue;
            };
            let Some(direction) = OrderDirection::parse(&raw) else {
                tracing::warn!(property, direction = %raw, "invalid order direction, skipped");
                continue;
            };

            let Some(target) =
                resolve_property(ctx, self.classes.as_ref(), resource_class, property, JoinKind::Left)?
            else {
                tracing::warn!(property, resource_class, "order filter on unknown property, skipped");
                continue;
            };

            ctx.query.add_order_by(OrderBy {
                expr: Expr::field(&target.alias, target.field),
                direction,
                nulls: nulls_comparison.map(|n| n.nulls_order(direction)),
            });
        }
        Ok(())
    }
}
