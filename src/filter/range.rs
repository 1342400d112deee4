//! Range filter: `?price[gte]=10&price[lt]=20`, `?price[between]=10..20`

use crate::core::error::PlatformResult;
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::Operation;
use crate::filter::{QueryFilter, ResolvedProperty, resolve_property, scalar_to_string, typed_value};
use crate::query::{CompareOp, Expr, JoinKind, QueryContext};
use serde_json::Value;
use std::sync::Arc;

pub struct RangeFilter {
    classes: Arc<dyn ClassMetadataFactory>,
    properties: Vec<String>,
}

impl RangeFilter {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>, properties: Vec<String>) -> Self {
        Self { classes, properties }
    }

    fn compare(ctx: &mut QueryContext, target: &ResolvedProperty, op: CompareOp, raw: &str) -> Option<Expr> {
        let value = typed_value(target.field_type, raw)?;
        let name = ctx.bind(&target.field, value);
        Some(Expr::compare(
            op,
            Expr::field(&target.alias, target.field.clone()),
            Expr::param(name),
        ))
    }
}

impl QueryFilter for RangeFilter {
    fn apply(&self, ctx: &mut QueryContext, resource_class: &str, _operation: &Operation) -> PlatformResult<()> {
        for property in &self.properties {
            let Some(Value::Object(operators)) = ctx.filter(property).cloned() else {
                continue;
            };

            let Some(target) =
                resolve_property(ctx, self.classes.as_ref(), resource_class, property, JoinKind::Inner)?
            else {
                tracing::warn!(property, resource_class, "range filter on unknown property, skipped");
                continue;
            };

            for (operator, value) in &operators {
                let Some(raw) = scalar_to_string(value) else {
                    continue;
                };
                let condition = match operator.as_str() {
                    "gt" => Self::compare(ctx, &target, CompareOp::Gt, &raw),
                    "gte" => Self::compare(ctx, &target, CompareOp::Gte, &raw),
                    "lt" => Self::compare(ctx, &target, CompareOp::Lt, &raw),
                    "lte" => Self::compare(ctx, &target, CompareOp::Lte, &raw),
                    "between" => match raw.split_once("..") {
                        Some((low, high)) if low == high => {
                            Self::compare(ctx, &target, CompareOp::Eq, low)
                        }
                        Some((low, high)) => Self::compare(ctx, &target, CompareOp::Gte, low)
                            .zip(Self::compare(ctx, &target, CompareOp::Lte, high))
                            .map(|(a, b)| a.and(b)),
                        None => None,
                    },
                    other => {
                        tracing::warn!(property, operator = other, "unknown range operator, skipped");
                        continue;
                    }
                };

                match condition {
                    Some(condition) => {
                        ctx.query.and_where(condition);
                    }
                    None => tracing::warn!(property, value = %raw, "invalid range value, skipped"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{ClassMetadata, EntityMetadataRegistry, FieldType};
    use serde_json::{Map, json};

    fn filter() -> RangeFilter {
        let classes = EntityMetadataRegistry::new().with(
            ClassMetadata::new("Book", &["id"])
                .with_field("price", FieldType::Float)
                .with_field("published", FieldType::DateTime),
        );
        RangeFilter::new(
            Arc::new(classes),
            vec!["price".to_string(), "published".to_string()],
        )
    }

    fn context(filters: Value) -> QueryContext {
        let filters: Map<String, Value> = serde_json::from_value(filters).unwrap();
        QueryContext::new("Book").with_filters(filters)
    }

    #[test]
    fn test_between_and_bounds() {
        let op = Operation::get_collection("Book");
        let mut ctx = context(json!({
            "price": { "between": "10..20" },
            "published": { "gte": "2020-01-01" }
        }));
        filter().apply(&mut ctx, "Book", &op).unwrap();

        assert_eq!(
            ctx.query.to_string(),
            "SELECT o FROM Book o WHERE o.price >= :price_p1 AND o.price <= :price_p2 \
             AND o.published >= :published_p3"
        );
        assert_eq!(ctx.query.parameter("price_p1"), Some(&json!(10.0)));
    }

    #[test]
    fn test_invalid_values_are_skipped() {
        let op = Operation::get_collection("Book");
        let mut ctx = context(json!({ "price": { "gt": "cheap", "sideways": "1" } }));
        filter().apply(&mut ctx, "Book", &op).unwrap();
        assert!(ctx.query.where_clause().is_none());
    }

    #[test]
    fn test_plain_value_is_ignored() {
        let op = Operation::get_collection("Book");
        let mut ctx = context(json!({ "price": "12" }));
        filter().apply(&mut ctx, "Book", &op).unwrap();
        assert!(ctx.query.where_clause().is_none());
    }
}
