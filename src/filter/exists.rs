//! Exists filter: `?exists[description]=true`

use crate::core::error::PlatformResult;
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::Operation;
use crate::filter::{QueryFilter, resolve_property, scalar_to_string};
use crate::query::{Expr, JoinKind, QueryContext};
use serde_json::Value;
use std::sync::Arc;

pub struct ExistsFilter {
    classes: Arc<dyn ClassMetadataFactory>,
    parameter_name: String,
    properties: Vec<String>,
}

impl ExistsFilter {
    pub fn new(
        classes: Arc<dyn ClassMetadataFactory>,
        parameter_name: impl Into<String>,
        properties: Vec<String>,
    ) -> Self {
        Self {
            classes,
            parameter_name: parameter_name.into(),
            properties,
        }
    }
}

impl QueryFilter for ExistsFilter {
    fn apply(&self, ctx: &mut QueryContext, resource_class: &str, _operation: &Operation) -> PlatformResult<()> {
        let Some(Value::Object(requested)) = ctx.filter(&self.parameter_name).cloned() else {
            return Ok(());
        };

        for property in &self.properties {
            let Some(raw) = requested.get(property).and_then(scalar_to_string) else {
                continue;
            };
            let exists = match raw.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    tracing::warn!(property, value = other, "invalid exists value, skipped");
                    continue;
                }
            };

            let Some(target) =
                resolve_property(ctx, self.classes.as_ref(), resource_class, property, JoinKind::Left)?
            else {
                tracing::warn!(property, resource_class, "exists filter on unknown property, skipped");
                continue;
            };

            let field = Expr::field(&target.alias, target.field);
            ctx.query.and_where(if exists {
                Expr::is_not_null(field)
            } else {
                Expr::is_null(field)
            });
        }
        Ok(())
    }
}
