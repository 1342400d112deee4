//! Search filter: `?title=dune`, `?author.name[]=a&author.name[]=b`

use crate::core::error::PlatformResult;
use crate::core::metadata::{ClassMetadataFactory, FieldType};
use crate::core::operation::Operation;
use crate::filter::{QueryFilter, ResolvedProperty, resolve_property, string_values, typed_value};
use crate::query::{Expr, JoinKind, QueryContext};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Matching strategy of a searchable property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    Exact,
    Partial,
    Start,
    End,
    WordStart,
    Iexact,
    Ipartial,
    Istart,
    Iend,
    IwordStart,
}

impl SearchStrategy {
    fn case_insensitive(&self) -> bool {
        matches!(
            self,
            SearchStrategy::Iexact
                | SearchStrategy::Ipartial
                | SearchStrategy::Istart
                | SearchStrategy::Iend
                | SearchStrategy::IwordStart
        )
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub struct SearchFilter {
    classes: Arc<dyn ClassMetadataFactory>,
    properties: IndexMap<String, SearchStrategy>,
}

impl SearchFilter {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>, properties: IndexMap<String, SearchStrategy>) -> Self {
        Self { classes, properties }
    }

    fn like(ctx: &mut QueryContext, target: &ResolvedProperty, pattern: String, ci: bool) -> Expr {
        let name = ctx.bind(&target.field, Value::String(pattern));
        Expr::Like {
            expr: Box::new(Expr::field(&target.alias, target.field.clone())),
            pattern: Box::new(Expr::param(name)),
            case_insensitive: ci,
        }
    }

    fn condition(
        ctx: &mut QueryContext,
        target: &ResolvedProperty,
        strategy: SearchStrategy,
        value: &str,
    ) -> Vec<Expr> {
        let ci = strategy.case_insensitive();
        let escaped = escape_like(value);
        match strategy {
            SearchStrategy::Exact | SearchStrategy::Iexact => {
                vec![Self::like(ctx, target, escaped, ci)]
            }
            SearchStrategy::Partial | SearchStrategy::Ipartial => {
                vec![Self::like(ctx, target, format!("%{}%", escaped), ci)]
            }
            SearchStrategy::Start | SearchStrategy::Istart => {
                vec![Self::like(ctx, target, format!("{}%", escaped), ci)]
            }
            SearchStrategy::End | SearchStrategy::Iend => {
                vec![Self::like(ctx, target, format!("%{}", escaped), ci)]
            }
            SearchStrategy::WordStart | SearchStrategy::IwordStart => vec![
                Self::like(ctx, target, format!("{}%", escaped), ci),
                Self::like(ctx, target, format!("% {}%", escaped), ci),
            ],
        }
    }
}

impl QueryFilter for SearchFilter {
    fn apply(&self, ctx: &mut QueryContext, resource_class: &str, _operation: &Operation) -> PlatformResult<()> {
        for (property, strategy) in &self.properties {
            let Some(raw) = ctx.filter(property).cloned() else {
                continue;
            };
            let values = string_values(&raw);
            if values.is_empty() {
                continue;
            }

            let Some(target) =
                resolve_property(ctx, self.classes.as_ref(), resource_class, property, JoinKind::Inner)?
            else {
                tracing::warn!(property, resource_class, "search filter on unknown property, skipped");
                continue;
            };

            if *strategy == SearchStrategy::Exact {
                let typed: Vec<Value> = values
                    .iter()
                    .filter_map(|raw| typed_value(target.field_type, raw))
                    .collect();
                if typed.len() != values.len() {
                    tracing::warn!(property, "invalid search value for {:?} field, skipped", target.field_type);
                    continue;
                }

                let field = Expr::field(&target.alias, target.field.clone());
                let condition = if typed.len() == 1 {
                    let name = ctx.bind(property, typed[0].clone());
                    Expr::eq(field, Expr::param(name))
                } else {
                    let list = typed
                        .into_iter()
                        .map(|value| Expr::param(ctx.bind(property, value)))
                        .collect();
                    Expr::InList {
                        expr: Box::new(field),
                        list,
                        negated: false,
                    }
                };
                ctx.query.and_where(condition);
                continue;
            }

            if target.field_type != FieldType::String {
                tracing::warn!(property, "text search strategy on a non-text field, skipped");
                continue;
            }

            let mut alternatives = Vec::new();
            for value in &values {
                alternatives.extend(Self::condition(ctx, &target, *strategy, value));
            }
            let condition = match alternatives.len() {
                1 => alternatives.remove(0),
                _ => Expr::Or(alternatives),
            };
            ctx.query.and_where(condition);
        }
        Ok(())
    }
}
