//! Query filters and their registry
//!
//! A filter reads its client values from the [`QueryContext`] and adds
//! conditions, joins or ordering to the query. Filters are registered under
//! an identifier; operations list the identifiers they enable.
//!
//! The registry may also hold filters that exist for another capability
//! (a serialization-only filter, for instance). Those are kept as
//! [`RegisteredFilter::Unsupported`] so the filter extension can tell
//! "unknown" from "not applicable to queries".

pub mod exists;
pub mod order;
pub mod range;
pub mod search;

pub use exists::ExistsFilter;
pub use order::{NullsComparison, OrderFilter};
pub use range::RangeFilter;
pub use search::{SearchFilter, SearchStrategy};

use crate::core::error::PlatformResult;
use crate::core::metadata::{ClassMetadataFactory, FieldType};
use crate::core::operation::Operation;
use crate::query::{Alias, JoinKind, QueryContext};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A filter that contributes to the query
pub trait QueryFilter: Send + Sync {
    fn apply(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()>;
}

/// Entry of the filter registry
#[derive(Clone)]
pub enum RegisteredFilter {
    Query(Arc<dyn QueryFilter>),
    /// Registered, but not applicable to queries
    Unsupported { kind: String },
}

impl std::fmt::Debug for RegisteredFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisteredFilter::Query(_) => f.write_str("Query(..)"),
            RegisteredFilter::Unsupported { kind } => write!(f, "Unsupported({})", kind),
        }
    }
}

/// Filters by identifier
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, RegisteredFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, filter: Arc<dyn QueryFilter>) {
        self.filters.insert(id.into(), RegisteredFilter::Query(filter));
    }

    pub fn register_unsupported(&mut self, id: impl Into<String>, kind: impl Into<String>) {
        self.filters
            .insert(id.into(), RegisteredFilter::Unsupported { kind: kind.into() });
    }

    pub fn has(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredFilter> {
        self.filters.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.filters.keys()
    }
}

/// A property resolved against the query
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProperty {
    pub alias: Alias,
    pub field: String,
    pub field_type: FieldType,
}

/// Resolve a possibly nested property (`author.name`) to an alias and field
///
/// Every association on the way is joined once with `kind`. Returns `None`
/// when the path does not exist on the mapping; nothing is joined then.
pub fn resolve_property(
    ctx: &mut QueryContext,
    classes: &dyn ClassMetadataFactory,
    resource_class: &str,
    property: &str,
    kind: JoinKind,
) -> PlatformResult<Option<ResolvedProperty>> {
    let segments: Vec<&str> = property.split('.').collect();
    let Some((last, associations)) = segments.split_last() else {
        return Ok(None);
    };

    // walk the mapping first so an invalid path leaves the query untouched
    let mut class = classes.get(resource_class)?;
    for name in associations {
        let Some(association) = class.association(name) else {
            return Ok(None);
        };
        class = classes.get(&association.target)?;
    }

    let (field, field_type) = if class.has_field(last) {
        (last.to_string(), class.field_type(last))
    } else if let Some(column) = class.association(last).and_then(|a| a.join_column.clone()) {
        let field_type = class.field_type(&column);
        (column, field_type)
    } else {
        return Ok(None);
    };

    let mut alias = ctx.root_alias();
    for name in associations {
        alias = ctx.join_once(&alias, name, kind);
    }

    Ok(Some(ResolvedProperty {
        alias,
        field,
        field_type,
    }))
}

/// Client values as a list of strings (`a` or `[a, b]`)
pub(crate) fn string_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert a client string into a value comparable with a field of `field_type`
pub(crate) fn typed_value(field_type: FieldType, raw: &str) -> Option<Value> {
    match field_type {
        FieldType::Integer => raw.parse::<i64>().ok().map(Value::from),
        FieldType::Float => raw.parse::<f64>().ok().map(Value::from),
        FieldType::Boolean => match raw {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        FieldType::String | FieldType::Uuid | FieldType::DateTime => {
            Some(Value::String(raw.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{
        Association, AssociationKind, ClassMetadata, EntityMetadataRegistry, FetchMode,
    };

    fn classes() -> EntityMetadataRegistry {
        EntityMetadataRegistry::new()
            .with(
                ClassMetadata::new("Book", &["id"])
                    .with_field("title", FieldType::String)
                    .with_field("author_id", FieldType::Integer)
                    .with_association(Association {
                        name: "author".to_string(),
                        target: "Author".to_string(),
                        kind: AssociationKind::ToOne,
                        fetch: FetchMode::Lazy,
                        join_column: Some("author_id".to_string()),
                        mapped_by: Vec::new(),
                        nullable: true,
                    }),
            )
            .with(ClassMetadata::new("Author", &["id"]).with_field("name", FieldType::String))
    }

    #[test]
    fn test_resolve_nested_property_joins_once() {
        let classes = classes();
        let mut ctx = QueryContext::new("Book");

        let first = resolve_property(&mut ctx, &classes, "Book", "author.name", JoinKind::Inner)
            .unwrap()
            .unwrap();
        let second = resolve_property(&mut ctx, &classes, "Book", "author.name", JoinKind::Inner)
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.alias.as_str(), "author_a1");
        assert_eq!(ctx.query.joins().len(), 1);
    }

    #[test]
    fn test_resolve_unknown_property_leaves_query_untouched() {
        let classes = classes();
        let mut ctx = QueryContext::new("Book");

        let resolved =
            resolve_property(&mut ctx, &classes, "Book", "author.missing", JoinKind::Inner).unwrap();

        assert!(resolved.is_none());
        assert!(ctx.query.joins().is_empty());
    }

    #[test]
    fn test_resolve_association_uses_join_column() {
        let classes = classes();
        let mut ctx = QueryContext::new("Book");
        let resolved = resolve_property(&mut ctx, &classes, "Book", "author", JoinKind::Left)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.field, "author_id");
        assert_eq!(resolved.alias.as_str(), "o");
    }

    #[test]
    fn test_registry_variants() {
        let mut registry = FilterRegistry::new();
        registry.register_unsupported("book.property", "property");
        assert!(registry.has("book.property"));
        assert!(matches!(
            registry.get("book.property"),
            Some(RegisteredFilter::Unsupported { kind }) if kind == "property"
        ));
        assert!(registry.get("book.search").is_none());
    }

    #[test]
    fn test_typed_values() {
        assert_eq!(typed_value(FieldType::Integer, "12"), Some(Value::from(12)));
        assert_eq!(typed_value(FieldType::Integer, "twelve"), None);
        assert_eq!(
            string_values(&serde_json::json!(["a", 1])),
            vec!["a".to_string(), "1".to_string()]
        );
    }
}
