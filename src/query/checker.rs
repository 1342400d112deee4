//! Structural inspections of a query
//!
//! These checks feed the pagination strategy decision. They only look at the
//! query shape and the mapping metadata, never at data.

use crate::core::error::{PlatformResult, QueryError};
use crate::core::metadata::{ClassMetadata, ClassMetadataFactory};
use crate::query::ast::{Alias, QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;

/// What an alias stands for
#[derive(Debug, Clone)]
pub struct AliasInfo {
    pub class: Arc<ClassMetadata>,
    /// Whether a to-many association sits on the path from the root
    pub through_to_many: bool,
}

/// Resolve every declared alias to its entity class
pub fn resolve_aliases(
    query: &QueryBuilder,
    classes: &dyn ClassMetadataFactory,
) -> PlatformResult<HashMap<Alias, AliasInfo>> {
    let mut aliases = HashMap::new();
    aliases.insert(
        query.root_alias().clone(),
        AliasInfo {
            class: classes.get(query.entity())?,
            through_to_many: false,
        },
    );

    for join in query.joins() {
        let parent = aliases
            .get(&join.parent)
            .ok_or_else(|| QueryError::UnknownAlias {
                alias: join.parent.to_string(),
            })?;
        let association = parent.class.association(&join.association).ok_or_else(|| {
            QueryError::UnknownAssociation {
                class: parent.class.name.clone(),
                association: join.association.clone(),
            }
        })?;
        let info = AliasInfo {
            class: classes.get(&association.target)?,
            through_to_many: parent.through_to_many || association.is_to_many(),
        };
        aliases.insert(join.alias.clone(), info);
    }

    Ok(aliases)
}

pub fn has_having_clause(query: &QueryBuilder) -> bool {
    query.having().is_some()
}

pub fn has_max_results(query: &QueryBuilder) -> bool {
    query.max_results().is_some()
}

pub fn has_root_entity_with_composite_identifier(
    query: &QueryBuilder,
    classes: &dyn ClassMetadataFactory,
) -> PlatformResult<bool> {
    Ok(classes.get(query.entity())?.is_identifier_composite())
}

pub fn has_root_entity_with_foreign_key_identifier(
    query: &QueryBuilder,
    classes: &dyn ClassMetadataFactory,
) -> PlatformResult<bool> {
    Ok(classes.get(query.entity())?.contains_foreign_identifier())
}

/// Whether an ORDER BY part refers to an alias reached through a to-many join
pub fn has_order_by_on_to_many_join(
    query: &QueryBuilder,
    classes: &dyn ClassMetadataFactory,
) -> PlatformResult<bool> {
    if query.order_by().is_empty() || query.joins().is_empty() {
        return Ok(false);
    }

    let aliases = resolve_aliases(query, classes)?;
    let mut found = false;
    for order in query.order_by() {
        order.expr.visit_aliases(&mut |alias| {
            found |= aliases.get(alias).is_some_and(|info| info.through_to_many);
        });
    }
    Ok(found)
}

/// Whether any join walks a to-many association
pub fn has_joined_to_many_association(
    query: &QueryBuilder,
    classes: &dyn ClassMetadataFactory,
) -> PlatformResult<bool> {
    if query.joins().is_empty() {
        return Ok(false);
    }

    let aliases = resolve_aliases(query, classes)?;
    Ok(query
        .joins()
        .iter()
        .any(|join| aliases.get(&join.alias).is_some_and(|info| info.through_to_many)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{Association, AssociationKind, EntityMetadataRegistry, FetchMode};
    use crate::core::operation::OrderDirection;
    use crate::query::ast::{Expr, Join, OrderBy};

    fn association(name: &str, target: &str, kind: AssociationKind) -> Association {
        Association {
            name: name.to_string(),
            target: target.to_string(),
            kind,
            fetch: FetchMode::Lazy,
            join_column: None,
            mapped_by: Vec::new(),
            nullable: true,
        }
    }

    fn registry() -> EntityMetadataRegistry {
        EntityMetadataRegistry::new()
            .with(
                ClassMetadata::new("Book", &["id"])
                    .with_association(association("author", "Author", AssociationKind::ToOne))
                    .with_association(association("reviews", "Review", AssociationKind::ToMany)),
            )
            .with(ClassMetadata::new("Author", &["id"]))
            .with(
                ClassMetadata::new("Review", &["id"])
                    .with_association(association("reviewer", "Author", AssociationKind::ToOne)),
            )
    }

    #[test]
    fn test_order_by_through_to_many_chain() {
        let classes = registry();
        let o = Alias::new("o");
        let reviews = Alias::new("reviews_a1");
        let reviewer = Alias::new("reviewer_a2");

        let mut query = QueryBuilder::new("Book", o.clone());
        query.add_join(Join::left(&o, "reviews", reviews.clone()));
        query.add_join(Join::left(&reviews, "reviewer", reviewer.clone()));
        query.add_order_by(OrderBy::new(Expr::field(&reviewer, "name"), OrderDirection::Asc));

        assert!(has_order_by_on_to_many_join(&query, &classes).unwrap());
        assert!(has_joined_to_many_association(&query, &classes).unwrap());
    }

    #[test]
    fn test_order_by_on_to_one_join() {
        let classes = registry();
        let o = Alias::new("o");
        let author = Alias::new("author_a1");

        let mut query = QueryBuilder::new("Book", o.clone());
        query.add_join(Join::left(&o, "author", author.clone()));
        query.add_order_by(OrderBy::new(Expr::field(&author, "name"), OrderDirection::Asc));

        assert!(!has_order_by_on_to_many_join(&query, &classes).unwrap());
        assert!(!has_joined_to_many_association(&query, &classes).unwrap());
    }

    #[test]
    fn test_unknown_association_is_query_error() {
        let classes = registry();
        let o = Alias::new("o");
        let mut query = QueryBuilder::new("Book", o.clone());
        query.add_join(Join::left(&o, "publisher", Alias::new("publisher_a1")));

        assert!(resolve_aliases(&query, &classes).is_err());
    }

    #[test]
    fn test_having_and_max_results() {
        let o = Alias::new("o");
        let mut query = QueryBuilder::new("Book", o.clone());
        assert!(!has_having_clause(&query));
        assert!(!has_max_results(&query));

        query.and_having(Expr::is_not_null(Expr::field(&o, "title")));
        query.set_max_results(Some(10));
        assert!(has_having_clause(&query));
        assert!(has_max_results(&query));
    }
}
