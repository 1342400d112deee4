//! Keeps fetch-joined collections complete when filters touch joined aliases
//!
//! A condition on a joined to-many alias removes rows, so the hydrated
//! collections would only contain the matching children. The WHERE is moved
//! into an identity subquery instead:
//!
//! ```text
//! SELECT o, r FROM Book o LEFT JOIN o.reviews r WHERE r.rating > 3
//! =>
//! SELECT o, r FROM Book o LEFT JOIN o.reviews r
//! WHERE o IN(SELECT o_a2 FROM Book o_a2 LEFT JOIN o_a2.reviews reviews_a3
//!            WHERE reviews_a3.rating > 3)
//! ```
//!
//! Root identity is the full identifier tuple, so composite and foreign
//! identifiers go through the same construction. Parameters stay bound on
//! the outer query.

use crate::config::EagerLoadingConfig;
use crate::core::error::PlatformResult;
use crate::core::metadata::ClassMetadataFactory;
use crate::core::operation::Operation;
use crate::extension::CollectionExtension;
use crate::query::{Alias, Expr, QueryBuilder, QueryContext};
use std::sync::Arc;

pub struct FilterEagerLoadingExtension {
    classes: Arc<dyn ClassMetadataFactory>,
    config: EagerLoadingConfig,
}

impl FilterEagerLoadingExtension {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>, config: EagerLoadingConfig) -> Self {
        Self { classes, config }
    }
}

impl CollectionExtension for FilterEagerLoadingExtension {
    fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()> {
        if !self.config.enabled || operation.force_eager == Some(false) {
            return Ok(());
        }
        let Some(where_clause) = ctx.query.where_clause().cloned() else {
            return Ok(());
        };
        if ctx.query.joins().is_empty() {
            return Ok(());
        }
        let force_eager = operation.force_eager.unwrap_or(self.config.force_eager);
        if !force_eager && !self.classes.get(resource_class)?.has_eager_association() {
            return Ok(());
        }

        let root = ctx.root_alias();
        let mut subquery = QueryBuilder::new(ctx.query.entity(), root.clone());
        for join in ctx.query.joins() {
            subquery.add_join(join.clone());
        }
        subquery.set_where(Some(where_clause));

        // fresh names never collide with declared ones, so renaming one
        // alias at a time cannot capture a previous rename
        let declared: Vec<(Alias, String)> = std::iter::once((root.clone(), root.to_string()))
            .chain(
                ctx.query
                    .joins()
                    .iter()
                    .map(|join| (join.alias.clone(), join.association.clone())),
            )
            .collect();
        for (alias, base) in declared {
            let fresh = ctx.names.generate_join_alias(&base);
            subquery.rename_alias(&alias, &fresh);
        }

        tracing::debug!(subquery = %subquery, "moving filters into an identity subquery");
        ctx.query.set_where(Some(Expr::InSubquery {
            exprs: vec![Expr::Identity(root)],
            subquery: Box::new(subquery),
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{
        Association, AssociationKind, ClassMetadata, EntityMetadataRegistry, FetchMode,
    };
    use crate::extension::EagerLoadingExtension;
    use crate::query::{CompareOp, JoinKind};
    use serde_json::json;

    fn classes(fetch: FetchMode) -> Arc<dyn ClassMetadataFactory> {
        Arc::new(
            EntityMetadataRegistry::new()
                .with(ClassMetadata::new("Book", &["id"]).with_association(Association {
                    name: "reviews".to_string(),
                    target: "Review".to_string(),
                    kind: AssociationKind::ToMany,
                    fetch,
                    join_column: None,
                    mapped_by: vec!["book_id".to_string()],
                    nullable: true,
                }))
                .with(ClassMetadata::new("Review", &["id"])),
        )
    }

    fn filtered_context(classes: &Arc<dyn ClassMetadataFactory>) -> QueryContext {
        let mut ctx = QueryContext::new("Book");
        EagerLoadingExtension::new(classes.clone(), EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();
        let root = ctx.root_alias();
        let reviews = ctx.join_once(&root, "reviews", JoinKind::Inner);
        let name = ctx.bind("rating", json!(3));
        ctx.query.and_where(Expr::compare(
            CompareOp::Gt,
            Expr::field(&reviews, "rating"),
            Expr::param(name),
        ));
        ctx
    }

    #[test]
    fn test_where_moves_into_identity_subquery() {
        let classes = classes(FetchMode::Eager);
        let mut ctx = filtered_context(&classes);

        FilterEagerLoadingExtension::new(classes, EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();

        assert_eq!(
            ctx.query.to_string(),
            "SELECT o, reviews_a1 FROM Book o LEFT JOIN o.reviews reviews_a1 \
             WHERE o IN(SELECT o_a2 FROM Book o_a2 LEFT JOIN o_a2.reviews reviews_a3 \
             WHERE reviews_a3.rating > :rating_p1)"
        );
        assert_eq!(ctx.query.parameter("rating_p1"), Some(&json!(3)));
    }

    #[test]
    fn test_skips_without_eager_association() {
        let classes = classes(FetchMode::Lazy);
        let mut ctx = filtered_context(&classes);
        let before = ctx.query.clone();

        FilterEagerLoadingExtension::new(classes, EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();

        assert_eq!(ctx.query, before);
    }

    #[test]
    fn test_skips_when_force_eager_is_off() {
        let classes = classes(FetchMode::Eager);
        let mut ctx = filtered_context(&classes);
        let before = ctx.query.clone();

        FilterEagerLoadingExtension::new(classes, EagerLoadingConfig::default())
            .apply_to_collection(
                &mut ctx,
                "Book",
                &Operation::get_collection("Book").with_force_eager(false),
            )
            .unwrap();

        assert_eq!(ctx.query, before);
    }

    #[test]
    fn test_skips_without_where() {
        let classes = classes(FetchMode::Eager);
        let mut ctx = QueryContext::new("Book");
        let root = ctx.root_alias();
        ctx.join_once(&root, "reviews", JoinKind::Left);
        let before = ctx.query.clone();

        FilterEagerLoadingExtension::new(classes, EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();

        assert_eq!(ctx.query, before);
    }
}
