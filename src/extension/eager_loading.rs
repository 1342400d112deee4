//! Eager loading of associations

use crate::config::EagerLoadingConfig;
use crate::core::error::{PlatformResult, QueryError};
use crate::core::metadata::{ClassMetadata, ClassMetadataFactory, FetchMode};
use crate::core::operation::Operation;
use crate::extension::{CollectionExtension, Identifiers, ItemExtension};
use crate::query::{Alias, Join, JoinKind, QueryContext};
use std::sync::Arc;

/// Joins and selects the associations that must be loaded with the root
///
/// EAGER associations are joined (every association when eager loading is
/// forced), recursively, without re-entering a class already on the join
/// path. A non-nullable to-one is INNER-joined unless its parent was
/// LEFT-joined.
pub struct EagerLoadingExtension {
    classes: Arc<dyn ClassMetadataFactory>,
    config: EagerLoadingConfig,
}

impl EagerLoadingExtension {
    pub fn new(classes: Arc<dyn ClassMetadataFactory>, config: EagerLoadingConfig) -> Self {
        Self { classes, config }
    }

    fn apply(&self, ctx: &mut QueryContext, resource_class: &str, operation: &Operation) -> PlatformResult<()> {
        if !self.config.enabled || operation.force_eager == Some(false) {
            return Ok(());
        }
        let force_eager = operation.force_eager.unwrap_or(self.config.force_eager);

        let metadata = self.classes.get(resource_class)?;
        let root = ctx.root_alias();
        let mut path = vec![metadata.name.clone()];
        self.join_relations(ctx, &metadata, &root, false, force_eager, &mut path)
    }

    fn join_relations(
        &self,
        ctx: &mut QueryContext,
        class: &ClassMetadata,
        parent: &Alias,
        parent_left_joined: bool,
        force_eager: bool,
        path: &mut Vec<String>,
    ) -> PlatformResult<()> {
        for association in &class.associations {
            if !force_eager && association.fetch != FetchMode::Eager {
                continue;
            }
            if path.contains(&association.target) {
                continue;
            }

            let (alias, left_joined) = match ctx.query.join_for(parent, &association.name) {
                Some(existing) => (existing.alias.clone(), existing.kind == JoinKind::Left),
                None => {
                    if ctx.query.joins().len() >= self.config.max_joins {
                        return Err(QueryError::TooManyJoins {
                            max_joins: self.config.max_joins,
                        }
                        .into());
                    }

                    let left_joined =
                        parent_left_joined || association.is_to_many() || association.nullable;
                    let alias = ctx.names.generate_join_alias(&association.name);
                    let join = if left_joined {
                        Join::left(parent, association.name.clone(), alias.clone())
                    } else {
                        Join::inner(parent, association.name.clone(), alias.clone())
                    };
                    ctx.query.add_join(join);
                    (alias, left_joined)
                }
            };
            ctx.query.add_select(&alias);

            let target = self.classes.get(&association.target)?;
            path.push(target.name.clone());
            self.join_relations(ctx, &target, &alias, left_joined, force_eager, path)?;
            path.pop();
        }
        Ok(())
    }
}

impl CollectionExtension for EagerLoadingExtension {
    fn apply_to_collection(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        operation: &Operation,
    ) -> PlatformResult<()> {
        self.apply(ctx, resource_class, operation)
    }
}

impl ItemExtension for EagerLoadingExtension {
    fn apply_to_item(
        &self,
        ctx: &mut QueryContext,
        resource_class: &str,
        _identifiers: &Identifiers,
        operation: &Operation,
    ) -> PlatformResult<()> {
        self.apply(ctx, resource_class, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PlatformError;
    use crate::core::metadata::{Association, AssociationKind, EntityMetadataRegistry};

    fn association(name: &str, target: &str, kind: AssociationKind, fetch: FetchMode, nullable: bool) -> Association {
        Association {
            name: name.to_string(),
            target: target.to_string(),
            kind,
            fetch,
            join_column: (kind == AssociationKind::ToOne).then(|| format!("{}_id", name)),
            mapped_by: if kind == AssociationKind::ToMany {
                vec!["book_id".to_string()]
            } else {
                Vec::new()
            },
            nullable,
        }
    }

    fn classes() -> Arc<dyn ClassMetadataFactory> {
        Arc::new(
            EntityMetadataRegistry::new()
                .with(
                    ClassMetadata::new("Book", &["id"])
                        .with_association(association("author", "Author", AssociationKind::ToOne, FetchMode::Eager, false))
                        .with_association(association("reviews", "Review", AssociationKind::ToMany, FetchMode::Eager, true))
                        .with_association(association("publisher", "Publisher", AssociationKind::ToOne, FetchMode::Lazy, true)),
                )
                .with(
                    ClassMetadata::new("Author", &["id"])
                        .with_association(association("books", "Book", AssociationKind::ToMany, FetchMode::Eager, true)),
                )
                .with(
                    ClassMetadata::new("Review", &["id"])
                        .with_association(association("reviewer", "Author", AssociationKind::ToOne, FetchMode::Eager, false)),
                )
                .with(ClassMetadata::new("Publisher", &["id"]))
                .with(ClassMetadata::new("Plain", &["id"])),
        )
    }

    fn extension(config: EagerLoadingConfig) -> EagerLoadingExtension {
        EagerLoadingExtension::new(classes(), config)
    }

    #[test]
    fn test_joins_eager_associations_recursively() {
        let mut ctx = QueryContext::new("Book");
        extension(EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();

        assert_eq!(
            ctx.query.to_string(),
            "SELECT o, author_a1, reviews_a2, reviewer_a3 FROM Book o \
             INNER JOIN o.author author_a1 LEFT JOIN o.reviews reviews_a2 \
             LEFT JOIN reviews_a2.reviewer reviewer_a3"
        );
    }

    #[test]
    fn test_no_eager_associations_is_noop() {
        let mut ctx = QueryContext::new("Plain");
        extension(EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Plain", &Operation::get_collection("Plain"))
            .unwrap();
        assert!(ctx.query.joins().is_empty());
        assert_eq!(ctx.query.select().len(), 1);
    }

    #[test]
    fn test_force_eager_false_skips() {
        let mut ctx = QueryContext::new("Book");
        let op = Operation::get_collection("Book").with_force_eager(false);
        extension(EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &op)
            .unwrap();
        assert!(ctx.query.joins().is_empty());
    }

    #[test]
    fn test_forced_joins_lazy_associations() {
        let mut ctx = QueryContext::new("Book");
        let op = Operation::get("Book").with_force_eager(true);
        extension(EagerLoadingConfig::default())
            .apply_to_item(&mut ctx, "Book", &Identifiers::new(), &op)
            .unwrap();
        assert!(ctx.query.join_for(&Alias::new("o"), "publisher").is_some());
    }

    #[test]
    fn test_reuses_existing_join() {
        let mut ctx = QueryContext::new("Book");
        let root = ctx.root_alias();
        let author = ctx.join_once(&root, "author", JoinKind::Inner);

        extension(EagerLoadingConfig::default())
            .apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"))
            .unwrap();

        let authors: Vec<_> = ctx
            .query
            .joins()
            .iter()
            .filter(|join| join.association == "author")
            .collect();
        assert_eq!(authors.len(), 1);
        assert!(ctx.query.select().contains(&author));
    }

    #[test]
    fn test_max_joins_exceeded() {
        let mut ctx = QueryContext::new("Book");
        let config = EagerLoadingConfig {
            max_joins: 2,
            ..EagerLoadingConfig::default()
        };
        let result = extension(config).apply_to_collection(&mut ctx, "Book", &Operation::get_collection("Book"));
        assert!(matches!(
            result,
            Err(PlatformError::Query(QueryError::TooManyJoins { max_joins: 2 }))
        ));
    }
}
