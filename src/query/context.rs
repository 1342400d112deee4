//! Request-scoped query building context

use crate::query::ast::{Alias, Join, JoinKind, QueryBuilder};
use crate::query::name_generator::QueryNameGenerator;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Hint carrying the configured NULL ordering for order filters
pub const HINT_NULLS_COMPARISON: &str = "nulls_comparison";

/// Mutable state shared by every extension working on one query
///
/// The context is created by the read stage, handed to each extension in
/// turn as `&mut`, and dropped once the query ran. Every join alias and
/// parameter name must come from [`names`](Self::names).
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query: QueryBuilder,
    pub names: QueryNameGenerator,
    hints: HashMap<String, Value>,
    filters: Map<String, Value>,
}

impl QueryContext {
    /// Context over `SELECT o FROM resource_class o`
    pub fn new(resource_class: &str) -> Self {
        Self {
            query: QueryBuilder::new(resource_class, Alias::new("o")),
            names: QueryNameGenerator::new(),
            hints: HashMap::new(),
            filters: Map::new(),
        }
    }

    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.filters = filters;
        self
    }

    /// Client filter values, as bound from the query string
    pub fn filters(&self) -> &Map<String, Value> {
        &self.filters
    }

    pub fn filter(&self, name: &str) -> Option<&Value> {
        self.filters.get(name)
    }

    pub fn hint(&self, key: &str) -> Option<&Value> {
        self.hints.get(key)
    }

    pub fn set_hint(&mut self, key: impl Into<String>, value: Value) {
        self.hints.insert(key.into(), value);
    }

    pub fn root_alias(&self) -> Alias {
        self.query.root_alias().clone()
    }

    /// Join `association` on `parent`, reusing an existing join
    ///
    /// Returns the alias of the joined entity.
    pub fn join_once(&mut self, parent: &Alias, association: &str, kind: JoinKind) -> Alias {
        if let Some(existing) = self.query.join_for(parent, association) {
            return existing.alias.clone();
        }

        let alias = self.names.generate_join_alias(association);
        let join = match kind {
            JoinKind::Inner => Join::inner(parent, association, alias.clone()),
            JoinKind::Left => Join::left(parent, association, alias.clone()),
        };
        self.query.add_join(join);
        alias
    }

    /// Bind `value` under a fresh parameter name and return the name
    pub fn bind(&mut self, base: &str, value: Value) -> String {
        let name = self.names.generate_parameter_name(base);
        self.query.set_parameter(name.clone(), value);
        name
    }
}
