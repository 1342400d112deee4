//! Composable query representation
//!
//! [`QueryBuilder`] is the abstract query the extensions mutate: a root
//! entity under an alias, joins over associations, a WHERE tree, grouping,
//! ordering and an optional result window. Aliases are values of their own
//! type, so rewriting "every occurrence of alias X" is a walk over the tree
//! and never a substring replacement.

use crate::core::operation::OrderDirection;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Alias of an entity inside one query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Alias(String);

impl Alias {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Alias {
    fn from(name: &str) -> Self {
        Alias::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// Expression tree used in WHERE, HAVING, join conditions and ORDER BY
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `alias.field`
    Field { alias: Alias, field: String },
    /// The entity under `alias`, compared by its identifier
    Identity(Alias),
    Literal(Value),
    /// `:name`, bound on the outermost query
    Parameter(String),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        case_insensitive: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `(a, b) IN (SELECT ...)`; the subquery selects entity identities
    InSubquery {
        exprs: Vec<Expr>,
        subquery: Box<QueryBuilder>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Aggregate {
        function: AggregateFunction,
        expr: Box<Expr>,
        distinct: bool,
    },
}

impl Expr {
    pub fn field(alias: &Alias, field: impl Into<String>) -> Self {
        Expr::Field {
            alias: alias.clone(),
            field: field.into(),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Parameter(name.into())
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn is_null(expr: Expr) -> Self {
        Expr::IsNull {
            expr: Box::new(expr),
            negated: false,
        }
    }

    pub fn is_not_null(expr: Expr) -> Self {
        Expr::IsNull {
            expr: Box::new(expr),
            negated: true,
        }
    }

    /// Conjunction that flattens nested ANDs
    pub fn and(self, other: Expr) -> Self {
        match (self, other) {
            (Expr::And(mut left), Expr::And(right)) => {
                left.extend(right);
                Expr::And(left)
            }
            (Expr::And(mut left), right) => {
                left.push(right);
                Expr::And(left)
            }
            (left, Expr::And(mut right)) => {
                right.insert(0, left);
                Expr::And(right)
            }
            (left, right) => Expr::And(vec![left, right]),
        }
    }

    /// Replace every reference to `from` by `to`, nested subqueries included
    pub fn rename_alias(&mut self, from: &Alias, to: &Alias) {
        match self {
            Expr::Field { alias, .. } | Expr::Identity(alias) => {
                if alias == from {
                    *alias = to.clone();
                }
            }
            Expr::Literal(_) | Expr::Parameter(_) => {}
            Expr::Compare { left, right, .. } => {
                left.rename_alias(from, to);
                right.rename_alias(from, to);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.rename_alias(from, to);
                pattern.rename_alias(from, to);
            }
            Expr::IsNull { expr, .. } | Expr::Not(expr) | Expr::Aggregate { expr, .. } => {
                expr.rename_alias(from, to)
            }
            Expr::InList { expr, list, .. } => {
                expr.rename_alias(from, to);
                list.iter_mut().for_each(|item| item.rename_alias(from, to));
            }
            Expr::InSubquery { exprs, subquery } => {
                exprs.iter_mut().for_each(|item| item.rename_alias(from, to));
                subquery.rename_alias(from, to);
            }
            Expr::And(items) | Expr::Or(items) => {
                items.iter_mut().for_each(|item| item.rename_alias(from, to));
            }
        }
    }

    /// Visit every alias referenced by this expression
    pub fn visit_aliases<'a>(&'a self, visit: &mut impl FnMut(&'a Alias)) {
        match self {
            Expr::Field { alias, .. } | Expr::Identity(alias) => visit(alias),
            Expr::Literal(_) | Expr::Parameter(_) => {}
            Expr::Compare { left, right, .. } => {
                left.visit_aliases(visit);
                right.visit_aliases(visit);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.visit_aliases(visit);
                pattern.visit_aliases(visit);
            }
            Expr::IsNull { expr, .. } | Expr::Not(expr) | Expr::Aggregate { expr, .. } => {
                expr.visit_aliases(visit)
            }
            Expr::InList { expr, list, .. } => {
                expr.visit_aliases(visit);
                list.iter().for_each(|item| item.visit_aliases(visit));
            }
            Expr::InSubquery { exprs, .. } => {
                // the subquery has its own alias scope
                exprs.iter().for_each(|item| item.visit_aliases(visit));
            }
            Expr::And(items) | Expr::Or(items) => {
                items.iter().for_each(|item| item.visit_aliases(visit));
            }
        }
    }

    pub fn references_alias(&self, alias: &Alias) -> bool {
        let mut found = false;
        self.visit_aliases(&mut |candidate| found |= candidate == alias);
        found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Join over an association of an already declared alias
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub parent: Alias,
    pub association: String,
    pub alias: Alias,
    pub condition: Option<Expr>,
}

impl Join {
    pub fn left(parent: &Alias, association: impl Into<String>, alias: Alias) -> Self {
        Self {
            kind: JoinKind::Left,
            parent: parent.clone(),
            association: association.into(),
            alias,
            condition: None,
        }
    }

    pub fn inner(parent: &Alias, association: impl Into<String>, alias: Alias) -> Self {
        Self {
            kind: JoinKind::Inner,
            ..Self::left(parent, association, alias)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
    /// `None` sorts NULL as the smallest value
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn new(expr: Expr, direction: OrderDirection) -> Self {
        Self {
            expr,
            direction,
            nulls: None,
        }
    }
}

/// The in-progress query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    entity: String,
    root_alias: Alias,
    select: Vec<Alias>,
    joins: Vec<Join>,
    where_clause: Option<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    order_by: Vec<OrderBy>,
    parameters: IndexMap<String, Value>,
    first_result: Option<u64>,
    max_results: Option<u64>,
}

impl QueryBuilder {
    /// `SELECT alias FROM entity alias`
    pub fn new(entity: impl Into<String>, root_alias: Alias) -> Self {
        Self {
            entity: entity.into(),
            select: vec![root_alias.clone()],
            root_alias,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            parameters: IndexMap::new(),
            first_result: None,
            max_results: None,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn root_alias(&self) -> &Alias {
        &self.root_alias
    }

    pub fn select(&self) -> &[Alias] {
        &self.select
    }

    pub fn add_select(&mut self, alias: &Alias) -> &mut Self {
        if !self.select.contains(alias) {
            self.select.push(alias.clone());
        }
        self
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn add_join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    /// Existing join of `association` on `parent`
    pub fn join_for(&self, parent: &Alias, association: &str) -> Option<&Join> {
        self.joins
            .iter()
            .find(|join| &join.parent == parent && join.association == association)
    }

    /// Join that declared `alias`
    pub fn join_by_alias(&self, alias: &Alias) -> Option<&Join> {
        self.joins.iter().find(|join| &join.alias == alias)
    }

    pub fn reset_joins(&mut self) -> &mut Self {
        self.joins.clear();
        self.select.retain(|alias| alias == &self.root_alias);
        self
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    pub fn and_where(&mut self, expr: Expr) -> &mut Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn set_where(&mut self, expr: Option<Expr>) -> &mut Self {
        self.where_clause = expr;
        self
    }

    pub fn group_by(&self) -> &[Expr] {
        &self.group_by
    }

    pub fn add_group_by(&mut self, expr: Expr) -> &mut Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(&self) -> Option<&Expr> {
        self.having.as_ref()
    }

    pub fn and_having(&mut self, expr: Expr) -> &mut Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn add_order_by(&mut self, order: OrderBy) -> &mut Self {
        self.order_by.push(order);
        self
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn first_result(&self) -> Option<u64> {
        self.first_result
    }

    pub fn set_first_result(&mut self, first_result: Option<u64>) -> &mut Self {
        self.first_result = first_result;
        self
    }

    pub fn max_results(&self) -> Option<u64> {
        self.max_results
    }

    pub fn set_max_results(&mut self, max_results: Option<u64>) -> &mut Self {
        self.max_results = max_results;
        self
    }

    /// Every alias declared by this query (root first, then joins)
    pub fn aliases(&self) -> impl Iterator<Item = &Alias> {
        std::iter::once(&self.root_alias).chain(self.joins.iter().map(|join| &join.alias))
    }

    /// Replace every reference to `from` by `to`
    pub fn rename_alias(&mut self, from: &Alias, to: &Alias) {
        let rename = |alias: &mut Alias| {
            if alias == from {
                *alias = to.clone();
            }
        };

        rename(&mut self.root_alias);
        self.select.iter_mut().for_each(rename);
        for join in &mut self.joins {
            rename(&mut join.parent);
            rename(&mut join.alias);
            if let Some(condition) = &mut join.condition {
                condition.rename_alias(from, to);
            }
        }
        for expr in self
            .where_clause
            .iter_mut()
            .chain(self.having.iter_mut())
            .chain(self.group_by.iter_mut())
        {
            expr.rename_alias(from, to);
        }
        for order in &mut self.order_by {
            order.expr.rename_alias(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_and_flattens() {
        let o = Alias::new("o");
        let expr = Expr::eq(Expr::field(&o, "a"), Expr::param("a_p1"))
            .and(Expr::eq(Expr::field(&o, "b"), Expr::param("b_p2")))
            .and(Expr::is_null(Expr::field(&o, "c")));
        match expr {
            Expr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_rename_alias_matches_whole_aliases_only() {
        let o = Alias::new("o");
        let prefixed = Alias::new("o_a1");
        let mut expr = Expr::eq(Expr::field(&o, "id"), Expr::field(&prefixed, "book_id"));

        expr.rename_alias(&o, &Alias::new("o_a9"));

        assert!(expr.references_alias(&Alias::new("o_a9")));
        assert!(expr.references_alias(&prefixed));
        assert!(!expr.references_alias(&o));
    }

    #[test]
    fn test_rename_reaches_join_conditions() {
        let o = Alias::new("o");
        let reviews = Alias::new("reviews_a1");
        let mut query = QueryBuilder::new("Book", o.clone());
        let mut join = Join::left(&o, "reviews", reviews.clone());
        join.condition = Some(Expr::compare(
            CompareOp::Gt,
            Expr::field(&reviews, "rating"),
            Expr::Literal(json!(3)),
        ));
        query.add_join(join);
        query.add_select(&reviews);

        let renamed = Alias::new("reviews_a2");
        query.rename_alias(&reviews, &renamed);

        let join = &query.joins()[0];
        assert_eq!(join.alias, renamed);
        assert!(join.condition.as_ref().unwrap().references_alias(&renamed));
        assert!(query.select().contains(&renamed));
    }

    #[test]
    fn test_reset_joins_keeps_root_selection() {
        let o = Alias::new("o");
        let mut query = QueryBuilder::new("Book", o.clone());
        let author = Alias::new("author_a1");
        query.add_join(Join::left(&o, "author", author.clone()));
        query.add_select(&author);

        query.reset_joins();

        assert!(query.joins().is_empty());
        assert_eq!(query.select(), &[o]);
    }
}
