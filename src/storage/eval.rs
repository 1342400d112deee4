//! Query evaluation over in-memory tables
//!
//! A query is evaluated in three steps:
//!
//! 1. joins expand every root row into tuples (one slot per alias);
//! 2. WHERE keeps the tuples it evaluates to true for (NULL counts as false),
//!    then ORDER BY sorts them;
//! 3. the tuples are hydrated back into nested objects: one object per
//!    distinct root identity, selected joins nested under their association
//!    name, in first-seen order.
//!
//! Windowing happens between 2 and 3, over raw tuples (cheap strategy) or
//! over distinct root identities (expensive strategies).

use crate::core::error::{PlatformResult, QueryError};
use crate::core::metadata::{Association, ClassMetadata, ClassMetadataFactory};
use crate::core::operation::OrderDirection;
use crate::core::service::{PageRequest, PageSlice};
use crate::query::{Alias, CompareOp, Expr, JoinKind, NullsOrder, OrderBy, QueryBuilder};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

pub(crate) type Row = Map<String, Value>;
pub(crate) type Tables = HashMap<String, Vec<Row>>;

type Tuple<'a> = Vec<Option<&'a Row>>;

/// One alias of the evaluated query
struct Slot {
    class: Arc<ClassMetadata>,
    parent: Option<usize>,
    association: Option<Association>,
}

/// Alias positions of one query
struct Scope {
    slots: Vec<Slot>,
    index: HashMap<Alias, usize>,
}

impl Scope {
    fn build(query: &QueryBuilder, classes: &dyn ClassMetadataFactory) -> PlatformResult<Self> {
        let mut slots = vec![Slot {
            class: classes.get(query.entity())?,
            parent: None,
            association: None,
        }];
        let mut index = HashMap::new();
        index.insert(query.root_alias().clone(), 0);

        for join in query.joins() {
            let parent = *index.get(&join.parent).ok_or_else(|| QueryError::UnknownAlias {
                alias: join.parent.to_string(),
            })?;
            let parent_class = &slots[parent].class;
            let association = parent_class
                .association(&join.association)
                .cloned()
                .ok_or_else(|| QueryError::UnknownAssociation {
                    class: parent_class.name.clone(),
                    association: join.association.clone(),
                })?;
            let class = classes.get(&association.target)?;
            index.insert(join.alias.clone(), slots.len());
            slots.push(Slot {
                class,
                parent: Some(parent),
                association: Some(association),
            });
        }

        Ok(Self { slots, index })
    }

    fn position(&self, alias: &Alias) -> PlatformResult<usize> {
        self.index.get(alias).copied().ok_or_else(|| {
            QueryError::UnknownAlias {
                alias: alias.to_string(),
            }
            .into()
        })
    }
}

fn unsupported(message: impl Into<String>) -> QueryError {
    QueryError::Unsupported {
        message: message.into(),
    }
}

fn identity(row: &Row, class: &ClassMetadata) -> Vec<Value> {
    class
        .identifier
        .iter()
        .map(|field| row.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn identity_key(row: &Row, class: &ClassMetadata) -> String {
    Value::Array(identity(row, class)).to_string()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn tuples_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// SQL LIKE with `%`, `_` and backslash escapes
fn like_match(text: &str, pattern: &str) -> bool {
    enum Token {
        Any,
        One,
        Literal(char),
    }

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            '%' => Token::Any,
            '_' => Token::One,
            c => Token::Literal(c),
        });
    }

    let text: Vec<char> = text.chars().collect();
    // matches[j]: the first i text chars match the first j tokens
    let mut matches = vec![false; tokens.len() + 1];
    matches[0] = true;
    for (j, token) in tokens.iter().enumerate() {
        if matches!(token, Token::Any) {
            matches[j + 1] = matches[j];
        }
    }
    for c in &text {
        let mut next = vec![false; tokens.len() + 1];
        for (j, token) in tokens.iter().enumerate() {
            next[j + 1] = match token {
                Token::Any => next[j] || matches[j + 1],
                Token::One => matches[j],
                Token::Literal(l) => matches[j] && l == c,
            };
        }
        matches = next;
    }
    matches[tokens.len()]
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

fn compare_keys(a: &[Value], b: &[Value], order_by: &[OrderBy]) -> Ordering {
    for ((x, y), order) in a.iter().zip(b).zip(order_by) {
        let nulls_first = match order.nulls {
            Some(NullsOrder::First) => true,
            Some(NullsOrder::Last) => false,
            None => order.direction == OrderDirection::Asc,
        };
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = compare_values(x, y).unwrap_or(Ordering::Equal);
                match order.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

struct Evaluator<'a> {
    tables: &'a Tables,
    classes: &'a dyn ClassMetadataFactory,
    parameters: &'a IndexMap<String, Value>,
    subqueries: RefCell<HashMap<usize, Rc<Vec<Vec<Value>>>>>,
}

impl<'a> Evaluator<'a> {
    fn new(
        tables: &'a Tables,
        classes: &'a dyn ClassMetadataFactory,
        parameters: &'a IndexMap<String, Value>,
    ) -> Self {
        Self {
            tables,
            classes,
            parameters,
            subqueries: RefCell::new(HashMap::new()),
        }
    }

    fn rows(&self, class: &str) -> &'a [Row] {
        self.tables.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Joined, filtered and ordered tuples of `query`
    fn run(&self, query: &QueryBuilder) -> PlatformResult<(Scope, Vec<Tuple<'a>>)> {
        if !query.group_by().is_empty() || query.having().is_some() {
            return Err(unsupported("GROUP BY and HAVING are not supported by the in-memory executor").into());
        }

        let scope = Scope::build(query, self.classes)?;
        let mut tuples: Vec<Tuple<'a>> = self
            .rows(&scope.slots[0].class.name)
            .iter()
            .map(|row| vec![Some(row)])
            .collect();

        for (i, join) in query.joins().iter().enumerate() {
            let slot = &scope.slots[i + 1];
            let parent = slot.parent.unwrap_or(0);
            let mut joined = Vec::with_capacity(tuples.len());

            for tuple in tuples {
                let candidates = match tuple[parent] {
                    Some(row) => self.related(row, &scope.slots[parent].class, slot)?,
                    None => Vec::new(),
                };

                let mut matched = false;
                for candidate in candidates {
                    let mut extended = tuple.clone();
                    extended.push(Some(candidate));
                    if let Some(condition) = &join.condition {
                        if !truthy(&self.eval(condition, &scope, &extended)?) {
                            continue;
                        }
                    }
                    matched = true;
                    joined.push(extended);
                }

                if !matched && join.kind == JoinKind::Left {
                    let mut extended = tuple;
                    extended.push(None);
                    joined.push(extended);
                }
            }
            tuples = joined;
        }

        if let Some(where_clause) = query.where_clause() {
            let mut kept = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                if truthy(&self.eval(where_clause, &scope, &tuple)?) {
                    kept.push(tuple);
                }
            }
            tuples = kept;
        }

        if !query.order_by().is_empty() {
            let mut keyed = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let keys = query
                    .order_by()
                    .iter()
                    .map(|order| self.eval(&order.expr, &scope, &tuple))
                    .collect::<PlatformResult<Vec<_>>>()?;
                keyed.push((keys, tuple));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, query.order_by()));
            tuples = keyed.into_iter().map(|(_, tuple)| tuple).collect();
        }

        Ok((scope, tuples))
    }

    /// Rows of `slot`'s class associated with `parent`
    fn related(&self, parent: &Row, parent_class: &ClassMetadata, slot: &Slot) -> PlatformResult<Vec<&'a Row>> {
        let Some(association) = &slot.association else {
            return Ok(Vec::new());
        };
        let rows = self.rows(&slot.class.name);

        if let Some(column) = &association.join_column {
            let key = parent.get(column).unwrap_or(&Value::Null);
            if key.is_null() {
                return Ok(Vec::new());
            }
            let [target_id] = slot.class.identifier.as_slice() else {
                return Err(unsupported(format!(
                    "association '{}' targets a composite identifier",
                    association.name
                ))
                .into());
            };
            return Ok(rows
                .iter()
                .filter(|row| row.get(target_id).is_some_and(|v| values_equal(v, key)))
                .collect());
        }

        if !association.mapped_by.is_empty() {
            if association.mapped_by.len() != parent_class.identifier.len() {
                return Err(unsupported(format!(
                    "association '{}' maps {} column(s) to a {}-field identifier",
                    association.name,
                    association.mapped_by.len(),
                    parent_class.identifier.len()
                ))
                .into());
            }
            // every mapped column must match its identifier field
            let keys: Vec<(&String, &Value)> = association
                .mapped_by
                .iter()
                .zip(&parent_class.identifier)
                .map(|(column, id)| (column, parent.get(id).unwrap_or(&Value::Null)))
                .collect();
            return Ok(rows
                .iter()
                .filter(|row| {
                    keys.iter()
                        .all(|(column, key)| row.get(*column).is_some_and(|v| values_equal(v, key)))
                })
                .collect());
        }

        Err(unsupported(format!(
            "association '{}' declares neither join_column nor mapped_by",
            association.name
        ))
        .into())
    }

    fn slot_row(&self, scope: &Scope, tuple: &Tuple<'a>, alias: &Alias) -> PlatformResult<(usize, Option<&'a Row>)> {
        let position = scope.position(alias)?;
        Ok((position, tuple.get(position).copied().flatten()))
    }

    fn eval(&self, expr: &Expr, scope: &Scope, tuple: &Tuple<'a>) -> PlatformResult<Value> {
        let value = match expr {
            Expr::Field { alias, field } => {
                let (_, row) = self.slot_row(scope, tuple, alias)?;
                row.and_then(|row| row.get(field)).cloned().unwrap_or(Value::Null)
            }
            Expr::Identity(alias) => {
                let (position, row) = self.slot_row(scope, tuple, alias)?;
                match row {
                    Some(row) => Value::Array(identity(row, &scope.slots[position].class)),
                    None => Value::Null,
                }
            }
            Expr::Literal(value) => value.clone(),
            Expr::Parameter(name) => self.parameters.get(name).cloned().ok_or_else(|| {
                QueryError::UnboundParameter { name: name.clone() }
            })?,
            Expr::Compare { op, left, right } => {
                let left = self.eval(left, scope, tuple)?;
                let right = self.eval(right, scope, tuple)?;
                if left.is_null() || right.is_null() {
                    return Ok(Value::Null);
                }
                let result = match op {
                    CompareOp::Eq => Some(values_equal(&left, &right)),
                    CompareOp::Neq => Some(!values_equal(&left, &right)),
                    CompareOp::Lt => compare_values(&left, &right).map(Ordering::is_lt),
                    CompareOp::Lte => compare_values(&left, &right).map(Ordering::is_le),
                    CompareOp::Gt => compare_values(&left, &right).map(Ordering::is_gt),
                    CompareOp::Gte => compare_values(&left, &right).map(Ordering::is_ge),
                };
                result.map(Value::Bool).unwrap_or(Value::Null)
            }
            Expr::Like {
                expr,
                pattern,
                case_insensitive,
            } => {
                let text = self.eval(expr, scope, tuple)?;
                let pattern = self.eval(pattern, scope, tuple)?;
                match (text.as_str(), pattern.as_str()) {
                    (Some(text), Some(pattern)) if *case_insensitive => {
                        Value::Bool(like_match(&text.to_lowercase(), &pattern.to_lowercase()))
                    }
                    (Some(text), Some(pattern)) => Value::Bool(like_match(text, pattern)),
                    _ => Value::Null,
                }
            }
            Expr::IsNull { expr, negated } => {
                Value::Bool(self.eval(expr, scope, tuple)?.is_null() != *negated)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, scope, tuple)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                for item in list {
                    found |= values_equal(&value, &self.eval(item, scope, tuple)?);
                }
                Value::Bool(found != *negated)
            }
            Expr::InSubquery { exprs, subquery } => {
                let mut left = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    match self.eval(expr, scope, tuple)? {
                        Value::Null => return Ok(Value::Null),
                        Value::Array(values) if exprs.len() == 1 => left = values,
                        value => left.push(value),
                    }
                }
                let identities = self.subquery_identities(subquery)?;
                Value::Bool(identities.iter().any(|candidate| tuples_equal(candidate, &left)))
            }
            Expr::And(items) => {
                let mut unknown = false;
                for item in items {
                    match self.eval(item, scope, tuple)? {
                        Value::Bool(false) => return Ok(Value::Bool(false)),
                        Value::Bool(true) => {}
                        _ => unknown = true,
                    }
                }
                if unknown { Value::Null } else { Value::Bool(true) }
            }
            Expr::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match self.eval(item, scope, tuple)? {
                        Value::Bool(true) => return Ok(Value::Bool(true)),
                        Value::Bool(false) => {}
                        _ => unknown = true,
                    }
                }
                if unknown { Value::Null } else { Value::Bool(false) }
            }
            Expr::Not(expr) => match self.eval(expr, scope, tuple)? {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Null,
            },
            Expr::Aggregate { .. } => {
                return Err(unsupported("aggregates are not supported by the in-memory executor").into());
            }
        };
        Ok(value)
    }

    /// Identities selected by an uncorrelated subquery, evaluated once
    fn subquery_identities(&self, subquery: &QueryBuilder) -> PlatformResult<Rc<Vec<Vec<Value>>>> {
        let key = subquery as *const QueryBuilder as usize;
        if let Some(cached) = self.subqueries.borrow().get(&key) {
            return Ok(cached.clone());
        }

        let (scope, tuples) = self.run(subquery)?;
        let selected = subquery.select().first().unwrap_or(subquery.root_alias());
        let position = scope.position(selected)?;
        let class = &scope.slots[position].class;
        let identities: Vec<Vec<Value>> = tuples
            .iter()
            .filter_map(|tuple| tuple[position])
            .map(|row| identity(row, class))
            .collect();

        let identities = Rc::new(identities);
        self.subqueries.borrow_mut().insert(key, identities.clone());
        Ok(identities)
    }
}

/// Nest selected joins under their association name
fn hydrate(scope: &Scope, selected: &HashSet<usize>, position: usize, tuples: &[&Tuple<'_>]) -> Vec<Value> {
    let class = &scope.slots[position].class;
    let mut groups: IndexMap<String, (&Row, Vec<&Tuple<'_>>)> = IndexMap::new();
    for tuple in tuples.iter().copied() {
        if let Some(row) = tuple.get(position).copied().flatten() {
            groups
                .entry(identity_key(row, class))
                .or_insert_with(|| (row, Vec::new()))
                .1
                .push(tuple);
        }
    }

    let children: Vec<usize> = (0..scope.slots.len())
        .filter(|child| scope.slots[*child].parent == Some(position) && selected.contains(child))
        .collect();

    groups
        .into_values()
        .map(|(row, group)| {
            let mut object = row.clone();
            for child in &children {
                let Some(association) = &scope.slots[*child].association else {
                    continue;
                };
                let nested = hydrate(scope, selected, *child, &group);
                let value = if association.is_to_many() {
                    Value::Array(nested)
                } else {
                    nested.into_iter().next().unwrap_or(Value::Null)
                };
                object.insert(association.name.clone(), value);
            }
            Value::Object(object)
        })
        .collect()
}

fn selected_positions(query: &QueryBuilder, scope: &Scope) -> HashSet<usize> {
    query
        .select()
        .iter()
        .filter_map(|alias| scope.index.get(alias).copied())
        .collect()
}

/// Evaluate `query` and window it
///
/// Without a page request the query's own window applies to hydrated root
/// objects. With one, the strategy decides whether raw tuples or distinct
/// root identities are windowed and counted.
pub(crate) fn execute(
    tables: &Tables,
    classes: &dyn ClassMetadataFactory,
    query: &QueryBuilder,
    request: Option<PageRequest>,
) -> PlatformResult<PageSlice> {
    let evaluator = Evaluator::new(tables, classes, query.parameters());
    let (scope, tuples) = evaluator.run(query)?;
    let selected = selected_positions(query, &scope);

    let offset = query.first_result().unwrap_or(0) as usize;
    let limit = query.max_results().map(|max| max as usize);

    let Some(request) = request else {
        let all: Vec<&Tuple<'_>> = tuples.iter().collect();
        let items = hydrate(&scope, &selected, 0, &all);
        let total = items.len();
        let items: Vec<Value> = items
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        let has_more = offset + items.len() < total;
        return Ok(PageSlice {
            items,
            total: Some(total as u64),
            has_more,
        });
    };

    // look one row ahead when not counting
    let take = match limit {
        Some(limit) if !request.count => limit + 1,
        Some(limit) => limit,
        None => usize::MAX,
    };

    let (window, total): (Vec<&Tuple<'_>>, usize) = if request.strategy.is_cheap() {
        let window = tuples.iter().skip(offset).take(take).collect();
        (window, tuples.len())
    } else {
        let root = &scope.slots[0].class;
        let identities: IndexSet<String> = tuples
            .iter()
            .filter_map(|tuple| tuple[0])
            .map(|row| identity_key(row, root))
            .collect();
        let kept: HashSet<&String> = identities.iter().skip(offset).take(take).collect();
        let window = tuples
            .iter()
            .filter(|tuple| tuple[0].is_some_and(|row| kept.contains(&identity_key(row, root))))
            .collect();
        (window, identities.len())
    };

    let mut items = hydrate(&scope, &selected, 0, &window);
    let has_more = match limit {
        Some(limit) if !request.count => {
            let more = items.len() > limit;
            items.truncate(limit);
            more
        }
        Some(limit) => offset + limit < total,
        None => false,
    };

    Ok(PageSlice {
        items,
        total: request.count.then_some(total as u64),
        has_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_match() {
        assert!(like_match("Dune Messiah", "%Mess%"));
        assert!(like_match("Dune", "D_ne"));
        assert!(!like_match("Dune", "D_e"));
        assert!(like_match("100%", "100\\%"));
        assert!(!like_match("1000", "100\\%"));
        assert!(like_match("", "%"));
        assert!(like_match("abc", "%%c"));
    }

    #[test]
    fn test_number_equality_ignores_representation() {
        assert!(values_equal(&Value::from(3), &Value::from(3.0)));
        assert!(!values_equal(&Value::from(3), &Value::from("3")));
        assert_eq!(
            compare_values(&Value::from(2), &Value::from(10)),
            Some(Ordering::Less)
        );
        assert_eq!(compare_values(&Value::from("a"), &Value::from(1)), None);
    }

    #[test]
    fn test_nulls_sort_smallest_by_default() {
        let asc = [OrderBy::new(Expr::Literal(Value::Null), OrderDirection::Asc)];
        assert_eq!(
            compare_keys(&[Value::Null], &[Value::from(1)], &asc),
            Ordering::Less
        );

        let desc = [OrderBy::new(Expr::Literal(Value::Null), OrderDirection::Desc)];
        assert_eq!(
            compare_keys(&[Value::Null], &[Value::from(1)], &desc),
            Ordering::Greater
        );

        let last = [OrderBy {
            expr: Expr::Literal(Value::Null),
            direction: OrderDirection::Asc,
            nulls: Some(NullsOrder::Last),
        }];
        assert_eq!(
            compare_keys(&[Value::Null], &[Value::from(1)], &last),
            Ordering::Greater
        );
    }
}
