//! Textual rendering of queries
//!
//! The output reads like DQL (`SELECT o FROM Book o LEFT JOIN o.author
//! author_a1 WHERE ...`). It is only used for logging and assertions; the
//! executor works on the tree itself.

use crate::query::ast::{AggregateFunction, Expr, JoinKind, NullsOrder, QueryBuilder};
use serde_json::Value;
use std::fmt;

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        Value::Null => f.write_str("NULL"),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Field { alias, field } => write!(f, "{}.{}", alias, field),
            Expr::Identity(alias) => write!(f, "{}", alias),
            Expr::Literal(value) => write_literal(f, value),
            Expr::Parameter(name) => write!(f, ":{}", name),
            Expr::Compare { op, left, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Expr::Like {
                expr,
                pattern,
                case_insensitive: false,
            } => write!(f, "{} LIKE {}", expr, pattern),
            Expr::Like {
                expr,
                pattern,
                case_insensitive: true,
            } => write!(f, "LOWER({}) LIKE LOWER({})", expr, pattern),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{} {}IN(", expr, if *negated { "NOT " } else { "" })?;
                write_list(f, list, ", ")?;
                f.write_str(")")
            }
            Expr::InSubquery { exprs, subquery } => {
                if let [single] = exprs.as_slice() {
                    write!(f, "{}", single)?;
                } else {
                    f.write_str("(")?;
                    write_list(f, exprs, ", ")?;
                    f.write_str(")")?;
                }
                write!(f, " IN({})", subquery)
            }
            Expr::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    match item {
                        Expr::Or(_) => write!(f, "({})", item)?,
                        _ => write!(f, "{}", item)?,
                    }
                }
                Ok(())
            }
            Expr::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    match item {
                        Expr::And(_) => write!(f, "({})", item)?,
                        _ => write!(f, "{}", item)?,
                    }
                }
                Ok(())
            }
            Expr::Not(expr) => write!(f, "NOT({})", expr),
            Expr::Aggregate {
                function,
                expr,
                distinct,
            } => write!(
                f,
                "{}({}{})",
                function,
                if *distinct { "DISTINCT " } else { "" },
                expr
            ),
        }
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        write_list(f, self.select(), ", ")?;
        write!(f, " FROM {} {}", self.entity(), self.root_alias())?;

        for join in self.joins() {
            let kind = match join.kind {
                JoinKind::Inner => "INNER",
                JoinKind::Left => "LEFT",
            };
            write!(
                f,
                " {} JOIN {}.{} {}",
                kind, join.parent, join.association, join.alias
            )?;
            if let Some(condition) = &join.condition {
                write!(f, " WITH {}", condition)?;
            }
        }

        if let Some(where_clause) = self.where_clause() {
            write!(f, " WHERE {}", where_clause)?;
        }
        if !self.group_by().is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, self.group_by(), ", ")?;
        }
        if let Some(having) = self.having() {
            write!(f, " HAVING {}", having)?;
        }
        if !self.order_by().is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, order) in self.order_by().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{} {}", order.expr, order.direction)?;
                match order.nulls {
                    Some(NullsOrder::First) => f.write_str(" NULLS FIRST")?,
                    Some(NullsOrder::Last) => f.write_str(" NULLS LAST")?,
                    None => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::operation::OrderDirection;
    use crate::query::ast::*;
    use serde_json::json;

    #[test]
    fn test_render_full_query() {
        let o = Alias::new("o");
        let author = Alias::new("author_a1");
        let mut query = QueryBuilder::new("Book", o.clone());
        query.add_join(Join::inner(&o, "author", author.clone()));
        query.add_select(&author);
        query.and_where(Expr::eq(Expr::field(&author, "name"), Expr::param("name_p1")));
        query.and_where(Expr::Or(vec![
            Expr::is_null(Expr::field(&o, "price")),
            Expr::compare(CompareOp::Gt, Expr::field(&o, "price"), Expr::Literal(json!(10))),
        ]));
        query.add_order_by(OrderBy {
            expr: Expr::field(&o, "title"),
            direction: OrderDirection::Desc,
            nulls: Some(NullsOrder::Last),
        });

        assert_eq!(
            query.to_string(),
            "SELECT o, author_a1 FROM Book o INNER JOIN o.author author_a1 \
             WHERE author_a1.name = :name_p1 AND (o.price IS NULL OR o.price > 10) \
             ORDER BY o.title DESC NULLS LAST"
        );
    }

    #[test]
    fn test_render_tuple_in_subquery() {
        let inner = QueryBuilder::new("Line", Alias::new("o_a1"));
        let expr = Expr::InSubquery {
            exprs: vec![Expr::Identity(Alias::new("o"))],
            subquery: Box::new(inner),
        };
        assert_eq!(expr.to_string(), "o IN(SELECT o_a1 FROM Line o_a1)");
    }

    #[test]
    fn test_render_like_and_literals() {
        let o = Alias::new("o");
        let expr = Expr::Like {
            expr: Box::new(Expr::field(&o, "title")),
            pattern: Box::new(Expr::Literal(json!("%o'k%"))),
            case_insensitive: true,
        };
        assert_eq!(expr.to_string(), "LOWER(o.title) LIKE LOWER('%o''k%')");
    }
}
