//! Abstract query layer
//!
//! The extensions never write query text: they mutate a [`QueryBuilder`]
//! held by a [`QueryContext`]. Rendering to text is only done for logs.

pub mod ast;
pub mod checker;
pub mod context;
pub mod name_generator;
pub mod render;

pub use ast::{
    AggregateFunction, Alias, CompareOp, Expr, Join, JoinKind, NullsOrder, OrderBy, QueryBuilder,
};
pub use context::{HINT_NULLS_COMPARISON, QueryContext};
pub use name_generator::QueryNameGenerator;
