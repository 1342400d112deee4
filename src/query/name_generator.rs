//! Unique alias and parameter names for one query

use crate::query::ast::Alias;

/// Generates join aliases and parameter names that never collide
///
/// One generator lives in each [`QueryContext`](crate::query::QueryContext);
/// both counters only ever grow, so every name handed out during the
/// lifetime of the context is distinct.
#[derive(Debug, Default, Clone)]
pub struct QueryNameGenerator {
    join_counter: usize,
    parameter_counter: usize,
}

impl QueryNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `base_a{n}`
    pub fn generate_join_alias(&mut self, base: &str) -> Alias {
        self.join_counter += 1;
        Alias::new(format!("{}_a{}", base, self.join_counter))
    }

    /// `base_p{n}`, with dots in `base` replaced by underscores
    pub fn generate_parameter_name(&mut self, base: &str) -> String {
        self.parameter_counter += 1;
        format!("{}_p{}", base.replace('.', "_"), self.parameter_counter)
    }
}
