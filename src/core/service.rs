//! Storage seams consumed by the read and write stages
//!
//! [`QueryExecutor`] runs a composed query and [`Persister`] applies the
//! changes collected in a [`UnitOfWork`]. The platform is agnostic to the
//! underlying storage mechanism.

use crate::core::error::PlatformResult;
use crate::query::QueryBuilder;
use async_trait::async_trait;
use serde_json::Value;

/// How a paginated query must be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaginationStrategy {
    /// Count and window over distinct root entities instead of raw rows
    pub use_output_walkers: bool,
    /// Window over root identifiers first so fetch-joined collections stay complete
    pub fetch_join_collection: bool,
}

impl PaginationStrategy {
    /// Whether the cheap row-based strategy can be used
    pub fn is_cheap(&self) -> bool {
        !self.use_output_walkers && !self.fetch_join_collection
    }
}

/// Paged execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub strategy: PaginationStrategy,
    /// `false` skips the count and looks one row ahead instead
    pub count: bool,
}

/// One window of results
#[derive(Debug, Clone, PartialEq)]
pub struct PageSlice {
    pub items: Vec<Value>,
    /// Total number of results, when counted
    pub total: Option<u64>,
    /// Whether results exist past the window
    pub has_more: bool,
}

/// Executes composed queries
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Every result of the query, honouring its window if set
    async fn fetch_all(&self, query: &QueryBuilder) -> PlatformResult<Vec<Value>>;

    /// The single result of the query, if any
    async fn fetch_one(&self, query: &QueryBuilder) -> PlatformResult<Option<Value>>;

    /// Window of the query given by its first/max results
    async fn paginate(&self, query: &QueryBuilder, request: PageRequest) -> PlatformResult<PageSlice>;
}

/// A pending storage change
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// New object; fails if its identity is already stored
    Insert { class: String, object: Value },
    Persist { class: String, object: Value },
    Remove { class: String, object: Value },
}

/// Changes staged during one request, applied by a single flush
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    changes: Vec<Change>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new object
    pub fn insert(&mut self, class: impl Into<String>, object: Value) {
        self.changes.push(Change::Insert {
            class: class.into(),
            object,
        });
    }

    /// Stage an insert or a replacement
    pub fn persist(&mut self, class: impl Into<String>, object: Value) {
        self.changes.push(Change::Persist {
            class: class.into(),
            object,
        });
    }

    /// Stage a removal
    pub fn remove(&mut self, class: impl Into<String>, object: Value) {
        self.changes.push(Change::Remove {
            class: class.into(),
            object,
        });
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Applies staged changes
#[async_trait]
pub trait Persister: Send + Sync {
    /// Apply every change atomically
    ///
    /// Returns the stored state of each persisted object (generated
    /// identifiers filled in), in staging order.
    async fn flush(&self, unit: UnitOfWork) -> PlatformResult<Vec<Value>>;
}
