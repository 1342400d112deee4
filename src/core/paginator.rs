//! Paginated collection results

use serde::Serialize;
use serde_json::Value;

/// One page of a collection, with its total count
///
/// Built once by the pagination extension and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginator {
    items: Vec<Value>,
    current_page: u64,
    items_per_page: u64,
    total_items: u64,
}

impl Paginator {
    pub fn new(items: Vec<Value>, current_page: u64, items_per_page: u64, total_items: u64) -> Self {
        Self {
            items,
            current_page,
            items_per_page,
            total_items,
        }
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    /// Number of items on this page
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn total_items(&self) -> u64 {
        self.total_items
    }

    /// Last page number, never below 1
    pub fn last_page(&self) -> u64 {
        if self.items_per_page == 0 {
            return 1;
        }
        self.total_items.div_ceil(self.items_per_page).max(1)
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.last_page()
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }
}

/// One page of a collection without a total count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialPaginator {
    items: Vec<Value>,
    current_page: u64,
    items_per_page: u64,
    has_next: bool,
}

impl PartialPaginator {
    pub fn new(items: Vec<Value>, current_page: u64, items_per_page: u64, has_next: bool) -> Self {
        Self {
            items,
            current_page,
            items_per_page,
            has_next,
        }
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }
}

/// Result of a collection read
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionResult {
    Paginated(Paginator),
    Partial(PartialPaginator),
    /// Pagination disabled: every matching item
    Items(Vec<Value>),
}

impl CollectionResult {
    pub fn items(&self) -> &[Value] {
        match self {
            CollectionResult::Paginated(p) => p.items(),
            CollectionResult::Partial(p) => p.items(),
            CollectionResult::Items(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<Value> {
        match self {
            CollectionResult::Paginated(p) => p.into_items(),
            CollectionResult::Partial(p) => p.into_items(),
            CollectionResult::Items(items) => items,
        }
    }

    /// Total count, when known
    pub fn total_items(&self) -> Option<u64> {
        match self {
            CollectionResult::Paginated(p) => Some(p.total_items()),
            CollectionResult::Partial(_) => None,
            CollectionResult::Items(items) => Some(items.len() as u64),
        }
    }
}
