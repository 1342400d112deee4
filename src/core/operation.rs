//! Resource operation metadata
//!
//! An [`Operation`] is the immutable description of one resource action
//! ("list books", "get one book", "create a book"...). It is resolved once
//! per request, shared behind an `Arc` and never mutated afterwards.

use crate::core::auth::AuthPolicy;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether the method changes server state
    pub fn is_write(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an operation targets a collection or a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Collection,
    Item,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    #[serde(alias = "asc", alias = "Asc")]
    #[serde(rename = "ASC")]
    Asc,
    #[serde(alias = "desc", alias = "Desc")]
    #[serde(rename = "DESC")]
    Desc,
}

impl OrderDirection {
    /// Parse a client-supplied direction, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Some(OrderDirection::Asc),
            "desc" => Some(OrderDirection::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation-level pagination settings
///
/// Every field is optional; unset values fall back to the platform-wide
/// pagination configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationOptions {
    pub enabled: Option<bool>,
    pub client_enabled: Option<bool>,
    pub client_items_per_page: Option<bool>,
    pub client_partial: Option<bool>,
    pub items_per_page: Option<i64>,
    pub maximum_items_per_page: Option<i64>,
    pub partial: Option<bool>,
    /// Forces (or forbids) the identifier-window strategy for fetch-joined collections
    pub fetch_join_collection: Option<bool>,
    /// Forces (or forbids) the output-walking count strategy
    pub use_output_walkers: Option<bool>,
}

/// Immutable description of one resource operation
#[derive(Debug, Clone)]
pub struct Operation {
    /// Operation name, unique within its resource (e.g. "get_collection")
    pub name: String,

    /// Entity class the operation targets
    pub resource_class: String,

    /// Public resource name (e.g. "Book")
    pub short_name: String,

    /// Collection path (e.g. "/books")
    pub path: String,

    pub method: HttpMethod,

    pub kind: OperationKind,

    /// Enabled filter identifiers, in application order
    pub filters: IndexSet<String>,

    pub pagination: PaginationOptions,

    /// Default ordering (property => direction)
    pub order: IndexMap<String, OrderDirection>,

    /// `Some(false)` disables eager loading for this operation
    pub force_eager: Option<bool>,

    pub security: Option<AuthPolicy>,
    pub security_post_denormalize: Option<AuthPolicy>,
    pub security_post_validation: Option<AuthPolicy>,

    pub read: Option<bool>,
    pub deserialize: Option<bool>,
    pub validate: Option<bool>,
    pub write: Option<bool>,
    pub serialize: Option<bool>,

    /// Response status override
    pub status: Option<u16>,
}

impl Operation {
    /// Create an operation with method-based defaults
    pub fn new(
        name: impl Into<String>,
        resource_class: impl Into<String>,
        method: HttpMethod,
        kind: OperationKind,
    ) -> Self {
        let resource_class = resource_class.into();
        Self {
            name: name.into(),
            short_name: resource_class.clone(),
            path: format!("/{}", resource_class.to_lowercase()),
            resource_class,
            method,
            kind,
            filters: IndexSet::new(),
            pagination: PaginationOptions::default(),
            order: IndexMap::new(),
            force_eager: None,
            security: None,
            security_post_denormalize: None,
            security_post_validation: None,
            read: None,
            deserialize: None,
            validate: None,
            write: None,
            serialize: None,
            status: None,
        }
    }

    /// `GET` on a collection
    pub fn get_collection(resource_class: impl Into<String>) -> Self {
        Self::new(
            "get_collection",
            resource_class,
            HttpMethod::Get,
            OperationKind::Collection,
        )
    }

    /// `GET` on an item
    pub fn get(resource_class: impl Into<String>) -> Self {
        Self::new("get", resource_class, HttpMethod::Get, OperationKind::Item)
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_order(mut self, property: impl Into<String>, direction: OrderDirection) -> Self {
        self.order.insert(property.into(), direction);
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationOptions) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_force_eager(mut self, force_eager: bool) -> Self {
        self.force_eager = Some(force_eager);
        self
    }

    pub fn is_collection(&self) -> bool {
        self.kind == OperationKind::Collection
    }

    /// Whether the read stage loads data (off for `POST` by default)
    pub fn can_read(&self) -> bool {
        self.read.unwrap_or(self.method != HttpMethod::Post)
    }

    pub fn can_deserialize(&self) -> bool {
        self.deserialize.unwrap_or(matches!(
            self.method,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch
        ))
    }

    pub fn can_validate(&self) -> bool {
        self.validate.unwrap_or(matches!(
            self.method,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch
        ))
    }

    pub fn can_write(&self) -> bool {
        self.write.unwrap_or(self.method.is_write())
    }

    pub fn can_serialize(&self) -> bool {
        self.serialize.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_defaults() {
        let post = Operation::new("post", "Book", HttpMethod::Post, OperationKind::Collection);
        assert!(!post.can_read());
        assert!(post.can_deserialize());
        assert!(post.can_validate());
        assert!(post.can_write());

        let get = Operation::get("Book");
        assert!(get.can_read());
        assert!(!get.can_deserialize());
        assert!(!get.can_write());

        let delete = Operation::new("delete", "Book", HttpMethod::Delete, OperationKind::Item);
        assert!(delete.can_read());
        assert!(!delete.can_validate());
        assert!(delete.can_write());
    }

    #[test]
    fn test_explicit_switch_wins_over_default() {
        let mut post = Operation::new("post", "Book", HttpMethod::Post, OperationKind::Collection);
        post.validate = Some(false);
        assert!(!post.can_validate());
    }

    #[test]
    fn test_filters_keep_declaration_order() {
        let op = Operation::get_collection("Book").with_filters(["b.search", "a.order", "b.search"]);
        let filters: Vec<&str> = op.filters.iter().map(String::as_str).collect();
        assert_eq!(filters, vec!["b.search", "a.order"]);
    }

    #[test]
    fn test_order_direction_parsing() {
        assert_eq!(OrderDirection::parse("DESC"), Some(OrderDirection::Desc));
        assert_eq!(OrderDirection::parse("asc"), Some(OrderDirection::Asc));
        assert_eq!(OrderDirection::parse("sideways"), None);

        let parsed: OrderDirection = serde_yaml::from_str("desc").unwrap();
        assert_eq!(parsed, OrderDirection::Desc);
    }
}
