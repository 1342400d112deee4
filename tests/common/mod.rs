//! Shared fixture for integration tests
//!
//! A small library domain: authors write books, books collect reviews.
//! Books eagerly load their author and reviews.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use platform::prelude::*;
use uuid::Uuid;

pub const LIBRARY_YAML: &str = r#"
logging:
  level: debug
pagination:
  items_per_page: 3
  client_items_per_page: true
entities:
  - name: Author
    identifier: [id]
    fields: { id: integer, name: string }
  - name: Book
    identifier: [id]
    fields: { id: integer, title: string, price: float, author_id: integer }
    associations:
      - { name: author, target: Author, kind: to_one, join_column: author_id, fetch: eager }
      - { name: reviews, target: Review, kind: to_many, mapped_by: book_id, fetch: eager }
  - name: Review
    identifier: [id]
    fields: { id: integer, rating: integer, book_id: integer }
filters:
  book.search: { type: search, properties: { title: ipartial } }
  book.range: { type: range, properties: [price, reviews.rating] }
  book.order: { type: order, properties: [title, price] }
validation:
  Book:
    title: [required, { length: { min: 1, max: 50 } }]
    price: [positive]
errors:
  UNSUPPORTED_MEDIA_TYPE: 400
resources:
  - class: Book
    short_name: Book
    filters: [book.search, book.range, book.order]
    order: { id: ASC }
    operations:
      get_collection: { method: GET, kind: collection }
      post: { method: POST, security: authenticated }
      get: { method: GET }
      patch: { method: PATCH, security: authenticated }
      delete: { method: DELETE, security: admin_only }
  - class: Author
    short_name: Author
    operations:
      get: { method: GET }
"#;

pub fn library_config() -> PlatformConfig {
    PlatformConfig::from_yaml_str(LIBRARY_YAML).unwrap()
}

/// Host over the default in-memory store, seeded with `books` books
///
/// Book `n` costs `n * 10`, is written by author `n % 2 + 1` and has
/// reviews rated 1 and 5 when `n` is odd.
pub fn library_host(books: i64) -> PlatformHost {
    library_host_with(PlatformBuilder::new(library_config()), books)
}

pub fn library_host_with(builder: PlatformBuilder, books: i64) -> PlatformHost {
    let host = builder.build().unwrap();
    let store = host.in_memory_store().unwrap();

    store
        .seed(
            "Author",
            vec![json!({ "id": 1, "name": "Le Guin" }), json!({ "id": 2, "name": "Herbert" })],
        )
        .unwrap();
    store
        .seed(
            "Book",
            (1..=books).map(|n| {
                json!({
                    "id": n,
                    "title": format!("Book {n}"),
                    "price": (n * 10) as f64,
                    "author_id": n % 2 + 1,
                })
            }),
        )
        .unwrap();
    store
        .seed(
            "Review",
            (1..=books).filter(|n| n % 2 == 1).flat_map(|n| {
                vec![
                    json!({ "id": n * 10 + 1, "rating": 1, "book_id": n }),
                    json!({ "id": n * 10 + 2, "rating": 5, "book_id": n }),
                ]
            }),
        )
        .unwrap();
    host
}

pub fn id(value: &str) -> UriVariables {
    let mut uri = UriVariables::new();
    uri.insert("id".to_string(), value.to_string());
    uri
}

pub fn user() -> AuthContext {
    AuthContext::User {
        user_id: Uuid::new_v4(),
        tenant_id: None,
        roles: vec![],
    }
}

pub async fn get_collection(host: &PlatformHost, query: &str) -> ResourceResponse {
    host.handle(
        "Book",
        "get_collection",
        &UriVariables::new(),
        ResourceRequest::new(HttpMethod::Get).with_query(query),
        AuthContext::Anonymous,
    )
    .await
}

/// `id` values of a collection body's members
pub fn member_ids(body: &Value) -> Vec<i64> {
    body["member"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_i64().unwrap())
        .collect()
}
