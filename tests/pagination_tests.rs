//! End-to-end pagination through the host

mod common;

use axum::http::StatusCode;
use common::*;
use platform::prelude::*;

/// A flat entity: no associations, simple identifier, so the cheap strategy applies
const TAGS_YAML: &str = r#"
pagination:
  items_per_page: 3
  client_items_per_page: true
  client_partial: true
entities:
  - name: Tag
    identifier: [id]
    fields: { id: integer, label: string }
resources:
  - class: Tag
    short_name: Tag
    order: { id: ASC }
    operations:
      get_collection: { method: GET, kind: collection }
"#;

fn tags_host(rows: i64) -> PlatformHost {
    let host = PlatformBuilder::from_yaml_str(TAGS_YAML).unwrap().build().unwrap();
    host.in_memory_store()
        .unwrap()
        .seed(
            "Tag",
            (1..=rows).map(|n| json!({ "id": n, "label": format!("tag-{n}") })),
        )
        .unwrap();
    host
}

async fn tags_page(host: &PlatformHost, page: u64) -> Value {
    let response = host
        .handle(
            "Tag",
            "get_collection",
            &UriVariables::new(),
            ResourceRequest::new(HttpMethod::Get).with_query(format!("page={page}")),
            AuthContext::Anonymous,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    response.body.unwrap()
}

#[tokio::test]
async fn test_seven_rows_three_per_page() {
    let host = tags_host(7);

    let first = tags_page(&host, 1).await;
    assert_eq!(member_ids(&first), vec![1, 2, 3]);
    assert_eq!(first["totalItems"], 7);
    assert_eq!(first["view"]["next"], "/tags?page=2");
    assert_eq!(first["view"]["last"], "/tags?page=3");
    assert!(first["view"].get("previous").is_none());

    let third = tags_page(&host, 3).await;
    assert_eq!(member_ids(&third), vec![7]);
    assert!(third["view"].get("next").is_none());
    assert_eq!(third["view"]["previous"], "/tags?page=2");

    let fourth = tags_page(&host, 4).await;
    assert!(member_ids(&fourth).is_empty());
    assert!(fourth["view"].get("next").is_none());
}

async fn tags_query(host: &PlatformHost, query: &str) -> Value {
    let response = host
        .handle(
            "Tag",
            "get_collection",
            &UriVariables::new(),
            ResourceRequest::new(HttpMethod::Get).with_query(query),
            AuthContext::Anonymous,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    response.body.unwrap()
}

#[tokio::test]
async fn test_partial_pages_only_know_about_next() {
    let host = tags_host(7);

    let first = tags_query(&host, "partial=true&itemsPerPage=3&page=1").await;
    assert_eq!(member_ids(&first), vec![1, 2, 3]);
    assert!(first.get("totalItems").is_none());
    assert_eq!(first["view"]["next"], "/tags?partial=true&itemsPerPage=3&page=2");
    assert!(first["view"].get("last").is_none());

    let third = tags_query(&host, "partial=true&itemsPerPage=3&page=3").await;
    assert_eq!(member_ids(&third), vec![7]);
    assert!(third["view"].get("next").is_none());
    assert_eq!(third["view"]["previous"], "/tags?partial=true&itemsPerPage=3&page=2");

    let fourth = tags_query(&host, "partial=true&itemsPerPage=3&page=4").await;
    assert!(member_ids(&fourth).is_empty());
    assert!(fourth["view"].get("next").is_none());
}

#[tokio::test]
async fn test_partial_can_be_switched_off_by_the_client() {
    let host = tags_host(7);
    let body = tags_query(&host, "partial=false&page=1").await;
    assert_eq!(body["totalItems"], 7);
    assert_eq!(body["view"]["last"], "/tags?partial=false&page=3");
}

/// Order lines keyed by (order_id, position), each with eagerly loaded notes
const LINES_YAML: &str = r#"
pagination:
  items_per_page: 2
entities:
  - name: Line
    identifier: [order_id, position]
    fields: { order_id: integer, position: integer, sku: string }
    associations:
      - { name: notes, target: Note, kind: to_many, mapped_by: [line_order_id, line_position], fetch: eager }
  - name: Note
    identifier: [id]
    fields: { id: integer, text: string, line_order_id: integer, line_position: integer }
filters:
  line.search: { type: search, properties: { sku: exact } }
resources:
  - class: Line
    short_name: Line
    filters: [line.search]
    order: { order_id: ASC, position: ASC }
    operations:
      get_collection: { method: GET, kind: collection }
"#;

fn lines_host() -> PlatformHost {
    let host = PlatformBuilder::from_yaml_str(LINES_YAML).unwrap().build().unwrap();
    let store = host.in_memory_store().unwrap();
    store
        .seed(
            "Line",
            [(1, 1, "s1"), (1, 2, "s2"), (2, 1, "s1"), (2, 2, "s1"), (3, 1, "s1")]
                .into_iter()
                .map(|(order_id, position, sku)| json!({ "order_id": order_id, "position": position, "sku": sku })),
        )
        .unwrap();
    store
        .seed(
            "Note",
            vec![
                json!({ "id": 1, "text": "gift wrap", "line_order_id": 1, "line_position": 1 }),
                json!({ "id": 2, "text": "fragile", "line_order_id": 1, "line_position": 1 }),
                json!({ "id": 3, "text": "backorder", "line_order_id": 1, "line_position": 2 }),
                json!({ "id": 4, "text": "express", "line_order_id": 2, "line_position": 1 }),
            ],
        )
        .unwrap();
    host
}

async fn lines_page(host: &PlatformHost, query: &str) -> Value {
    let response = host
        .handle(
            "Line",
            "get_collection",
            &UriVariables::new(),
            ResourceRequest::new(HttpMethod::Get).with_query(query),
            AuthContext::Anonymous,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    response.body.unwrap()
}

fn line_keys(body: &Value) -> Vec<(i64, i64)> {
    body["member"]
        .as_array()
        .unwrap()
        .iter()
        .map(|line| (line["order_id"].as_i64().unwrap(), line["position"].as_i64().unwrap()))
        .collect()
}

#[tokio::test]
async fn test_composite_root_with_fetch_joined_collection() {
    let host = lines_host();

    let first = lines_page(&host, "sku=s1&page=1").await;
    assert_eq!(line_keys(&first), vec![(1, 1), (2, 1)]);
    assert_eq!(first["totalItems"], 4);
    // notes are matched on the whole identifier, not just order_id
    let texts: Vec<&str> = first["member"][0]["notes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|note| note["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["gift wrap", "fragile"]);
    assert_eq!(first["member"][1]["notes"].as_array().unwrap().len(), 1);

    let second = lines_page(&host, "sku=s1&page=2").await;
    assert_eq!(line_keys(&second), vec![(2, 2), (3, 1)]);
    assert_eq!(second["member"][0]["notes"], json!([]));
    assert!(second["view"].get("next").is_none());
}

#[tokio::test]
async fn test_page_zero_is_a_client_error() {
    let host = tags_host(7);
    let response = host
        .handle(
            "Tag",
            "get_collection",
            &UriVariables::new(),
            ResourceRequest::new(HttpMethod::Get).with_query("page=0"),
            AuthContext::Anonymous,
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body.unwrap()["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_fetch_joined_collection_pages_by_root() {
    // 7 books, the odd ones with two reviews each: 11 joined tuples
    let host = library_host(7);

    let response = get_collection(&host, "page=1").await;
    let body = response.body.unwrap();
    assert_eq!(member_ids(&body), vec![1, 2, 3]);
    assert_eq!(body["totalItems"], 7);
    assert_eq!(body["member"][0]["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(body["member"][1]["reviews"], json!([]));
    assert_eq!(body["member"][0]["author"]["name"], "Herbert");

    let last = get_collection(&host, "page=3").await.body.unwrap();
    assert_eq!(member_ids(&last), vec![7]);
}

#[tokio::test]
async fn test_client_items_per_page_keeps_other_parameters_in_links() {
    let host = library_host(7);

    let body = get_collection(&host, "itemsPerPage=5&page=1").await.body.unwrap();
    assert_eq!(member_ids(&body), vec![1, 2, 3, 4, 5]);
    assert_eq!(body["view"]["next"], "/books?itemsPerPage=5&page=2");
}
