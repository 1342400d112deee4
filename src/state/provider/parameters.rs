//! Query string binding
//!
//! Brackets nest values the way HTML forms do:
//!
//! ```text
//! title=Dune                      {"title": "Dune"}
//! price[gt]=10&price[lt]=20       {"price": {"gt": "10", "lt": "20"}}
//! id[]=1&id[]=2                   {"id": ["1", "2"]}
//! order[author.name]=desc         {"order": {"author.name": "desc"}}
//! ```
//!
//! A repeated plain key keeps its last value.

use crate::core::error::{ArgumentError, PlatformResult};
use crate::core::operation::Operation;
use crate::state::{Provider, ProviderNext, StateContext, UriVariables};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Debug, Default)]
pub struct BindParametersProvider;

/// Split `a[b][]` into `["a", "b", ""]`; malformed keys stay whole
fn key_segments(key: &str) -> Vec<&str> {
    let Some(open) = key.find('[') else {
        return vec![key];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key];
    }

    let mut segments = vec![&key[..open]];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key];
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key];
    }
    segments
}

fn insert(map: &mut Map<String, Value>, segments: &[&str], value: String) {
    let Some((key, rest)) = segments.split_first() else {
        return;
    };
    match rest.first() {
        None => {
            map.insert(key.to_string(), Value::String(value));
        }
        Some(&"") => {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(values) = entry {
                values.push(Value::String(value));
            }
        }
        Some(_) => {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(nested) = entry {
                insert(nested, rest, value);
            }
        }
    }
}

/// Parse a raw query string into nested filter values
pub fn parse_query(query: &str) -> PlatformResult<Map<String, Value>> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(query).map_err(|e| ArgumentError::InvalidParameter {
            parameter: "query".to_string(),
            value: query.to_string(),
            message: e.to_string(),
        })?;

    let mut filters = Map::new();
    for (key, value) in pairs {
        insert(&mut filters, &key_segments(&key), value);
    }
    Ok(filters)
}

#[async_trait]
impl Provider for BindParametersProvider {
    async fn provide(
        &self,
        operation: &Operation,
        uri_variables: &UriVariables,
        context: &mut StateContext,
        next: ProviderNext<'_>,
    ) -> PlatformResult<()> {
        if let Some(query) = context.request.query.as_deref() {
            context.filters = parse_query(query)?;
            let bound = Value::Object(context.filters.clone());
            tracing::debug!(filters = %bound, "bound query parameters");
        }
        next.run(operation, uri_variables, context).await
    }
}
