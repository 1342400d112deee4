//! REST exposure
//!
//! Routes every configured operation on its path: collection operations on
//! the resource path, item operations on the path followed by one segment
//! per identifier field (`/books/{id}`). The caller's [`AuthContext`] is
//! read from the request extensions, so an authentication layer only has to
//! insert one; requests without it are anonymous.

use super::super::host::PlatformHost;
use crate::core::auth::AuthContext;
use crate::core::error::{ConfigError, PlatformError, PlatformResult, RequestError};
use crate::core::metadata::ClassMetadata;
use crate::core::operation::{HttpMethod, Operation};
use crate::state::{ResourceRequest, UriVariables};
use axum::extract::{Path, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, get, on};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest accepted request body
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// Two operations sharing a path and method are a configuration error.
    pub fn build_router(host: Arc<PlatformHost>, custom_routes: Vec<Router>) -> PlatformResult<Router> {
        let mut routes: IndexMap<String, MethodRouter> = IndexMap::new();
        let mut seen = HashSet::new();

        for resource in host.resources().resources() {
            let metadata = host.classes().get(&resource.resource_class)?;
            for operation in resource.operations.values() {
                let path = Self::route_path(operation, &metadata);
                if !seen.insert((path.clone(), operation.method)) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("resources.{}.operations.{}", resource.short_name, operation.name),
                        value: format!("{} {}", operation.method, path),
                        message: "another operation is already routed here".to_string(),
                    }
                    .into());
                }
                tracing::debug!(method = %operation.method, path = %path, operation = %operation.name, "route registered");

                let method_router = Self::operation_route(host.clone(), operation);
                let merged = match routes.shift_remove(&path) {
                    Some(existing) => existing.merge(method_router),
                    None => method_router,
                };
                routes.insert(path, merged);
            }
        }

        let mut app = Self::health_routes();
        for (path, method_router) in routes {
            app = app.route(&path, method_router);
        }
        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }
        Ok(app.layer(TraceLayer::new_for_http()))
    }

    /// `/books` for collections, `/books/{id}` for items
    pub fn route_path(operation: &Operation, metadata: &ClassMetadata) -> String {
        let base = operation.path.trim_end_matches('/');
        if operation.is_collection() {
            return if base.is_empty() { "/".to_string() } else { base.to_string() };
        }
        let mut path = base.to_string();
        for field in &metadata.identifier {
            path.push_str("/{");
            path.push_str(field);
            path.push('}');
        }
        path
    }

    fn operation_route(host: Arc<PlatformHost>, operation: &Operation) -> MethodRouter {
        let filter = method_filter(operation.method);
        let method = operation.method;
        let resource_class = operation.resource_class.clone();
        let operation_name = operation.name.clone();

        if operation.is_collection() {
            on(filter, move |request: Request| {
                let host = host.clone();
                let resource_class = resource_class.clone();
                let operation_name = operation_name.clone();
                async move {
                    dispatch(&host, &resource_class, &operation_name, method, UriVariables::new(), request).await
                }
            })
        } else {
            on(
                filter,
                move |Path(params): Path<HashMap<String, String>>, request: Request| {
                    let host = host.clone();
                    let resource_class = resource_class.clone();
                    let operation_name = operation_name.clone();
                    async move {
                        let uri_variables: UriVariables = params.into_iter().collect();
                        dispatch(&host, &resource_class, &operation_name, method, uri_variables, request).await
                    }
                },
            )
        }
    }

    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "this-platform"
        }))
    }
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

async fn dispatch(
    host: &PlatformHost,
    resource_class: &str,
    operation_name: &str,
    method: HttpMethod,
    uri_variables: UriVariables,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let auth = parts
        .extensions
        .get::<AuthContext>()
        .cloned()
        .unwrap_or(AuthContext::Anonymous);

    let body = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(body) => body,
        Err(e) => {
            let err: PlatformError = RequestError::InvalidBody {
                message: e.to_string(),
            }
            .into();
            return host.error_mapper().map(&err).into_response();
        }
    };

    let mut resource_request = ResourceRequest::new(method);
    resource_request.headers = parts.headers;
    resource_request.query = parts.uri.query().map(str::to_string);
    resource_request.body = (!body.is_empty()).then_some(body);

    host.handle(resource_class, operation_name, &uri_variables, resource_request, auth)
        .await
        .into_response()
}
