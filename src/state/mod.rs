//! Request state pipeline
//!
//! A request goes through two priority-ordered middleware chains that share
//! one [`StateContext`]:
//!
//! ```text
//! providers:  negotiate -> bind_parameters -> access_pre_read -> read
//!             -> deserialize -> access_post_denormalize -> validate
//!             -> access_post_validate
//! processors: respond( add_headers( serialize( write(data) ) ) )
//! ```
//!
//! Providers act and then call the rest of the chain; processors call the
//! rest of the chain first and act on its result. Either side may
//! short-circuit by setting [`StateContext::response`] instead of calling
//! `next`.

pub mod chain;
pub mod processor;
pub mod provider;

pub use chain::{Processor, ProcessorNext, Provider, ProviderNext, StatePipeline};

use crate::core::auth::AuthContext;
use crate::core::operation::HttpMethod;
use crate::core::paginator::CollectionResult;
use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Raw URI variables (e.g. `id => "42"`)
pub type UriVariables = IndexMap<String, String>;

/// Incoming request, already routed to an operation
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: HttpMethod,
    pub headers: HeaderMap,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    pub body: Option<Bytes>,
}

impl ResourceRequest {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: None,
            body: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set a header; invalid values are ignored
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set a JSON body and its content type
    pub fn with_json(self, body: &Value) -> Self {
        let mut request = self.with_header("content-type", "application/json");
        request.body = Some(Bytes::from(body.to_string()));
        request
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Output format picked by negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub name: String,
    pub mime_type: String,
}

/// Data carried through the pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResourceData {
    #[default]
    None,
    Item(Value),
    Collection(CollectionResult),
}

impl ResourceData {
    pub fn as_item(&self) -> Option<&Value> {
        match self {
            ResourceData::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ResourceData::None)
    }
}

/// Final response of a request
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ResourceResponse {
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, None)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => Response::new(Body::from(body.to_string())),
            None => Response::new(Body::empty()),
        };
        *response.status_mut() = self.status;
        let has_body = !matches!(self.status, StatusCode::NO_CONTENT);
        for (name, value) in &self.headers {
            if name == CONTENT_TYPE && !has_body {
                continue;
            }
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

/// Request-scoped state shared by every stage
#[derive(Debug)]
pub struct StateContext {
    pub request: ResourceRequest,
    pub auth: AuthContext,

    /// Set by negotiation
    pub format: Option<Format>,

    /// Query parameters parsed by `bind_parameters`
    pub filters: Map<String, Value>,

    /// Current data: read result, then denormalized input, then written state
    pub data: ResourceData,

    /// Item as read, before deserialization touched it
    pub previous_data: Option<Value>,

    /// Serialized body produced by the serialize stage
    pub output: Option<Value>,

    /// Headers collected for the response
    pub response_headers: HeaderMap,

    /// Set to short-circuit, or by the respond stage
    pub response: Option<ResourceResponse>,
}

impl StateContext {
    pub fn new(request: ResourceRequest, auth: AuthContext) -> Self {
        Self {
            request,
            auth,
            format: None,
            filters: Map::new(),
            data: ResourceData::None,
            previous_data: None,
            output: None,
            response_headers: HeaderMap::new(),
            response: None,
        }
    }
}
