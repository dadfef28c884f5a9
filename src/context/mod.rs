//! Per-request state handed to the execution pipeline by the dispatch layer.
//!
//! The pipeline never builds a [`RequestContext`] itself; it reads the request,
//! mutates attributes and writes response state.

mod response;

pub use response::{ResponseBody, ResponseEntity, ResponseState};

use crate::arg::Value;
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri, request::Parts};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Request-scoped attribute bag
#[derive(Debug, Default, Clone)]
pub struct Attributes {
    values: HashMap<String, Value>,
}

impl Attributes {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Value::new(value));
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values.get(key).and_then(Value::downcast::<T>)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The request, its buffered body, the response under construction and an
/// attribute bag. Lifetime is one request.
#[derive(Debug)]
pub struct RequestContext {
    id: Uuid,
    parts: Parts,
    body: Bytes,
    path_variables: HashMap<String, String>,
    query: Option<HashMap<String, String>>,
    attributes: Attributes,
    response: ResponseState,
}

impl RequestContext {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            parts,
            body,
            path_variables: HashMap::new(),
            query: None,
            attributes: Attributes::default(),
            response: ResponseState::default(),
        }
    }

    pub fn from_request(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body)
    }

    /// Shorthand for a body-less request, mostly useful in tests.
    pub fn get(uri: &str) -> Self {
        Self::with_method(Method::GET, uri, Bytes::new())
    }

    pub fn with_method(method: Method, uri: &str, body: impl Into<Bytes>) -> Self {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body.into())
            .unwrap_or_else(|_| Request::new(Bytes::new()));
        Self::from_request(request)
    }

    pub fn with_path_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_variables.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse::<HeaderValue>() {
            self.parts.headers.insert(name, value);
        }
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path_variables.get(name).map(String::as_str)
    }

    pub fn set_path_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_variables.insert(name.into(), value.into());
    }

    /// Decoded query parameter. The query string is parsed once and cached.
    pub fn query_param(&mut self, name: &str) -> Option<&str> {
        let uri = &self.parts.uri;
        self.query
            .get_or_insert_with(|| {
                Query::<HashMap<String, String>>::try_from_uri(uri)
                    .map(|Query(map)| map)
                    .unwrap_or_default()
            })
            .get(name)
            .map(String::as_str)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseState {
        &mut self.response
    }

    /// Renders the accumulated response state.
    pub fn into_response(self) -> axum::response::Response {
        self.response.into_response()
    }
}
