use axum::Json;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Body entity written by value resolution, filters or exception handlers
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
}

/// Response side effects accumulated while a request is handled.
#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: ResponseBody,
    committed: bool,
}

impl ResponseState {
    /// The status set so far, `200 OK` when nothing was set.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn is_status_set(&self) -> bool {
        self.status.is_some()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn set_body(&mut self, body: ResponseBody) {
        self.body = body;
    }

    pub fn set_json(&mut self, value: serde_json::Value) {
        self.body = ResponseBody::Json(value);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.body = ResponseBody::Text(text.into());
    }

    /// Marks the response as final; later writers should leave it alone.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Copies an entity's status, headers and body into this response.
    pub fn apply(&mut self, entity: ResponseEntity) {
        self.status = Some(entity.status);
        self.headers.extend(entity.headers);
        self.body = entity.body;
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        let mut response = match self.body {
            ResponseBody::Empty => Body::empty().into_response(),
            ResponseBody::Text(text) => text.into_response(),
            ResponseBody::Json(value) => Json(value).into_response(),
            ResponseBody::Bytes(bytes) => (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                bytes,
            )
                .into_response(),
        };
        *response.status_mut() = status;
        response.headers_mut().extend(self.headers);
        response
    }
}

/// A handler return value carrying full response control.
#[derive(Debug, Clone)]
pub struct ResponseEntity {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ResponseEntity {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn ok(body: ResponseBody) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        Self::new(status, ResponseBody::Json(value))
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, ResponseBody::Empty)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}
