use axum::http::StatusCode;
use std::any::Any;
use thiserror::Error;

/// A type-erased error raised by resolvers, handlers and user hooks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, WebError>;

/// The single failure type that crosses the execution pipeline boundary.
///
/// Every stage (filters, interceptors, argument resolution, invocation,
/// value resolution) reports through this enum so the dispatch layer can map
/// it through the route's exception handler.
#[derive(Debug, Error)]
pub enum WebError {
    /// Client-side failure: missing or failing argument resolution, bean
    /// instantiation failures, illegal handler arguments.
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The request body exceeded the configured limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A handler broke its own return contract (e.g. an asynchronous handler
    /// returned nothing).
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    /// The handler's own error, surfaced as-is.
    #[error(transparent)]
    Handler(BoxError),

    /// A panic escaped a filter, interceptor or handler.
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl WebError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            source: None,
        }
    }

    pub fn bad_request_caused(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::BadRequest {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge(message.into())
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalServerError(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Builds a `Fatal` error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Fatal(panic_message(payload.as_ref()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            WebError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WebError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            WebError::IllegalState(_)
            | WebError::InternalServerError(_)
            | WebError::Handler(_)
            | WebError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this failure came from an unrecoverable panic rather than an
    /// ordinary error value.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WebError::Fatal(_))
    }

    /// The handler's own error, if this failure carries one.
    pub fn handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            WebError::Handler(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// The original cause of a `BadRequest`, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            WebError::BadRequest {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<BoxError> for WebError {
    fn from(err: BoxError) -> Self {
        match err.downcast::<WebError>() {
            Ok(web) => *web,
            Err(other) => WebError::Handler(other),
        }
    }
}

impl axum::response::IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = serde_json::json!({
            "statusCode": status.as_u16(),
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Errors raised while building a route's execution at registration time.
///
/// These are never produced per request.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(
        "Parameter {index} ('{name}') of {method} is claimed by more than one resolver kind: {kinds}"
    )]
    AmbiguousResolver {
        method: String,
        index: usize,
        name: String,
        kinds: String,
    },

    #[error("Singleton bean '{type_name}' for {method} is not registered in the container")]
    MissingBean { method: String, type_name: String },

    #[error("Bean for {method} has type '{actual}', expected '{expected}'")]
    BeanTypeMismatch {
        method: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid route configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_error_roundtrips_web_error() {
        let boxed: BoxError = Box::new(WebError::Forbidden("nope".into()));
        let web = WebError::from(boxed);
        assert!(matches!(web, WebError::Forbidden(_)));
    }

    #[test]
    fn test_foreign_box_error_becomes_handler_error() {
        let boxed: BoxError = "boom".into();
        let web = WebError::from(boxed);
        assert!(web.handler_error().is_some());
        assert_eq!(web.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("exploded");
        assert_eq!(WebError::from_panic(payload).to_string(), "Fatal error: exploded");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert!(WebError::from_panic(payload).is_fatal());
    }
}
