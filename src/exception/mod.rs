//! Mapping pipeline failures to responses, and the terminal completion hook.

mod method;

pub use method::{ErrorArgs, MethodExceptionHandler};

use crate::context::RequestContext;
use crate::error::WebError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Route-level exception-to-response mapping, run by the dispatch layer
/// after [`RouteExecution::handle`](crate::execution::RouteExecution::handle)
/// fails.
///
/// Returning an error means the failure could not be mapped; the dispatcher
/// then renders that error directly.
#[async_trait]
pub trait ExceptionHandler: Send + Sync + 'static {
    async fn handle_exception(&self, ctx: &mut RequestContext, error: Arc<WebError>) -> Result<(), WebError>;
}

/// Writes `{statusCode, message, timestamp}` with the error's status.
///
/// Server errors are logged at error level and their message is replaced by
/// the status reason. A response that is already committed is left as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionHandler;

#[async_trait]
impl ExceptionHandler for DefaultExceptionHandler {
    async fn handle_exception(&self, ctx: &mut RequestContext, error: Arc<WebError>) -> Result<(), WebError> {
        let status = error.status();
        if status.is_server_error() {
            tracing::error!(error = %error, status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %error, status = status.as_u16(), "request rejected");
        }

        let response = ctx.response_mut();
        if response.is_committed() {
            return Ok(());
        }

        let message = if status.is_server_error() {
            status.canonical_reason().unwrap_or("Internal Server Error").to_string()
        } else {
            error.to_string()
        };
        response.set_status(status);
        response.set_json(json!({
            "statusCode": status.as_u16(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
        response.commit();
        Ok(())
    }
}

/// The always-run terminal hook of a request, invoked once the exception
/// handler (if any) has settled.
#[async_trait]
pub trait CompletionHandler: Send + Sync + 'static {
    async fn on_complete(&self, ctx: &mut RequestContext, error: Option<&WebError>);
}

pub(crate) const RECEIVED_AT: &str = "meshdispatch.received_at";

/// Logs the final status of every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCompletionHandler;

#[async_trait]
impl CompletionHandler for LoggingCompletionHandler {
    async fn on_complete(&self, ctx: &mut RequestContext, error: Option<&WebError>) {
        let elapsed = ctx
            .attributes()
            .get::<Instant>(RECEIVED_AT)
            .map(|received| received.elapsed());
        let status = ctx.response().status().as_u16();
        match error {
            None => tracing::info!(
                method = %ctx.method(),
                path = %ctx.path(),
                status,
                elapsed = ?elapsed,
                "request completed"
            ),
            Some(error) => tracing::info!(
                method = %ctx.method(),
                path = %ctx.path(),
                status,
                error = %error,
                elapsed = ?elapsed,
                "request completed with error"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResponseBody;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_default_handler_writes_error_body() {
        let mut ctx = RequestContext::get("/");
        DefaultExceptionHandler
            .handle_exception(&mut ctx, Arc::new(WebError::bad_request("id must be positive")))
            .await
            .unwrap();

        assert_eq!(ctx.response().status(), StatusCode::BAD_REQUEST);
        let ResponseBody::Json(body) = ctx.response().body() else {
            panic!("expected json body");
        };
        assert_eq!(body["statusCode"], 400);
        assert!(body["message"].as_str().unwrap().contains("id must be positive"));
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let mut ctx = RequestContext::get("/");
        DefaultExceptionHandler
            .handle_exception(&mut ctx, Arc::new(WebError::internal("db password rejected")))
            .await
            .unwrap();

        let ResponseBody::Json(body) = ctx.response().body() else {
            panic!("expected json body");
        };
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_committed_response_is_kept() {
        let mut ctx = RequestContext::get("/");
        ctx.response_mut().set_status(StatusCode::INTERNAL_SERVER_ERROR);
        ctx.response_mut().commit();

        DefaultExceptionHandler
            .handle_exception(&mut ctx, Arc::new(WebError::illegal_state("no future")))
            .await
            .unwrap();
        assert!(matches!(ctx.response().body(), ResponseBody::Empty));
    }
}
