//! Tower glue: a registered route as a `Service<Request<Body>>`.

use crate::config::PipelineConfig;
use crate::context::RequestContext;
use crate::error::WebError;
use crate::exception::RECEIVED_AT;
use crate::execution::RouteExecution;
use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::Request;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

/// Buffers the request body, builds the [`RequestContext`] and runs
/// [`RouteExecution::dispatch`].
///
/// Path variables captured by an axum router (`/items/{id}`) become the
/// context's path variables, so the service is usually mounted with
/// `Router::route_service`.
#[derive(Clone)]
pub struct RouteService {
    execution: Arc<RouteExecution>,
    max_body_bytes: usize,
}

impl RouteService {
    pub fn new(execution: Arc<RouteExecution>) -> Self {
        Self {
            execution,
            max_body_bytes: PipelineConfig::default().max_body_bytes,
        }
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn execution(&self) -> &Arc<RouteExecution> {
        &self.execution
    }
}

async fn path_variables(parts: &mut Parts) -> Vec<(String, String)> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

impl Service<Request<Body>> for RouteService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let execution = Arc::clone(&self.execution);
        let limit = self.max_body_bytes;

        Box::pin(async move {
            let received = Instant::now();
            let (mut parts, body) = request.into_parts();
            let variables = path_variables(&mut parts).await;

            let bytes = match Limited::new(body, limit).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                    tracing::warn!(limit, "request body over limit");
                    return Ok(WebError::payload_too_large(format!("request body exceeds {limit} bytes")).into_response());
                }
                Err(e) => {
                    tracing::warn!(error = %e, limit, "cannot read request body");
                    return Ok(WebError::bad_request(format!("cannot read request body: {e}")).into_response());
                }
            };

            let mut ctx = RequestContext::new(parts, bytes);
            for (name, value) in variables {
                ctx.set_path_variable(name, value);
            }
            ctx.attributes_mut().insert(RECEIVED_AT, received);
            Ok(execution.dispatch(ctx).await)
        })
    }
}
