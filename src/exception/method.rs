use super::{DefaultExceptionHandler, ExceptionHandler};
use crate::arg::Value;
use crate::bean::Bean;
use crate::context::RequestContext;
use crate::error::WebError;
use crate::execution::ExecutionHandler;
use crate::method::MethodParameter;
use crate::resolve::FixedArgs;
use crate::value::{DefaultValueResolver, HandlerValueResolver};
use async_trait::async_trait;
use axum::http::StatusCode;
use std::sync::Arc;

type ErrorMatcher = Arc<dyn Fn(&WebError) -> bool + Send + Sync>;

/// Supplies the failure being handled: a `WebError` parameter receives the
/// error itself, a `StatusCode` parameter its status.
pub struct ErrorArgs {
    error: Arc<WebError>,
}

impl ErrorArgs {
    pub fn new(error: Arc<WebError>) -> Self {
        Self { error }
    }
}

impl FixedArgs for ErrorArgs {
    fn fixed_arg(&self, param: &MethodParameter) -> Option<Value> {
        if param.is::<WebError>() {
            Some(Value::from_arc(Arc::clone(&self.error)))
        } else if param.is::<StatusCode>() {
            Some(Value::new(self.error.status()))
        } else {
            None
        }
    }
}

/// Runs an exception-handler method on its owning bean.
///
/// The method is an ordinary handler method executed with the external
/// bean strategy; its other parameters resolve like any handler's. Errors
/// it does not accept go to the fallback.
pub struct MethodExceptionHandler {
    handler: ExecutionHandler,
    bean: Bean,
    matcher: Option<ErrorMatcher>,
    fallback: Arc<dyn ExceptionHandler>,
    value_resolver: Arc<dyn HandlerValueResolver>,
}

impl MethodExceptionHandler {
    pub fn new(handler: ExecutionHandler, bean: Bean) -> Self {
        Self {
            handler,
            bean,
            matcher: None,
            fallback: Arc::new(DefaultExceptionHandler),
            value_resolver: Arc::new(DefaultValueResolver::new()),
        }
    }

    /// Only handle errors accepted by `matcher`.
    pub fn matching<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&WebError) -> bool + Send + Sync + 'static,
    {
        self.matcher = Some(Arc::new(matcher));
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn ExceptionHandler>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn value_resolver(mut self, resolver: Arc<dyn HandlerValueResolver>) -> Self {
        self.value_resolver = resolver;
        self
    }

    pub fn handler(&self) -> &ExecutionHandler {
        &self.handler
    }
}

#[async_trait]
impl ExceptionHandler for MethodExceptionHandler {
    async fn handle_exception(&self, ctx: &mut RequestContext, error: Arc<WebError>) -> Result<(), WebError> {
        if self.matcher.as_ref().is_some_and(|accepts| !accepts(error.as_ref())) {
            return self.fallback.handle_exception(ctx, error).await;
        }

        let method = self.handler.method();
        if ctx.response().is_committed() {
            tracing::debug!(handler = %method, error = %error, "response already committed, exception handler skipped");
            return Ok(());
        }
        tracing::debug!(handler = %method, error = %error, "invoking exception handler method");
        ctx.response_mut().set_status(error.status());

        let fixed = ErrorArgs::new(error);
        let value = self.handler.execute(ctx, &fixed, Some(self.bean.clone())).await?;
        self.value_resolver.resolve_value(ctx, method, value).await?;
        ctx.response_mut().commit();
        Ok(())
    }
}
