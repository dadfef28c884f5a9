use super::{HandlerInterceptor, InterceptorResult};
use crate::context::RequestContext;
use crate::error::WebError;
use crate::method::HandlerMethod;
use async_trait::async_trait;
use std::time::Instant;

const STARTED_AT: &str = "meshdispatch.logging.started_at";

/// An interceptor that logs request timing and status
#[derive(Clone, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl HandlerInterceptor for LoggingInterceptor {
    async fn pre_handle(&self, ctx: &mut RequestContext, handler: &HandlerMethod) -> InterceptorResult<bool> {
        tracing::info!(method = %ctx.method(), uri = %ctx.uri(), handler = %handler, "-->");
        ctx.attributes_mut().insert(STARTED_AT, Instant::now());
        Ok(true)
    }

    async fn after_completion(
        &self,
        ctx: &mut RequestContext,
        _handler: &HandlerMethod,
        error: Option<&WebError>,
    ) -> InterceptorResult<()> {
        let elapsed = ctx
            .attributes_mut()
            .remove(STARTED_AT)
            .and_then(|v| v.downcast::<Instant>())
            .map(|start| start.elapsed());
        match error {
            None => tracing::info!(
                method = %ctx.method(),
                uri = %ctx.uri(),
                status = ctx.response().status().as_u16(),
                elapsed = ?elapsed,
                "<--"
            ),
            Some(e) => tracing::info!(
                method = %ctx.method(),
                uri = %ctx.uri(),
                error = %e,
                elapsed = ?elapsed,
                "<-- ERROR"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pages;

    #[tokio::test]
    async fn test_timing_attribute_is_cleaned_up() {
        let handler = HandlerMethod::builder::<Pages>("index").build();
        let mut ctx = RequestContext::get("/pages");

        assert!(LoggingInterceptor.pre_handle(&mut ctx, &handler).await.unwrap());
        assert!(ctx.attributes().contains(STARTED_AT));

        LoggingInterceptor.after_completion(&mut ctx, &handler, None).await.unwrap();
        assert!(!ctx.attributes().contains(STARTED_AT));
    }
}
