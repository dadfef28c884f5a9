use super::HandlerInterceptor;
use crate::arg::ReturnValue;
use crate::context::RequestContext;
use crate::error::WebError;
use crate::method::HandlerMethod;
use std::sync::Arc;

/// Per-request interceptor state: the matched interceptors and how far
/// `pre_handle` got.
///
/// Created fresh for every request; never shared between requests.
pub struct InterceptorChain {
    interceptors: Option<Vec<Arc<dyn HandlerInterceptor>>>,
    reached: usize,
}

impl InterceptorChain {
    /// `None` means no interceptors are registered for the route.
    pub fn new(interceptors: Option<Vec<Arc<dyn HandlerInterceptor>>>) -> Self {
        Self {
            interceptors,
            reached: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.as_ref().is_none_or(Vec::is_empty)
    }

    /// Runs `pre_handle` in order until one returns `false` or fails.
    ///
    /// An interceptor counts as reached as soon as its `pre_handle` starts,
    /// so the one that refused (or failed) also gets `after_completion`.
    pub async fn apply_pre_handle(&mut self, ctx: &mut RequestContext, handler: &HandlerMethod) -> Result<bool, WebError> {
        let Some(interceptors) = &self.interceptors else {
            return Ok(true);
        };
        for (index, interceptor) in interceptors.iter().enumerate() {
            self.reached = index + 1;
            if !interceptor.pre_handle(ctx, handler).await? {
                tracing::debug!(interceptor = index, "pre_handle refused execution");
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn apply_post_handle(
        &self,
        ctx: &mut RequestContext,
        handler: &HandlerMethod,
        value: &mut Option<ReturnValue>,
    ) -> Result<(), WebError> {
        let Some(interceptors) = &self.interceptors else {
            return Ok(());
        };
        for interceptor in interceptors {
            interceptor.post_handle(ctx, handler, value).await?;
        }
        Ok(())
    }

    /// Interceptors whose `pre_handle` ran, in execution order.
    pub fn reached(&self) -> &[Arc<dyn HandlerInterceptor>] {
        match &self.interceptors {
            Some(interceptors) => &interceptors[..self.reached],
            None => &[],
        }
    }
}
