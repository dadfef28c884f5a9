//! Route filters wrap the whole execution of a route, interceptors included.

use crate::context::RequestContext;
use crate::error::WebError;
use crate::execution::RouteExecution;
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A chain-of-responsibility stage around a route.
///
/// Call [`Next::do_next`] to continue. Returning without calling it ends the
/// request with whatever this filter wrote to the response.
#[async_trait]
pub trait RouteFilter: Send + Sync + 'static {
    async fn do_filter(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<(), WebError>;
}

/// The remaining filters followed by the interceptor pipeline.
pub struct Next<'a> {
    filters: &'a [Arc<dyn RouteFilter>],
    execution: &'a RouteExecution,
}

impl<'a> Next<'a> {
    pub(crate) fn new(filters: &'a [Arc<dyn RouteFilter>], execution: &'a RouteExecution) -> Self {
        Self { filters, execution }
    }

    /// Runs the rest of the chain. A suppressed execution completes as `Ok`.
    pub async fn do_next(self, ctx: &mut RequestContext) -> Result<(), WebError> {
        match self.filters.split_first() {
            Some((filter, rest)) => {
                let next = Next {
                    filters: rest,
                    execution: self.execution,
                };
                match AssertUnwindSafe(filter.do_filter(ctx, next)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(WebError::from_panic(panic)),
                }
            }
            None => self.execution.run_interceptors(ctx).await.into_result().map(|_| ()),
        }
    }
}
