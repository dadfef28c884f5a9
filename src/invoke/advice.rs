use super::{HandlerInvoker, TargetInvoker};
use crate::arg::{Args, ReturnValue};
use crate::context::RequestContext;
use crate::error::WebError;
use crate::method::HandlerMethod;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Cross-cutting wrapper around handler invocation.
///
/// An advice either calls [`Invocation::proceed`] to run the rest of the
/// chain, or returns its own result to short-circuit the handler.
#[async_trait]
pub trait HandlerAdvice: Send + Sync {
    async fn around(
        &self,
        ctx: &mut RequestContext,
        invocation: Invocation<'_>,
    ) -> Result<Option<ReturnValue>, WebError>;
}

/// The remaining chain seen by one advice.
pub struct Invocation<'a> {
    args: Args,
    advices: &'a [Arc<dyn HandlerAdvice>],
    target: &'a TargetInvoker,
}

impl<'a> Invocation<'a> {
    pub fn method(&self) -> &HandlerMethod {
        self.target.handler().method()
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Args {
        &mut self.args
    }

    /// A copy of this invocation that can be proceeded independently.
    pub fn fork(&self) -> Invocation<'a> {
        Invocation {
            args: self.args.clone(),
            advices: self.advices,
            target: self.target,
        }
    }

    pub async fn proceed(self, ctx: &mut RequestContext) -> Result<Option<ReturnValue>, WebError> {
        match self.advices.split_first() {
            Some((advice, rest)) => {
                let next = Invocation {
                    args: self.args,
                    advices: rest,
                    target: self.target,
                };
                advice.around(ctx, next).await
            }
            None => self.target.invoke(ctx, self.args).await,
        }
    }
}

/// Target invoker decorated by an ordered advice list. The first advice is
/// the outermost.
pub struct AdvisedInvoker {
    advices: Arc<[Arc<dyn HandlerAdvice>]>,
    target: TargetInvoker,
}

impl AdvisedInvoker {
    pub fn new(advices: Arc<[Arc<dyn HandlerAdvice>]>, target: TargetInvoker) -> Self {
        Self { advices, target }
    }
}

#[async_trait]
impl HandlerInvoker for AdvisedInvoker {
    async fn invoke(
        &self,
        ctx: &mut RequestContext,
        args: Args,
    ) -> Result<Option<ReturnValue>, WebError> {
        let invocation = Invocation {
            args,
            advices: &self.advices,
            target: &self.target,
        };
        invocation.proceed(ctx).await
    }
}

/// Runs the invocation inside a `handler` span and logs its duration.
#[derive(Debug, Default, Clone)]
pub struct TracingAdvice;

#[async_trait]
impl HandlerAdvice for TracingAdvice {
    async fn around(
        &self,
        ctx: &mut RequestContext,
        invocation: Invocation<'_>,
    ) -> Result<Option<ReturnValue>, WebError> {
        let span = tracing::debug_span!("handler", method = %invocation.method());
        let start = Instant::now();
        let result = invocation.proceed(ctx).instrument(span.clone()).await;
        let _guard = span.enter();
        match &result {
            Ok(_) => tracing::debug!(elapsed = ?start.elapsed(), "handler completed"),
            Err(e) => tracing::debug!(elapsed = ?start.elapsed(), error = %e, "handler failed"),
        }
        result
    }
}

/// Re-invokes the rest of the chain while it fails with a retryable error.
///
/// Client errors and fatal errors are never retried.
#[derive(Debug, Clone)]
pub struct RetryAdvice {
    attempts: usize,
}

impl RetryAdvice {
    pub fn new(attempts: usize) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    fn retryable(error: &WebError) -> bool {
        !error.is_fatal() && error.status().is_server_error()
    }
}

#[async_trait]
impl HandlerAdvice for RetryAdvice {
    async fn around(
        &self,
        ctx: &mut RequestContext,
        invocation: Invocation<'_>,
    ) -> Result<Option<ReturnValue>, WebError> {
        for attempt in 1..self.attempts {
            match invocation.fork().proceed(ctx).await {
                Err(e) if Self::retryable(&e) => {
                    tracing::warn!(attempt, error = %e, "handler failed, retrying");
                }
                other => return other,
            }
        }
        invocation.proceed(ctx).await
    }
}
