//! Handler invocation: the raw call, the handler-advice chain around it and
//! normalization of sync/async returns into one completion.

mod advice;
mod aspect;
mod transfer;

pub use advice::{AdvisedInvoker, HandlerAdvice, Invocation, RetryAdvice, TracingAdvice};
pub use aspect::{Aspect, AspectAdvice, AspectResult};
pub use transfer::{AsyncTransfer, FutureTransfer, ReadyTransfer, TransferFuture};

use crate::arg::{Args, ReturnValue};
use crate::bean::Bean;
use crate::context::RequestContext;
use crate::error::{BoxError, WebError};
use crate::method::HandlerMethod;
use async_trait::async_trait;
use axum::http::StatusCode;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// The erased function behind a [`HandlerMethod`].
pub type HandlerFn =
    Arc<dyn Fn(&Bean, Args) -> Result<Option<ReturnValue>, InvocationError> + Send + Sync>;

/// Failure of the raw handler call.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The resolved arguments do not fit the method.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// The handler's own error.
    #[error(transparent)]
    Target(BoxError),
}

impl InvocationError {
    pub fn target(error: impl Into<BoxError>) -> Self {
        Self::Target(error.into())
    }
}

impl From<BoxError> for InvocationError {
    fn from(error: BoxError) -> Self {
        Self::Target(error)
    }
}

impl From<WebError> for InvocationError {
    fn from(error: WebError) -> Self {
        Self::Target(Box::new(error))
    }
}

/// A handler method bound to the bean it runs on.
#[derive(Clone)]
pub struct Handler {
    method: Arc<HandlerMethod>,
    bean: Bean,
}

impl Handler {
    pub fn new(method: Arc<HandlerMethod>, bean: Bean) -> Self {
        Self { method, bean }
    }

    pub fn method(&self) -> &HandlerMethod {
        &self.method
    }

    pub fn bean(&self) -> &Bean {
        &self.bean
    }

    pub fn invoke(&self, args: Args) -> Result<Option<ReturnValue>, InvocationError> {
        self.method.invoke(&self.bean, args)
    }
}

/// Invokes a bound handler with resolved arguments and yields the settled
/// return value.
#[async_trait]
pub trait HandlerInvoker: Send + Sync {
    async fn invoke(
        &self,
        ctx: &mut RequestContext,
        args: Args,
    ) -> Result<Option<ReturnValue>, WebError>;
}

/// The innermost invoker: calls the handler and transfers its raw result.
pub struct TargetInvoker {
    handler: Handler,
    transfer: Arc<dyn FutureTransfer>,
    dump_argument_types: bool,
}

impl TargetInvoker {
    pub fn new(handler: Handler, transfer: Arc<dyn FutureTransfer>) -> Self {
        Self {
            handler,
            transfer,
            dump_argument_types: true,
        }
    }

    pub fn dump_argument_types(mut self, enabled: bool) -> Self {
        self.dump_argument_types = enabled;
        self
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Calls the handler synchronously, capturing errors and panics.
    fn call(&self, args: Args) -> Result<Option<ReturnValue>, WebError> {
        let type_dump = self.dump_argument_types.then(|| args.type_dump());
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.invoke(args)));
        match outcome {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(InvocationError::Target(error))) => Err(WebError::from(error)),
            Ok(Err(InvocationError::IllegalArgument(message))) => {
                let message = match type_dump {
                    Some(types) => format!(
                        "Illegal argument invoking {}: {message}; resolved argument types: [{types}]",
                        self.handler.method()
                    ),
                    None => format!(
                        "Illegal argument invoking {}: {message}",
                        self.handler.method()
                    ),
                };
                Err(WebError::bad_request(message))
            }
            Err(panic) => Err(WebError::from_panic(panic)),
        }
    }
}

#[async_trait]
impl HandlerInvoker for TargetInvoker {
    async fn invoke(
        &self,
        ctx: &mut RequestContext,
        args: Args,
    ) -> Result<Option<ReturnValue>, WebError> {
        let raw = self.call(args)?;
        let method = self.handler.method();
        if raw.is_none() && method.is_concurrent() {
            tracing::error!(
                method = %method,
                "Concurrent handler returned no future; response committed as server error"
            );
            let response = ctx.response_mut();
            response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            response.commit();
            return Err(WebError::illegal_state(format!(
                "Concurrent handler {method} must return a future, got null"
            )));
        }
        self.transfer.transfer(raw).await
    }
}

/// Everything needed to build an invoker chain for a bean, fixed at
/// registration time.
#[derive(Clone)]
pub struct InvokerTemplate {
    method: Arc<HandlerMethod>,
    advices: Arc<[Arc<dyn HandlerAdvice>]>,
    transfer: Arc<dyn FutureTransfer>,
    dump_argument_types: bool,
}

impl InvokerTemplate {
    pub fn new(
        method: Arc<HandlerMethod>,
        advices: Vec<Arc<dyn HandlerAdvice>>,
        transfer: Arc<dyn FutureTransfer>,
    ) -> Self {
        Self {
            method,
            advices: advices.into(),
            transfer,
            dump_argument_types: true,
        }
    }

    pub fn dump_argument_types(mut self, enabled: bool) -> Self {
        self.dump_argument_types = enabled;
        self
    }

    pub fn method(&self) -> &Arc<HandlerMethod> {
        &self.method
    }

    /// Builds the invoker chain for `bean`. Without advices the target
    /// invoker is returned directly.
    pub fn bind(&self, bean: Bean) -> Arc<dyn HandlerInvoker> {
        let target = TargetInvoker::new(
            Handler::new(Arc::clone(&self.method), bean),
            Arc::clone(&self.transfer),
        )
        .dump_argument_types(self.dump_argument_types);

        if self.advices.is_empty() {
            Arc::new(target)
        } else {
            Arc::new(AdvisedInvoker::new(Arc::clone(&self.advices), target))
        }
    }
}
