//! Executing one handler method: obtain the bean, resolve arguments, invoke.
//!
//! [`RouteExecution`] wraps an [`ExecutionHandler`] with filters, interceptors
//! and value resolution.

mod outcome;
mod route;

pub use outcome::Outcome;
pub use route::RouteExecution;

use crate::arg::ReturnValue;
use crate::bean::{Bean, BeanScope, BeanStrategy};
use crate::context::RequestContext;
use crate::di::Container;
use crate::error::WebError;
use crate::method::HandlerMethod;
use crate::resolve::{ArgumentsResolver, FixedArgs};
use std::fmt;
use std::sync::Arc;

/// Resolve-args, invoke and transfer for a single handler method.
///
/// Immutable after registration and shared by all requests of a route.
pub struct ExecutionHandler {
    method: Arc<HandlerMethod>,
    arguments: ArgumentsResolver,
    strategy: BeanStrategy,
    deployment: Arc<Container>,
}

impl ExecutionHandler {
    pub fn new(
        method: Arc<HandlerMethod>,
        arguments: ArgumentsResolver,
        strategy: BeanStrategy,
        deployment: Arc<Container>,
    ) -> Self {
        Self {
            method,
            arguments,
            strategy,
            deployment,
        }
    }

    pub fn method(&self) -> &Arc<HandlerMethod> {
        &self.method
    }

    pub fn scope(&self) -> BeanScope {
        self.strategy.scope()
    }

    pub fn arguments(&self) -> &ArgumentsResolver {
        &self.arguments
    }

    pub fn deployment(&self) -> &Arc<Container> {
        &self.deployment
    }

    /// Runs the handler for this request.
    ///
    /// The bean is obtained first, so a prototype whose injection fails never
    /// resolves the method's arguments. `supplied` is the bean for an
    /// externally scoped handler.
    pub async fn execute(
        &self,
        ctx: &mut RequestContext,
        fixed: &dyn FixedArgs,
        supplied: Option<Bean>,
    ) -> Result<Option<ReturnValue>, WebError> {
        let invoker = self.strategy.invoker(ctx, &self.deployment, supplied).await?;
        let args = self.arguments.resolve(ctx, &self.deployment, fixed).await?;
        tracing::debug!(handler = %self.method, args = args.len(), "arguments resolved");
        invoker.invoke(ctx, args).await
    }
}

impl fmt::Debug for ExecutionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandler")
            .field("method", &self.method.signature())
            .field("scope", &self.strategy.scope())
            .finish()
    }
}
