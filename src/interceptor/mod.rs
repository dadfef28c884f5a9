//! Handler interceptors: `pre_handle` gates the handler, `post_handle` sees
//! its value, `after_completion` always runs for the interceptors that were
//! reached.

mod chain;
mod guard;
mod logging;
mod matcher;
mod predicate;

pub use chain::InterceptorChain;
pub use guard::{Guard, GuardError, GuardInterceptor, GuardResult};
pub use logging::LoggingInterceptor;
pub use matcher::InterceptorMatcher;
pub use predicate::{FnPredicate, HeaderPredicate, MethodPredicate, PathPredicate, RequestPredicate};

use crate::arg::ReturnValue;
use crate::context::RequestContext;
use crate::error::WebError;
use crate::method::HandlerMethod;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Standard return type for interceptor hooks
pub type InterceptorResult<T> = Result<T, WebError>;

/// The HandlerInterceptor trait
///
/// Interceptors run around a matched handler:
///
/// 1. `pre_handle` in registration order. Returning `false` stops the chain
///    and suppresses the handler.
/// 2. `post_handle` in registration order, only after a successful handler.
/// 3. `after_completion` in reverse order, for every interceptor whose
///    `pre_handle` ran, with the terminal error if any.
///
/// # Example
/// ```
/// use meshdispatch::prelude::*;
///
/// struct RequireTenant;
///
/// #[async_trait]
/// impl HandlerInterceptor for RequireTenant {
///     async fn pre_handle(&self, ctx: &mut RequestContext, _handler: &HandlerMethod) -> InterceptorResult<bool> {
///         Ok(ctx.header("x-tenant").is_some())
///     }
/// }
/// ```
#[async_trait]
pub trait HandlerInterceptor: Send + Sync + 'static {
    async fn pre_handle(&self, _ctx: &mut RequestContext, _handler: &HandlerMethod) -> InterceptorResult<bool> {
        Ok(true)
    }

    async fn post_handle(
        &self,
        _ctx: &mut RequestContext,
        _handler: &HandlerMethod,
        _value: &mut Option<ReturnValue>,
    ) -> InterceptorResult<()> {
        Ok(())
    }

    async fn after_completion(
        &self,
        _ctx: &mut RequestContext,
        _handler: &HandlerMethod,
        _error: Option<&WebError>,
    ) -> InterceptorResult<()> {
        Ok(())
    }
}

type HandlerFilter = Arc<dyn Fn(&HandlerMethod) -> bool + Send + Sync>;

/// An interceptor with its request predicate and order.
///
/// Lower `order` runs first; equal orders keep registration order.
#[derive(Clone)]
pub struct InterceptorMapping {
    interceptor: Arc<dyn HandlerInterceptor>,
    predicate: Option<Arc<dyn RequestPredicate>>,
    handler_filter: Option<HandlerFilter>,
    order: i32,
}

impl InterceptorMapping {
    pub fn new(interceptor: impl HandlerInterceptor) -> Self {
        Self::shared(Arc::new(interceptor))
    }

    pub fn shared(interceptor: Arc<dyn HandlerInterceptor>) -> Self {
        Self {
            interceptor,
            predicate: None,
            handler_filter: None,
            order: 0,
        }
    }

    /// Applies only to requests matching `predicate`. Mappings sharing one
    /// `Arc` predicate share its evaluation per request.
    pub fn when(mut self, predicate: Arc<dyn RequestPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Applies only to handler methods accepted by `filter`; checked at registration.
    pub fn for_handlers<F>(mut self, filter: F) -> Self
    where
        F: Fn(&HandlerMethod) -> bool + Send + Sync + 'static,
    {
        self.handler_filter = Some(Arc::new(filter));
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn get_order(&self) -> i32 {
        self.order
    }

    pub fn interceptor(&self) -> &Arc<dyn HandlerInterceptor> {
        &self.interceptor
    }

    pub fn predicate(&self) -> Option<&Arc<dyn RequestPredicate>> {
        self.predicate.as_ref()
    }

    pub fn is_eligible(&self, handler: &HandlerMethod) -> bool {
        self.handler_filter.as_ref().is_none_or(|filter| filter(handler))
    }
}

impl fmt::Debug for InterceptorMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorMapping")
            .field("order", &self.order)
            .field("conditional", &self.predicate.is_some())
            .finish()
    }
}
