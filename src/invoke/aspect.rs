use super::{HandlerAdvice, Invocation};
use crate::arg::ReturnValue;
use crate::context::RequestContext;
use crate::error::WebError;
use crate::method::HandlerMethod;
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for Aspect hooks.
pub type AspectResult = Result<(), WebError>;

/// # Aspect
///
/// Defines cross-cutting concerns with simple `before` and `after` hooks.
/// Aspects are easier to implement than a full [`HandlerAdvice`] when you
/// don't need to control the invocation itself.
///
/// ### Example
///
/// ```rust
/// use meshdispatch::prelude::*;
///
/// pub struct AuditAspect;
///
/// #[async_trait]
/// impl Aspect for AuditAspect {
///     async fn before(&self, ctx: &mut RequestContext, method: &HandlerMethod) -> AspectResult {
///         ctx.attributes_mut().insert("audited", method.name().to_string());
///         Ok(())
///     }
/// }
///
/// let advice = AspectAdvice::new(AuditAspect);
/// ```
#[async_trait]
pub trait Aspect: Send + Sync + 'static {
    /// Executed before the handler is invoked. An error aborts the invocation.
    async fn before(&self, _ctx: &mut RequestContext, _method: &HandlerMethod) -> AspectResult {
        Ok(())
    }

    /// Executed after the handler returned successfully.
    async fn after(&self, _ctx: &mut RequestContext, _value: &mut Option<ReturnValue>) -> AspectResult {
        Ok(())
    }

    /// Executed when the invocation failed.
    async fn on_error(&self, _ctx: &mut RequestContext, _error: &WebError) {}
}

/// Adapter that runs an [`Aspect`] as a [`HandlerAdvice`].
pub struct AspectAdvice<A: Aspect> {
    aspect: Arc<A>,
}

impl<A: Aspect> AspectAdvice<A> {
    pub fn new(aspect: A) -> Self {
        Self {
            aspect: Arc::new(aspect),
        }
    }
}

#[async_trait]
impl<A: Aspect> HandlerAdvice for AspectAdvice<A> {
    async fn around(
        &self,
        ctx: &mut RequestContext,
        invocation: Invocation<'_>,
    ) -> Result<Option<ReturnValue>, WebError> {
        self.aspect.before(ctx, invocation.method()).await?;

        match invocation.proceed(ctx).await {
            Ok(mut value) => {
                self.aspect.after(ctx, &mut value).await?;
                Ok(value)
            }
            Err(e) => {
                self.aspect.on_error(ctx, &e).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::{Args, Value, ret};
    use crate::invoke::{AdvisedInvoker, Handler, HandlerInvoker, InvocationError, ReadyTransfer, TargetInvoker};
    use std::sync::Mutex;

    struct Echo;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Aspect for Arc<Recorder> {
        async fn before(&self, _ctx: &mut RequestContext, method: &HandlerMethod) -> AspectResult {
            self.events.lock().unwrap().push(format!("before {}", method.name()));
            Ok(())
        }

        async fn after(&self, _ctx: &mut RequestContext, value: &mut Option<ReturnValue>) -> AspectResult {
            self.events.lock().unwrap().push("after".into());
            *value = ret("rewritten");
            Ok(())
        }

        async fn on_error(&self, _ctx: &mut RequestContext, error: &WebError) {
            self.events.lock().unwrap().push(format!("error {error}"));
        }
    }

    fn invoker(fail: bool, recorder: Arc<Recorder>) -> AdvisedInvoker {
        let method = Arc::new(
            HandlerMethod::builder::<Echo>("echo")
                .handler(move |_, _| {
                    if fail {
                        Err(InvocationError::target(WebError::NotFound("x".into())))
                    } else {
                        Ok(ret("original"))
                    }
                })
                .build(),
        );
        let target = TargetInvoker::new(Handler::new(method, Value::new(Echo)), Arc::new(ReadyTransfer));
        AdvisedInvoker::new(
            vec![Arc::new(AspectAdvice::new(recorder)) as Arc<dyn HandlerAdvice>].into(),
            target,
        )
    }

    #[tokio::test]
    async fn test_before_and_after_hooks() {
        let recorder = Arc::new(Recorder::default());
        let mut ctx = RequestContext::get("/");
        let out = invoker(false, recorder.clone())
            .invoke(&mut ctx, Args::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*out.downcast::<&str>().unwrap(), "rewritten");
        assert_eq!(*recorder.events.lock().unwrap(), vec!["before echo", "after"]);
    }

    #[tokio::test]
    async fn test_on_error_hook() {
        let recorder = Arc::new(Recorder::default());
        let mut ctx = RequestContext::get("/");
        let err = invoker(true, recorder.clone())
            .invoke(&mut ctx, Args::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WebError::NotFound(_)));
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["before echo".to_string(), "error Not found: x".to_string()]
        );
    }
}
