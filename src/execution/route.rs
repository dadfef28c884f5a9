use super::{ExecutionHandler, Outcome};
use crate::context::RequestContext;
use crate::error::WebError;
use crate::exception::{CompletionHandler, DefaultExceptionHandler, ExceptionHandler, LoggingCompletionHandler};
use crate::filter::{Next, RouteFilter};
use crate::interceptor::{InterceptorChain, InterceptorMatcher};
use crate::resolve::NoFixedArgs;
use crate::value::{DefaultValueResolver, HandlerValueResolver};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// The full pipeline of one registered route.
///
/// ```text
/// filters -> pre_handle* -> arguments -> invoke -> post_handle* -> value
///                                                    after_completion* (reverse)
/// ```
///
/// Built once by [`RouteRegistry`](crate::route::RouteRegistry) and shared by
/// every request to the route. All per-request state (the matched
/// interceptors, how far `pre_handle` got, a prototype bean) lives in the
/// call, never on this struct.
pub struct RouteExecution {
    handler: Arc<ExecutionHandler>,
    filters: Arc<[Arc<dyn RouteFilter>]>,
    matcher: InterceptorMatcher,
    value_resolver: Arc<dyn HandlerValueResolver>,
    exception_handler: Arc<dyn ExceptionHandler>,
    completion_handler: Arc<dyn CompletionHandler>,
}

impl RouteExecution {
    pub fn new(handler: ExecutionHandler, matcher: InterceptorMatcher) -> Self {
        Self {
            handler: Arc::new(handler),
            filters: Arc::from(Vec::new()),
            matcher,
            value_resolver: Arc::new(DefaultValueResolver::new()),
            exception_handler: Arc::new(DefaultExceptionHandler),
            completion_handler: Arc::new(LoggingCompletionHandler),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Arc<dyn RouteFilter>>) -> Self {
        self.filters = filters.into();
        self
    }

    pub fn with_value_resolver(mut self, resolver: Arc<dyn HandlerValueResolver>) -> Self {
        self.value_resolver = resolver;
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = handler;
        self
    }

    pub fn with_completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.completion_handler = handler;
        self
    }

    pub fn handler(&self) -> &Arc<ExecutionHandler> {
        &self.handler
    }

    pub fn matcher(&self) -> &InterceptorMatcher {
        &self.matcher
    }

    /// Maps a failed [`handle`](Self::handle) to a response.
    pub fn exception_handler(&self) -> &Arc<dyn ExceptionHandler> {
        &self.exception_handler
    }

    /// Always runs once `handle` and the exception handler have settled.
    pub fn completion_handler(&self) -> &Arc<dyn CompletionHandler> {
        &self.completion_handler
    }

    /// Runs the route. Suppressed execution completes as `Ok(())`; any
    /// other failure is returned for the exception handler.
    pub async fn handle(&self, ctx: &mut RequestContext) -> Result<(), WebError> {
        let span = tracing::info_span!(
            "route",
            method = %ctx.method(),
            path = %ctx.path(),
            request_id = %ctx.request_id()
        );
        match self.execute(ctx).instrument(span).await {
            Outcome::Proceed(()) => Ok(()),
            Outcome::Suppressed => {
                tracing::debug!(handler = %self.handler.method(), "execution suppressed by interceptor");
                Ok(())
            }
            Outcome::Failed(error) => Err(error),
        }
    }

    /// The pipeline without suppression swallowed.
    pub async fn execute(&self, ctx: &mut RequestContext) -> Outcome<()> {
        if self.filters.is_empty() {
            return self.run_interceptors(ctx).await;
        }
        Next::new(&self.filters, self).do_next(ctx).await.into()
    }

    /// Handles the request end to end: `handle`, the exception handler on
    /// failure, then the completion handler.
    pub async fn dispatch(&self, mut ctx: RequestContext) -> Response {
        let error = self.handle(&mut ctx).await.err().map(Arc::new);

        let mut rendered = None;
        if let Some(error) = &error {
            let handling = AssertUnwindSafe(self.exception_handler.handle_exception(&mut ctx, Arc::clone(error)));
            let unhandled = match handling.catch_unwind().await {
                Ok(result) => result.err(),
                Err(panic) => Some(WebError::from_panic(panic)),
            };
            if let Some(unhandled) = unhandled {
                tracing::error!(error = %unhandled, original = %error, "exception handler failed");
                rendered = Some(unhandled.into_response());
            }
        }

        self.completion_handler.on_complete(&mut ctx, error.as_deref()).await;
        rendered.unwrap_or_else(|| ctx.into_response())
    }

    /// Interceptors around the handler. Matching and the stages run under
    /// one panic guard; after-completion runs for the reached interceptors
    /// unless the outcome is fatal. The response is committed only once the
    /// whole pipeline has succeeded.
    pub(crate) async fn run_interceptors(&self, ctx: &mut RequestContext) -> Outcome<()> {
        let mut chain = InterceptorChain::new(None);

        let outcome = match AssertUnwindSafe(self.run_stages(ctx, &mut chain)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Outcome::Failed(WebError::from_panic(panic)),
        };

        if let Some(error) = outcome.error().filter(|e| e.is_fatal()) {
            tracing::error!(handler = %self.handler.method(), error = %error, "fatal failure, skipping after-completion");
            return outcome;
        }
        let outcome = if chain.reached().is_empty() {
            outcome
        } else {
            self.after_completion(ctx, &chain, outcome).await
        };
        if let Outcome::Proceed(()) = outcome {
            ctx.response_mut().commit();
        }
        outcome
    }

    async fn run_stages(&self, ctx: &mut RequestContext, chain: &mut InterceptorChain) -> Outcome<()> {
        let method = self.handler.method();
        *chain = InterceptorChain::new(self.matcher.matching(ctx));

        match chain.apply_pre_handle(ctx, method).await {
            Ok(true) => {}
            Ok(false) => return Outcome::Suppressed,
            Err(error) => return Outcome::Failed(error),
        }

        let mut value = match self.handler.execute(ctx, &NoFixedArgs, None).await {
            Ok(value) => value,
            Err(error) => return Outcome::Failed(error),
        };
        tracing::debug!(handler = %method, returned = value.is_some(), "handler completed");

        if let Err(error) = chain.apply_post_handle(ctx, method, &mut value).await {
            return Outcome::Failed(error);
        }

        match self.value_resolver.resolve_value(ctx, method, value).await {
            Ok(()) => Outcome::Proceed(()),
            Err(error) => Outcome::Failed(error),
        }
    }

    /// Reverse order over the reached prefix, one at a time. Each hook sees
    /// the pipeline's own error. A failing hook does not stop the others; the
    /// first such failure becomes the outcome if there was none. A panicking
    /// hook ends the phase as fatal.
    async fn after_completion(&self, ctx: &mut RequestContext, chain: &InterceptorChain, outcome: Outcome<()>) -> Outcome<()> {
        let method = self.handler.method();
        let mut late = None;

        for (index, interceptor) in chain.reached().iter().enumerate().rev() {
            let hook = AssertUnwindSafe(interceptor.after_completion(ctx, method, outcome.error()));
            match hook.catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(interceptor = index, error = %error, "after_completion failed");
                    late.get_or_insert(error);
                }
                Err(panic) => {
                    let fatal = WebError::from_panic(panic);
                    tracing::error!(interceptor = index, error = %fatal, "after_completion panicked");
                    return Outcome::Failed(fatal);
                }
            }
        }

        match (outcome, late) {
            (Outcome::Failed(error), _) => Outcome::Failed(error),
            (_, Some(error)) => Outcome::Failed(error),
            (outcome, None) => outcome,
        }
    }
}

impl fmt::Debug for RouteExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteExecution")
            .field("handler", &self.handler)
            .field("filters", &self.filters.len())
            .field("interceptors", &self.matcher.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::{Args, ret, ret_future};
    use crate::bean::BeanDefinition;
    use crate::context::ResponseBody;
    use crate::di::Container;
    use crate::interceptor::{HandlerInterceptor, InterceptorMapping, InterceptorResult};
    use crate::method::HandlerMethod;
    use crate::route::{HandlerMapping, RouteRegistry};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        id: usize,
        allow: bool,
        delayed: bool,
        fail_pre: bool,
        fail_post: bool,
        log: Log,
    }

    impl Recorder {
        fn new(id: usize, allow: bool, log: &Log) -> Self {
            Self {
                id,
                allow,
                delayed: false,
                fail_pre: false,
                fail_post: false,
                log: Arc::clone(log),
            }
        }

        fn delayed(mut self) -> Self {
            self.delayed = true;
            self
        }

        fn failing_pre(mut self) -> Self {
            self.fail_pre = true;
            self
        }

        fn failing_post(mut self) -> Self {
            self.fail_post = true;
            self
        }
    }

    #[async_trait]
    impl HandlerInterceptor for Recorder {
        async fn pre_handle(&self, _ctx: &mut RequestContext, _handler: &HandlerMethod) -> InterceptorResult<bool> {
            if self.delayed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.log.lock().unwrap().push(format!("pre{}", self.id));
            if self.fail_pre {
                return Err(WebError::Forbidden(format!("rejected by {}", self.id)));
            }
            Ok(self.allow)
        }

        async fn post_handle(
            &self,
            _ctx: &mut RequestContext,
            _handler: &HandlerMethod,
            _value: &mut Option<crate::arg::ReturnValue>,
        ) -> InterceptorResult<()> {
            self.log.lock().unwrap().push(format!("post{}", self.id));
            if self.fail_post {
                return Err(WebError::internal(format!("post {} failed", self.id)));
            }
            Ok(())
        }

        async fn after_completion(
            &self,
            _ctx: &mut RequestContext,
            _handler: &HandlerMethod,
            error: Option<&WebError>,
        ) -> InterceptorResult<()> {
            if self.delayed {
                tokio::task::yield_now().await;
            }
            let suffix = if error.is_some() { "!" } else { "" };
            self.log.lock().unwrap().push(format!("after{}{suffix}", self.id));
            Ok(())
        }
    }

    struct Api {
        calls: AtomicUsize,
    }

    fn api() -> BeanDefinition {
        BeanDefinition::instance(Api {
            calls: AtomicUsize::new(0),
        })
    }

    fn hello() -> HandlerMethod {
        HandlerMethod::builder::<Api>("hello")
            .returns::<String>()
            .handler(|api, _: Args| {
                api.calls.fetch_add(1, Ordering::SeqCst);
                Ok(ret(String::from("hello")))
            })
            .build()
    }

    fn registry() -> RouteRegistry {
        RouteRegistry::new(Arc::new(Container::new()))
    }

    async fn run_with(recorders: Vec<Recorder>, handler: HandlerMethod) -> (Result<(), WebError>, RequestContext) {
        let mut mapping = HandlerMapping::new(handler).bean(api());
        for recorder in recorders {
            mapping = mapping.interceptor(InterceptorMapping::new(recorder));
        }
        let route = registry().register(mapping).unwrap();
        let mut ctx = RequestContext::get("/hello");
        let result = route.handle(&mut ctx).await;
        (result, ctx)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_pre_handle_short_circuit_and_reverse_after_completion() {
        let log = Log::default();
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handled);
        let method = HandlerMethod::builder::<Api>("hello")
            .handler(move |_, _: Args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .build();

        let recorders = vec![
            Recorder::new(0, true, &log),
            Recorder::new(1, false, &log),
            Recorder::new(2, true, &log),
        ];
        let (result, _) = run_with(recorders, method).await;

        assert!(result.is_ok());
        assert_eq!(entries(&log), ["pre0", "pre1", "after1", "after0"]);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_async_interceptors_keep_the_same_sequence() {
        let log = Log::default();
        let recorders = vec![
            Recorder::new(0, true, &log).delayed(),
            Recorder::new(1, false, &log),
            Recorder::new(2, true, &log).delayed(),
        ];
        let (result, _) = run_with(recorders, hello()).await;

        assert!(result.is_ok());
        assert_eq!(entries(&log), ["pre0", "pre1", "after1", "after0"]);
    }

    #[tokio::test]
    async fn test_full_pipeline_order() {
        let log = Log::default();
        let recorders = vec![Recorder::new(0, true, &log), Recorder::new(1, true, &log)];
        let (result, ctx) = run_with(recorders, hello()).await;

        result.unwrap();
        assert_eq!(entries(&log), ["pre0", "pre1", "post0", "post1", "after1", "after0"]);
        assert!(matches!(ctx.response().body(), ResponseBody::Text(t) if t == "hello"));
        assert!(ctx.response().is_committed());
    }

    #[tokio::test]
    async fn test_handler_error_reaches_after_completion() {
        let log = Log::default();
        let method = HandlerMethod::builder::<Api>("broken")
            .handler(|_, _: Args| Err(crate::invoke::InvocationError::target(anyhow::anyhow!("boom"))))
            .build();
        let (result, _) = run_with(vec![Recorder::new(0, true, &log), Recorder::new(1, true, &log)], method).await;

        let err = result.unwrap_err();
        assert!(err.handler_error().is_some());
        assert_eq!(err.to_string(), "boom");
        assert_eq!(entries(&log), ["pre0", "pre1", "after1!", "after0!"]);
    }

    fn counted(handled: &Arc<AtomicUsize>) -> HandlerMethod {
        let counter = Arc::clone(handled);
        HandlerMethod::builder::<Api>("hello")
            .returns::<String>()
            .handler(move |_, _: Args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ret(String::from("hello")))
            })
            .build()
    }

    #[tokio::test]
    async fn test_pre_handle_error_stops_chain_and_completes_reached() {
        let log = Log::default();
        let handled = Arc::new(AtomicUsize::new(0));
        let recorders = vec![
            Recorder::new(0, true, &log),
            Recorder::new(1, true, &log).failing_pre(),
            Recorder::new(2, true, &log),
        ];
        let (result, ctx) = run_with(recorders, counted(&handled)).await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(entries(&log), ["pre0", "pre1", "after1!", "after0!"]);
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        assert!(!ctx.response().is_committed());
    }

    #[tokio::test]
    async fn test_post_handle_error_skips_value_resolution() {
        let log = Log::default();
        let handled = Arc::new(AtomicUsize::new(0));
        let recorders = vec![
            Recorder::new(0, true, &log),
            Recorder::new(1, true, &log).failing_post(),
            Recorder::new(2, true, &log),
        ];
        let (result, ctx) = run_with(recorders, counted(&handled)).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("post 1 failed"));
        assert_eq!(
            entries(&log),
            ["pre0", "pre1", "pre2", "post0", "post1", "after2!", "after1!", "after0!"]
        );
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.response().body(), &ResponseBody::Empty);
        assert!(!ctx.response().is_committed());
    }

    #[tokio::test]
    async fn test_panicking_predicate_is_fatal() {
        let log = Log::default();
        let exploding: Arc<dyn crate::interceptor::RequestPredicate> =
            Arc::new(crate::interceptor::FnPredicate::new(|_: &RequestContext| -> bool {
                panic!("predicate exploded")
            }));
        let mapping = HandlerMapping::new(hello())
            .bean(api())
            .interceptor(InterceptorMapping::new(Recorder::new(0, true, &log)).when(exploding));
        let route = registry().register(mapping).unwrap();

        let mut ctx = RequestContext::get("/hello");
        let err = route.handle(&mut ctx).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("predicate exploded"));
        assert!(entries(&log).is_empty());

        let response = route.dispatch(RequestContext::get("/hello")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct PanickingExceptionHandler;

    #[async_trait]
    impl crate::exception::ExceptionHandler for PanickingExceptionHandler {
        async fn handle_exception(&self, _ctx: &mut RequestContext, _error: Arc<WebError>) -> Result<(), WebError> {
            panic!("renderer exploded")
        }
    }

    #[tokio::test]
    async fn test_panicking_exception_handler_renders_fatal() {
        let method = HandlerMethod::builder::<Api>("broken")
            .handler(|_, _: Args| Err(crate::invoke::InvocationError::target(WebError::bad_request("bad input"))))
            .build();
        let mapping = HandlerMapping::new(method)
            .bean(api())
            .exception_handler(Arc::new(PanickingExceptionHandler));
        let route = registry().register(mapping).unwrap();

        let response = route.dispatch(RequestContext::get("/broken")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_handler_panic_is_fatal_and_skips_after_completion() {
        let log = Log::default();
        let method = HandlerMethod::builder::<Api>("panics")
            .handler(|_, _: Args| panic!("handler exploded"))
            .build();
        let (result, _) = run_with(vec![Recorder::new(0, true, &log)], method).await;

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("handler exploded"));
        assert_eq!(entries(&log), ["pre0"]);
    }

    #[tokio::test]
    async fn test_concurrent_handler_returning_future() {
        let method = HandlerMethod::builder::<Api>("later")
            .concurrent()
            .handler(|_, _: Args| Ok(ret_future(async { Ok(ret(String::from("done"))) })))
            .build();
        let route = registry().register(HandlerMapping::new(method).bean(api())).unwrap();
        let mut ctx = RequestContext::get("/later");

        route.handle(&mut ctx).await.unwrap();
        assert!(matches!(ctx.response().body(), ResponseBody::Text(t) if t == "done"));
    }

    #[tokio::test]
    async fn test_no_interceptors_fast_path() {
        let route = registry().register(HandlerMapping::new(hello()).bean(api())).unwrap();
        assert!(route.matcher().is_empty());

        let mut ctx = RequestContext::get("/hello");
        assert!(route.matcher().matching(&ctx).is_none());
        route.handle(&mut ctx).await.unwrap();
        assert!(matches!(ctx.response().body(), ResponseBody::Text(_)));
    }

    struct FailingCompletion {
        log: Log,
    }

    #[async_trait]
    impl HandlerInterceptor for FailingCompletion {
        async fn after_completion(
            &self,
            _ctx: &mut RequestContext,
            _handler: &HandlerMethod,
            _error: Option<&WebError>,
        ) -> InterceptorResult<()> {
            self.log.lock().unwrap().push("failing".into());
            Err(WebError::internal("audit store unavailable"))
        }
    }

    #[tokio::test]
    async fn test_after_completion_failure_does_not_stop_others() {
        let log = Log::default();
        let mapping = HandlerMapping::new(hello())
            .bean(api())
            .interceptor(InterceptorMapping::new(Recorder::new(0, true, &log)))
            .interceptor(InterceptorMapping::new(FailingCompletion { log: Arc::clone(&log) }));
        let route = registry().register(mapping).unwrap();
        let mut ctx = RequestContext::get("/hello");

        let err = route.handle(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("audit store unavailable"));
        assert_eq!(entries(&log), ["pre0", "post0", "failing", "after0"]);
        assert!(!ctx.response().is_committed());
    }

    #[tokio::test]
    async fn test_after_completion_failure_is_rendered() {
        let log = Log::default();
        let mapping = HandlerMapping::new(hello())
            .bean(api())
            .interceptor(InterceptorMapping::new(FailingCompletion { log: Arc::clone(&log) }));
        let route = registry().register(mapping).unwrap();

        let response = route.dispatch(RequestContext::get("/hello")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["statusCode"], 500);
    }

    struct PanickingCompletion;

    #[async_trait]
    impl HandlerInterceptor for PanickingCompletion {
        async fn after_completion(
            &self,
            _ctx: &mut RequestContext,
            _handler: &HandlerMethod,
            _error: Option<&WebError>,
        ) -> InterceptorResult<()> {
            panic!("cleanup exploded")
        }
    }

    #[tokio::test]
    async fn test_after_completion_panic_aborts_phase() {
        let log = Log::default();
        let mapping = HandlerMapping::new(hello())
            .bean(api())
            .interceptor(InterceptorMapping::new(Recorder::new(0, true, &log)))
            .interceptor(InterceptorMapping::new(PanickingCompletion));
        let route = registry().register(mapping).unwrap();
        let mut ctx = RequestContext::get("/hello");

        let err = route.handle(&mut ctx).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(entries(&log), ["pre0", "post0"]);
    }

    #[tokio::test]
    async fn test_dispatch_renders_exception() {
        let method = HandlerMethod::builder::<Api>("missing")
            .param(crate::method::MethodParameter::query::<i64>("id"))
            .handler(|_, _: Args| Ok(None))
            .build();
        let route = registry().register(HandlerMapping::new(method).bean(api())).unwrap();

        let response = route.dispatch(RequestContext::get("/missing")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
