use super::{HandlerInterceptor, InterceptorResult};
use crate::context::RequestContext;
use crate::method::HandlerMethod;
use async_trait::async_trait;
use axum::http::StatusCode;

/// Standard Result type for Guard
/// Ok(()) means allowed
/// Err(GuardError) means denied
pub type GuardResult = Result<(), GuardError>;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl GuardError {
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::Forbidden(_) => StatusCode::FORBIDDEN,
            GuardError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

/// The Guard trait
/// Implement this to protect routes
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    async fn can_activate(&self, ctx: &RequestContext, handler: &HandlerMethod) -> GuardResult;
}

/// Runs a [`Guard`] as the `pre_handle` of an interceptor.
///
/// A denial writes the guard's status and a JSON error body, then refuses
/// execution; it is not reported as an error.
pub struct GuardInterceptor<G> {
    guard: G,
}

impl<G: Guard> GuardInterceptor<G> {
    pub fn new(guard: G) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl<G: Guard> HandlerInterceptor for GuardInterceptor<G> {
    async fn pre_handle(&self, ctx: &mut RequestContext, handler: &HandlerMethod) -> InterceptorResult<bool> {
        match self.guard.can_activate(ctx, handler).await {
            Ok(()) => Ok(true),
            Err(denied) => {
                tracing::warn!(handler = %handler, reason = %denied, "guard denied request");
                let status = denied.status();
                let response = ctx.response_mut();
                response.set_status(status);
                response.set_json(serde_json::json!({
                    "statusCode": status.as_u16(),
                    "message": denied.to_string(),
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }));
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResponseBody;

    struct ApiKeyGuard;

    #[async_trait]
    impl Guard for ApiKeyGuard {
        async fn can_activate(&self, ctx: &RequestContext, _handler: &HandlerMethod) -> GuardResult {
            match ctx.header("x-api-key") {
                Some("secret") => Ok(()),
                Some(_) => Err(GuardError::Forbidden("bad key".into())),
                None => Err(GuardError::Unauthorized("missing key".into())),
            }
        }
    }

    struct Admin;

    fn handler() -> HandlerMethod {
        HandlerMethod::builder::<Admin>("purge").build()
    }

    #[tokio::test]
    async fn test_guard_allows() {
        let guard = GuardInterceptor::new(ApiKeyGuard);
        let mut ctx = RequestContext::get("/").with_header("x-api-key", "secret");
        assert!(guard.pre_handle(&mut ctx, &handler()).await.unwrap());
        assert!(!ctx.response().is_status_set());
    }

    #[tokio::test]
    async fn test_guard_denial_writes_status() {
        let guard = GuardInterceptor::new(ApiKeyGuard);

        let mut ctx = RequestContext::get("/").with_header("x-api-key", "guess");
        assert!(!guard.pre_handle(&mut ctx, &handler()).await.unwrap());
        assert_eq!(ctx.response().status(), StatusCode::FORBIDDEN);
        let ResponseBody::Json(body) = ctx.response().body() else {
            panic!("expected json body");
        };
        assert_eq!(body["statusCode"], 403);

        let mut ctx = RequestContext::get("/");
        assert!(!guard.pre_handle(&mut ctx, &handler()).await.unwrap());
        assert_eq!(ctx.response().status(), StatusCode::UNAUTHORIZED);
    }
}
