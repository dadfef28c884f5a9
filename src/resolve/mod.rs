//! Parameter resolution.
//!
//! Every declared parameter is bound at registration time to at most one
//! resolver kind (context, request parameter or request entity), optionally
//! wrapped with an ordered advice chain. Per request, [`ArgumentsResolver`]
//! walks the bound parameters in declaration order and fails fast.

mod advice;
mod args;
mod builtin;
mod factory;

pub use advice::{DefaultValueAdvice, ParseAdvice, ParseIntPipe, Pipe, PipeAdvice, PipeError, PipeResult};
pub use args::{ArgumentsResolver, FixedArgs, NoFixedArgs};
pub use builtin::{
    AttributeResolver, BytesEntityResolver, ContainerResolver, HeaderResolver, JsonEntityResolver,
    PathVariableResolver, QueryParamResolver, TextEntityResolver,
};
pub use factory::{DefaultResolverFactory, ResolverFactory};

use crate::arg::Arg;
use crate::context::RequestContext;
use crate::di::Container;
use crate::error::BoxError;
use crate::method::MethodParameter;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Pulls a value from the deployment context (shared beans).
#[async_trait]
pub trait ContextResolver: Send + Sync {
    fn supports(&self, param: &MethodParameter) -> bool;

    async fn resolve(&self, deployment: &Container, param: &MethodParameter) -> Result<Arg, BoxError>;
}

/// Pulls a value from structured request data (path, query, headers, attributes).
#[async_trait]
pub trait ParamResolver: Send + Sync {
    fn supports(&self, param: &MethodParameter) -> bool;

    async fn resolve(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Arg, BoxError>;
}

/// Reads the request body.
///
/// `Ok(None)` means this reader does not apply to the request (for example a
/// content type it does not understand) and the next one in priority order is
/// tried.
#[async_trait]
pub trait RequestEntityResolver: Send + Sync {
    fn supports(&self, param: &MethodParameter) -> bool;

    async fn read(&self, ctx: &mut RequestContext, param: &MethodParameter) -> Result<Option<Arg>, BoxError>;
}

/// Intercepts the resolution of one parameter.
///
/// An advice may call [`ResolutionChain::proceed`] and post-process the
/// result, return its own value without proceeding, or fail.
#[async_trait]
pub trait ResolverAdvice: Send + Sync {
    /// Whether this advice applies to `param`. Checked once at registration.
    fn supports(&self, _param: &MethodParameter) -> bool {
        true
    }

    async fn around(&self, ctx: &mut RequestContext, chain: ResolutionChain<'_>) -> Result<Arg, BoxError>;
}

/// The resolver a parameter is bound to.
#[derive(Clone)]
pub enum ResolverKind {
    Context(Arc<dyn ContextResolver>),
    Param(Arc<dyn ParamResolver>),
    /// Entity readers in priority order.
    Entity(Arc<[Arc<dyn RequestEntityResolver>]>),
}

impl ResolverKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResolverKind::Context(_) => "context",
            ResolverKind::Param(_) => "parameter",
            ResolverKind::Entity(_) => "request entity",
        }
    }

    async fn resolve(
        &self,
        ctx: &mut RequestContext,
        deployment: &Container,
        param: &MethodParameter,
    ) -> Result<Arg, BoxError> {
        match self {
            ResolverKind::Context(resolver) => resolver.resolve(deployment, param).await,
            ResolverKind::Param(resolver) => resolver.resolve(ctx, param).await,
            ResolverKind::Entity(readers) => {
                let mut last_error = None;
                for reader in readers.iter() {
                    match reader.read(ctx, param).await {
                        Ok(Some(arg)) => return Ok(arg),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::debug!(param = param.name(), error = %e, "entity reader failed, trying next");
                            last_error = Some(e);
                        }
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    format!(
                        "no entity reader accepted content type {:?} for {}",
                        ctx.content_type().unwrap_or("<none>"),
                        param.type_descriptor()
                    )
                    .into()
                }))
            }
        }
    }
}

impl fmt::Debug for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The rest of an advice chain, seen by one [`ResolverAdvice`].
pub struct ResolutionChain<'a> {
    param: &'a MethodParameter,
    deployment: &'a Container,
    advices: &'a [Arc<dyn ResolverAdvice>],
    kind: &'a ResolverKind,
}

impl<'a> ResolutionChain<'a> {
    pub fn param(&self) -> &'a MethodParameter {
        self.param
    }

    pub fn deployment(&self) -> &'a Container {
        self.deployment
    }

    pub async fn proceed(self, ctx: &mut RequestContext) -> Result<Arg, BoxError> {
        match self.advices.split_first() {
            Some((advice, rest)) => {
                let next = ResolutionChain {
                    advices: rest,
                    ..self
                };
                advice.around(ctx, next).await
            }
            None => self.kind.resolve(ctx, self.deployment, self.param).await,
        }
    }
}

/// A resolver plus its advices, presented as a single resolution step.
#[derive(Clone)]
pub struct ResolverWrap {
    kind: ResolverKind,
    advices: Arc<[Arc<dyn ResolverAdvice>]>,
}

impl ResolverWrap {
    pub fn new(kind: ResolverKind, advices: Vec<Arc<dyn ResolverAdvice>>) -> Self {
        Self {
            kind,
            advices: advices.into(),
        }
    }

    pub fn kind(&self) -> &ResolverKind {
        &self.kind
    }

    pub fn is_advised(&self) -> bool {
        !self.advices.is_empty()
    }

    pub async fn resolve(
        &self,
        ctx: &mut RequestContext,
        deployment: &Container,
        param: &MethodParameter,
    ) -> Result<Arg, BoxError> {
        if self.advices.is_empty() {
            return self.kind.resolve(ctx, deployment, param).await;
        }
        ResolutionChain {
            param,
            deployment,
            advices: &self.advices,
            kind: &self.kind,
        }
        .proceed(ctx)
        .await
    }
}

impl fmt::Debug for ResolverWrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverWrap")
            .field("kind", &self.kind)
            .field("advices", &self.advices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::Value;
    use std::sync::Mutex;

    struct Fixed(&'static str);

    #[async_trait]
    impl ParamResolver for Fixed {
        fn supports(&self, _param: &MethodParameter) -> bool {
            true
        }

        async fn resolve(&self, _ctx: &mut RequestContext, _param: &MethodParameter) -> Result<Arg, BoxError> {
            Ok(Some(Value::new(self.0.to_string())))
        }
    }

    struct Upper {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ResolverAdvice for Upper {
        async fn around(&self, ctx: &mut RequestContext, chain: ResolutionChain<'_>) -> Result<Arg, BoxError> {
            self.log.lock().unwrap().push("upper");
            let arg = chain.proceed(ctx).await?;
            Ok(arg
                .and_then(|v| v.downcast::<String>())
                .map(|s| Value::new(s.to_uppercase())))
        }
    }

    struct Veto;

    #[async_trait]
    impl ResolverAdvice for Veto {
        async fn around(&self, _ctx: &mut RequestContext, chain: ResolutionChain<'_>) -> Result<Arg, BoxError> {
            Err(format!("'{}' vetoed", chain.param().name()).into())
        }
    }

    struct Failing;

    #[async_trait]
    impl RequestEntityResolver for Failing {
        fn supports(&self, _param: &MethodParameter) -> bool {
            true
        }

        async fn read(&self, _ctx: &mut RequestContext, _param: &MethodParameter) -> Result<Option<Arg>, BoxError> {
            Err("unreadable".into())
        }
    }

    struct Skipping;

    #[async_trait]
    impl RequestEntityResolver for Skipping {
        fn supports(&self, _param: &MethodParameter) -> bool {
            true
        }

        async fn read(&self, _ctx: &mut RequestContext, _param: &MethodParameter) -> Result<Option<Arg>, BoxError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_unadvised_wrap_calls_resolver_directly() {
        let wrap = ResolverWrap::new(ResolverKind::Param(Arc::new(Fixed("abc"))), vec![]);
        let mut ctx = RequestContext::get("/");
        let arg = wrap
            .resolve(&mut ctx, &Container::new(), &MethodParameter::new::<String>("s"))
            .await
            .unwrap();
        assert!(!wrap.is_advised());
        assert_eq!(*arg.unwrap().downcast::<String>().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_advice_transforms_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let wrap = ResolverWrap::new(
            ResolverKind::Param(Arc::new(Fixed("abc"))),
            vec![Arc::new(Upper { log: log.clone() })],
        );
        let mut ctx = RequestContext::get("/");
        let arg = wrap
            .resolve(&mut ctx, &Container::new(), &MethodParameter::new::<String>("s"))
            .await
            .unwrap();
        assert_eq!(*arg.unwrap().downcast::<String>().unwrap(), "ABC");
        assert_eq!(*log.lock().unwrap(), vec!["upper"]);
    }

    #[tokio::test]
    async fn test_advice_can_abort_before_resolver() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let wrap = ResolverWrap::new(
            ResolverKind::Param(Arc::new(Fixed("abc"))),
            vec![Arc::new(Veto), Arc::new(Upper { log: log.clone() })],
        );
        let mut ctx = RequestContext::get("/");
        let err = wrap
            .resolve(&mut ctx, &Container::new(), &MethodParameter::new::<String>("token"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "'token' vetoed");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entity_readers_tried_in_priority_order() {
        let readers: Vec<Arc<dyn RequestEntityResolver>> =
            vec![Arc::new(Skipping), Arc::new(Failing), Arc::new(Skipping)];
        let wrap = ResolverWrap::new(ResolverKind::Entity(readers.into()), vec![]);
        let mut ctx = RequestContext::get("/");
        let err = wrap
            .resolve(&mut ctx, &Container::new(), &MethodParameter::new::<String>("body"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unreadable");

        let readers: Vec<Arc<dyn RequestEntityResolver>> = vec![Arc::new(Skipping)];
        let wrap = ResolverWrap::new(ResolverKind::Entity(readers.into()), vec![]);
        let err = wrap
            .resolve(&mut ctx, &Container::new(), &MethodParameter::new::<String>("body"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no entity reader"), "{err}");
    }
}
