use super::{ResolverFactory, ResolverWrap};
use crate::arg::{Args, Value};
use crate::context::RequestContext;
use crate::di::Container;
use crate::error::{RegistrationError, WebError};
use crate::method::{MethodParameter, ResolvableParam};
use std::sync::Arc;

/// Supplies a parameter's value outside the resolver chain, e.g. the failure
/// being handled by an exception-handler method.
pub trait FixedArgs: Send + Sync {
    fn fixed_arg(&self, param: &MethodParameter) -> Option<Value>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoFixedArgs;

impl FixedArgs for NoFixedArgs {
    fn fixed_arg(&self, _param: &MethodParameter) -> Option<Value> {
        None
    }
}

/// Resolves the full argument list of a method, constructor or setter.
///
/// Bound once at registration; one entry per declared parameter in
/// declaration order.
#[derive(Clone, Debug)]
pub struct ArgumentsResolver {
    target: Arc<str>,
    params: Arc<[ResolvableParam<MethodParameter, ResolverWrap>]>,
}

impl ArgumentsResolver {
    /// Binds every parameter of `target` through `factory`.
    pub fn bind(
        target: impl Into<String>,
        params: &[MethodParameter],
        factory: &dyn ResolverFactory,
    ) -> Result<Self, RegistrationError> {
        let target = target.into();
        let params = params
            .iter()
            .map(|param| {
                let resolver = factory.resolver(&target, param)?;
                Ok(ResolvableParam::new(param.clone(), resolver))
            })
            .collect::<Result<Vec<_>, RegistrationError>>()?;
        Ok(Self {
            target: target.into(),
            params: params.into(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &[ResolvableParam<MethodParameter, ResolverWrap>] {
        &self.params
    }

    /// Resolves all arguments in order. The first failure aborts the rest.
    pub async fn resolve(
        &self,
        ctx: &mut RequestContext,
        deployment: &Container,
        fixed: &dyn FixedArgs,
    ) -> Result<Args, WebError> {
        let mut args = Args::with_capacity(self.params.len());
        for ResolvableParam { param, resolver } in self.params.iter() {
            if let Some(value) = fixed.fixed_arg(param) {
                args.push(Some(value));
                continue;
            }

            let Some(resolver) = resolver else {
                return Err(WebError::bad_request(format!(
                    "No resolver for parameter {} ('{}') of type {} in {}",
                    param.index(),
                    param.name(),
                    param.type_descriptor(),
                    self.target
                )));
            };

            let arg = resolver.resolve(ctx, deployment, param).await.map_err(|e| {
                WebError::bad_request_caused(
                    format!(
                        "Failed to resolve parameter {} ('{}') of {}: {e}",
                        param.index(),
                        param.name(),
                        self.target
                    ),
                    e,
                )
            })?;
            args.push(arg);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::Arg;
    use crate::error::BoxError;
    use crate::method::{HandlerMethod, ParamSource};
    use crate::resolve::{DefaultResolverFactory, ParamResolver};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Orders;

    /// Records which parameters it was asked for; fails on `boom`.
    #[derive(Clone, Default)]
    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ParamResolver for Recording {
        fn supports(&self, param: &MethodParameter) -> bool {
            matches!(param.param_source(), ParamSource::Attribute(_))
        }

        async fn resolve(&self, _ctx: &mut RequestContext, param: &MethodParameter) -> Result<Arg, BoxError> {
            self.seen.lock().unwrap().push(param.name().to_string());
            match param.name() {
                "boom" => Err(WebError::illegal_state("resolver broke").into()),
                "nothing" => Ok(None),
                other => Ok(Some(Value::new(other.to_string()))),
            }
        }
    }

    fn method(params: Vec<MethodParameter>) -> HandlerMethod {
        params
            .into_iter()
            .fold(HandlerMethod::builder::<Orders>("list"), |b, p| b.param(p))
            .build()
    }

    fn attr(name: &str) -> MethodParameter {
        MethodParameter::attribute::<String>(name)
    }

    struct ErrorCode;

    impl FixedArgs for ErrorCode {
        fn fixed_arg(&self, param: &MethodParameter) -> Option<Value> {
            param.is::<u16>().then(|| Value::new(404_u16))
        }
    }

    #[tokio::test]
    async fn test_arguments_follow_declaration_order() {
        let recording = Recording::default();
        let factory = DefaultResolverFactory::empty().with_param_resolver(recording.clone());
        let method = method(vec![
            attr("a"),
            MethodParameter::new::<u16>("code"),
            attr("nothing"),
            attr("c"),
        ]);
        let resolver = ArgumentsResolver::bind(method.signature(), method.parameters(), &factory).unwrap();

        let mut ctx = RequestContext::get("/");
        let args = resolver.resolve(&mut ctx, &Container::new(), &ErrorCode).await.unwrap();

        assert_eq!(args.len(), 4);
        assert_eq!(*args.get::<String>(0).unwrap(), "a");
        assert_eq!(*args.get::<u16>(1).unwrap(), 404);
        assert!(args.opt::<String>(2).unwrap().is_none());
        assert_eq!(*args.get::<String>(3).unwrap(), "c");
    }

    #[tokio::test]
    async fn test_missing_resolver_fails_before_later_parameters() {
        let recording = Recording::default();
        let factory = DefaultResolverFactory::empty().with_param_resolver(recording.clone());
        let method = method(vec![attr("a"), MethodParameter::new::<u16>("code"), attr("c")]);
        let resolver = ArgumentsResolver::bind(method.signature(), method.parameters(), &factory).unwrap();

        let mut ctx = RequestContext::get("/");
        let err = resolver
            .resolve(&mut ctx, &Container::new(), &NoFixedArgs)
            .await
            .unwrap_err();

        assert!(matches!(err, WebError::BadRequest { .. }));
        let message = err.to_string();
        assert!(message.contains("parameter 1 ('code') of type u16"), "{message}");
        assert!(message.contains("Orders::list"), "{message}");
        assert_eq!(*recording.seen.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_resolver_failure_keeps_cause() {
        let recording = Recording::default();
        let factory = DefaultResolverFactory::empty().with_param_resolver(recording.clone());
        let method = method(vec![attr("boom"), attr("b")]);
        let resolver = ArgumentsResolver::bind(method.signature(), method.parameters(), &factory).unwrap();

        let mut ctx = RequestContext::get("/");
        let err = resolver
            .resolve(&mut ctx, &Container::new(), &NoFixedArgs)
            .await
            .unwrap_err();

        let cause = err.cause().unwrap().downcast_ref::<WebError>().unwrap();
        assert!(matches!(cause, WebError::IllegalState(_)));
        assert_eq!(*recording.seen.lock().unwrap(), vec!["boom"]);
    }
}
