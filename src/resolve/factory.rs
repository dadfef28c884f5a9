use super::{
    AttributeResolver, BytesEntityResolver, ContainerResolver, ContextResolver, HeaderResolver,
    JsonEntityResolver, ParamResolver, ParseAdvice, PathVariableResolver, QueryParamResolver,
    RequestEntityResolver, ResolverAdvice, ResolverKind, ResolverWrap, TextEntityResolver,
};
use crate::error::RegistrationError;
use crate::invoke::{AsyncTransfer, FutureTransfer, ReadyTransfer};
use crate::method::{HandlerMethod, MethodParameter};
use std::sync::Arc;

/// Supplies resolvers, advices and the return-value transfer strategy at
/// registration time.
pub trait ResolverFactory: Send + Sync {
    fn context_resolver(&self, param: &MethodParameter) -> Option<Arc<dyn ContextResolver>>;

    fn param_resolver(&self, param: &MethodParameter) -> Option<Arc<dyn ParamResolver>>;

    /// Entity readers for `param`, highest priority first.
    fn request_entity_resolvers(&self, param: &MethodParameter) -> Vec<Arc<dyn RequestEntityResolver>>;

    fn advices(&self, param: &MethodParameter) -> Vec<Arc<dyn ResolverAdvice>>;

    fn future_transfer(&self, method: &HandlerMethod) -> Arc<dyn FutureTransfer>;

    /// Binds `param` to exactly one resolver kind. `Ok(None)` leaves the
    /// parameter to the fixed-argument path. More than one claiming kind is
    /// a registration error.
    fn resolver(&self, target: &str, param: &MethodParameter) -> Result<Option<ResolverWrap>, RegistrationError> {
        let mut kinds = Vec::new();
        if let Some(resolver) = self.context_resolver(param) {
            kinds.push(ResolverKind::Context(resolver));
        }
        if let Some(resolver) = self.param_resolver(param) {
            kinds.push(ResolverKind::Param(resolver));
        }
        let readers = self.request_entity_resolvers(param);
        if !readers.is_empty() {
            kinds.push(ResolverKind::Entity(readers.into()));
        }

        if kinds.len() > 1 {
            return Err(RegistrationError::AmbiguousResolver {
                method: target.to_string(),
                index: param.index(),
                name: param.name().to_string(),
                kinds: kinds.iter().map(ResolverKind::name).collect::<Vec<_>>().join(", "),
            });
        }
        Ok(kinds
            .pop()
            .map(|kind| ResolverWrap::new(kind, self.advices(param))))
    }
}

/// Registry of the built-in resolvers plus any custom ones.
///
/// Custom resolvers are consulted before the built-ins of the same kind.
#[derive(Clone)]
pub struct DefaultResolverFactory {
    context_resolvers: Vec<Arc<dyn ContextResolver>>,
    param_resolvers: Vec<Arc<dyn ParamResolver>>,
    entity_resolvers: Vec<Arc<dyn RequestEntityResolver>>,
    advices: Vec<Arc<dyn ResolverAdvice>>,
}

impl DefaultResolverFactory {
    pub fn new() -> Self {
        Self {
            context_resolvers: vec![Arc::new(ContainerResolver)],
            param_resolvers: vec![
                Arc::new(PathVariableResolver),
                Arc::new(QueryParamResolver),
                Arc::new(HeaderResolver),
                Arc::new(AttributeResolver),
            ],
            entity_resolvers: vec![
                Arc::new(JsonEntityResolver),
                Arc::new(TextEntityResolver),
                Arc::new(BytesEntityResolver),
            ],
            advices: vec![Arc::new(ParseAdvice)],
        }
    }

    /// A factory with no resolvers at all.
    pub fn empty() -> Self {
        Self {
            context_resolvers: Vec::new(),
            param_resolvers: Vec::new(),
            entity_resolvers: Vec::new(),
            advices: Vec::new(),
        }
    }

    pub fn with_context_resolver(mut self, resolver: impl ContextResolver + 'static) -> Self {
        self.context_resolvers.insert(0, Arc::new(resolver));
        self
    }

    pub fn with_param_resolver(mut self, resolver: impl ParamResolver + 'static) -> Self {
        self.param_resolvers.insert(0, Arc::new(resolver));
        self
    }

    pub fn with_entity_resolver(mut self, resolver: impl RequestEntityResolver + 'static) -> Self {
        self.entity_resolvers.insert(0, Arc::new(resolver));
        self
    }

    /// Appends an advice. Advices wrap in registration order, the first
    /// registered being outermost.
    pub fn with_advice(mut self, advice: impl ResolverAdvice + 'static) -> Self {
        self.advices.push(Arc::new(advice));
        self
    }
}

impl Default for DefaultResolverFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverFactory for DefaultResolverFactory {
    fn context_resolver(&self, param: &MethodParameter) -> Option<Arc<dyn ContextResolver>> {
        self.context_resolvers.iter().find(|r| r.supports(param)).cloned()
    }

    fn param_resolver(&self, param: &MethodParameter) -> Option<Arc<dyn ParamResolver>> {
        self.param_resolvers.iter().find(|r| r.supports(param)).cloned()
    }

    fn request_entity_resolvers(&self, param: &MethodParameter) -> Vec<Arc<dyn RequestEntityResolver>> {
        self.entity_resolvers
            .iter()
            .filter(|r| r.supports(param))
            .cloned()
            .collect()
    }

    fn advices(&self, param: &MethodParameter) -> Vec<Arc<dyn ResolverAdvice>> {
        self.advices.iter().filter(|a| a.supports(param)).cloned().collect()
    }

    fn future_transfer(&self, method: &HandlerMethod) -> Arc<dyn FutureTransfer> {
        if method.is_concurrent() {
            Arc::new(AsyncTransfer)
        } else {
            Arc::new(ReadyTransfer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arg::Arg;
    use crate::context::RequestContext;
    use crate::error::BoxError;
    use crate::method::ParamSource;
    use async_trait::async_trait;

    /// Claims every parameter, colliding with the built-in kinds.
    struct Greedy;

    #[async_trait]
    impl ParamResolver for Greedy {
        fn supports(&self, _param: &MethodParameter) -> bool {
            true
        }

        async fn resolve(&self, _ctx: &mut RequestContext, _param: &MethodParameter) -> Result<Arg, BoxError> {
            Ok(None)
        }
    }

    #[test]
    fn test_each_source_binds_one_kind() {
        let factory = DefaultResolverFactory::new();
        let cases = [
            (MethodParameter::context::<String>("svc"), "context"),
            (MethodParameter::path::<u32>("id"), "parameter"),
            (MethodParameter::header::<String>("accept"), "parameter"),
            (MethodParameter::raw_body::<String>("text"), "request entity"),
        ];
        for (param, expected) in cases {
            let wrap = factory.resolver("T::m", &param).unwrap().unwrap();
            assert_eq!(wrap.kind().name(), expected, "{param:?}");
        }
    }

    #[test]
    fn test_unbound_parameter_has_no_resolver() {
        let factory = DefaultResolverFactory::new();
        let param = MethodParameter::new::<u8>("error").source(ParamSource::Unbound);
        assert!(factory.resolver("T::m", &param).unwrap().is_none());
    }

    #[test]
    fn test_ambiguous_binding_is_rejected() {
        let factory = DefaultResolverFactory::new().with_param_resolver(Greedy);
        let err = factory
            .resolver("Users::create", &MethodParameter::raw_body::<String>("text"))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::AmbiguousResolver { .. }));
        assert!(err.to_string().contains("parameter, request entity"), "{err}");
    }

    #[test]
    fn test_parse_advice_attached_only_where_needed() {
        let factory = DefaultResolverFactory::new();
        let undecoded = MethodParameter::new::<i64>("n").source(ParamSource::Query("n".into()));
        assert!(factory.resolver("T::m", &undecoded).unwrap().unwrap().is_advised());
        let decoded = MethodParameter::query::<i64>("n");
        assert!(!factory.resolver("T::m", &decoded).unwrap().unwrap().is_advised());
    }
}
