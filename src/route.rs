//! Route registration: turning a [`HandlerMapping`] into an immutable
//! [`RouteExecution`].
//!
//! All validation happens here, once. A route that registers successfully
//! never fails per request for structural reasons (ambiguous resolvers,
//! missing singleton beans, mismatched bean types). Externally scoped beans
//! are only accepted by [`RouteRegistry::exception_method`], which receives
//! the bean up front.

use crate::bean::{Bean, BeanDefinition, BeanFactory, BeanScope, BeanStrategy};
use crate::config::PipelineConfig;
use crate::di::Container;
use crate::error::RegistrationError;
use crate::exception::{CompletionHandler, DefaultExceptionHandler, ExceptionHandler, LoggingCompletionHandler, MethodExceptionHandler};
use crate::execution::{ExecutionHandler, RouteExecution};
use crate::filter::RouteFilter;
use crate::interceptor::{InterceptorMapping, InterceptorMatcher};
use crate::invoke::{HandlerAdvice, InvokerTemplate};
use crate::method::HandlerMethod;
use crate::resolve::{ArgumentsResolver, DefaultResolverFactory, ResolverFactory};
use crate::service::RouteService;
use crate::value::{DefaultValueResolver, HandlerValueResolver};
use std::sync::Arc;

/// Everything declared for one route, as handed over by the router.
pub struct HandlerMapping {
    method: Arc<HandlerMethod>,
    bean: Option<BeanDefinition>,
    interceptors: Vec<InterceptorMapping>,
    filters: Vec<Arc<dyn RouteFilter>>,
    advices: Vec<Arc<dyn HandlerAdvice>>,
    value_resolver: Option<Arc<dyn HandlerValueResolver>>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
    completion_handler: Option<Arc<dyn CompletionHandler>>,
}

impl HandlerMapping {
    pub fn new(method: impl Into<Arc<HandlerMethod>>) -> Self {
        Self {
            method: method.into(),
            bean: None,
            interceptors: Vec::new(),
            filters: Vec::new(),
            advices: Vec::new(),
            value_resolver: None,
            exception_handler: None,
            completion_handler: None,
        }
    }

    pub fn method(&self) -> &Arc<HandlerMethod> {
        &self.method
    }

    /// Without a definition the registry's default scope applies.
    pub fn bean(mut self, definition: BeanDefinition) -> Self {
        self.bean = Some(definition);
        self
    }

    pub fn interceptor(mut self, mapping: InterceptorMapping) -> Self {
        self.interceptors.push(mapping);
        self
    }

    /// Filters run in the order they are added.
    pub fn filter(mut self, filter: impl RouteFilter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Handler advices run after the registry's global ones.
    pub fn advice(mut self, advice: impl HandlerAdvice + 'static) -> Self {
        self.advices.push(Arc::new(advice));
        self
    }

    pub fn value_resolver(mut self, resolver: Arc<dyn HandlerValueResolver>) -> Self {
        self.value_resolver = Some(resolver);
        self
    }

    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    pub fn completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.completion_handler = Some(handler);
        self
    }
}

/// Builds route executions against one deployment context.
///
/// # Example
/// ```
/// use meshdispatch::prelude::*;
/// use std::sync::Arc;
///
/// struct Health;
///
/// let method = HandlerMethod::builder::<Health>("check")
///     .returns::<&'static str>()
///     .handler(|_, _| Ok(ret("up")))
///     .build();
///
/// let registry = RouteRegistry::new(Arc::new(Container::new()))
///     .with_interceptor(InterceptorMapping::new(LoggingInterceptor));
/// let route = registry
///     .register(HandlerMapping::new(method).bean(BeanDefinition::instance(Health)))
///     .unwrap();
/// assert_eq!(route.matcher().len(), 1);
/// ```
#[derive(Clone)]
pub struct RouteRegistry {
    deployment: Arc<Container>,
    resolvers: Arc<dyn ResolverFactory>,
    interceptors: Vec<InterceptorMapping>,
    advices: Vec<Arc<dyn HandlerAdvice>>,
    value_resolver: Arc<dyn HandlerValueResolver>,
    exception_handler: Arc<dyn ExceptionHandler>,
    completion_handler: Arc<dyn CompletionHandler>,
    config: PipelineConfig,
}

impl RouteRegistry {
    pub fn new(deployment: Arc<Container>) -> Self {
        Self {
            deployment,
            resolvers: Arc::new(DefaultResolverFactory::new()),
            interceptors: Vec::new(),
            advices: Vec::new(),
            value_resolver: Arc::new(DefaultValueResolver::new()),
            exception_handler: Arc::new(DefaultExceptionHandler),
            completion_handler: Arc::new(LoggingCompletionHandler),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_resolvers(mut self, resolvers: impl ResolverFactory + 'static) -> Self {
        self.resolvers = Arc::new(resolvers);
        self
    }

    /// An interceptor applied to every route registered afterwards.
    pub fn with_interceptor(mut self, mapping: InterceptorMapping) -> Self {
        self.interceptors.push(mapping);
        self
    }

    /// A handler advice applied to every route registered afterwards.
    pub fn with_advice(mut self, advice: impl HandlerAdvice + 'static) -> Self {
        self.advices.push(Arc::new(advice));
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

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn deployment(&self) -> &Arc<Container> {
        &self.deployment
    }

    pub fn register(&self, mapping: HandlerMapping) -> Result<RouteExecution, RegistrationError> {
        let HandlerMapping {
            method,
            bean,
            interceptors,
            filters,
            advices,
            value_resolver,
            exception_handler,
            completion_handler,
        } = mapping;

        let definition = match bean {
            Some(definition) => definition,
            None => self.default_definition(&method)?,
        };
        if matches!(definition, BeanDefinition::External) {
            return Err(RegistrationError::Invalid(format!(
                "{method} is externally scoped; a route has no caller to supply its bean"
            )));
        }
        let advices = self.advices.iter().cloned().chain(advices).collect();
        let handler = self.execution_handler(&method, definition, advices)?;

        let mappings: Vec<InterceptorMapping> = self.interceptors.iter().cloned().chain(interceptors).collect();
        let matcher = InterceptorMatcher::new(&method, &mappings, self.config.complex_mapping_threshold);

        tracing::debug!(
            handler = %method,
            scope = %handler.scope(),
            interceptors = matcher.len(),
            complex_groups = matcher.complex_groups(),
            filters = filters.len(),
            "route registered"
        );

        Ok(RouteExecution::new(handler, matcher)
            .with_filters(filters)
            .with_value_resolver(value_resolver.unwrap_or_else(|| Arc::clone(&self.value_resolver)))
            .with_exception_handler(exception_handler.unwrap_or_else(|| Arc::clone(&self.exception_handler)))
            .with_completion_handler(completion_handler.unwrap_or_else(|| Arc::clone(&self.completion_handler))))
    }

    /// Registers `mapping` and wraps it as a tower service.
    pub fn service(&self, mapping: HandlerMapping) -> Result<RouteService, RegistrationError> {
        let execution = self.register(mapping)?;
        Ok(RouteService::new(Arc::new(execution)).max_body_bytes(self.config.max_body_bytes))
    }

    /// Builds an exception handler running `method` on `bean`.
    ///
    /// Parameters declared as `WebError` or `StatusCode` receive the failure
    /// being handled; the rest resolve like any handler parameter.
    pub fn exception_method(
        &self,
        method: impl Into<Arc<HandlerMethod>>,
        bean: Bean,
    ) -> Result<MethodExceptionHandler, RegistrationError> {
        let method = method.into();
        check_bean_type(&method, &bean)?;
        let handler = self.execution_handler(&method, BeanDefinition::External, self.advices.clone())?;
        Ok(MethodExceptionHandler::new(handler, bean)
            .fallback(Arc::clone(&self.exception_handler))
            .value_resolver(Arc::clone(&self.value_resolver)))
    }

    fn default_definition(&self, method: &HandlerMethod) -> Result<BeanDefinition, RegistrationError> {
        match self.config.default_scope {
            BeanScope::Singleton => Ok(BeanDefinition::Container),
            BeanScope::External => Ok(BeanDefinition::External),
            BeanScope::Prototype => Err(RegistrationError::Invalid(format!(
                "{method} has no bean definition; prototype scope needs a bean descriptor"
            ))),
        }
    }

    fn execution_handler(
        &self,
        method: &Arc<HandlerMethod>,
        definition: BeanDefinition,
        advices: Vec<Arc<dyn HandlerAdvice>>,
    ) -> Result<ExecutionHandler, RegistrationError> {
        let arguments = ArgumentsResolver::bind(method.signature(), method.parameters(), self.resolvers.as_ref())?;
        let template = InvokerTemplate::new(Arc::clone(method), advices, self.resolvers.future_transfer(method))
            .dump_argument_types(self.config.log_argument_types);
        let strategy = self.strategy(method, definition, template)?;
        Ok(ExecutionHandler::new(
            Arc::clone(method),
            arguments,
            strategy,
            Arc::clone(&self.deployment),
        ))
    }

    fn strategy(
        &self,
        method: &HandlerMethod,
        definition: BeanDefinition,
        template: InvokerTemplate,
    ) -> Result<BeanStrategy, RegistrationError> {
        match definition {
            BeanDefinition::Instance(bean) => {
                check_bean_type(method, &bean)?;
                Ok(BeanStrategy::singleton(bean, &template))
            }
            BeanDefinition::Container => {
                let owner = method.owner();
                let bean = self
                    .deployment
                    .resolve_value(owner.id())
                    .ok_or_else(|| RegistrationError::MissingBean {
                        method: method.signature(),
                        type_name: owner.name().to_string(),
                    })?;
                Ok(BeanStrategy::singleton(bean, &template))
            }
            BeanDefinition::Prototype(descriptor) => {
                let bean_type = descriptor.bean_type();
                if bean_type.id() != method.owner().id() {
                    return Err(RegistrationError::BeanTypeMismatch {
                        method: method.signature(),
                        expected: method.owner().name().to_string(),
                        actual: bean_type.name().to_string(),
                    });
                }
                let factory = BeanFactory::new(descriptor, self.resolvers.as_ref())?;
                Ok(BeanStrategy::Prototype {
                    factory: Arc::new(factory),
                    template,
                })
            }
            BeanDefinition::External => Ok(BeanStrategy::External { template }),
        }
    }
}

fn check_bean_type(method: &HandlerMethod, bean: &Bean) -> Result<(), RegistrationError> {
    let owner = method.owner();
    if bean.concrete_type_id() == owner.id() {
        Ok(())
    } else {
        Err(RegistrationError::BeanTypeMismatch {
            method: method.signature(),
            expected: owner.name().to_string(),
            actual: bean.type_name().to_string(),
        })
    }
}
