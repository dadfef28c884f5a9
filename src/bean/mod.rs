//! Bean scopes and the strategies that obtain a handler's bean per request.
//!
//! The strategy for a route is chosen once at registration:
//!
//! - **Singleton**: the bean and its invoker chain are built once and reused.
//! - **Prototype**: a fresh bean per request (constructor, fields, setters),
//!   wrapped in a fresh invoker chain.
//! - **External**: the caller supplies the bean (exception handlers, located
//!   sub-resources).

mod descriptor;
mod factory;

pub use descriptor::{BeanDescriptor, BeanDescriptorBuilder};
pub use factory::BeanFactory;

use crate::arg::Value;
use crate::context::RequestContext;
use crate::di::Container;
use crate::error::WebError;
use crate::invoke::{HandlerInvoker, InvokerTemplate};
use std::any::Any;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// A controller instance.
pub type Bean = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BeanScope {
    #[default]
    Singleton,
    Prototype,
    External,
}

/// Types that can be instantiated per request.
///
/// Usually derived with `#[derive(Prototype)]`.
pub trait Prototype: Any + Send + Sync + Sized {
    fn descriptor() -> BeanDescriptor;
}

/// How a route obtains its bean, as declared at registration.
#[derive(Clone)]
pub enum BeanDefinition {
    /// A pre-built singleton instance.
    Instance(Bean),
    /// A singleton looked up in the deployment container by the method's owner type.
    Container,
    Prototype(BeanDescriptor),
    External,
}

impl BeanDefinition {
    pub fn instance<B: Any + Send + Sync>(bean: B) -> Self {
        Self::Instance(Value::new(bean))
    }

    pub fn prototype<B: Prototype>() -> Self {
        Self::Prototype(B::descriptor())
    }

    pub fn scope(&self) -> BeanScope {
        match self {
            BeanDefinition::Instance(_) | BeanDefinition::Container => BeanScope::Singleton,
            BeanDefinition::Prototype(_) => BeanScope::Prototype,
            BeanDefinition::External => BeanScope::External,
        }
    }
}

/// Per-route bean resolution, fixed at registration.
#[derive(Clone)]
pub enum BeanStrategy {
    Singleton {
        invoker: Arc<dyn HandlerInvoker>,
    },
    Prototype {
        factory: Arc<BeanFactory>,
        template: InvokerTemplate,
    },
    External {
        template: InvokerTemplate,
    },
}

impl BeanStrategy {
    pub fn singleton(bean: Bean, template: &InvokerTemplate) -> Self {
        Self::Singleton {
            invoker: template.bind(bean),
        }
    }

    pub fn scope(&self) -> BeanScope {
        match self {
            BeanStrategy::Singleton { .. } => BeanScope::Singleton,
            BeanStrategy::Prototype { .. } => BeanScope::Prototype,
            BeanStrategy::External { .. } => BeanScope::External,
        }
    }

    /// The invoker to run this request's handler with. `supplied` is only
    /// consulted by the external strategy.
    pub async fn invoker(
        &self,
        ctx: &mut RequestContext,
        deployment: &Container,
        supplied: Option<Bean>,
    ) -> Result<Arc<dyn HandlerInvoker>, WebError> {
        match self {
            BeanStrategy::Singleton { invoker } => Ok(Arc::clone(invoker)),
            BeanStrategy::Prototype { factory, template } => {
                let bean = factory.instantiate(ctx, deployment).await?;
                Ok(template.bind(bean))
            }
            BeanStrategy::External { template } => match supplied {
                Some(bean) => Ok(template.bind(bean)),
                None => Err(WebError::illegal_state(format!(
                    "no bean supplied for externally scoped handler {}",
                    template.method()
                ))),
            },
        }
    }
}
