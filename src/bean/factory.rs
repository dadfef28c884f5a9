use super::{Bean, BeanDescriptor};
use super::descriptor::{ConstructFn, Instance, InjectFn, SetterFn};
use crate::arg::Value;
use crate::context::RequestContext;
use crate::di::Container;
use crate::error::{RegistrationError, WebError};
use crate::method::TypeDescriptor;
use crate::resolve::{ArgumentsResolver, NoFixedArgs, ResolverFactory};

struct BoundField {
    name: String,
    arguments: ArgumentsResolver,
    inject: InjectFn,
}

struct BoundSetter {
    name: String,
    arguments: ArgumentsResolver,
    invoke: SetterFn,
}

/// Instantiates prototype beans: constructor, then fields, then setters.
///
/// All resolvers are bound at registration; every failure surfaces as a bad
/// request naming the element that failed.
pub struct BeanFactory {
    ty: TypeDescriptor,
    signature: String,
    constructor: ArgumentsResolver,
    construct: ConstructFn,
    fields: Vec<BoundField>,
    setters: Vec<BoundSetter>,
}

impl BeanFactory {
    pub fn new(descriptor: BeanDescriptor, resolvers: &dyn ResolverFactory) -> Result<Self, RegistrationError> {
        let ty = descriptor.bean_type();
        let signature = descriptor.constructor_signature();
        let Some(constructor) = descriptor.constructor else {
            return Err(RegistrationError::Invalid(format!(
                "prototype bean {ty} declares no constructor"
            )));
        };

        let fields = descriptor
            .fields
            .into_iter()
            .map(|field| {
                let name = field.param.name().to_string();
                let arguments = ArgumentsResolver::bind(
                    format!("field '{name}' of {}", ty.simple_name()),
                    std::slice::from_ref(&field.param),
                    resolvers,
                )?;
                Ok(BoundField {
                    name,
                    arguments,
                    inject: field.inject,
                })
            })
            .collect::<Result<Vec<_>, RegistrationError>>()?;

        let setters = descriptor
            .setters
            .into_iter()
            .map(|setter| {
                let arguments = ArgumentsResolver::bind(
                    format!("setter {}::{}", ty.simple_name(), setter.name),
                    &setter.params,
                    resolvers,
                )?;
                Ok(BoundSetter {
                    name: setter.name,
                    arguments,
                    invoke: setter.invoke,
                })
            })
            .collect::<Result<Vec<_>, RegistrationError>>()?;

        Ok(Self {
            ty,
            constructor: ArgumentsResolver::bind(signature.clone(), &constructor.params, resolvers)?,
            signature,
            construct: constructor.construct,
            fields,
            setters,
        })
    }

    pub fn bean_type(&self) -> TypeDescriptor {
        self.ty
    }

    pub async fn instantiate(&self, ctx: &mut RequestContext, deployment: &Container) -> Result<Bean, WebError> {
        let mut instance = self.construct(ctx, deployment).await?;

        for field in &self.fields {
            let arg = field
                .arguments
                .resolve(ctx, deployment, &NoFixedArgs)
                .await
                .map_err(|e| self.failed(format!("cannot resolve field '{}'", field.name), e))?
                .into_vec()
                .pop()
                .flatten();
            (field.inject)(instance.as_mut(), arg)
                .map_err(|e| self.failed(format!("cannot inject field '{}'", field.name), e))?;
        }

        for setter in &self.setters {
            let args = setter
                .arguments
                .resolve(ctx, deployment, &NoFixedArgs)
                .await
                .map_err(|e| self.failed(format!("cannot resolve parameters of setter '{}'", setter.name), e))?;
            (setter.invoke)(instance.as_mut(), args)
                .map_err(|e| self.failed(format!("setter '{}' failed", setter.name), e))?;
        }

        tracing::trace!(bean = %self.ty, "prototype bean instantiated");
        Ok(Value::from_boxed(instance, self.ty.name()))
    }

    async fn construct(&self, ctx: &mut RequestContext, deployment: &Container) -> Result<Instance, WebError> {
        let args = self
            .constructor
            .resolve(ctx, deployment, &NoFixedArgs)
            .await
            .map_err(|e| self.failed(format!("cannot resolve constructor {}", self.signature), e))?;
        (self.construct)(args).map_err(|e| self.failed(format!("constructor {} failed", self.signature), e))
    }

    fn failed(&self, what: String, cause: impl Into<crate::error::BoxError>) -> WebError {
        WebError::bad_request_caused(format!("Cannot instantiate {}: {what}", self.ty.simple_name()), cause)
    }
}
