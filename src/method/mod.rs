//! Immutable descriptors of handler methods and their parameters.
//!
//! A [`HandlerMethod`] is built once at route registration and shared
//! read-only by every request matched to that route.

mod parameter;

pub use parameter::{Decoder, MethodParameter, ParamSource};

use crate::arg::{Args, ReturnValue};
use crate::bean::Bean;
use crate::invoke::{HandlerFn, InvocationError};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Runtime identity and display name of a declared type
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: ?Sized + Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The unqualified type name (`UserController` for `app::users::UserController`).
    pub fn simple_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }

    pub fn is<T: ?Sized + Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A parameter descriptor paired with the resolver bound to it at
/// registration time. `None` means the value must come from a fixed path.
#[derive(Clone, Debug)]
pub struct ResolvableParam<P, R> {
    pub param: P,
    pub resolver: Option<R>,
}

impl<P, R> ResolvableParam<P, R> {
    pub fn new(param: P, resolver: Option<R>) -> Self {
        Self { param, resolver }
    }

    pub fn is_bound(&self) -> bool {
        self.resolver.is_some()
    }
}

/// Descriptor of a target method: owning type, parameters, return
/// convention, annotations and the erased function that calls it.
pub struct HandlerMethod {
    owner: TypeDescriptor,
    name: String,
    parameters: Vec<MethodParameter>,
    return_type: TypeDescriptor,
    concurrent: bool,
    annotations: HashMap<String, String>,
    function: HandlerFn,
}

impl HandlerMethod {
    /// Starts a method descriptor whose function receives the bean as `&B`.
    pub fn builder<B: Any + Send + Sync>(name: impl Into<String>) -> HandlerMethodBuilder<B> {
        HandlerMethodBuilder {
            name: name.into(),
            parameters: Vec::new(),
            return_type: TypeDescriptor::of::<()>(),
            concurrent: false,
            annotations: HashMap::new(),
            function: None,
            _bean: PhantomData,
        }
    }

    pub fn owner(&self) -> TypeDescriptor {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[MethodParameter] {
        &self.parameters
    }

    pub fn parameter(&self, index: usize) -> Option<&MethodParameter> {
        self.parameters.get(index)
    }

    pub fn return_type(&self) -> TypeDescriptor {
        self.return_type
    }

    /// Whether the method follows the asynchronous return convention.
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations.get(name).map(String::as_str)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.contains_key(name)
    }

    pub fn function(&self) -> &HandlerFn {
        &self.function
    }

    pub fn invoke(&self, bean: &Bean, args: Args) -> Result<Option<ReturnValue>, InvocationError> {
        (self.function)(bean, args)
    }

    /// `Owner::method(T0, T1, ...)`, used in diagnostics.
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.type_descriptor().simple_name())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}::{}({})", self.owner.simple_name(), self.name, params)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("signature", &self.signature())
            .field("return_type", &self.return_type)
            .field("concurrent", &self.concurrent)
            .finish()
    }
}

impl fmt::Display for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

pub struct HandlerMethodBuilder<B> {
    name: String,
    parameters: Vec<MethodParameter>,
    return_type: TypeDescriptor,
    concurrent: bool,
    annotations: HashMap<String, String>,
    function: Option<HandlerFn>,
    _bean: PhantomData<fn(&B)>,
}

impl<B: Any + Send + Sync> HandlerMethodBuilder<B> {
    /// Appends the next declared parameter. Indices follow declaration order.
    pub fn param(mut self, parameter: MethodParameter) -> Self {
        let index = self.parameters.len();
        self.parameters.push(parameter.at(index));
        self
    }

    pub fn returns<T: ?Sized + Any>(mut self) -> Self {
        self.return_type = TypeDescriptor::of::<T>();
        self
    }

    /// Marks the method as returning a future (see [`crate::arg::ret_future`]).
    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    pub fn annotate(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&B, Args) -> Result<Option<ReturnValue>, InvocationError> + Send + Sync + 'static,
    {
        let function: HandlerFn = Arc::new(move |bean: &Bean, args: Args| {
            let target = bean.downcast_ref::<B>().ok_or_else(|| {
                InvocationError::IllegalArgument(format!(
                    "bean of type {} is not an instance of {}",
                    bean.type_name(),
                    std::any::type_name::<B>()
                ))
            })?;
            f(target, args)
        });
        self.function = Some(function);
        self
    }

    pub fn build(self) -> HandlerMethod {
        let name = self.name;
        let function = self.function.unwrap_or_else(|| {
            let method = name.clone();
            Arc::new(move |_: &Bean, _: Args| {
                Err(InvocationError::IllegalArgument(format!(
                    "handler method '{method}' has no body"
                )))
            })
        });
        HandlerMethod {
            owner: TypeDescriptor::of::<B>(),
            name,
            parameters: self.parameters,
            return_type: self.return_type,
            concurrent: self.concurrent,
            annotations: self.annotations,
            function,
        }
    }
}
