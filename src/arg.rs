//! Type-erased values flowing between resolvers, beans and handlers.
//!
//! A parameter declared with type `T` is resolved to a [`Value`] wrapping an
//! `Arc<T>`. `None` in an [`Arg`] is the null-equivalent and is a legitimate
//! resolved value.

use crate::error::BoxError;
use crate::invoke::InvocationError;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A shared, type-erased value that remembers its concrete type name.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wraps an already-erased instance. The caller supplies the type name.
    pub fn from_boxed(value: Box<dyn Any + Send + Sync>, type_name: &'static str) -> Self {
        Self {
            inner: Arc::from(value),
            type_name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.inner.as_ref()
    }

    /// `TypeId` of the wrapped value (not of `Value` itself).
    pub fn concrete_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name)
            .finish()
    }
}

/// A resolved argument; `None` is the null-equivalent.
pub type Arg = Option<Value>;

/// Raw return value of a handler call.
pub type ReturnValue = Box<dyn Any + Send>;

/// Output of an asynchronous handler.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<Option<ReturnValue>, BoxError>> + Send + 'static>>;

/// Boxes a plain value as a handler return value.
pub fn ret<T: Any + Send>(value: T) -> Option<ReturnValue> {
    Some(Box::new(value))
}

/// Boxes a future as the return value of a concurrent handler.
pub fn ret_future<F>(future: F) -> Option<ReturnValue>
where
    F: Future<Output = Result<Option<ReturnValue>, BoxError>> + Send + 'static,
{
    let future: HandlerFuture = Box::pin(future);
    Some(Box::new(future))
}

/// Ordered arguments for one handler call.
#[derive(Clone, Debug, Default)]
pub struct Args {
    values: Vec<Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, arg: Arg) {
        self.values.push(arg);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.values.iter()
    }

    pub fn into_vec(self) -> Vec<Arg> {
        self.values
    }

    /// The argument at `index`, which must be present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, InvocationError> {
        match self.opt::<T>(index)? {
            Some(value) => Ok(value),
            None => Err(InvocationError::IllegalArgument(format!(
                "argument {index} is null, expected {}",
                std::any::type_name::<T>()
            ))),
        }
    }

    /// The argument at `index`, allowing null.
    pub fn opt<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>, InvocationError> {
        let slot = self.values.get(index).ok_or_else(|| {
            InvocationError::IllegalArgument(format!(
                "argument {index} out of range ({} resolved)",
                self.values.len()
            ))
        })?;
        match slot {
            None => Ok(None),
            Some(value) => value.downcast::<T>().map(Some).ok_or_else(|| {
                InvocationError::IllegalArgument(format!(
                    "argument {index} has type {}, expected {}",
                    value.type_name(),
                    std::any::type_name::<T>()
                ))
            }),
        }
    }

    pub fn cloned<T: Any + Send + Sync + Clone>(&self, index: usize) -> Result<T, InvocationError> {
        self.get::<T>(index).map(|arc| T::clone(&arc))
    }

    /// Comma separated resolved type names, `null` for absent values.
    pub fn type_dump(&self) -> String {
        self.values
            .iter()
            .map(|arg| arg.as_ref().map_or("null", Value::type_name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<Vec<Arg>> for Args {
    fn from(values: Vec<Arg>) -> Self {
        Self { values }
    }
}

/// Requires `arg` to be a non-null `T`, naming the injection target on failure.
pub fn required_arc<T: Any + Send + Sync>(arg: Arg, target: &str) -> Result<Arc<T>, BoxError> {
    let value = arg.ok_or_else(|| format!("'{target}' resolved to null"))?;
    value.downcast::<T>().ok_or_else(|| {
        format!(
            "'{target}' resolved to {}, expected {}",
            value.type_name(),
            std::any::type_name::<T>()
        )
        .into()
    })
}

/// Like [`required_arc`], cloning the value out of its `Arc`.
pub fn required_cloned<T: Any + Send + Sync + Clone>(arg: Arg, target: &str) -> Result<T, BoxError> {
    required_arc::<T>(arg, target).map(|arc| T::clone(&arc))
}

/// Like [`required_arc`], but a null argument is `None`.
pub fn optional_arc<T: Any + Send + Sync>(arg: Arg, target: &str) -> Result<Option<Arc<T>>, BoxError> {
    match arg {
        Some(value) => required_arc::<T>(Some(value), target).map(Some),
        None => Ok(None),
    }
}

pub fn optional_cloned<T: Any + Send + Sync + Clone>(arg: Arg, target: &str) -> Result<Option<T>, BoxError> {
    optional_arc::<T>(arg, target).map(|value| value.map(|arc| T::clone(&arc)))
}
