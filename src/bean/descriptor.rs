use crate::arg::{Arg, Args};
use crate::error::BoxError;
use crate::method::{MethodParameter, TypeDescriptor};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type Instance = Box<dyn Any + Send + Sync>;

type Target = dyn Any + Send + Sync + 'static;

pub(crate) type ConstructFn = Arc<dyn Fn(Args) -> Result<Instance, BoxError> + Send + Sync>;
pub(crate) type InjectFn = Arc<dyn Fn(&mut Target, Arg) -> Result<(), BoxError> + Send + Sync>;
pub(crate) type SetterFn = Arc<dyn Fn(&mut Target, Args) -> Result<(), BoxError> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Constructor {
    pub(crate) params: Vec<MethodParameter>,
    pub(crate) construct: ConstructFn,
}

#[derive(Clone)]
pub(crate) struct FieldInjection {
    pub(crate) param: MethodParameter,
    pub(crate) inject: InjectFn,
}

#[derive(Clone)]
pub(crate) struct SetterInjection {
    pub(crate) name: String,
    pub(crate) params: Vec<MethodParameter>,
    pub(crate) invoke: SetterFn,
}

/// How to build a prototype bean: a constructor, then field injection
/// points, then setters, each resolved with the route's resolvers.
#[derive(Clone)]
pub struct BeanDescriptor {
    ty: TypeDescriptor,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) fields: Vec<FieldInjection>,
    pub(crate) setters: Vec<SetterInjection>,
}

impl BeanDescriptor {
    pub fn builder<B: Any + Send + Sync>() -> BeanDescriptorBuilder<B> {
        BeanDescriptorBuilder {
            descriptor: BeanDescriptor {
                ty: TypeDescriptor::of::<B>(),
                constructor: None,
                fields: Vec::new(),
                setters: Vec::new(),
            },
            _bean: PhantomData,
        }
    }

    pub fn bean_type(&self) -> TypeDescriptor {
        self.ty
    }

    /// `Type::new(A, B)`.
    pub fn constructor_signature(&self) -> String {
        let params = self
            .constructor
            .as_ref()
            .map(|c| {
                c.params
                    .iter()
                    .map(|p| p.type_descriptor().simple_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        format!("{}::new({params})", self.ty.simple_name())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.param.name())
    }

    pub fn setter_names(&self) -> impl Iterator<Item = &str> {
        self.setters.iter().map(|s| s.name.as_str())
    }
}

fn index_params(params: Vec<MethodParameter>) -> Vec<MethodParameter> {
    params
        .into_iter()
        .enumerate()
        .map(|(i, p)| p.at(i))
        .collect()
}

fn target_mut<B: Any>(bean: &mut Target) -> Result<&mut B, BoxError> {
    bean.downcast_mut::<B>()
        .ok_or_else(|| format!("instance is not a {}", std::any::type_name::<B>()).into())
}

pub struct BeanDescriptorBuilder<B> {
    descriptor: BeanDescriptor,
    _bean: PhantomData<fn() -> B>,
}

impl<B: Any + Send + Sync> BeanDescriptorBuilder<B> {
    pub fn constructor<F>(mut self, params: Vec<MethodParameter>, construct: F) -> Self
    where
        F: Fn(Args) -> Result<B, BoxError> + Send + Sync + 'static,
    {
        self.descriptor.constructor = Some(Constructor {
            params: index_params(params),
            construct: Arc::new(move |args: Args| construct(args).map(|bean| Box::new(bean) as Instance)),
        });
        self
    }

    /// A field injected after construction. `param` names the field.
    pub fn field<F>(mut self, param: MethodParameter, inject: F) -> Self
    where
        F: Fn(&mut B, Arg) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.descriptor.fields.push(FieldInjection {
            param,
            inject: Arc::new(move |bean: &mut Target, arg: Arg| inject(target_mut::<B>(bean)?, arg)),
        });
        self
    }

    /// A setter called after field injection, in registration order.
    pub fn setter<F>(mut self, name: impl Into<String>, params: Vec<MethodParameter>, invoke: F) -> Self
    where
        F: Fn(&mut B, Args) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.descriptor.setters.push(SetterInjection {
            name: name.into(),
            params: index_params(params),
            invoke: Arc::new(move |bean: &mut Target, args: Args| invoke(target_mut::<B>(bean)?, args)),
        });
        self
    }

    pub fn build(self) -> BeanDescriptor {
        self.descriptor
    }
}

impl<B: Any + Send + Sync + Default> BeanDescriptorBuilder<B> {
    /// Uses `B::default()` as a parameterless constructor.
    pub fn default_constructor(self) -> Self {
        self.constructor(Vec::new(), |_| Ok(B::default()))
    }
}
