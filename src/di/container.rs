use crate::arg::Value;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },
}

/// Thread-safe deployment context holding shared beans.
///
/// Context resolvers look beans up by the `TypeId` of the declared parameter
/// type, so every entry is stored as a type-erased [`Value`].
#[derive(Clone, Default)]
pub struct Container {
    services: DashMap<TypeId, Value>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    pub fn register<T: 'static + Send + Sync>(&mut self, instance: T) -> &mut Self {
        self.register_arc(Arc::new(instance))
    }

    pub fn register_arc<T: 'static + Send + Sync>(&mut self, instance: Arc<T>) -> &mut Self {
        self.services
            .insert(TypeId::of::<T>(), Value::from_arc(instance));
        self
    }

    pub fn resolve<T: 'static + Send + Sync>(&self) -> Result<Arc<T>, ContainerError> {
        let entry = self.services.get(&TypeId::of::<T>()).ok_or_else(|| {
            ContainerError::DependencyNotFound {
                type_name: std::any::type_name::<T>().to_string(),
            }
        })?;
        entry
            .value()
            .downcast::<T>()
            .ok_or_else(|| ContainerError::DowncastFailed {
                type_name: std::any::type_name::<T>().to_string(),
            })
    }

    /// Type-erased lookup used by context resolvers.
    pub fn resolve_value(&self, type_id: TypeId) -> Option<Value> {
        self.services.get(&type_id).map(|entry| entry.value().clone())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.services.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.services.len())
            .finish()
    }
}
