use crate::di::Container;
use std::sync::Arc;

/// Builder for the deployment context
///
/// Register shared beans before freezing the container behind an `Arc` for
/// the route registry.
///
/// # Example
/// ```
/// use meshdispatch::di::ContainerBuilder;
///
/// struct Database;
///
/// let container = ContainerBuilder::new()
///     .register(Database)
///     .build();
/// assert!(container.contains::<Database>());
/// ```
pub struct ContainerBuilder {
    container: Container,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
        }
    }

    /// Register a service instance
    pub fn register<T: 'static + Send + Sync>(mut self, instance: T) -> Self {
        self.container.register(instance);
        self
    }

    /// Register an already shared instance
    pub fn register_arc<T: 'static + Send + Sync>(mut self, instance: Arc<T>) -> Self {
        self.container.register_arc(instance);
        self
    }

    pub fn build(self) -> Container {
        self.container
    }

    pub fn build_shared(self) -> Arc<Container> {
        Arc::new(self.container)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
