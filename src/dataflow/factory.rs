//! String-keyed component construction.

use super::component::{BuildContext, Component, Construct};
use super::error::{DataflowError, DataflowResult};
use super::module::{Module, ModuleRegistry};
use crate::config::SubgraphConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Constructor registered for one class name.
pub type Constructor =
    Arc<dyn Fn(&SubgraphConfig, &BuildContext) -> DataflowResult<Arc<dyn Component>> + Send + Sync>;

/// Maps class names to constructors.
///
/// Module registries are owned by the factory, so two factories never
/// share a module instance.
#[derive(Default)]
pub struct ComponentFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in component and I/O adapter registered.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        crate::components::register_all(&mut factory);
        crate::io::register_all(&mut factory);
        factory
    }

    /// Register a class implemented by `C`.
    pub fn register<C>(&mut self, class: &str)
    where
        C: Construct + Component + 'static,
    {
        self.register_fn(class, |config, ctx| {
            Ok(Arc::new(C::construct(config, ctx)?) as Arc<dyn Component>)
        });
    }

    /// Register a class with an explicit constructor. Registering a name
    /// twice replaces the earlier constructor.
    pub fn register_fn<F>(&mut self, class: &str, constructor: F)
    where
        F: Fn(&SubgraphConfig, &BuildContext) -> DataflowResult<Arc<dyn Component>>
            + Send
            + Sync
            + 'static,
    {
        if self
            .constructors
            .insert(class.to_string(), Arc::new(constructor))
            .is_some()
        {
            tracing::warn!("Component class {} registered twice", class);
        }
    }

    /// Register `classes` as components of module `M`. All of them share
    /// one registry, so components of different classes with the same
    /// module key attach to the same module.
    pub fn register_module<M: Module>(&mut self, classes: &[&str]) {
        let registry = Arc::new(ModuleRegistry::<M>::new());
        for class in classes {
            let registry = registry.clone();
            self.register_fn(class, move |config, ctx| {
                let module = registry.obtain(config, ctx)?;
                M::create_component(&module, config, ctx)
            });
        }
    }

    pub fn contains(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn create(&self, config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Arc<dyn Component>> {
        let constructor = self
            .constructors
            .get(&config.class)
            .ok_or_else(|| DataflowError::UnknownComponentType(config.class.clone()))?;
        constructor(config, ctx)
    }
}
