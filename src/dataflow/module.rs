//! Modules: one shared resource for a group of components.
//!
//! Components that share a physical resource (a UDP socket, a replay clock)
//! attach to one [`Module`] instance selected by a key taken from their
//! configuration. The [`ModuleRegistry`] keeps at most one live module per
//! key; attached components hold the module's [`ModuleHandle`], so the
//! module is dropped, and stopped, together with the last component.
//!
//! The module's background work starts when the first attached component
//! starts ([`ModuleHandle::ensure_started`]). Modules deliver events to
//! their components through a [`ComponentTable`], which holds weak
//! references so it never keeps a component alive.

use super::component::{BuildContext, Component};
use super::error::{DataflowError, DataflowResult};
use crate::config::SubgraphConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// A resource shared by all components with the same key.
pub trait Module: Send + Sync + Sized + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Key selecting the module instance for a component configuration.
    fn module_key(config: &SubgraphConfig) -> DataflowResult<Self::Key>;

    fn create(key: &Self::Key, config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self>;

    /// Build a component of `config.class` attached to `module`.
    fn create_component(
        module: &Arc<ModuleHandle<Self>>,
        config: &SubgraphConfig,
        ctx: &BuildContext,
    ) -> DataflowResult<Arc<dyn Component>>;

    /// Start background work; called once, by the first started component.
    fn start_module(&self) -> DataflowResult<()> {
        Ok(())
    }

    /// Stop background work; called when the module is dropped after a
    /// successful start.
    fn stop_module(&self) {}
}

/// Shared ownership of a module by its components.
pub struct ModuleHandle<M: Module> {
    key: M::Key,
    module: M,
    started: Mutex<bool>,
    span: tracing::Span,
}

impl<M: Module> ModuleHandle<M> {
    fn new(key: M::Key, module: M) -> Self {
        let span = tracing::info_span!("module", key = ?key);
        Self {
            key,
            module,
            started: Mutex::new(false),
            span,
        }
    }

    pub fn key(&self) -> &M::Key {
        &self.key
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn is_started(&self) -> bool {
        *self.started.lock()
    }

    /// Start the module unless it is already running.
    pub fn ensure_started(&self) -> DataflowResult<()> {
        let mut started = self.started.lock();
        if *started {
            return Ok(());
        }
        let _entered = self.span.enter();
        tracing::debug!("Starting module");
        self.module.start_module()?;
        *started = true;
        Ok(())
    }
}

impl<M: Module> Deref for ModuleHandle<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.module
    }
}

impl<M: Module> Drop for ModuleHandle<M> {
    fn drop(&mut self) {
        if *self.started.get_mut() {
            let _entered = self.span.enter();
            tracing::debug!("Stopping module");
            self.module.stop_module();
        }
    }
}

/// One live module per key.
pub struct ModuleRegistry<M: Module> {
    modules: Mutex<HashMap<M::Key, Weak<ModuleHandle<M>>>>,
}

impl<M: Module> Default for ModuleRegistry<M> {
    fn default() -> Self {
        Self {
            modules: Mutex::new(HashMap::new()),
        }
    }
}

impl<M: Module> ModuleRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live module for `config`'s key, created on first use.
    pub fn obtain(
        &self,
        config: &SubgraphConfig,
        ctx: &BuildContext,
    ) -> DataflowResult<Arc<ModuleHandle<M>>> {
        let key = M::module_key(config)?;
        let mut modules = self.modules.lock();
        if let Some(handle) = modules.get(&key).and_then(Weak::upgrade) {
            return Ok(handle);
        }
        modules.retain(|_, m| m.strong_count() > 0);

        let handle = Arc::new(ModuleHandle::new(key.clone(), M::create(&key, config, ctx)?));
        tracing::debug!("Created module {:?}", key);
        modules.insert(key, Arc::downgrade(&handle));
        Ok(handle)
    }

    /// Number of modules still referenced by components.
    pub fn live_modules(&self) -> usize {
        self.modules
            .lock()
            .values()
            .filter(|m| m.strong_count() > 0)
            .count()
    }
}

/// Components of one module, by component key.
pub struct ComponentTable<K, C: ?Sized> {
    entries: Mutex<HashMap<K, Weak<C>>>,
}

impl<K, C: ?Sized> Default for ComponentTable<K, C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, C> ComponentTable<K, C>
where
    K: Eq + Hash + Clone + Debug,
    C: ?Sized,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component; a key may be used by one live component only.
    pub fn register(&self, key: K, component: &Arc<C>) -> DataflowResult<()> {
        let mut entries = self.entries.lock();
        if entries.get(&key).is_some_and(|c| c.strong_count() > 0) {
            return Err(DataflowError::invalid_attribute(
                format!("{key:?}"),
                "key",
                "component key already in use by this module",
            ));
        }
        entries.insert(key, Arc::downgrade(component));
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<Arc<C>> {
        self.entries.lock().get(key).and_then(Weak::upgrade)
    }

    /// Forget `key` if its component is gone.
    pub fn release(&self, key: &K) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|c| c.strong_count() == 0) {
            entries.remove(key);
        }
    }

    /// Live components.
    pub fn snapshot(&self) -> Vec<(K, Arc<C>)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|(k, c)| c.upgrade().map(|c| (k.clone(), c)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|c| c.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
