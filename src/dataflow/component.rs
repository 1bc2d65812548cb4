//! Component abstraction.
//!
//! A component is a named node owning its ports. Concrete components embed a
//! [`ComponentCore`], create their ports through it at construction time and
//! implement [`Component`] to expose the core plus optional start/stop
//! hooks.
//!
//! Port callbacks usually capture an `Arc` of the component's mutable state
//! and clones of its output ports, so components never need a reference to
//! themselves.

use super::error::{DataflowError, DataflowResult};
use super::port::{Port, PortDescriptor, PortOwner, PullConsumer, PullSupplier, PushConsumer, PushSupplier};
use super::scheduler::EventQueue;
use crate::config::SubgraphConfig;
use crate::measurement::{Measurement, Payload, Timestamp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared services handed to component constructors.
#[derive(Clone)]
pub struct BuildContext {
    queue: Arc<EventQueue>,
}

impl BuildContext {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Context with its own inline queue, for components built outside a
    /// network.
    pub fn standalone() -> Self {
        Self::new(EventQueue::inline())
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

/// Ports owned by one component, in creation order.
#[derive(Default)]
pub struct PortSet {
    ports: Vec<Arc<dyn Port>>,
}

impl PortSet {
    fn insert(&mut self, port: Arc<dyn Port>) -> DataflowResult<()> {
        if self.get(&port.descriptor().name).is_some() {
            return Err(DataflowError::AlreadyConnected(format!(
                "{} declared twice",
                port.full_name()
            )));
        }
        self.ports.push(port);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Port>> {
        self.ports.iter().find(|p| p.descriptor().name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Port>> {
        self.ports.iter()
    }

    pub fn descriptors(&self) -> Vec<PortDescriptor> {
        self.ports.iter().map(|p| p.descriptor().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Typed handle of a port, e.g. `ports.typed::<PushSupplier<Pose>>("Output")`.
    pub fn typed<P: Clone + 'static>(&self, owner: &str, name: &str) -> DataflowResult<P> {
        let port = self.get(name).ok_or_else(|| DataflowError::NoSuchPort {
            component: owner.to_string(),
            port: name.to_string(),
        })?;
        port.as_any()
            .downcast_ref::<P>()
            .cloned()
            .ok_or_else(|| DataflowError::TypeMismatch {
                port: port.full_name(),
                expected: std::any::type_name::<P>().to_string(),
                found: format!("{} {}", port.descriptor().kind, port.descriptor().type_tag),
            })
    }

    pub fn disconnect_all(&self) {
        for port in &self.ports {
            port.disconnect();
        }
    }
}

/// State shared by every component: name, logging span, ports, run flag.
pub struct ComponentCore {
    owner: PortOwner,
    class: String,
    ports: PortSet,
    queue: Arc<EventQueue>,
    running: AtomicBool,
}

impl ComponentCore {
    pub fn new(config: &SubgraphConfig, ctx: &BuildContext) -> Self {
        let span = tracing::info_span!("component", name = %config.id, class = %config.class);
        Self {
            owner: PortOwner::new(config.id.as_str(), span),
            class: config.class.clone(),
            ports: PortSet::default(),
            queue: ctx.queue().clone(),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.owner.name()
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Logging context; events inside it carry the component name.
    pub fn span(&self) -> &tracing::Span {
        self.owner.span()
    }

    pub fn owner(&self) -> &PortOwner {
        &self.owner
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Set the run flag; returns whether it changed.
    fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel) != running
    }

    pub fn push_supplier<T: Payload>(&mut self, name: &str) -> DataflowResult<PushSupplier<T>> {
        let port = PushSupplier::new(name, self.owner.clone(), self.queue.clone());
        self.ports.insert(Arc::new(port.clone()))?;
        Ok(port)
    }

    pub fn push_consumer<T, F>(&mut self, name: &str, handler: F) -> DataflowResult<PushConsumer<T>>
    where
        T: Payload,
        F: Fn(Measurement<T>) -> DataflowResult<()> + Send + Sync + 'static,
    {
        let port = PushConsumer::new(name, self.owner.clone(), handler);
        self.ports.insert(Arc::new(port.clone()))?;
        Ok(port)
    }

    pub fn pull_supplier<T, F>(&mut self, name: &str, handler: F) -> DataflowResult<PullSupplier<T>>
    where
        T: Payload,
        F: Fn(Timestamp) -> DataflowResult<Measurement<T>> + Send + Sync + 'static,
    {
        let port = PullSupplier::new(name, self.owner.clone(), handler);
        self.ports.insert(Arc::new(port.clone()))?;
        Ok(port)
    }

    pub fn pull_consumer<T: Payload>(&mut self, name: &str) -> DataflowResult<PullConsumer<T>> {
        let port = PullConsumer::new(name, self.owner.clone());
        self.ports.insert(Arc::new(port.clone()))?;
        Ok(port)
    }
}

/// A node of the dataflow graph.
pub trait Component: Send + Sync {
    fn core(&self) -> &ComponentCore;

    /// Called once when the component starts; source components spawn
    /// their threads here.
    fn on_start(&self) -> DataflowResult<()> {
        Ok(())
    }

    /// Called once when the component stops; must join owned threads.
    fn on_stop(&self) {}

    fn name(&self) -> &str {
        self.core().name()
    }

    fn ports(&self) -> &PortSet {
        self.core().ports()
    }

    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    /// Start the component. Starting a running component does nothing.
    fn start(&self) -> DataflowResult<()> {
        if !self.core().set_running(true) {
            return Ok(());
        }
        let _entered = self.core().span().enter();
        tracing::debug!("Starting");
        self.on_start().inspect_err(|_| {
            self.core().set_running(false);
        })
    }

    /// Stop the component. Safe to call repeatedly.
    fn stop(&self) {
        if !self.core().set_running(false) {
            return;
        }
        let _entered = self.core().span().enter();
        tracing::debug!("Stopping");
        self.on_stop();
    }
}

/// Construction from a subgraph configuration, used by the factory.
pub trait Construct: Sized {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self>;
}
