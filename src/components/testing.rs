//! Wiring helpers for component unit tests.

use crate::config::SubgraphConfig;
use crate::dataflow::{
    BuildContext, Component, ComponentFactory, DataflowResult, EventQueue, PortOwner, PullConsumer,
    PullSupplier, PushConsumer, PushSupplier,
};
use crate::measurement::{Measurement, Payload, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) type Collected<T> = Arc<Mutex<Vec<Measurement<T>>>>;

/// Drives one component through test-side ports on an inline queue.
pub(crate) struct Harness {
    queue: Arc<EventQueue>,
    owner: PortOwner,
    factory: ComponentFactory,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            queue: EventQueue::inline(),
            owner: PortOwner::detached("harness"),
            factory: ComponentFactory::with_builtins(),
        }
    }

    pub fn ctx(&self) -> BuildContext {
        BuildContext::new(self.queue.clone())
    }

    /// Build a registered class.
    pub fn build(&self, config: &SubgraphConfig) -> DataflowResult<Arc<dyn Component>> {
        self.factory.create(config, &self.ctx())
    }

    /// Supplier feeding the component's push input `port`.
    pub fn feed<T: Payload>(&self, component: &dyn Component, port: &str) -> PushSupplier<T> {
        let supplier = PushSupplier::new(format!("to_{port}"), self.owner.clone(), self.queue.clone());
        let consumer: PushConsumer<T> = component.ports().typed(component.name(), port).unwrap();
        supplier.connect(&consumer).unwrap();
        supplier
    }

    /// Everything the component pushes on `port`.
    pub fn collect<T: Payload>(&self, component: &dyn Component, port: &str) -> Collected<T> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let consumer = PushConsumer::new(format!("from_{port}"), self.owner.clone(), move |m| {
            s.lock().push(m);
            Ok(())
        });
        let supplier: PushSupplier<T> = component.ports().typed(component.name(), port).unwrap();
        supplier.connect(&consumer).unwrap();
        seen
    }

    /// Answer the component's pull input `port` with `handler`.
    pub fn answer<T, F>(&self, component: &dyn Component, port: &str, handler: F)
    where
        T: Payload,
        F: Fn(Timestamp) -> DataflowResult<Measurement<T>> + Send + Sync + 'static,
    {
        let supplier = PullSupplier::new(format!("for_{port}"), self.owner.clone(), handler);
        let consumer: PullConsumer<T> = component.ports().typed(component.name(), port).unwrap();
        consumer.connect(&supplier).unwrap();
    }

    /// The component's pull output `port`.
    pub fn pull<T: Payload>(&self, component: &dyn Component, port: &str) -> PullSupplier<T> {
        component.ports().typed(component.name(), port).unwrap()
    }
}

pub(crate) fn at<T>(ms: u64, value: T) -> Measurement<T> {
    Measurement::new(Timestamp::from_millis(ms), value)
}

pub(crate) fn values<T: Clone>(seen: &Collected<T>) -> Vec<T> {
    seen.lock().iter().map(|m| m.value().unwrap().clone()).collect()
}
