//! Collector: appends a pulled measurement to a pulled list.
//!
//! On a pull of `Output` at `t`, `List` and `Input` are both pulled at `t`
//! and the input's payload is appended to the list. Neither failure aborts
//! the request: a missing list starts from an empty one and a missing input
//! leaves the list unchanged, each with a warning.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{Distance, Measurement, Payload, Pose, Position, Position2D};
use std::marker::PhantomData;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Collector<Pose>>("PoseCollector");
    factory.register::<Collector<Position>>("PositionCollector");
    factory.register::<Collector<Position2D>>("PositionCollector2D");
    factory.register::<Collector<Distance>>("DistanceCollector");
}

pub struct Collector<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for Collector<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let mut core = ComponentCore::new(config, ctx);
        let input = core.pull_consumer::<T>("Input")?;
        let list = core.pull_consumer::<Vec<T>>("List")?;
        core.pull_supplier::<Vec<T>, _>("Output", move |t| {
            let mut items = match list.get(t).and_then(|m| m.value().cloned()) {
                Ok(items) => items,
                Err(err) => {
                    tracing::warn!(category = %err.category(), "List unavailable: {}", err);
                    Vec::new()
                }
            };
            match input.get(t).and_then(|m| m.value().cloned()) {
                Ok(item) => items.push(item),
                Err(err) => tracing::warn!(category = %err.category(), "Input unavailable: {}", err),
            }
            Ok(Measurement::new(t, items))
        })?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Collector<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
