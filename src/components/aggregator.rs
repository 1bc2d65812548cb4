//! Fan-in components accepting any number of input edges.
//!
//! Both create one push input per configured input edge, whatever its name.
//! The aggregator forwards every input unchanged; the accumulator keeps the
//! last `maxLength` values (default 100) and pushes the whole list with the
//! newest event's time.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{Measurement, Payload, Pose, Position, Position2D, Rotation};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Aggregator<Pose>>("PoseAggregator");
    factory.register::<Aggregator<Rotation>>("RotationAggregator");
    factory.register::<Aggregator<Position>>("PositionAggregator");

    factory.register::<Accumulator<Position>>("PositionAccumulator");
    factory.register::<Accumulator<Position2D>>("Position2DAccumulator");
    factory.register::<Accumulator<Pose>>("PoseAccumulator");
}

fn input_names(config: &SubgraphConfig) -> Vec<String> {
    config.inputs().map(|e| e.name.clone()).collect()
}

pub struct Aggregator<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for Aggregator<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;
        for name in input_names(config) {
            let out = output.clone();
            core.push_consumer::<T, _>(&name, move |m| {
                out.send(m);
                Ok(())
            })?;
        }
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Aggregator<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

pub struct Accumulator<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for Accumulator<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let max_length: usize = config.attr_or("maxLength", 100)?;
        let data: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<Vec<T>>("Output")?;
        for name in input_names(config) {
            let out = output.clone();
            let data = data.clone();
            core.push_consumer::<T, _>(&name, move |m| {
                let list: Vec<T> = {
                    let mut data = data.lock();
                    data.push_back(m.value()?.clone());
                    while data.len() > max_length {
                        data.pop_front();
                    }
                    data.iter().cloned().collect()
                };
                out.send(Measurement::new(m.time(), list));
                Ok(())
            })?;
        }
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Accumulator<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
