//! Stepping through a pulled list one element at a time.
//!
//! [`ListExtractor`] returns the next element of `Coordinates` on every pull
//! of `NextCoordinate`, wrapping around at the end. [`ListGate`] pushes the
//! current element on `Coordinate` for each matching `ButtonEvent` and then
//! advances; its `NextCoordinate` pull output peeks at the current element
//! without advancing.

use super::ButtonFilter;
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError, DataflowResult};
use crate::measurement::{Button, Measurement, Payload, Pose, Position, Position2D};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<ListExtractor<Position>>("3DPointCloudExtractor");
    factory.register::<ListExtractor<Position2D>>("2DPointCloudExtractor");
    factory.register::<ListExtractor<Pose>>("PoseCloudExtractor");

    factory.register::<ListGate<Position>>("3DPointCloudGate");
    factory.register::<ListGate<Position2D>>("2DPointCloudGate");
    factory.register::<ListGate<Pose>>("PoseCloudGate");
}

fn element<T: Clone>(list: &[T], index: usize) -> DataflowResult<T> {
    list.get(index).cloned().ok_or_else(|| {
        DataflowError::NoData(format!("no element {} in a list of {}", index, list.len()))
    })
}

pub struct ListExtractor<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for ListExtractor<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let mut core = ComponentCore::new(config, ctx);
        let list = core.pull_consumer::<Vec<T>>("Coordinates")?;
        let counter = Mutex::new(0usize);
        core.pull_supplier::<T, _>("NextCoordinate", move |t| {
            let list = list.get(t)?;
            let items = list.value()?;
            let mut counter = counter.lock();
            if *counter >= items.len() {
                *counter = 0;
            }
            tracing::debug!("Current counter: {}, wrap around at: {}", *counter, items.len());
            let item = element(items, *counter)?;
            *counter += 1;
            Ok(Measurement::new(t, item))
        })?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for ListExtractor<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

pub struct ListGate<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for ListGate<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let filter = ButtonFilter::from_config(config, "event", ' ');
        let index = Arc::new(Mutex::new(0usize));

        let mut core = ComponentCore::new(config, ctx);
        let list = core.pull_consumer::<Vec<T>>("Coordinates")?;
        let output = core.push_supplier::<T>("Coordinate")?;

        let gate_list = list.clone();
        let gate_index = index.clone();
        core.push_consumer::<Button, _>("ButtonEvent", move |button| {
            if !filter.matches(*button.value()?) {
                return Ok(());
            }
            let list = gate_list.get(button.time())?;
            let items = list.value()?;
            let item = {
                let mut index = gate_index.lock();
                let item = element(items, *index)?;
                *index += 1;
                if *index >= items.len() {
                    tracing::debug!("List gate wrapping around");
                    *index = 0;
                }
                item
            };
            output.send(Measurement::new(button.time(), item));
            Ok(())
        })?;

        core.pull_supplier::<T, _>("NextCoordinate", move |t| {
            let list = list.get(t)?;
            let index = *index.lock();
            match list.value()?.get(index) {
                Some(item) => Ok(Measurement::new(t, item.clone())),
                None => Ok(Measurement::invalid(t)),
            }
        })?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for ListGate<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
