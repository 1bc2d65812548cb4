//! Delay: forwards measurements with a shifted timestamp.
//!
//! `delayTime` is in milliseconds and may be fractional or negative.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{Button, Payload, Pose, Position, Position2D, Rotation, NANOS_PER_MILLI};
use std::marker::PhantomData;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Delay<Rotation>>("DelayRotation");
    factory.register::<Delay<Position>>("DelayPosition");
    factory.register::<Delay<Position2D>>("DelayPosition2");
    factory.register::<Delay<Pose>>("DelayPose");
    factory.register::<Delay<Button>>("DelayButton");
}

pub struct Delay<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for Delay<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let delay_ms: f64 = config.attr_or("delayTime", 0.0)?;
        let delay_ns = (delay_ms * NANOS_PER_MILLI as f64) as i64;
        tracing::info!("Setting delay time {} ns", delay_ns);

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;
        core.push_consumer::<T, _>("Input", move |m| {
            output.send(m.retimed(m.time().offset_nanos(delay_ns)));
            Ok(())
        })?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Delay<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
