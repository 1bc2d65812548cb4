//! ButtonTrigger: pulls its input whenever a matching button event arrives.
//!
//! `event` selects the button (first character, default space); an empty
//! value reacts to every button. The pulled measurement is requested for
//! the button event's time and pushed on `Output`.

use super::ButtonFilter;
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{
    Button, Distance, Matrix3x3, Matrix3x4f, Matrix4x4, Payload, Pose, Position, Position2D, Rotation,
};
use std::marker::PhantomData;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<ButtonTrigger<Rotation>>("ButtonTriggerRotation");
    factory.register::<ButtonTrigger<Position>>("ButtonTriggerPosition");
    factory.register::<ButtonTrigger<Position2D>>("ButtonTriggerPosition2");
    factory.register::<ButtonTrigger<Distance>>("ButtonTriggerDistance");
    factory.register::<ButtonTrigger<Pose>>("ButtonTriggerPose");
    factory.register::<ButtonTrigger<Vec<Position>>>("ButtonTriggerPositionList");
    factory.register::<ButtonTrigger<Vec<Position2D>>>("ButtonTriggerPositionList2");
    factory.register::<ButtonTrigger<Vec<Distance>>>("ButtonTriggerDistanceList");
    factory.register::<ButtonTrigger<Vec<Pose>>>("ButtonTriggerPoseList");
    factory.register::<ButtonTrigger<Matrix3x3>>("ButtonTriggerMatrix3x3");
    factory.register::<ButtonTrigger<Matrix3x4f>>("ButtonTriggerMatrix3x4");
    factory.register::<ButtonTrigger<Matrix4x4>>("ButtonTriggerMatrix4x4");
}

pub struct ButtonTrigger<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for ButtonTrigger<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let filter = ButtonFilter::from_config(config, "event", ' ');
        let mut core = ComponentCore::new(config, ctx);
        let input = core.pull_consumer::<T>("Input")?;
        let output = core.push_supplier::<T>("Output")?;
        core.push_consumer::<Button, _>("Trigger", move |event| {
            if filter.matches(*event.value()?) {
                output.send(input.get(event.time())?);
            }
            Ok(())
        })?;
        tracing::debug!("Reacting on button code {}", filter.code());
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for ButtonTrigger<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, Harness};
    use crate::config::EdgeMode;
    use crate::measurement::{Measurement, Timestamp};

    #[test]
    fn test_pulls_at_event_time() {
        let h = Harness::new();
        let config = SubgraphConfig::new("trigger", "ButtonTriggerDistance")
            .with_attribute("event", "a")
            .with_open_input("Input", EdgeMode::Pull)
            .with_open_input("Trigger", EdgeMode::Push)
            .with_output("Output", EdgeMode::Push);
        let trigger = h.build(&config).unwrap();
        h.answer::<Distance, _>(trigger.as_ref(), "Input", |t| {
            Ok(Measurement::new(t, t.as_millis() as f64))
        });
        let buttons = h.feed::<Button>(trigger.as_ref(), "Trigger");
        let seen = h.collect::<Distance>(trigger.as_ref(), "Output");

        buttons.send(at(5, 'b' as Button));
        buttons.send(at(7, 'a' as Button));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].time(), Timestamp::from_millis(7));
        assert_eq!(*seen[0].value().unwrap(), 7.0);
    }
}
