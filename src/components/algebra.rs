//! Pose algebra as trigger components.
//!
//! - Identity: `Input` -> `Output`, unchanged.
//! - Inversion: `AB` -> `BA`.
//! - Multiplication: `AB` and `BC` -> `AC`.
//!
//! Each input may be push or pull, as configured on its edge.

use super::{register_trigger, TriggerBuilder};
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, ComponentFactory, DataflowResult, TriggerComponent};
use crate::measurement::{Invert, Measurement, Multiply, Payload, Pose, Position, Rotation};

pub(crate) fn register(factory: &mut ComponentFactory) {
    let builders: [(&str, TriggerBuilder); 15] = [
        ("PoseIdentity", identity::<Pose>),
        ("RotationIdentity", identity::<Rotation>),
        ("PositionIdentity", identity::<Position>),
        ("PoseInversion", inversion::<Pose>),
        ("RotationInversion", inversion::<Rotation>),
        ("PositionInversion", inversion::<Position>),
        ("PoseListInversion", inversion::<Vec<Pose>>),
        ("PositionListInversion", inversion::<Vec<Position>>),
        ("PoseMultiplication", multiplication::<Pose, Pose>),
        ("RotationMultiplication", multiplication::<Rotation, Rotation>),
        ("PosePositionMultiplication", multiplication::<Pose, Position>),
        ("PositionMultiplication", multiplication::<Position, Position>),
        ("PosePositionListMultiplication", multiplication::<Pose, Vec<Position>>),
        ("PosePoseListMultiplication", multiplication::<Pose, Vec<Pose>>),
        ("PoseListPoseMultiplication", multiplication::<Vec<Pose>, Pose>),
    ];
    for (class, build) in builders {
        register_trigger(factory, class, build);
    }
    register_trigger(factory, "RotationPositionMultiplication", multiplication::<Rotation, Position>);
    register_trigger(factory, "PositionAddition", multiplication::<Position, Position>);
}

pub fn identity<T: Payload>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent> {
    let mut trig = TriggerComponent::new(config, ctx)?;
    let input = trig.input::<T>("Input")?;
    let output = trig.output::<T>("Output")?;
    trig.set_compute(move |_| {
        output.send(input.get()?);
        Ok(())
    });
    Ok(trig)
}

pub fn inversion<T>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent>
where
    T: Payload + Invert,
{
    let mut trig = TriggerComponent::new(config, ctx)?;
    let ab = trig.input::<T>("AB")?;
    let ba = trig.output::<T>("BA")?;
    trig.set_compute(move |_| {
        let m = ab.get()?;
        ba.send(m.map(Invert::invert)?);
        Ok(())
    });
    Ok(trig)
}

pub fn multiplication<A, B>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent>
where
    A: Payload + Multiply<B>,
    B: Payload,
    A::Output: Payload,
{
    let mut trig = TriggerComponent::new(config, ctx)?;
    let ab = trig.input::<A>("AB")?;
    let bc = trig.input::<B>("BC")?;
    let ac = trig.output::<A::Output>("AC")?;
    trig.set_compute(move |t| {
        let product = ab.value()?.multiply(&bc.value()?);
        ac.send(Measurement::new(t, product));
        Ok(())
    });
    Ok(trig)
}
