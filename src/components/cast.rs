//! Type conversions between payloads, as trigger components with `Input`
//! and `Output`. Casting a list to a single value requires exactly one
//! element.

use super::register_trigger;
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, ComponentFactory, DataflowError, DataflowResult, TriggerComponent};
use crate::measurement::{ErrorPose, Matrix3x4f, Matrix4x4, Measurement, Payload, Pose, Position, Position2D, Rotation};

pub(crate) fn register(factory: &mut ComponentFactory) {
    register_trigger(factory, "CastErrorPose2Pose", cast::<ErrorPose, Pose>);
    register_trigger(factory, "CastPose2Position", cast::<Pose, Position>);
    register_trigger(factory, "CastPose2Rotation", cast::<Pose, Rotation>);
    register_trigger(factory, "CastPositionList2Position", cast::<Vec<Position>, Position>);
    register_trigger(factory, "Cast2DPositionList22DPosition", cast::<Vec<Position2D>, Position2D>);
    register_trigger(factory, "CastPose2Matrix3x4", cast::<Pose, Matrix3x4f>);
    register_trigger(factory, "CastPose2Matrix4x4", cast::<Pose, Matrix4x4>);
}

/// Conversion from `S`.
pub trait CastFrom<S>: Sized {
    fn cast_from(source: &S) -> DataflowResult<Self>;
}

impl CastFrom<ErrorPose> for Pose {
    fn cast_from(source: &ErrorPose) -> DataflowResult<Self> {
        Ok(source.pose)
    }
}

impl CastFrom<Pose> for Position {
    fn cast_from(source: &Pose) -> DataflowResult<Self> {
        Ok(source.translation)
    }
}

impl CastFrom<Pose> for Rotation {
    fn cast_from(source: &Pose) -> DataflowResult<Self> {
        Ok(source.rotation)
    }
}

impl CastFrom<Pose> for Matrix3x4f {
    fn cast_from(source: &Pose) -> DataflowResult<Self> {
        Ok(source.to_matrix3x4())
    }
}

impl CastFrom<Pose> for Matrix4x4 {
    fn cast_from(source: &Pose) -> DataflowResult<Self> {
        Ok(source.to_matrix4x4())
    }
}

fn single<T: Clone>(list: &[T]) -> DataflowResult<T> {
    match list {
        [only] => Ok(only.clone()),
        _ => Err(DataflowError::ListSize(list.len())),
    }
}

impl CastFrom<Vec<Position>> for Position {
    fn cast_from(source: &Vec<Position>) -> DataflowResult<Self> {
        single(source)
    }
}

impl CastFrom<Vec<Position2D>> for Position2D {
    fn cast_from(source: &Vec<Position2D>) -> DataflowResult<Self> {
        single(source)
    }
}

pub fn cast<S, T>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent>
where
    S: Payload,
    T: Payload + CastFrom<S>,
{
    let mut trig = TriggerComponent::new(config, ctx)?;
    let input = trig.input::<S>("Input")?;
    let output = trig.output::<T>("Output")?;
    trig.set_compute(move |t| {
        let value = T::cast_from(&input.value()?)?;
        output.send(Measurement::new(t, value));
        Ok(())
    });
    Ok(trig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, values, Harness};
    use crate::config::EdgeMode;

    #[test]
    fn test_list_cast_requires_one_element() {
        assert!(matches!(
            Position::cast_from(&vec![Position::zeros(), Position::zeros()]),
            Err(DataflowError::ListSize(2))
        ));
        assert!(matches!(Position::cast_from(&Vec::<Position>::new()), Err(DataflowError::ListSize(0))));
        let p = Position::new(1.0, 2.0, 3.0);
        assert_eq!(Position::cast_from(&vec![p]).unwrap(), p);
    }

    #[test]
    fn test_pose_to_matrix() {
        let pose = Pose::from_translation(Position::new(1.0, 2.0, 3.0));
        let m = Matrix4x4::cast_from(&pose).unwrap();
        assert_eq!(m[(0, 3)], 1.0);
        assert_eq!(m[(3, 3)], 1.0);
    }

    #[test]
    fn test_cast_component_drops_bad_lists() {
        let h = Harness::new();
        let config = SubgraphConfig::new("cast", "CastPositionList2Position")
            .with_open_input("Input", EdgeMode::Push)
            .with_output("Output", EdgeMode::Push);
        let c = h.build(&config).unwrap();
        let feed = h.feed::<Vec<Position>>(c.as_ref(), "Input");
        let out = h.collect::<Position>(c.as_ref(), "Output");
        feed.send(at(1, vec![Position::zeros(), Position::zeros()]));
        feed.send(at(2, vec![Position::new(1.0, 0.0, 0.0)]));
        assert_eq!(values(&out), vec![Position::new(1.0, 0.0, 0.0)]);
    }
}
