//! Averaging: the mean of a list input, and exponential smoothing of a
//! single-valued stream.

use super::{register_trigger, TriggerBuilder};
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, ComponentFactory, DataflowError, DataflowResult, TriggerComponent};
use crate::measurement::{Distance, Interpolate, Mean, Measurement, Payload, Pose, Position, Position2D, Rotation};
use parking_lot::Mutex;

pub(crate) fn register(factory: &mut ComponentFactory) {
    let builders: [(&str, TriggerBuilder); 10] = [
        ("DistanceListAverage", list_average::<Distance>),
        ("PositionList2DAverage", list_average::<Position2D>),
        ("PositionListAverage", list_average::<Position>),
        ("PoseListAverage", list_average::<Pose>),
        ("RotationListAverage", list_average::<Rotation>),
        ("ExponentialSmoothingDistance", exponential_smoothing::<Distance>),
        ("ExponentialSmoothingPosition2D", exponential_smoothing::<Position2D>),
        ("ExponentialSmoothingPosition", exponential_smoothing::<Position>),
        ("ExponentialSmoothingRotation", exponential_smoothing::<Rotation>),
        ("ExponentialSmoothingPose", exponential_smoothing::<Pose>),
    ];
    for (class, build) in builders {
        register_trigger(factory, class, build);
    }
}

/// Mean of the `Input` list, expanded as configured by `expansion`.
pub fn list_average<T>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent>
where
    T: Payload + Mean,
{
    let mut trig = TriggerComponent::new(config, ctx)?;
    let input = trig.expansion_input::<T>("Input")?;
    let output = trig.output::<T>("Output")?;
    trig.set_compute(move |t| {
        let list = input.values()?;
        let mean = T::mean(&list)
            .ok_or_else(|| DataflowError::NotEnoughData("cannot average an empty list".to_string()))?;
        output.send(Measurement::new(t, mean));
        Ok(())
    });
    Ok(trig)
}

/// `mean = alpha * value + (1 - alpha) * mean`; the first value
/// initializes the mean.
pub fn exponential_smoothing<T>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent>
where
    T: Payload + Interpolate,
{
    let alpha: f64 = config.attr_or("alpha", 0.5)?;
    if !(0.0..=1.0).contains(&alpha) {
        return Err(DataflowError::invalid_attribute(
            &config.id,
            "alpha",
            format!("must lie in [0, 1], got {alpha}"),
        ));
    }
    let mut trig = TriggerComponent::new(config, ctx)?;
    let input = trig.input::<T>("Input")?;
    let output = trig.output::<T>("Output")?;
    let mean: Mutex<Option<T>> = Mutex::new(None);
    trig.set_compute(move |t| {
        let value = input.value()?;
        let smoothed = {
            let mut mean = mean.lock();
            let next = match mean.as_ref() {
                None => value,
                Some(previous) => previous.interpolate(&value, alpha),
            };
            *mean = Some(next.clone());
            next
        };
        tracing::trace!("Exponential smoothing: {:?}", smoothed);
        output.send(Measurement::new(t, smoothed));
        Ok(())
    });
    Ok(trig)
}
