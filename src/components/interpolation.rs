//! LinearInterpolation: pull-side interpolation over recent pushes.
//!
//! The last [`INTERPOLATION_HISTORY`] measurements pushed on `AB` are kept.
//! A pull of `AB-Interpolated` at `t` picks the latest pair of neighbouring
//! samples whose first sample is not after `t` (or the oldest pair) and
//! interpolates between them, extrapolating beyond either end. `maxAge`
//! (milliseconds, 0 disables) bounds the distance between `t` and the first
//! sample of the pair.

use crate::config::{SubgraphConfig, INTERPOLATION_HISTORY};
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError, DataflowResult};
use crate::measurement::{ErrorPose, Interpolate, Measurement, Payload, Pose, Position, Rotation, Timestamp, NANOS_PER_MILLI};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<LinearInterpolation<Pose>>("PoseLinearInterpolation");
    factory.register::<LinearInterpolation<Rotation>>("RotationLinearInterpolation");
    factory.register::<LinearInterpolation<Position>>("PositionLinearInterpolation");
    factory.register::<LinearInterpolation<ErrorPose>>("ErrorPoseLinearInterpolation");
}

/// Interpolate `history` (ordered by arrival) at `t`.
pub fn interpolate_at<T: Interpolate>(
    history: &VecDeque<Measurement<T>>,
    t: Timestamp,
    max_age_ns: u64,
) -> DataflowResult<T> {
    if history.len() < 2 {
        return Err(DataflowError::NotEnoughData(
            "not enough data to start interpolation".to_string(),
        ));
    }
    let mut second = history.len() - 1;
    while second > 1 && history[second - 1].time() > t {
        second -= 1;
    }
    let (a, b) = (&history[second - 1], &history[second]);

    let time_diff = t.nanos_since(a.time());
    if max_age_ns > 0 && time_diff.unsigned_abs() > max_age_ns {
        return Err(DataflowError::TooOld(format!(
            "data is too old to do extrapolation: {} ms away from {}",
            time_diff / NANOS_PER_MILLI as i64,
            t
        )));
    }
    let event_diff = b.time().nanos_since(a.time());
    let h = if event_diff != 0 {
        time_diff as f64 / event_diff as f64
    } else {
        1.0
    };
    Ok(a.value()?.interpolate(b.value()?, h))
}

pub struct LinearInterpolation<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload + Interpolate> Construct for LinearInterpolation<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let max_age_ns = config.attr_or::<u64>("maxAge", 0)?.saturating_mul(NANOS_PER_MILLI);
        let history: Arc<Mutex<VecDeque<Measurement<T>>>> =
            Arc::new(Mutex::new(VecDeque::with_capacity(INTERPOLATION_HISTORY + 1)));

        let mut core = ComponentCore::new(config, ctx);
        let store = history.clone();
        core.push_consumer::<T, _>("AB", move |m| {
            tracing::trace!("Received push event with timestamp {}", m.time());
            let mut history = store.lock();
            history.push_back(m);
            if history.len() > INTERPOLATION_HISTORY {
                history.pop_front();
            }
            Ok(())
        })?;
        core.pull_supplier::<T, _>("AB-Interpolated", move |t| {
            let value = interpolate_at(&history.lock(), t, max_age_ns)?;
            Ok(Measurement::new(t, value))
        })?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload + Interpolate> Component for LinearInterpolation<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, Harness};
    use crate::config::EdgeMode;

    fn history(samples: &[(u64, f64)]) -> VecDeque<Measurement<Position>> {
        samples
            .iter()
            .map(|&(ms, x)| at(ms, Position::new(x, 0.0, 0.0)))
            .collect()
    }

    fn x_at(h: &VecDeque<Measurement<Position>>, ms: u64, max_age: u64) -> DataflowResult<f64> {
        interpolate_at(h, Timestamp::from_millis(ms), max_age * NANOS_PER_MILLI).map(|p| p.x)
    }

    #[test]
    fn test_interpolates_between_neighbours() {
        let h = history(&[(0, 0.0), (10, 10.0), (20, 40.0)]);
        assert!((x_at(&h, 5, 0).unwrap() - 5.0).abs() < 1e-9);
        assert!((x_at(&h, 15, 0).unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_extrapolates_past_newest() {
        let h = history(&[(0, 0.0), (10, 10.0)]);
        assert!((x_at(&h, 15, 0).unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_needs_two_samples() {
        let h = history(&[(0, 0.0)]);
        assert!(matches!(x_at(&h, 0, 0), Err(DataflowError::NotEnoughData(_))));
    }

    #[test]
    fn test_max_age() {
        let h = history(&[(0, 0.0), (10, 10.0)]);
        assert!(x_at(&h, 50, 100).is_ok());
        assert!(matches!(x_at(&h, 500, 100), Err(DataflowError::TooOld(_))));
    }

    #[test]
    fn test_component_ports() {
        let h = Harness::new();
        let config = SubgraphConfig::new("interp", "PositionLinearInterpolation")
            .with_open_input("AB", EdgeMode::Push)
            .with_output("AB-Interpolated", EdgeMode::Pull);
        let interp = h.build(&config).unwrap();
        let feed = h.feed::<Position>(interp.as_ref(), "AB");
        for i in 0..60 {
            feed.send(at(i * 10, Position::new(i as f64, 0.0, 0.0)));
        }
        let out = h.pull::<Position>(interp.as_ref(), "AB-Interpolated");
        let m = out.pull(Timestamp::from_millis(585)).unwrap();
        assert!((m.value().unwrap().x - 58.5).abs() < 1e-9);
    }
}
