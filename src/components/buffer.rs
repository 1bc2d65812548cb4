//! Buffer: turns a push stream into a pull source.
//!
//! The last pushed measurement is returned for any requested time, with the
//! timestamp replaced by the request time. With `maxAge` set (milliseconds),
//! requests more than `maxAge` after the buffered measurement fail as too
//! old. A `maxAge` of zero disables the check.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError, DataflowResult};
use crate::measurement::{
    Button, Distance, ErrorPose, ErrorPosition, Measurement, Payload, Pose, Position, Position2D, Rotation,
};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Buffer<Pose>>("PoseBuffer");
    factory.register::<Buffer<ErrorPose>>("ErrorPoseBuffer");
    factory.register::<Buffer<ErrorPosition>>("ErrorPositionBuffer");
    factory.register::<Buffer<Rotation>>("RotationBuffer");
    factory.register::<Buffer<Position>>("PositionBuffer");
    factory.register::<Buffer<Position2D>>("Position2Buffer");
    factory.register::<Buffer<Distance>>("DistanceBuffer");
    factory.register::<Buffer<Button>>("SkalarBuffer");
    factory.register::<Buffer<Vec<Position>>>("PositionListBuffer");
    factory.register::<Buffer<Vec<Position2D>>>("PositionList2Buffer");
    factory.register::<Buffer<Vec<Pose>>>("PoseListBuffer");
}

pub struct Buffer<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for Buffer<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let max_age = config
            .attr::<u64>("maxAge")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        let last: Arc<Mutex<Option<Measurement<T>>>> = Arc::new(Mutex::new(None));

        let mut core = ComponentCore::new(config, ctx);
        let store = last.clone();
        core.push_consumer::<T, _>("Input", move |m| {
            *store.lock() = Some(m);
            Ok(())
        })?;
        core.pull_supplier::<T, _>("Output", move |t| {
            let buffered = last
                .lock()
                .clone()
                .ok_or_else(|| DataflowError::NoData("nothing buffered yet".to_string()))?;
            if let Some(max_age) = max_age {
                if buffered.time() + max_age < t {
                    return Err(DataflowError::TooOld(format!(
                        "buffered measurement from {} is older than {} ms at {}",
                        buffered.time(),
                        max_age.as_millis(),
                        t
                    )));
                }
            }
            Ok(buffered.retimed(t))
        })?;

        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Buffer<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, Harness};
    use crate::config::EdgeMode;
    use crate::measurement::Timestamp;
    use nalgebra::Vector3;

    fn buffer_config(max_age: Option<i64>) -> SubgraphConfig {
        let cfg = SubgraphConfig::new("buffer", "PoseBuffer")
            .with_open_input("Input", EdgeMode::Push)
            .with_output("Output", EdgeMode::Pull);
        match max_age {
            Some(ms) => cfg.with_attribute("maxAge", ms),
            None => cfg,
        }
    }

    #[test]
    fn test_empty_buffer_has_no_data() {
        let h = Harness::new();
        let buffer = h.build(&buffer_config(None)).unwrap();
        let out = h.pull::<Pose>(buffer.as_ref(), "Output");
        assert!(matches!(
            out.pull(Timestamp::from_millis(1)),
            Err(DataflowError::NoData(_))
        ));
    }

    #[test]
    fn test_max_age() {
        let h = Harness::new();
        let buffer = h.build(&buffer_config(Some(100))).unwrap();
        let feed = h.feed::<Pose>(buffer.as_ref(), "Input");
        let out = h.pull::<Pose>(buffer.as_ref(), "Output");

        let pose = Pose::from_translation(Vector3::new(1.0, 2.0, 3.0));
        feed.send(at(1000, pose));

        let m = out.pull(Timestamp::from_millis(1050)).unwrap();
        assert_eq!(m.time(), Timestamp::from_millis(1050));
        assert_eq!(*m.value().unwrap(), pose);
        assert!(out.pull(Timestamp::from_millis(1100)).is_ok());
        assert!(matches!(
            out.pull(Timestamp::from_millis(1200)),
            Err(DataflowError::TooOld(_))
        ));
    }

    #[test]
    fn test_without_max_age_never_too_old() {
        let h = Harness::new();
        let buffer = h.build(&buffer_config(None)).unwrap();
        let feed = h.feed::<Pose>(buffer.as_ref(), "Input");
        feed.send(at(0, Pose::identity()));
        let out = h.pull::<Pose>(buffer.as_ref(), "Output");
        assert!(out.pull(Timestamp::from_millis(3_600_000)).is_ok());
    }

    #[test]
    fn test_latest_value_wins() {
        let h = Harness::new();
        let config = SubgraphConfig::new("b", "DistanceBuffer")
            .with_open_input("Input", EdgeMode::Push)
            .with_output("Output", EdgeMode::Pull);
        let buffer = h.build(&config).unwrap();
        let feed = h.feed::<Distance>(buffer.as_ref(), "Input");
        feed.send(at(1, 1.0));
        feed.send(at(2, 2.0));
        let out = h.pull::<Distance>(buffer.as_ref(), "Output");
        assert_eq!(*out.pull(Timestamp::from_millis(3)).unwrap().value().unwrap(), 2.0);
    }
}
