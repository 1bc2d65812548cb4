//! Turning a stream of single measurements into lists.
//!
//! | Class family | Attribute | Emits |
//! |---|---|---|
//! | `*RingBuffer` | `size` (required) | the last `size` values, oldest first, once full |
//! | `*WindowedAggregator` | `time` (ms, required) | values newer than `t - time` |
//! | `*TimeToSpaceConverter` | `size` (default 30) | every `size` values, then starts over |
//!
//! All of them read `Input` (push) and write the list to `Output`.

use super::{register_trigger, TriggerBuilder};
use crate::config::SubgraphConfig;
use crate::dataflow::{
    BuildContext, ComponentFactory, DataflowError, DataflowResult, TimePolicy, TriggerComponent,
};
use crate::measurement::{Distance, Measurement, Payload, Pose, Position, NANOS_PER_MILLI};
use std::time::Duration;

pub(crate) fn register(factory: &mut ComponentFactory) {
    let builders: [(&str, TriggerBuilder); 9] = [
        ("PoseRingBuffer", ring_buffer::<Pose>),
        ("PositionRingBuffer", ring_buffer::<Position>),
        ("DistanceRingBuffer", ring_buffer::<Distance>),
        ("PoseWindowedAggregator", windowed_aggregator::<Pose>),
        ("PositionWindowedAggregator", windowed_aggregator::<Position>),
        ("DistanceWindowedAggregator", windowed_aggregator::<Distance>),
        ("PoseTimeToSpaceConverter", time_to_space::<Pose>),
        ("PositionTimeToSpaceConverter", time_to_space::<Position>),
        ("DistanceTimeToSpaceConverter", time_to_space::<Distance>),
    ];
    for (class, build) in builders {
        register_trigger(factory, class, build);
    }
}

fn positive_size(config: &SubgraphConfig, size: usize) -> DataflowResult<usize> {
    if size == 0 {
        return Err(DataflowError::invalid_attribute(&config.id, "size", "must be positive"));
    }
    Ok(size)
}

fn expanding<T: Payload>(
    config: &SubgraphConfig,
    ctx: &BuildContext,
    policy: TimePolicy,
) -> DataflowResult<TriggerComponent> {
    let mut trig = TriggerComponent::new(config, ctx)?;
    let input = trig.time_expansion_input::<T>("Input", policy)?;
    let output = trig.output::<Vec<T>>("Output")?;
    trig.set_compute(move |t| {
        let list = input.values()?;
        tracing::trace!("Emitting {} measurements", list.len());
        output.send(Measurement::new(t, list));
        Ok(())
    });
    Ok(trig)
}

pub fn ring_buffer<T: Payload>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent> {
    let capacity = positive_size(config, config.require("size")?)?;
    expanding::<T>(config, ctx, TimePolicy::Ring { capacity })
}

pub fn windowed_aggregator<T: Payload>(
    config: &SubgraphConfig,
    ctx: &BuildContext,
) -> DataflowResult<TriggerComponent> {
    let millis: f64 = config.require("time")?;
    if !(millis > 0.0 && millis.is_finite()) {
        return Err(DataflowError::invalid_attribute(
            &config.id,
            "time",
            format!("must be positive, got {millis}"),
        ));
    }
    let width = Duration::from_nanos((millis * NANOS_PER_MILLI as f64) as u64);
    expanding::<T>(config, ctx, TimePolicy::Window { width })
}

pub fn time_to_space<T: Payload>(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent> {
    let size = positive_size(config, config.attr_or("size", 30)?)?;
    expanding::<T>(config, ctx, TimePolicy::Count { size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, values, Harness};
    use crate::config::EdgeMode;

    fn distances(class: &str, attr: (&str, i64), inputs: &[(u64, f64)]) -> Vec<Vec<Distance>> {
        let h = Harness::new();
        let config = SubgraphConfig::new("expand", class)
            .with_attribute(attr.0, attr.1)
            .with_open_input("Input", EdgeMode::Push)
            .with_output("Output", EdgeMode::Push);
        let c = h.build(&config).unwrap();
        let feed = h.feed::<Distance>(c.as_ref(), "Input");
        let out = h.collect::<Vec<Distance>>(c.as_ref(), "Output");
        for &(ms, v) in inputs {
            feed.send(at(ms, v));
        }
        values(&out)
    }

    #[test]
    fn test_ring_buffer_waits_until_full() {
        let lists = distances("DistanceRingBuffer", ("size", 3), &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        assert_eq!(lists, vec![vec![1.0, 2.0, 3.0], vec![2.0, 3.0, 4.0]]);
    }

    #[test]
    fn test_window_is_strict() {
        let lists = distances(
            "DistanceWindowedAggregator",
            ("time", 10),
            &[(0, 0.0), (5, 5.0), (10, 10.0), (21, 21.0)],
        );
        assert_eq!(lists[2], vec![5.0, 10.0]);
        assert_eq!(lists[3], vec![21.0]);
    }

    #[test]
    fn test_time_to_space_emits_once_per_batch() {
        let inputs: Vec<(u64, f64)> = (0..7).map(|i| (i, i as f64)).collect();
        let lists = distances("DistanceTimeToSpaceConverter", ("size", 3), &inputs);
        assert_eq!(lists, vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]]);
    }

    #[test]
    fn test_ring_buffer_requires_size() {
        let h = Harness::new();
        let config = SubgraphConfig::new("ring", "PoseRingBuffer");
        assert!(matches!(h.build(&config), Err(DataflowError::MissingAttribute { .. })));
        let zero = SubgraphConfig::new("ring", "PoseRingBuffer").with_attribute("size", 0i64);
        assert!(matches!(h.build(&zero), Err(DataflowError::InvalidAttribute { .. })));
    }
}
