//! Property tests over whole networks

mod common;

use common::builders::pose_chain;
use common::{at, collect, feed, times, values};
use nalgebra::{UnitQuaternion, Vector3};
use proptest::prelude::*;
use trackflow::config::{EdgeMode, GraphConfig, SubgraphConfig};
use trackflow::dataflow::{ComponentFactory, DispatchMode, Network};
use trackflow::measurement::{Distance, Pose};

fn pose_strategy() -> impl Strategy<Value = Pose> {
    (-3.0..3.0f64, -3.0..3.0f64, -3.0..3.0f64, -10.0..10.0f64, -10.0..10.0f64, -10.0..10.0f64).prop_map(
        |(r, p, y, tx, ty, tz)| Pose::new(UnitQuaternion::from_euler_angles(r, p, y), Vector3::new(tx, ty, tz)),
    )
}

fn ring_buffer(size: i64) -> GraphConfig {
    GraphConfig::new().with(
        SubgraphConfig::new("ring", "DistanceRingBuffer")
            .with_attribute("size", size)
            .with_open_input("Input", EdgeMode::Push)
            .with_output("Output", EdgeMode::Push),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_chain_matches_direct_algebra(poses in proptest::collection::vec(pose_strategy(), 1..20)) {
        let network = Network::build(&pose_chain("0.5 -1 2"), &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap();
        let input = feed::<Pose>(&network, "in", "Input");
        let out = collect::<Pose>(&network, "inv", "BA");
        network.start().unwrap();

        let offset = Pose::from_translation(Vector3::new(0.5, -1.0, 2.0));
        for (i, pose) in poses.iter().enumerate() {
            input.send(at(i as u64, *pose));
        }

        let seen = values(&out);
        prop_assert_eq!(seen.len(), poses.len());
        for (pose, result) in poses.iter().zip(&seen) {
            prop_assert!(result.approx_eq(&pose.compose(&offset).invert(), 1e-8));
        }
        prop_assert_eq!(times(&out), (0..poses.len() as u64).collect::<Vec<_>>());
    }

    #[test]
    fn prop_ring_buffer_emits_full_windows(size in 1usize..8, n in 0usize..30) {
        let network = Network::build(&ring_buffer(size as i64), &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap();
        let input = feed::<Distance>(&network, "ring", "Input");
        let out = collect::<Vec<Distance>>(&network, "ring", "Output");
        network.start().unwrap();

        for i in 0..n {
            input.send(at(i as u64, i as f64));
        }

        let windows = values(&out);
        prop_assert_eq!(windows.len(), (n + 1).saturating_sub(size));
        for (k, window) in windows.iter().enumerate() {
            let expected: Vec<f64> = (k..k + size).map(|v| v as f64).collect();
            prop_assert_eq!(window, &expected);
        }
    }

    #[test]
    fn prop_worker_dispatch_preserves_edge_order(xs in proptest::collection::vec(-1e6..1e6f64, 0..50)) {
        let network = Network::build(&ring_buffer(1), &ComponentFactory::with_builtins(), DispatchMode::Worker).unwrap();
        let input = feed::<Distance>(&network, "ring", "Input");
        let out = collect::<Vec<Distance>>(&network, "ring", "Output");
        network.start().unwrap();

        for (i, x) in xs.iter().enumerate() {
            input.send(at(i as u64, *x));
        }

        prop_assert!(common::wait_for(|| out.lock().len() == xs.len()));
        let seen: Vec<f64> = values(&out).into_iter().flatten().collect();
        prop_assert_eq!(seen, xs);
    }
}
