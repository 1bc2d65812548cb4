//! Integration tests for building and running whole networks
//!
//! These wire graphs through the public factory and drive them from
//! test-side ports, the way an embedding application would.

mod common;

use common::builders::{deliveries, factory_with_trace, fan_out, pose_at, pose_chain, TraceLog};
use common::{assert_float_eq, at, collect, feed, times, values, wait_for};
use std::sync::Arc;
use std::thread;
use trackflow::config::{EdgeMode, GraphConfig, SubgraphConfig};
use trackflow::dataflow::{ComponentFactory, DataflowError, DispatchMode, Network};
use trackflow::measurement::{Pose, Position};

#[test]
fn test_pose_chain_combines_push_and_pull() {
    let network = Network::build(&pose_chain("0 0 5"), &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap();
    let input = feed::<Pose>(&network, "in", "Input");
    let out = collect::<Pose>(&network, "inv", "BA");
    network.start().unwrap();

    input.send(at(10, pose_at(1.0, 0.0, 0.0)));
    input.send(at(20, pose_at(0.0, 2.0, 0.0)));

    assert_eq!(times(&out), vec![10, 20]);
    let poses = values(&out);
    assert!(poses[0].approx_eq(&pose_at(-1.0, 0.0, -5.0), 1e-9));
    assert!(poses[1].approx_eq(&pose_at(0.0, -2.0, -5.0), 1e-9));
}

#[test]
fn test_static_output_pulled_through_network() {
    let network = Network::build(&pose_chain("0 0 1"), &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap();
    let offset: trackflow::dataflow::PullSupplier<Pose> = network.port("offset", "AB").unwrap();
    let m = offset.pull(trackflow::Timestamp::from_millis(42)).unwrap();
    assert_eq!(m.time().as_millis(), 42);
    assert!(m.value().unwrap().approx_eq(&pose_at(0.0, 0.0, 1.0), 1e-12));
    assert!(network.component("mul").is_some());
    assert!(network.port::<trackflow::dataflow::PullSupplier<Pose>>("in", "Output").is_err());
}

#[test]
fn test_depths_follow_push_edges() {
    let network = Network::build(&pose_chain("0 0 1"), &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap();
    assert_eq!(network.len(), 4);
    let depth = |id| network.depth(id).unwrap();
    assert!(depth("in") < depth("mul"));
    assert!(depth("mul") < depth("inv"));
    assert_eq!(network.depth("missing"), None);
}

#[test]
fn test_delivered_after_overrides_insertion_order() {
    let log = TraceLog::default();
    let mut graph = fan_out(&["b", "a"]);
    graph.components[1] = SubgraphConfig::new("b", "PoseTrace")
        .with_input("Input", EdgeMode::Push, "in.Output")
        .delivered_after("a.Input");
    let network = Network::build(&graph, &factory_with_trace(&log), DispatchMode::Inline).unwrap();
    let input = feed::<Pose>(&network, "in", "Input");
    network.start().unwrap();

    input.send(at(1, pose_at(1.0, 0.0, 0.0)));
    input.send(at(2, pose_at(2.0, 0.0, 0.0)));

    assert_eq!(deliveries(&log), vec!["a 1", "b 1", "a 2", "b 2"]);
}

#[test]
fn test_start_consumers_first_and_stop_producers_first() {
    let log = TraceLog::default();
    let mut graph = fan_out(&["a", "b"]);
    graph.components[2] = SubgraphConfig::new("b", "PoseTrace")
        .with_input("Input", EdgeMode::Push, "in.Output")
        .delivered_after("a.Input");
    let network = Network::build(&graph, &factory_with_trace(&log), DispatchMode::Inline).unwrap();

    network.start().unwrap();
    network.start().unwrap();
    assert!(network.is_running());
    network.stop();
    network.stop();
    assert!(!network.is_running());

    assert_eq!(*log.lock(), vec!["start b", "start a", "stop a", "stop b"]);
}

#[test]
fn test_drop_stops_running_network() {
    let log = TraceLog::default();
    let network = Network::build(&fan_out(&["a"]), &factory_with_trace(&log), DispatchMode::Inline).unwrap();
    network.start().unwrap();
    drop(network);
    assert_eq!(*log.lock(), vec!["start a", "stop a"]);
}

#[test]
fn test_worker_dispatch_keeps_per_producer_order() {
    const EVENTS: usize = 200;
    let network = Arc::new(
        Network::build(&fan_out(&[]), &ComponentFactory::with_builtins(), DispatchMode::Worker).unwrap(),
    );
    let out = collect::<Pose>(&network, "in", "Output");
    network.start().unwrap();

    let producers: Vec<_> = (0..2)
        .map(|producer| {
            let input = feed::<Pose>(&network, "in", "Input");
            thread::spawn(move || {
                for seq in 0..EVENTS {
                    input.send(at(seq as u64, pose_at(producer as f64, seq as f64, 0.0)));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    assert!(wait_for(|| out.lock().len() == 2 * EVENTS));
    for producer in 0..2 {
        let seqs: Vec<f64> = values(&out)
            .iter()
            .filter(|pose| pose.translation.x == producer as f64)
            .map(|pose| pose.translation.y)
            .collect();
        let expected: Vec<f64> = (0..EVENTS).map(|s| s as f64).collect();
        assert_eq!(seqs, expected, "producer {producer} reordered");
    }
}

#[test]
fn test_build_rejects_unknown_class() {
    let graph = GraphConfig::new().with(SubgraphConfig::new("x", "NoSuchComponent"));
    let err = Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap_err();
    assert!(matches!(err, DataflowError::UnknownComponentType(class) if class == "NoSuchComponent"));
}

#[test]
fn test_build_rejects_unknown_source() {
    let graph = GraphConfig::new().with(
        SubgraphConfig::new("inv", "PoseInversion")
            .with_input("AB", EdgeMode::Push, "ghost.Output")
            .with_output("BA", EdgeMode::Push),
    );
    let err = Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap_err();
    assert!(matches!(err, DataflowError::UnknownComponent(id) if id == "ghost"));
}

#[test]
fn test_build_rejects_missing_port() {
    let graph = fan_out(&[]).with(
        SubgraphConfig::new("buf", "PoseBuffer")
            .with_input("Input", EdgeMode::Push, "in.Nope")
            .with_output("Output", EdgeMode::Pull),
    );
    let err = Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap_err();
    assert!(matches!(err, DataflowError::NoSuchPort { port, .. } if port == "Nope"));
}

#[test]
fn test_build_rejects_mode_mismatch() {
    let graph = fan_out(&[]).with(
        SubgraphConfig::new("buf", "PoseBuffer")
            .with_input("Input", EdgeMode::Pull, "in.Output")
            .with_output("Output", EdgeMode::Pull),
    );
    let err = Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap_err();
    assert!(matches!(err, DataflowError::ModeMismatch { .. }), "got {err}");
}

#[test]
fn test_build_rejects_type_mismatch() {
    let graph = GraphConfig::new()
        .with(
            SubgraphConfig::new("pos", "PositionIdentity")
                .with_open_input("Input", EdgeMode::Push)
                .with_output("Output", EdgeMode::Push),
        )
        .with(
            SubgraphConfig::new("inv", "PoseInversion")
                .with_input("AB", EdgeMode::Push, "pos.Output")
                .with_output("BA", EdgeMode::Push),
        );
    let err = Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap_err();
    assert!(matches!(err, DataflowError::TypeMismatch { .. }), "got {err}");
}

#[test]
fn test_build_rejects_duplicate_id() {
    let graph = fan_out(&[]).with(SubgraphConfig::new("in", "PoseIdentity"));
    assert!(Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).is_err());
}

const SMOOTHING_GRAPH: &str = r#"
[[component]]
id = "in"
class = "PositionIdentity"

[[component.edge]]
name = "Input"
direction = "input"
mode = "push"

[[component.edge]]
name = "Output"
direction = "output"
mode = "push"

[[component]]
id = "smooth"
class = "ExponentialSmoothingPosition"

[component.attributes]
alpha = 0.5

[[component.edge]]
name = "Input"
direction = "input"
mode = "push"
source = "in.Output"

[[component.edge]]
name = "Output"
direction = "output"
mode = "push"
"#;

#[test]
fn test_graph_loaded_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("smoothing.toml");
    std::fs::write(&path, SMOOTHING_GRAPH).unwrap();

    let graph = GraphConfig::load(&path).unwrap();
    assert_eq!(graph.components.len(), 2);
    let network = Network::build(&graph, &ComponentFactory::with_builtins(), DispatchMode::Inline).unwrap();
    let input = feed::<Position>(&network, "in", "Input");
    let out = collect::<Position>(&network, "smooth", "Output");
    network.start().unwrap();

    input.send(at(1, Position::new(0.0, 0.0, 0.0)));
    input.send(at(2, Position::new(2.0, 0.0, 0.0)));

    let xs: Vec<f64> = values(&out).iter().map(|p| p.x).collect();
    assert_eq!(xs.len(), 2);
    assert_float_eq(xs[0], 0.0, 1e-12);
    assert_float_eq(xs[1], 1.0, 1e-12);
}

#[test]
fn test_graph_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let graph = pose_chain("1 2 3");
    for name in ["chain.toml", "chain.json"] {
        let path = dir.path().join(name);
        graph.save(&path).unwrap();
        assert_eq!(GraphConfig::load(&path).unwrap(), graph);
    }
}
