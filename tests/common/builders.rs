//! Graph builders and tracing components shared by the integration tests

use parking_lot::Mutex;
use std::sync::Arc;
use trackflow::config::{EdgeMode, GraphConfig, SubgraphConfig};
use trackflow::dataflow::{Component, ComponentCore, ComponentFactory};
use trackflow::measurement::{Pose, Position};

/// Lines appended by [`Trace`] components.
pub type TraceLog = Arc<Mutex<Vec<String>>>;

/// Consumes poses on `Input` and logs `"<id> <x>"` for each one, plus
/// `"start <id>"` / `"stop <id>"` on lifecycle changes.
pub struct Trace {
    core: ComponentCore,
    log: TraceLog,
}

impl Component for Trace {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> trackflow::DataflowResult<()> {
        self.log.lock().push(format!("start {}", self.name()));
        Ok(())
    }

    fn on_stop(&self) {
        self.log.lock().push(format!("stop {}", self.name()));
    }
}

/// Built-in factory plus the `PoseTrace` class writing to `log`.
pub fn factory_with_trace(log: &TraceLog) -> ComponentFactory {
    let mut factory = ComponentFactory::with_builtins();
    let log = log.clone();
    factory.register_fn("PoseTrace", move |config, ctx| {
        let mut core = ComponentCore::new(config, ctx);
        let (sink, id) = (log.clone(), config.id.clone());
        core.push_consumer::<Pose, _>("Input", move |m| {
            sink.lock().push(format!("{id} {}", m.value()?.translation.x));
            Ok(())
        })?;
        Ok(Arc::new(Trace {
            core,
            log: log.clone(),
        }) as Arc<dyn Component>)
    });
    factory
}

/// Trace lines that record deliveries, without lifecycle lines.
pub fn deliveries(log: &TraceLog) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|line| !line.starts_with("start ") && !line.starts_with("stop "))
        .cloned()
        .collect()
}

pub fn pose_at(x: f64, y: f64, z: f64) -> Pose {
    Pose::from_translation(Position::new(x, y, z))
}

/// `in` (open push input) -> `mul` (times the static `offset`) -> `inv`.
pub fn pose_chain(offset: &str) -> GraphConfig {
    GraphConfig::new()
        .with(
            SubgraphConfig::new("in", "PoseIdentity")
                .with_open_input("Input", EdgeMode::Push)
                .with_output("Output", EdgeMode::Push),
        )
        .with(
            SubgraphConfig::new("offset", "StaticPose")
                .with_attribute("staticPosition", offset)
                .with_output("AB", EdgeMode::Pull),
        )
        .with(
            SubgraphConfig::new("mul", "PoseMultiplication")
                .with_input("AB", EdgeMode::Push, "in.Output")
                .with_input("BC", EdgeMode::Pull, "offset.AB")
                .with_output("AC", EdgeMode::Push),
        )
        .with(
            SubgraphConfig::new("inv", "PoseInversion")
                .with_input("AB", EdgeMode::Push, "mul.AC")
                .with_output("BA", EdgeMode::Push),
        )
}

/// `in` fanning out to traced consumers named `ids`, in insertion order.
pub fn fan_out(ids: &[&str]) -> GraphConfig {
    let mut graph = GraphConfig::new().with(
        SubgraphConfig::new("in", "PoseIdentity")
            .with_open_input("Input", EdgeMode::Push)
            .with_output("Output", EdgeMode::Push),
    );
    for id in ids {
        graph = graph.with(SubgraphConfig::new(*id, "PoseTrace").with_input("Input", EdgeMode::Push, "in.Output"));
    }
    graph
}
