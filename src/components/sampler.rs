//! Sampler: pulls its input at a fixed rate and pushes the result.
//!
//! Attributes: `frequency` in Hz (default 1), `offset` in seconds added to
//! the sampling time (default 0).

use crate::config::SubgraphConfig;
use crate::dataflow::{
    BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError,
    DataflowResult, PullConsumer, PushSupplier, WorkerSlot,
};
use crate::measurement::{
    Button, ErrorPose, ErrorPosition, Matrix3x3, Matrix3x4f, Payload, Pose, Position, Position2D,
    Rotation, Timestamp, Vector4d,
};
use std::time::Duration;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Sampler<Pose>>("PoseSampler");
    factory.register::<Sampler<ErrorPose>>("ErrorPoseSampler");
    factory.register::<Sampler<ErrorPosition>>("ErrorPositionSampler");
    factory.register::<Sampler<Rotation>>("RotationSampler");
    factory.register::<Sampler<Position>>("PositionSampler");
    factory.register::<Sampler<Matrix3x3>>("Matrix3x3Sampler");
    factory.register::<Sampler<Matrix3x4f>>("Matrix3x4Sampler");
    factory.register::<Sampler<Button>>("ButtonSampler");
    factory.register::<Sampler<Vec<Position2D>>>("PositionList2Sampler");
    factory.register::<Sampler<Vec<Position>>>("PositionListSampler");
    factory.register::<Sampler<Vec<Pose>>>("PoseListSampler");
    factory.register::<Sampler<Vector4d>>("Vector4DSampler");
}

pub struct Sampler<T> {
    core: ComponentCore,
    input: PullConsumer<T>,
    output: PushSupplier<T>,
    period: Duration,
    offset_ns: i64,
    worker: WorkerSlot,
}

impl<T: Payload> Construct for Sampler<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let frequency: f64 = config.attr_or("frequency", 1.0)?;
        if !(frequency > 0.0 && frequency.is_finite()) {
            return Err(DataflowError::invalid_attribute(
                &config.id,
                "frequency",
                format!("must be positive, got {frequency}"),
            ));
        }
        let period = Duration::try_from_secs_f64(frequency.recip())
            .map_err(|e| DataflowError::invalid_attribute(&config.id, "frequency", format!("{frequency}: {e}")))?;
        let offset: f64 = config.attr_or("offset", 0.0)?;

        let mut core = ComponentCore::new(config, ctx);
        let input = core.pull_consumer::<T>("Input")?;
        let output = core.push_supplier::<T>("Output")?;
        Ok(Self {
            core,
            input,
            output,
            period,
            offset_ns: (offset * 1e9) as i64,
            worker: WorkerSlot::new(),
        })
    }
}

impl<T: Payload> Component for Sampler<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        let input = self.input.clone();
        let output = self.output.clone();
        let span = self.core.span().clone();
        let (period, offset_ns) = (self.period, self.offset_ns);
        tracing::info!("Sampling every {:?}", period);
        self.worker.start(format!("sampler-{}", self.name()), move |stop| {
            let _entered = span.enter();
            stop.run_periodic(period, || {
                let t = Timestamp::now().offset_nanos(offset_ns);
                match input.get(t) {
                    Ok(m) => output.send(m),
                    Err(err) => tracing::warn!(category = %err.category(), "Sampling failed: {}", err),
                }
            });
        })
    }

    fn on_stop(&self) {
        self.worker.stop();
    }
}
