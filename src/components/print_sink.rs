//! PrintSink: logs every measurement pushed to `Input`.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{
    Button, Distance, ErrorPose, ErrorPosition, Matrix3x3, Matrix3x4f, Matrix4x4, Payload, Pose,
    Position, Position2D, Rotation, Vector4d,
};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<PrintSink<Pose>>("PosePrintSink");
    factory.register::<PrintSink<ErrorPose>>("ErrorPosePrintSink");
    factory.register::<PrintSink<Position>>("PositionPrintSink");
    factory.register::<PrintSink<ErrorPosition>>("ErrorPositionPrintSink");
    factory.register::<PrintSink<Position2D>>("Position2PrintSink");
    factory.register::<PrintSink<Vector4d>>("Vector4PrintSink");
    factory.register::<PrintSink<Rotation>>("RotationPrintSink");
    factory.register::<PrintSink<Distance>>("DistancePrintSink");
    factory.register::<PrintSink<Vec<Position>>>("PositionListPrintSink");
    factory.register::<PrintSink<Vec<Position2D>>>("PositionList2PrintSink");
    factory.register::<PrintSink<Vec<Pose>>>("PoseListPrintSink");
    factory.register::<PrintSink<Vec<Distance>>>("DistanceListPrintSink");
    factory.register::<PrintSink<Button>>("ButtonPrintSink");
    factory.register::<PrintSink<Matrix4x4>>("Matrix4x4PrintSink");
    factory.register::<PrintSink<Matrix3x3>>("Matrix3x3PrintSink");
    factory.register::<PrintSink<Matrix3x4f>>("Matrix3x4PrintSink");
}

pub struct PrintSink<T> {
    core: ComponentCore,
    received: Arc<AtomicU64>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> PrintSink<T> {
    /// Measurements logged so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl<T: Payload> Construct for PrintSink<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let received = Arc::new(AtomicU64::new(0));
        let mut core = ComponentCore::new(config, ctx);
        let count = received.clone();
        core.push_consumer::<T, _>("Input", move |m| {
            count.fetch_add(1, Ordering::Relaxed);
            tracing::info!(time = %m.time(), "Data received: {:?}", m.value()?);
            Ok(())
        })?;
        Ok(Self {
            core,
            received,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for PrintSink<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
