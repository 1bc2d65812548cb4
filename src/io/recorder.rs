//! Recorder: writes every measurement pushed to `Input` to the `file`
//! attribute, one record per line, in the format the player reads back.
//!
//! The file is created (or truncated) when the component is built.

use super::file_attribute;
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::codec::write_record;
use crate::measurement::{
    Distance, ErrorPose, ErrorPosition, Matrix3x4f, Payload, Pose, Position, Position2D, Rotation,
};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Recorder<Pose>>("PoseRecorder");
    factory.register::<Recorder<ErrorPose>>("ErrorPoseRecorder");
    factory.register::<Recorder<ErrorPosition>>("ErrorPositionRecorder");
    factory.register::<Recorder<Position>>("PositionRecorder");
    factory.register::<Recorder<Position2D>>("Position2Recorder");
    factory.register::<Recorder<Rotation>>("RotationRecorder");
    factory.register::<Recorder<Distance>>("DistanceRecorder");
    factory.register::<Recorder<Vec<Position>>>("PositionListRecorder");
    factory.register::<Recorder<Vec<Position2D>>>("PositionList2Recorder");
    factory.register::<Recorder<Vec<Pose>>>("PoseListRecorder");
    factory.register::<Recorder<Matrix3x4f>>("Matrix3x4Recorder");
}

pub struct Recorder<T> {
    core: ComponentCore,
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Recorder<T> {
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn flush(&self) {
        if let Err(e) = self.writer.lock().flush() {
            tracing::error!("Could not flush recording {}: {}", self.path.display(), e);
        }
    }
}

impl<T: Payload> Construct for Recorder<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let path = file_attribute(config, "Input")?;
        let file = File::create(&path)
            .inspect_err(|e| tracing::error!("Could not open {} for writing: {}", path.display(), e))?;
        let writer = Arc::new(Mutex::new(BufWriter::new(file)));

        let mut core = ComponentCore::new(config, ctx);
        let w = writer.clone();
        core.push_consumer::<T, _>("Input", move |m| write_record(&mut *w.lock(), &m))?;
        tracing::info!("Recording to {}", path.display());
        Ok(Self {
            core,
            path,
            writer,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Recorder<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_stop(&self) {
        self.flush();
    }
}

impl<T> Drop for Recorder<T> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, Harness};
    use crate::config::EdgeMode;
    use crate::measurement::codec::read_records;
    use crate::measurement::{Measurement, Timestamp};
    use std::io::BufReader;
    use tempfile::tempdir;

    #[test]
    fn test_records_in_arrival_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("track.rec");
        let h = Harness::new();
        let config = SubgraphConfig::new("rec", "PositionRecorder")
            .with_attribute("file", path.display().to_string())
            .with_open_input("Input", EdgeMode::Push);
        let recorder = h.build(&config).unwrap();
        let feed = h.feed::<Position>(recorder.as_ref(), "Input");
        for ms in [10, 20, 30] {
            feed.send(at(ms, Position::new(ms as f64, 0.0, 0.0)));
        }
        recorder.start().unwrap();
        recorder.stop();

        let records: Vec<Measurement<Position>> =
            read_records(BufReader::new(File::open(&path).unwrap())).unwrap();
        let times: Vec<Timestamp> = records.iter().map(Measurement::time).collect();
        assert_eq!(times, vec![Timestamp::from_millis(10), Timestamp::from_millis(20), Timestamp::from_millis(30)]);
        assert_eq!(records[1].value().unwrap().x, 20.0);
    }

    #[test]
    fn test_unwritable_file_fails_build() {
        let dir = tempdir().unwrap();
        let h = Harness::new();
        let config = SubgraphConfig::new("rec", "PoseRecorder")
            .with_attribute("file", dir.path().join("no/such/dir/x.rec").display().to_string());
        assert!(h.build(&config).is_err());
    }
}
