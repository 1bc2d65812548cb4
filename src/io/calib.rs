//! Calibration files: one measurement per file.
//!
//! - [`CalibReader`] loads the file when built and answers pulls on
//!   `Output` with the stored value at the requested time.
//! - [`CalibWriter`] stores each measurement pushed to `Input`, writing to
//!   disk at most once per [`CALIB_WRITE_INTERVAL_NS`]; a measurement
//!   that arrives too early is kept and written on stop.
//! - [`PushCalibReaderWriter`] does both, and pushes the stored value on
//!   start.

use super::file_attribute;
use crate::config::{SubgraphConfig, CALIB_WRITE_INTERVAL_NS};
use crate::dataflow::{
    BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError,
    DataflowResult, PushSupplier,
};
use crate::measurement::codec::{read_records, write_record};
use crate::measurement::{
    Distance, ErrorPose, ErrorPosition, Matrix3x3, Matrix3x4f, Matrix4x4, Measurement, Payload, Pose,
    Position, Position2D, Rotation, Timestamp, Vector4d,
};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    register_family::<Distance>(factory, "Distance");
    register_family::<Pose>(factory, "Pose");
    register_family::<ErrorPose>(factory, "ErrorPose");
    register_family::<ErrorPosition>(factory, "ErrorPosition");
    register_family::<Position>(factory, "Position");
    register_family::<Rotation>(factory, "Rotation");
    register_family::<Matrix3x3>(factory, "Matrix3x3");
    register_family::<Matrix3x4f>(factory, "Matrix3x4");
    register_family::<Matrix4x4>(factory, "Matrix4x4");
    register_family::<Vector4d>(factory, "Vector4");
    register_family::<Vec<Position>>(factory, "PositionList");
    register_family::<Vec<Position2D>>(factory, "PositionList2D");
    register_family::<Vec<Pose>>(factory, "PoseList");
    register_family::<Vec<Distance>>(factory, "DistanceList");
}

fn register_family<T: Payload>(factory: &mut ComponentFactory, prefix: &str) {
    factory.register::<CalibReader<T>>(&format!("{prefix}CalibReader"));
    factory.register::<CalibWriter<T>>(&format!("{prefix}CalibWriter"));
    factory.register::<PushCalibReaderWriter<T>>(&format!("{prefix}PushCalibReaderWriter"));
}

/// Read the measurement stored in `path`. A file with several records
/// yields the last one.
pub fn read_calib_file<T: Payload>(path: &Path) -> DataflowResult<Measurement<T>> {
    let file = File::open(path)?;
    read_records::<T, _>(BufReader::new(file))?
        .pop()
        .ok_or_else(|| DataflowError::Serialization(format!("{} holds no measurement", path.display())))
}

/// Replace the contents of `path` with `measurement`.
pub fn write_calib_file<T: Payload>(path: &Path, measurement: &Measurement<T>) -> DataflowResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_record(&mut writer, measurement)?;
    writer.flush()?;
    Ok(())
}

/// Rate-limited writes of the latest measurement to one file.
struct CalibStore<T> {
    path: PathBuf,
    last_written: Option<Timestamp>,
    pending: Option<Measurement<T>>,
}

impl<T: Payload> CalibStore<T> {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_written: None,
            pending: None,
        }
    }

    /// No write yet, or the last one is at least the write interval older
    /// than `time`.
    fn write_due(&self, time: Timestamp) -> bool {
        match self.last_written {
            None => true,
            Some(last) => time.nanos_since(last) >= CALIB_WRITE_INTERVAL_NS as i64,
        }
    }

    /// Write `measurement` now if the interval has passed, otherwise keep
    /// it for [`CalibStore::flush`].
    fn offer(&mut self, measurement: Measurement<T>) -> DataflowResult<()> {
        if !self.write_due(measurement.time()) {
            self.pending = Some(measurement);
            return Ok(());
        }
        write_calib_file(&self.path, &measurement)?;
        tracing::debug!("Wrote calibration to {}", self.path.display());
        self.last_written = Some(measurement.time());
        self.pending = None;
        Ok(())
    }

    fn flush(&mut self) {
        let Some(measurement) = self.pending.take() else {
            return;
        };
        match write_calib_file(&self.path, &measurement) {
            Ok(()) => {
                tracing::debug!("Wrote pending calibration to {}", self.path.display());
                self.last_written = Some(measurement.time());
            }
            Err(e) => tracing::error!("Could not write {}: {}", self.path.display(), e),
        }
    }
}

// ==================== reader ====================

pub struct CalibReader<T> {
    core: ComponentCore,
    stored: Measurement<T>,
}

impl<T> CalibReader<T> {
    /// The measurement read from the file.
    pub fn stored(&self) -> &Measurement<T> {
        &self.stored
    }
}

impl<T: Payload> Construct for CalibReader<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let path = file_attribute(config, "Output")?;
        let stored = read_calib_file::<T>(&path)
            .inspect_err(|e| tracing::error!("Could not read calibration {}: {}", path.display(), e))?;
        tracing::info!("Read calibration from {}", path.display());

        let mut core = ComponentCore::new(config, ctx);
        let value = stored.clone();
        core.pull_supplier::<T, _>("Output", move |t| Ok(value.retimed(t)))?;
        Ok(Self { core, stored })
    }
}

impl<T: Payload> Component for CalibReader<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

// ==================== writer ====================

pub struct CalibWriter<T: Payload> {
    core: ComponentCore,
    store: Arc<Mutex<CalibStore<T>>>,
}

impl<T: Payload> Construct for CalibWriter<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let store = Arc::new(Mutex::new(CalibStore::new(file_attribute(config, "Input")?)));
        let mut core = ComponentCore::new(config, ctx);
        let s = store.clone();
        core.push_consumer::<T, _>("Input", move |m| s.lock().offer(m))?;
        Ok(Self { core, store })
    }
}

impl<T: Payload> Component for CalibWriter<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_stop(&self) {
        self.store.lock().flush();
    }
}

impl<T: Payload> Drop for CalibWriter<T> {
    fn drop(&mut self) {
        self.store.lock().flush();
    }
}

// ==================== push reader / writer ====================

struct Latest<T> {
    store: CalibStore<T>,
    current: Option<Measurement<T>>,
}

pub struct PushCalibReaderWriter<T: Payload> {
    core: ComponentCore,
    output: PushSupplier<T>,
    state: Arc<Mutex<Latest<T>>>,
}

impl<T: Payload> PushCalibReaderWriter<T> {
    /// The value currently held, if any.
    pub fn current(&self) -> Option<Measurement<T>> {
        self.state.lock().current.clone()
    }
}

impl<T: Payload> Construct for PushCalibReaderWriter<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let path = file_attribute(config, "Input")?;
        let current = match read_calib_file::<T>(&path) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::info!("No stored calibration in {}: {}", path.display(), e);
                None
            }
        };
        let mut store = CalibStore::new(path);
        store.last_written = current.as_ref().map(Measurement::time);
        let state = Arc::new(Mutex::new(Latest { store, current }));

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;
        let (s, out) = (state.clone(), output.clone());
        core.push_consumer::<T, _>("Input", move |m| {
            let result = {
                let mut latest = s.lock();
                latest.current = Some(m.clone());
                latest.store.offer(m.clone())
            };
            out.send(m);
            result
        })?;
        let s = state.clone();
        core.pull_supplier::<T, _>("OutputPull", move |t| {
            s.lock()
                .current
                .as_ref()
                .map(|m| m.retimed(t))
                .ok_or_else(|| DataflowError::NoData("no calibration stored yet".to_string()))
        })?;
        Ok(Self { core, output, state })
    }
}

impl<T: Payload> Component for PushCalibReaderWriter<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        let stored = self.state.lock().current.clone();
        if let Some(m) = stored {
            self.output.send(m.retimed(Timestamp::now()));
        }
        Ok(())
    }

    fn on_stop(&self) {
        self.state.lock().store.flush();
    }
}

impl<T: Payload> Drop for PushCalibReaderWriter<T> {
    fn drop(&mut self) {
        self.state.lock().store.flush();
    }
}
