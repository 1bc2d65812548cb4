//! Player: replays recordings at their original pace.
//!
//! Every player component loads one recording into memory when built. All
//! players share one [`PlayerModule`], whose thread keeps their relative
//! timing: playback starts with the earliest recorded event, a fixed delay
//! after the module starts, and each event is pushed with the real time
//!
//! ```text
//! real = (t - record_start + offset) / speedup + playback_start
//! ```
//!
//! `offset` (ms) and `speedup` are attributes of the `Output` edge, as is
//! the `file` that keys the component within the module.

use super::file_attribute;
use crate::config::{SubgraphConfig, PLAYBACK_START_DELAY_MS};
use crate::dataflow::{
    BuildContext, Component, ComponentCore, ComponentFactory, ComponentTable, DataflowError, DataflowResult,
    Module, ModuleHandle, PushSupplier, StopSignal, WorkerSlot,
};
use crate::measurement::codec::read_records;
use crate::measurement::{
    ErrorPose, ErrorPosition, Measurement, Payload, Pose, Position, Position2D, Rotation, Timestamp,
    NANOS_PER_MILLI,
};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

const PLAYER_CLASSES: [&str; 9] = [
    "PlayerPose",
    "PlayerErrorPose",
    "PlayerErrorPosition",
    "PlayerRotation",
    "PlayerPosition",
    "PlayerPosition2",
    "PlayerPositionList",
    "PlayerPositionList2",
    "PlayerPoseList",
];

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register_module::<PlayerModule>(&PLAYER_CLASSES);
}

/// Mapping from recorded to real time, shared by all players of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    pub record_start: Timestamp,
    pub playback_start: Timestamp,
}

/// A player as seen by the module thread.
pub trait Replay: Component {
    /// Recorded time of the first event, shifted by the offset.
    fn first_time(&self) -> Option<Timestamp>;

    /// Real time of the next event not yet sent.
    fn next_time(&self, clock: &PlaybackClock) -> Option<Timestamp>;

    /// Push every event due at `now`; returns the real time of the next one.
    fn send_due(&self, clock: &PlaybackClock, now: Timestamp) -> Option<Timestamp>;
}

pub struct PlayerModule {
    players: Arc<ComponentTable<String, dyn Replay>>,
    start_delay: Duration,
    worker: WorkerSlot,
}

impl Module for PlayerModule {
    type Key = ();

    fn module_key(_config: &SubgraphConfig) -> DataflowResult<()> {
        Ok(())
    }

    fn create(_key: &(), config: &SubgraphConfig, _ctx: &BuildContext) -> DataflowResult<Self> {
        let delay_ms: u64 = config.attr_or("startDelay", PLAYBACK_START_DELAY_MS)?;
        Ok(Self {
            players: Arc::new(ComponentTable::new()),
            start_delay: Duration::from_millis(delay_ms),
            worker: WorkerSlot::new(),
        })
    }

    fn create_component(
        module: &Arc<ModuleHandle<Self>>,
        config: &SubgraphConfig,
        ctx: &BuildContext,
    ) -> DataflowResult<Arc<dyn Component>> {
        match config.class.as_str() {
            "PlayerPose" => Player::<Pose>::attach(module, config, ctx),
            "PlayerErrorPose" => Player::<ErrorPose>::attach(module, config, ctx),
            "PlayerErrorPosition" => Player::<ErrorPosition>::attach(module, config, ctx),
            "PlayerRotation" => Player::<Rotation>::attach(module, config, ctx),
            "PlayerPosition" => Player::<Position>::attach(module, config, ctx),
            "PlayerPosition2" => Player::<Position2D>::attach(module, config, ctx),
            "PlayerPositionList" => Player::<Vec<Position>>::attach(module, config, ctx),
            "PlayerPositionList2" => Player::<Vec<Position2D>>::attach(module, config, ctx),
            "PlayerPoseList" => Player::<Vec<Pose>>::attach(module, config, ctx),
            other => Err(DataflowError::UnknownComponentType(format!(
                "{other} is not supported by the player module"
            ))),
        }
    }

    fn start_module(&self) -> DataflowResult<()> {
        let players = self.players.clone();
        let delay = self.start_delay;
        self.worker.start("player", move |stop| playback(&players, &stop, delay))
    }

    fn stop_module(&self) {
        self.worker.stop();
    }
}

fn earliest(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Module thread body.
fn playback(players: &ComponentTable<String, dyn Replay>, stop: &StopSignal, delay: Duration) {
    let Some(record_start) = players
        .snapshot()
        .iter()
        .filter_map(|(_, p)| p.first_time())
        .min()
    else {
        tracing::info!("Nothing to play");
        return;
    };
    let clock = PlaybackClock {
        record_start,
        playback_start: Timestamp::now() + delay,
    };
    tracing::debug!(record_start = %clock.record_start, playback_start = %clock.playback_start, "Starting playback");

    let mut next = players
        .snapshot()
        .iter()
        .fold(None, |next, (_, p)| earliest(next, p.next_time(&clock)));
    while let Some(due) = next {
        if stop.wait_until(due) {
            return;
        }
        let now = Timestamp::now();
        next = players
            .snapshot()
            .iter()
            .fold(None, |next, (_, p)| earliest(next, p.send_due(&clock, now)));
    }
    tracing::info!("Playback finished");
}

pub struct Player<T: Payload> {
    core: ComponentCore,
    key: String,
    offset_ns: i64,
    speedup: f64,
    events: Vec<Measurement<T>>,
    cursor: Mutex<usize>,
    output: PushSupplier<T>,
    module: Arc<ModuleHandle<PlayerModule>>,
}

impl<T: Payload> Player<T> {
    fn attach(
        module: &Arc<ModuleHandle<PlayerModule>>,
        config: &SubgraphConfig,
        ctx: &BuildContext,
    ) -> DataflowResult<Arc<dyn Component>> {
        let path = file_attribute(config, "Output")?;
        let offset_ms: i64 = config.edge_attr_or("Output", "offset", 0)?;
        let speedup: f64 = config.edge_attr_or("Output", "speedup", 1.0)?;
        if !(speedup > 0.0 && speedup.is_finite()) {
            return Err(DataflowError::invalid_attribute(
                &config.id,
                "speedup",
                format!("must be positive, got {speedup}"),
            ));
        }

        let file = File::open(&path)
            .inspect_err(|e| tracing::error!("Could not open recording {}: {}", path.display(), e))?;
        let mut events: Vec<Measurement<T>> = read_records(BufReader::new(file))?;
        events.sort_by(Measurement::time_order);
        tracing::info!("Loaded {} events from {}", events.len(), path.display());

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;
        let key = path.display().to_string();
        let player = Arc::new(Self {
            core,
            key: key.clone(),
            offset_ns: offset_ms.saturating_mul(NANOS_PER_MILLI as i64),
            speedup,
            events,
            cursor: Mutex::new(0),
            output,
            module: module.clone(),
        });
        let replay: Arc<dyn Replay> = player.clone();
        module.players.register(key, &replay)?;
        Ok(player)
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn real_time(&self, recorded: Timestamp, clock: &PlaybackClock) -> Timestamp {
        let since_start = recorded.nanos_since(clock.record_start).saturating_add(self.offset_ns);
        clock.playback_start.offset_nanos((since_start as f64 / self.speedup) as i64)
    }
}

impl<T: Payload> Component for Player<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        self.module.ensure_started()
    }
}

impl<T: Payload> Replay for Player<T> {
    fn first_time(&self) -> Option<Timestamp> {
        self.events.first().map(|m| m.time().offset_nanos(self.offset_ns))
    }

    fn next_time(&self, clock: &PlaybackClock) -> Option<Timestamp> {
        let cursor = *self.cursor.lock();
        self.events.get(cursor).map(|m| self.real_time(m.time(), clock))
    }

    fn send_due(&self, clock: &PlaybackClock, now: Timestamp) -> Option<Timestamp> {
        // advance under the lock, deliver after releasing it
        let (due, next) = {
            let mut cursor = self.cursor.lock();
            let first = *cursor;
            let mut next = None;
            while let Some(event) = self.events.get(*cursor) {
                let real = self.real_time(event.time(), clock);
                if real > now {
                    next = Some(real);
                    break;
                }
                *cursor += 1;
            }
            (first..*cursor, next)
        };
        let advanced = !due.is_empty();
        for event in &self.events[due] {
            self.output.send(event.retimed(self.real_time(event.time(), clock)));
        }
        if advanced && next.is_none() {
            tracing::info!("{} reached end of recording", self.name());
        }
        next
    }
}

impl<T: Payload> Drop for Player<T> {
    fn drop(&mut self) {
        self.module.players.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeMode;
    use crate::dataflow::{EventQueue, ModuleRegistry, PortOwner, PushConsumer};
    use crate::measurement::codec::write_record;
    use std::path::Path;
    use std::time::Instant;
    use tempfile::tempdir;

    fn record(path: &Path, times_ms: &[u64]) {
        let mut file = File::create(path).unwrap();
        for &ms in times_ms {
            let m = Measurement::new(Timestamp::from_millis(ms), Position::new(ms as f64, 0.0, 0.0));
            write_record(&mut file, &m).unwrap();
        }
    }

    fn player_config(id: &str, path: &Path) -> SubgraphConfig {
        SubgraphConfig::new(id, "PlayerPosition")
            .with_attribute("startDelay", 0i64)
            .with_output("Output", EdgeMode::Push)
            .with_edge_attribute("file", path.display().to_string())
    }

    #[test]
    fn test_real_time_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rec");
        record(&path, &[1_000, 1_200]);

        let config = player_config("p", &path)
            .with_edge_attribute("offset", 100i64)
            .with_edge_attribute("speedup", 2.0);
        let ctx = BuildContext::standalone();
        let registry = ModuleRegistry::<PlayerModule>::new();
        let module = registry.obtain(&config, &ctx).unwrap();
        let _player = PlayerModule::create_component(&module, &config, &ctx).unwrap();
        let (key, replay) = module.players.snapshot().remove(0);
        assert_eq!(key, path.display().to_string());

        let clock = PlaybackClock {
            record_start: Timestamp::from_millis(1_000),
            playback_start: Timestamp::from_millis(50_000),
        };
        assert_eq!(replay.first_time(), Some(Timestamp::from_millis(1_100)));
        // (1000 - 1000 + 100) / 2 + 50000
        assert_eq!(replay.next_time(&clock), Some(Timestamp::from_millis(50_050)));
        assert_eq!(
            replay.send_due(&clock, Timestamp::from_millis(50_100)),
            Some(Timestamp::from_millis(50_150))
        );
        assert_eq!(replay.send_due(&clock, Timestamp::from_millis(50_150)), None);
    }

    #[test]
    fn test_handler_can_query_player_during_delivery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rec");
        record(&path, &[1_000, 1_100, 1_200]);

        let config = player_config("p", &path);
        let ctx = BuildContext::standalone();
        let registry = ModuleRegistry::<PlayerModule>::new();
        let module = registry.obtain(&config, &ctx).unwrap();
        let player = PlayerModule::create_component(&module, &config, &ctx).unwrap();
        let (_, replay) = module.players.snapshot().remove(0);

        let clock = PlaybackClock {
            record_start: Timestamp::from_millis(1_000),
            playback_start: Timestamp::from_millis(5_000),
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s, weak) = (seen.clone(), Arc::downgrade(&replay));
        let sink = PushConsumer::<Position>::new("in", PortOwner::detached("sink"), move |m| {
            let next = weak.upgrade().and_then(|r| r.next_time(&clock));
            s.lock().push((m.time(), next));
            Ok(())
        });
        let out: PushSupplier<Position> = player.ports().typed(player.name(), "Output").unwrap();
        out.connect(&sink).unwrap();

        assert_eq!(replay.send_due(&clock, Timestamp::from_millis(5_100)), Some(Timestamp::from_millis(5_200)));
        let seen = seen.lock();
        let times: Vec<Timestamp> = seen.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![Timestamp::from_millis(5_000), Timestamp::from_millis(5_100)]);
        // the cursor has already moved past everything being delivered
        assert!(seen.iter().all(|(_, next)| *next == Some(Timestamp::from_millis(5_200))));
    }

    #[test]
    fn test_speedup_must_be_positive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rec");
        record(&path, &[1]);
        let factory = ComponentFactory::with_builtins();
        let config = player_config("p", &path).with_edge_attribute("speedup", 0.0);
        assert!(matches!(
            factory.create(&config, &BuildContext::standalone()),
            Err(DataflowError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_players_keep_relative_timing() {
        let dir = tempdir().unwrap();
        let (a, b) = (dir.path().join("a.rec"), dir.path().join("b.rec"));
        record(&a, &[1_000, 1_200]);
        record(&b, &[1_100]);

        let queue = EventQueue::inline();
        let ctx = BuildContext::new(queue.clone());
        let factory = ComponentFactory::with_builtins();
        let pa = factory.create(&player_config("a", &a), &ctx).unwrap();
        let pb = factory.create(&player_config("b", &b), &ctx).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let owner = PortOwner::detached("sink");
        for player in [&pa, &pb] {
            let s = seen.clone();
            let sink = PushConsumer::<Position>::new("in", owner.clone(), move |m| {
                s.lock().push(m);
                Ok(())
            });
            let out: PushSupplier<Position> = player.ports().typed(player.name(), "Output").unwrap();
            out.connect(&sink).unwrap();
        }

        let started = Instant::now();
        pa.start().unwrap();
        pb.start().unwrap();
        while seen.lock().len() < 3 && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        pa.stop();
        pb.stop();

        let seen = seen.lock();
        let xs: Vec<f64> = seen.iter().map(|m| m.value().unwrap().x).collect();
        assert_eq!(xs, vec![1_000.0, 1_100.0, 1_200.0]);
        assert_eq!(seen[1].time().nanos_since(seen[0].time()), 100 * NANOS_PER_MILLI as i64);
        assert_eq!(seen[2].time().nanos_since(seen[0].time()), 200 * NANOS_PER_MILLI as i64);
    }

    #[test]
    fn test_same_file_twice_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rec");
        record(&path, &[1]);
        let factory = ComponentFactory::with_builtins();
        let ctx = BuildContext::standalone();
        let _first = factory.create(&player_config("a", &path), &ctx).unwrap();
        assert!(factory.create(&player_config("b", &path), &ctx).is_err());
    }

    #[test]
    fn test_factories_do_not_share_player_modules() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rec");
        record(&path, &[1]);
        let ctx = BuildContext::standalone();
        let first = ComponentFactory::with_builtins();
        let second = ComponentFactory::with_builtins();
        let _a = first.create(&player_config("a", &path), &ctx).unwrap();
        let _b = second.create(&player_config("b", &path), &ctx).unwrap();
    }
}
