//! Event sources running their own threads.
//!
//! - [`Countdown`]: a button event every `time` seconds, `number` times
//!   (`-1` repeats forever).
//! - [`TestSource`]: noisy synthetic motion around a configured pose,
//!   position or rotation.
//! - [`KeyboardEvent`]: one button event per line read from stdin.
//!
//! All of them push from a [`WorkerSlot`] started with the component.

use crate::config::SubgraphConfig;
use crate::dataflow::{
    BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError,
    DataflowResult, PushSupplier, WorkerSlot,
};
use crate::measurement::{
    Button, FromNumbers, Interpolate, Measurement, Payload, Pose, Position, Rotation, Timestamp,
    NANOS_PER_MILLI,
};
use crossbeam_channel::Receiver;
use nalgebra::{Quaternion, UnitQuaternion};
use parking_lot::Mutex;
use rand::Rng;
use std::io::BufRead;
use std::sync::OnceLock;
use std::time::Duration;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Countdown>("Countdown");
    factory.register::<TestSource<Position>>("TestSourcePosition");
    factory.register::<TestSource<Rotation>>("TestSourceRotation");
    factory.register::<TestSource<Pose>>("TestSourcePose");
    factory.register::<KeyboardEvent>("KeyboardEvent");
}

// ==================== countdown ====================

pub struct Countdown {
    core: ComponentCore,
    output: PushSupplier<Button>,
    interval: Duration,
    number: i64,
    worker: WorkerSlot,
}

impl Construct for Countdown {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let seconds: f64 = config.attr_or("time", 1.0)?;
        if !(seconds >= 0.0 && seconds.is_finite()) {
            return Err(DataflowError::invalid_attribute(
                &config.id,
                "time",
                format!("must not be negative, got {seconds}"),
            ));
        }
        let number: i64 = config.attr_or("number", -1)?;

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<Button>("Output")?;
        Ok(Self {
            core,
            output,
            interval: Duration::from_secs_f64(seconds),
            number,
            worker: WorkerSlot::new(),
        })
    }
}

impl Component for Countdown {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        let output = self.output.clone();
        let span = self.core.span().clone();
        let (interval, number) = (self.interval, self.number);
        self.worker.start(format!("countdown-{}", self.name()), move |stop| {
            let _entered = span.enter();
            let mut remaining = number;
            while remaining != 0 {
                if stop.wait_timeout(interval) {
                    return;
                }
                output.send(Measurement::new(Timestamp::now(), 1));
                if remaining > 0 {
                    remaining -= 1;
                }
            }
            tracing::debug!("Countdown finished");
        })
    }

    fn on_stop(&self) {
        self.worker.stop();
    }
}

// ==================== test source ====================

fn noise<R: Rng>(rng: &mut R) -> f64 {
    rng.gen_range(-1.0..=1.0)
}

fn random_position<R: Rng>(reference: &Position, level: f64, rng: &mut R) -> Position {
    reference + Position::new(noise(rng) * level, noise(rng) * level, noise(rng) * level)
}

/// Small random rotation applied on top of `reference`; the vector part
/// has norm below one so the real part stays defined.
fn random_rotation<R: Rng>(reference: &Rotation, level: f64, rng: &mut R) -> Rotation {
    let mut axis = Position::new(noise(rng) * level, noise(rng) * level, noise(rng) * level);
    let mut norm = axis.norm();
    if norm > 1.0 {
        let shrunk = (noise(rng) + 1.0) / 2.0;
        axis *= shrunk / norm;
        norm = shrunk;
    }
    let w = (1.0 - norm * norm).max(0.0).sqrt();
    reference * UnitQuaternion::new_normalize(Quaternion::new(w, axis.x, axis.y, axis.z))
}

/// Payloads a [`TestSource`] can generate.
pub trait Synthetic: Payload + Interpolate {
    /// Reference value from the `position` / `rotation` attributes.
    fn reference(config: &SubgraphConfig) -> DataflowResult<Self>;

    fn perturb<R: Rng>(&self, position_noise: f64, rotation_noise: f64, rng: &mut R) -> Self;
}

fn numbers_attr<T: FromNumbers>(config: &SubgraphConfig, key: &str, default: T) -> DataflowResult<T> {
    match config.numbers("Output", key)? {
        None => Ok(default),
        Some(values) => T::from_numbers(&values).ok_or_else(|| {
            DataflowError::invalid_attribute(
                &config.id,
                key,
                format!("expected {} numbers, got {}", T::LEN, values.len()),
            )
        }),
    }
}

impl Synthetic for Position {
    fn reference(config: &SubgraphConfig) -> DataflowResult<Self> {
        numbers_attr(config, "position", Position::zeros())
    }

    fn perturb<R: Rng>(&self, position_noise: f64, _: f64, rng: &mut R) -> Self {
        random_position(self, position_noise, rng)
    }
}

impl Synthetic for Rotation {
    fn reference(config: &SubgraphConfig) -> DataflowResult<Self> {
        numbers_attr(config, "rotation", Rotation::identity())
    }

    fn perturb<R: Rng>(&self, _: f64, rotation_noise: f64, rng: &mut R) -> Self {
        random_rotation(self, rotation_noise, rng)
    }
}

impl Synthetic for Pose {
    fn reference(config: &SubgraphConfig) -> DataflowResult<Self> {
        Ok(Pose::new(Rotation::reference(config)?, Position::reference(config)?))
    }

    fn perturb<R: Rng>(&self, position_noise: f64, rotation_noise: f64, rng: &mut R) -> Self {
        Pose::new(
            random_rotation(&self.rotation, rotation_noise, rng),
            random_position(&self.translation, position_noise, rng),
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Motion {
    frequency: f64,
    jerk_ns: u64,
    position_noise: f64,
    rotation_noise: f64,
}

/// Moves between random targets around a reference value. A new target is
/// drawn every `jerktime` milliseconds (default 3000); events are pushed at
/// `frequency` Hz (default 30, 0 disables the thread).
pub struct TestSource<T> {
    core: ComponentCore,
    output: PushSupplier<T>,
    reference: T,
    motion: Motion,
    worker: WorkerSlot,
}

impl<T: Synthetic> Construct for TestSource<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let frequency: f64 = config.attr_or("frequency", 30.0)?;
        if !(frequency >= 0.0 && frequency.is_finite()) {
            return Err(DataflowError::invalid_attribute(
                &config.id,
                "frequency",
                format!("must not be negative, got {frequency}"),
            ));
        }
        let jerk_ms: u64 = config.attr_or("jerktime", 3000)?;
        let motion = Motion {
            frequency,
            jerk_ns: jerk_ms.max(1) * NANOS_PER_MILLI,
            position_noise: config.attr_or("posnoise", 0.1)?,
            rotation_noise: config.attr_or("rotnoise", 0.1)?,
        };
        let reference = T::reference(config)?;

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;
        {
            let _entered = core.span().enter();
            tracing::info!("Test source at {} Hz", frequency);
            tracing::debug!("Noise: {} {}", motion.position_noise, motion.rotation_noise);
        }
        Ok(Self {
            core,
            output,
            reference,
            motion,
            worker: WorkerSlot::new(),
        })
    }
}

impl<T: Synthetic> Component for TestSource<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        if self.motion.frequency == 0.0 {
            return Ok(());
        }
        let output = self.output.clone();
        let span = self.core.span().clone();
        let reference = self.reference.clone();
        let motion = self.motion;
        self.worker.start(format!("test-source-{}", self.name()), move |stop| {
            let _entered = span.enter();
            let mut rng = rand::thread_rng();
            let draw = |rng: &mut rand::rngs::ThreadRng| {
                reference.perturb(motion.position_noise, motion.rotation_noise, rng)
            };
            let mut previous = draw(&mut rng);
            let mut next = draw(&mut rng);
            let mut last = Timestamp::now();
            stop.run_periodic(Duration::from_secs_f64(1.0 / motion.frequency), || {
                let now = Timestamp::now();
                if now.as_nanos() / motion.jerk_ns > last.as_nanos() / motion.jerk_ns {
                    previous = std::mem::replace(&mut next, draw(&mut rng));
                }
                let h = (now.as_nanos() % motion.jerk_ns) as f64 / motion.jerk_ns as f64;
                output.send(Measurement::new(now, previous.interpolate(&next, h)));
                last = now;
            });
        })
    }

    fn on_stop(&self) {
        self.worker.stop();
    }
}

// ==================== keyboard ====================

/// Lines of the process's stdin, read by one shared thread.
fn stdin_lines() -> Receiver<String> {
    static LINES: OnceLock<Receiver<String>> = OnceLock::new();
    LINES
        .get_or_init(|| {
            let (tx, rx) = crossbeam_channel::unbounded();
            let reader = std::thread::Builder::new()
                .name("stdin-lines".to_string())
                .spawn(move || {
                    for line in std::io::stdin().lock().lines() {
                        let Ok(line) = line else { break };
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            if let Err(err) = reader {
                tracing::error!("Cannot read keyboard input: {}", err);
            }
            rx
        })
        .clone()
}

/// Pushes one button per input line: the line's first character, or
/// `button` (default space) for an empty line.
pub struct KeyboardEvent {
    core: ComponentCore,
    output: PushSupplier<Button>,
    empty_line: Button,
    lines: Mutex<Option<Receiver<String>>>,
    worker: WorkerSlot,
}

impl KeyboardEvent {
    /// Read lines from `lines` instead of stdin.
    pub fn with_lines(
        config: &SubgraphConfig,
        ctx: &BuildContext,
        lines: Receiver<String>,
    ) -> DataflowResult<Self> {
        let keyboard = Self::construct(config, ctx)?;
        *keyboard.lines.lock() = Some(lines);
        Ok(keyboard)
    }
}

impl Construct for KeyboardEvent {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let empty_line = config.attr_char("button", ' ')? as Button;
        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<Button>("Output")?;
        Ok(Self {
            core,
            output,
            empty_line,
            lines: Mutex::new(None),
            worker: WorkerSlot::new(),
        })
    }
}

impl Component for KeyboardEvent {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn on_start(&self) -> DataflowResult<()> {
        let lines = self.lines.lock().get_or_insert_with(stdin_lines).clone();
        let output = self.output.clone();
        let span = self.core.span().clone();
        let empty_line = self.empty_line;
        self.worker.start(format!("keyboard-{}", self.name()), move |stop| {
            let _entered = span.enter();
            loop {
                crossbeam_channel::select! {
                    recv(stop.receiver()) -> _ => return,
                    recv(lines) -> line => {
                        let Ok(line) = line else {
                            tracing::debug!("Keyboard input closed");
                            return;
                        };
                        let key = line.chars().next().map_or(empty_line, |c| c as Button);
                        output.send(Measurement::new(Timestamp::now(), key));
                    }
                }
            }
        })
    }

    fn on_stop(&self) {
        self.worker.stop();
    }
}
