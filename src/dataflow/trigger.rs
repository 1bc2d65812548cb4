//! Join components.
//!
//! A [`TriggerComponent`] gathers several named inputs and runs one
//! computation per round. Push inputs keep their latest value between
//! rounds; pull inputs are pulled lazily at the round time when the
//! computation asks for them.
//!
//! A round starts in one of two ways:
//!
//! - **push**: a push input receives a measurement, the component has at
//!   least one push output and every push input holds a value. If any input
//!   is marked as a completion signal, only those inputs start rounds.
//! - **pull**: one of the component's pull outputs is pulled.
//!
//! Buffered state changes under the component's round lock; results written
//! to push outputs are sent after the lock is released, so a downstream
//! push that loops back into the component cannot deadlock.
//!
//! [`ExpansionInPort`] presents a list view of one logical input, either
//! carried directly on a list edge, collected across numbered edges
//! (`Input`, `1_Input`, `2_Input`, ...) or accumulated over time.

use super::component::{BuildContext, Component, ComponentCore};
use super::error::{DataflowError, DataflowResult};
use super::expansion::{payloads, TimeAccumulator, TimePolicy};
use super::port::{PullConsumer, PushSupplier};
use crate::config::{EdgeMode, SubgraphConfig};
use crate::measurement::{Measurement, Payload, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type ComputeFn = Box<dyn Fn(Timestamp) -> DataflowResult<()> + Send + Sync>;
type OutputDelivery = Box<dyn FnOnce() + Send>;

trait InputSlot: Send + Sync {
    fn is_push(&self) -> bool;
    fn is_completion(&self) -> bool;
    fn is_ready(&self) -> bool;
    fn begin_round(&self, time: Timestamp);
    fn end_round(&self, success: bool);
}

trait OutputSlot: Send + Sync {
    fn is_push(&self) -> bool;
    fn take_delivery(&self) -> Option<OutputDelivery>;
    fn discard(&self);
}

#[derive(Default)]
struct TriggerShared {
    round: Mutex<()>,
    compute: RwLock<Option<ComputeFn>>,
    inputs: RwLock<Vec<Arc<dyn InputSlot>>>,
    outputs: RwLock<Vec<Arc<dyn OutputSlot>>>,
    rounds: AtomicU64,
}

impl TriggerShared {
    fn run_round(&self, time: Timestamp) -> DataflowResult<()> {
        let inputs = self.inputs.read();
        for input in inputs.iter() {
            input.begin_round(time);
        }
        let result = match self.compute.read().as_ref() {
            Some(compute) => compute(time),
            None => Err(DataflowError::Compute("no computation registered".to_string())),
        };
        for input in inputs.iter() {
            input.end_round(result.is_ok());
        }
        if result.is_ok() {
            self.rounds.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn should_fire(&self, completion: bool) -> bool {
        if !self.outputs.read().iter().any(|o| o.is_push()) {
            return false;
        }
        let inputs = self.inputs.read();
        if !completion && inputs.iter().any(|i| i.is_completion()) {
            return false;
        }
        inputs.iter().filter(|i| i.is_push()).all(|i| i.is_ready())
    }

    fn on_push(&self, completion: bool, time: Timestamp, store: impl FnOnce()) -> DataflowResult<()> {
        let deliveries: Vec<OutputDelivery> = {
            let _round = self.round.lock();
            store();
            if !self.should_fire(completion) {
                return Ok(());
            }
            let result = self.run_round(time);
            let outputs = self.outputs.read();
            if let Err(err) = result {
                outputs.iter().for_each(|o| o.discard());
                return Err(err);
            }
            outputs.iter().filter_map(|o| o.take_delivery()).collect()
        };
        for deliver in deliveries {
            deliver();
        }
        Ok(())
    }

    fn pull_round<T: Payload>(
        &self,
        time: Timestamp,
        output: &TriggerOutInner<T>,
    ) -> DataflowResult<Measurement<T>> {
        let _round = self.round.lock();
        let result = self.run_round(time);
        let value = output.pending.lock().take();
        self.outputs.read().iter().for_each(|o| o.discard());
        result?;
        value.ok_or_else(|| DataflowError::NoData(format!("no value computed for {}", output.name)))
    }
}

// ==================== inputs ====================

enum InputSource<T> {
    Push,
    Pull(PullConsumer<T>),
}

struct TriggerInInner<T> {
    name: String,
    completion: bool,
    source: InputSource<T>,
    current: Mutex<Option<Measurement<T>>>,
    accumulator: Option<Mutex<TimeAccumulator<T>>>,
    round_time: AtomicU64,
}

impl<T: Payload> TriggerInInner<T> {
    fn store(&self, measurement: Measurement<T>) {
        match &self.accumulator {
            Some(acc) => acc.lock().push(measurement),
            None => *self.current.lock() = Some(measurement),
        }
    }

    fn round_time(&self) -> Timestamp {
        Timestamp::from_nanos(self.round_time.load(Ordering::Relaxed))
    }
}

impl<T: Payload> InputSlot for TriggerInInner<T> {
    fn is_push(&self) -> bool {
        matches!(self.source, InputSource::Push)
    }

    fn is_completion(&self) -> bool {
        self.completion
    }

    fn is_ready(&self) -> bool {
        match &self.accumulator {
            Some(acc) => !acc.lock().is_empty(),
            None => self.current.lock().is_some(),
        }
    }

    fn begin_round(&self, time: Timestamp) {
        self.round_time.store(time.as_nanos(), Ordering::Relaxed);
    }

    fn end_round(&self, success: bool) {
        if success {
            if let Some(acc) = &self.accumulator {
                acc.lock().consumed();
            }
        }
    }
}

/// One input of a trigger component.
pub struct TriggerInPort<T> {
    inner: Arc<TriggerInInner<T>>,
}

impl<T> Clone for TriggerInPort<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> TriggerInPort<T> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The value for the current round: the latest pushed measurement, or
    /// the result of pulling at the round time.
    pub fn get(&self) -> DataflowResult<Measurement<T>> {
        match &self.inner.source {
            InputSource::Pull(consumer) => consumer.get(self.inner.round_time()),
            InputSource::Push => self
                .inner
                .current
                .lock()
                .clone()
                .ok_or_else(|| DataflowError::NoData(format!("nothing received on {}", self.inner.name))),
        }
    }

    /// Payload of [`Self::get`].
    pub fn value(&self) -> DataflowResult<T> {
        self.get()?.value().cloned()
    }

    fn accumulated(&self) -> DataflowResult<Vec<Measurement<T>>> {
        match &self.inner.accumulator {
            Some(acc) => acc.lock().snapshot(self.inner.round_time()),
            None => Ok(vec![self.get()?]),
        }
    }
}

/// How an [`ExpansionInPort`] obtains its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionMode {
    /// The edge itself carries a list.
    #[default]
    None,
    /// One single-valued edge per list element.
    Space,
    /// Successive values of one edge.
    Time,
}

impl ExpansionMode {
    fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
        match config.attributes.text("expansion").as_deref() {
            None | Some("none") => Ok(ExpansionMode::None),
            Some("space") => Ok(ExpansionMode::Space),
            Some("time") => Ok(ExpansionMode::Time),
            Some(other) => Err(DataflowError::invalid_attribute(
                &config.id,
                "expansion",
                format!("expected none, space or time, got '{other}'"),
            )),
        }
    }
}

enum Expansion<T> {
    List(TriggerInPort<Vec<T>>),
    Space(Vec<TriggerInPort<T>>),
    Time(TriggerInPort<T>),
}

/// A list-valued logical input.
pub struct ExpansionInPort<T> {
    expansion: Expansion<T>,
}

impl<T: Payload> ExpansionInPort<T> {
    pub fn mode(&self) -> ExpansionMode {
        match self.expansion {
            Expansion::List(_) => ExpansionMode::None,
            Expansion::Space(_) => ExpansionMode::Space,
            Expansion::Time(_) => ExpansionMode::Time,
        }
    }

    /// The list for the current round.
    pub fn get(&self) -> DataflowResult<Measurement<Vec<T>>> {
        match &self.expansion {
            Expansion::List(port) => port.get(),
            Expansion::Space(ports) => {
                let time = ports.first().map_or(Timestamp::ZERO, |p| p.inner.round_time());
                let values = ports
                    .iter()
                    .map(TriggerInPort::value)
                    .collect::<DataflowResult<Vec<T>>>()?;
                Ok(Measurement::new(time, values))
            }
            Expansion::Time(port) => {
                let list = port.accumulated()?;
                Ok(Measurement::new(port.inner.round_time(), payloads(&list)?))
            }
        }
    }

    /// Payload of [`Self::get`].
    pub fn values(&self) -> DataflowResult<Vec<T>> {
        Ok(self.get()?.value()?.clone())
    }
}

// ==================== outputs ====================

struct TriggerOutInner<T> {
    name: String,
    pending: Mutex<Option<Measurement<T>>>,
    supplier: Option<PushSupplier<T>>,
}

impl<T: Payload> OutputSlot for TriggerOutInner<T> {
    fn is_push(&self) -> bool {
        self.supplier.is_some()
    }

    fn take_delivery(&self) -> Option<OutputDelivery> {
        let measurement = self.pending.lock().take()?;
        let supplier = self.supplier.clone()?;
        Some(Box::new(move || supplier.send(measurement)))
    }

    fn discard(&self) {
        self.pending.lock().take();
    }
}

/// One output of a trigger component. Values written during a round are
/// pushed after the round, or returned to the pulling consumer.
pub struct TriggerOutPort<T> {
    inner: Arc<TriggerOutInner<T>>,
}

impl<T> Clone for TriggerOutPort<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> TriggerOutPort<T> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn send(&self, measurement: Measurement<T>) {
        *self.inner.pending.lock() = Some(measurement);
    }

    pub fn is_push(&self) -> bool {
        self.inner.supplier.is_some()
    }
}

// ==================== component ====================

/// Join component running a registered computation per round.
pub struct TriggerComponent {
    core: ComponentCore,
    config: SubgraphConfig,
    expansion: ExpansionMode,
    shared: Arc<TriggerShared>,
}

impl TriggerComponent {
    pub fn new(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        Ok(Self {
            core: ComponentCore::new(config, ctx),
            config: config.clone(),
            expansion: ExpansionMode::from_config(config)?,
            shared: Arc::new(TriggerShared::default()),
        })
    }

    pub fn config(&self) -> &SubgraphConfig {
        &self.config
    }

    pub fn expansion(&self) -> ExpansionMode {
        self.expansion
    }

    /// Number of successful computations so far.
    pub fn rounds(&self) -> u64 {
        self.shared.rounds.load(Ordering::Relaxed)
    }

    /// Register the computation. `compute(t)` reads inputs through their
    /// ports and writes results to output ports.
    pub fn set_compute<F>(&self, compute: F)
    where
        F: Fn(Timestamp) -> DataflowResult<()> + Send + Sync + 'static,
    {
        *self.shared.compute.write() = Some(Box::new(compute));
    }

    /// Input whose mode follows the edge configuration (push by default).
    /// An edge attribute `completion = true` makes it a completion signal.
    pub fn input<T: Payload>(&mut self, name: &str) -> DataflowResult<TriggerInPort<T>> {
        let completion = self.config.edge_attr_or(name, "completion", false)?;
        self.add_input(name, completion, None)
    }

    /// Push input that alone starts rounds, together with any other
    /// completion inputs.
    pub fn completion_input<T: Payload>(&mut self, name: &str) -> DataflowResult<TriggerInPort<T>> {
        self.add_input(name, true, None)
    }

    /// List input, expanded as configured by the `expansion` attribute.
    pub fn expansion_input<T: Payload>(&mut self, name: &str) -> DataflowResult<ExpansionInPort<T>> {
        let expansion = match self.expansion {
            ExpansionMode::None => Expansion::List(self.input::<Vec<T>>(name)?),
            ExpansionMode::Time => {
                return self.time_expansion_input(name, TimePolicy::UntilConsumed);
            }
            ExpansionMode::Space => {
                let mut edges: Vec<(usize, String)> = self
                    .config
                    .inputs()
                    .filter_map(|e| space_index(&e.name, name).map(|i| (i, e.name.clone())))
                    .collect();
                if edges.is_empty() {
                    return Err(DataflowError::NoSuchPort {
                        component: self.config.id.clone(),
                        port: name.to_string(),
                    });
                }
                edges.sort();
                let ports = edges
                    .iter()
                    .map(|(_, edge)| self.input::<T>(edge))
                    .collect::<DataflowResult<Vec<_>>>()?;
                Expansion::Space(ports)
            }
        };
        Ok(ExpansionInPort { expansion })
    }

    /// Push input accumulating single measurements into a list.
    pub fn time_expansion_input<T: Payload>(
        &mut self,
        name: &str,
        policy: TimePolicy,
    ) -> DataflowResult<ExpansionInPort<T>> {
        let completion = self.config.edge_attr_or(name, "completion", false)?;
        let port = self.add_input(name, completion, Some(policy))?;
        Ok(ExpansionInPort {
            expansion: Expansion::Time(port),
        })
    }

    fn add_input<T: Payload>(
        &mut self,
        name: &str,
        completion: bool,
        policy: Option<TimePolicy>,
    ) -> DataflowResult<TriggerInPort<T>> {
        let mode = self.config.edge_mode(name, EdgeMode::Push);
        let source = match mode {
            EdgeMode::Push => InputSource::Push,
            EdgeMode::Pull if policy.is_some() => {
                return Err(DataflowError::invalid_attribute(
                    &self.config.id,
                    name,
                    "time expansion needs a push edge",
                ));
            }
            EdgeMode::Pull => InputSource::Pull(self.core.pull_consumer::<T>(name)?),
        };
        let inner = Arc::new(TriggerInInner {
            name: name.to_string(),
            completion: completion && mode == EdgeMode::Push,
            source,
            current: Mutex::new(None),
            accumulator: policy.map(|p| Mutex::new(TimeAccumulator::new(p))),
            round_time: AtomicU64::new(0),
        });

        if mode == EdgeMode::Push {
            let slot = inner.clone();
            let shared = self.shared.clone();
            let completion = inner.completion;
            self.core.push_consumer::<T, _>(name, move |m| {
                let time = m.time();
                shared.on_push(completion, time, || slot.store(m))
            })?;
        }
        self.shared.inputs.write().push(inner.clone());
        Ok(TriggerInPort { inner })
    }

    /// Output whose mode follows the edge configuration (push by default).
    pub fn output<T: Payload>(&mut self, name: &str) -> DataflowResult<TriggerOutPort<T>> {
        let mode = self.config.edge_mode(name, EdgeMode::Push);
        let supplier = match mode {
            EdgeMode::Push => Some(self.core.push_supplier::<T>(name)?),
            EdgeMode::Pull => None,
        };
        let inner = Arc::new(TriggerOutInner {
            name: name.to_string(),
            pending: Mutex::new(None),
            supplier,
        });
        if mode == EdgeMode::Pull {
            let shared = self.shared.clone();
            let out = inner.clone();
            self.core
                .pull_supplier::<T, _>(name, move |t| shared.pull_round(t, &out))?;
        }
        self.shared.outputs.write().push(inner.clone());
        Ok(TriggerOutPort { inner })
    }
}

/// Index of `edge` within the space expansion of `base`: `base` is 0,
/// `N_base` is N.
fn space_index(edge: &str, base: &str) -> Option<usize> {
    if edge == base {
        return Some(0);
    }
    let (index, rest) = edge.split_once('_')?;
    (rest == base).then(|| index.parse().ok()).flatten()
}

impl Component for TriggerComponent {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
