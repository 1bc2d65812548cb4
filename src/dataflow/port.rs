//! Typed ports.
//!
//! A component exchanges measurements through four kinds of ports:
//!
//! | kind | direction | callback |
//! |---|---|---|
//! | [`PushSupplier<T>`] | output | none; `send` delivers to bound consumers |
//! | [`PushConsumer<T>`] | input | `Fn(Measurement<T>)`, run by the event queue |
//! | [`PullSupplier<T>`] | output | `Fn(Timestamp) -> Measurement<T>`, run on pull |
//! | [`PullConsumer<T>`] | input | none; `get(t)` calls the bound supplier |
//!
//! Port values are cheap handles: cloning shares the underlying port. Each
//! port keeps a [`PortOwner`] naming its component; it is used for logging
//! only and does not keep the component alive.
//!
//! Networks bind ports through the type-erased [`Port`] trait, which checks
//! kind and payload type at connect time.

use super::error::{DataflowError, DataflowResult};
use super::scheduler::{Delivery, EventQueue};
use crate::config::EdgeMode;
use crate::measurement::{Measurement, Payload, Timestamp};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// The four port kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    PushSupplier,
    PushConsumer,
    PullSupplier,
    PullConsumer,
}

impl PortKind {
    pub fn direction(self) -> PortDirection {
        match self {
            PortKind::PushSupplier | PortKind::PullSupplier => PortDirection::Output,
            PortKind::PushConsumer | PortKind::PullConsumer => PortDirection::Input,
        }
    }

    pub fn mode(self) -> EdgeMode {
        match self {
            PortKind::PushSupplier | PortKind::PushConsumer => EdgeMode::Push,
            PortKind::PullSupplier | PortKind::PullConsumer => EdgeMode::Pull,
        }
    }

    /// The kind this port binds to.
    pub fn complement(self) -> PortKind {
        match self {
            PortKind::PushSupplier => PortKind::PushConsumer,
            PortKind::PushConsumer => PortKind::PushSupplier,
            PortKind::PullSupplier => PortKind::PullConsumer,
            PortKind::PullConsumer => PortKind::PullSupplier,
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Static description of a port.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: String,
    pub kind: PortKind,
    pub type_id: TypeId,
    pub type_tag: String,
}

impl PortDescriptor {
    pub fn new<T: Payload>(name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            kind,
            type_id: TypeId::of::<T>(),
            type_tag: T::type_tag(),
        }
    }

    pub fn direction(&self) -> PortDirection {
        self.kind.direction()
    }
}

/// Name and logging span of the component a port belongs to.
#[derive(Clone)]
pub struct PortOwner {
    name: Arc<str>,
    span: tracing::Span,
}

impl PortOwner {
    pub fn new(name: impl Into<Arc<str>>, span: tracing::Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    /// Owner for ports created outside a network, e.g. in tests.
    pub fn detached(name: &str) -> Self {
        Self::new(name, tracing::info_span!("component", name = %name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl fmt::Debug for PortOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PortOwner({})", self.name)
    }
}

/// Type-erased view of a port, used for wiring by name.
pub trait Port: Send + Sync {
    fn descriptor(&self) -> &PortDescriptor;

    fn owner(&self) -> &PortOwner;

    fn as_any(&self) -> &dyn Any;

    /// Bind this port to `peer` of the complementary kind.
    fn bind(&self, peer: &dyn Port) -> DataflowResult<()>;

    /// Drop all bindings.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Delivery priority for push consumers; ignored by other kinds.
    fn set_priority(&self, _priority: u32) {}

    fn priority(&self) -> u32 {
        0
    }

    /// `component:port`.
    fn full_name(&self) -> String {
        format!("{}:{}", self.owner().name(), self.descriptor().name)
    }
}

/// Build the error for a failed downcast of `peer`.
fn bind_error(this: &dyn Port, peer: &dyn Port) -> DataflowError {
    let ours = this.descriptor();
    let theirs = peer.descriptor();
    if theirs.kind != ours.kind.complement() {
        DataflowError::ModeMismatch {
            from: this.full_name(),
            to: peer.full_name(),
            message: format!("{} cannot bind to {}", ours.kind, theirs.kind),
        }
    } else {
        DataflowError::TypeMismatch {
            port: peer.full_name(),
            expected: ours.type_tag.clone(),
            found: theirs.type_tag.clone(),
        }
    }
}

/// Log a failed push delivery under the consumer's span.
fn report_push_error(port: &str, err: &DataflowError) {
    match err {
        DataflowError::NotEnoughData(_) => {
            tracing::debug!(port, category = %err.category(), "{}", err)
        }
        _ => tracing::warn!(port, category = %err.category(), "{}", err),
    }
}

// ==================== Push ====================

type PushHandler<T> = Box<dyn Fn(Measurement<T>) -> DataflowResult<()> + Send + Sync>;

struct PushConsumerInner<T> {
    descriptor: PortDescriptor,
    owner: PortOwner,
    handler: PushHandler<T>,
    queued: AtomicUsize,
    priority: AtomicU32,
    suppliers: AtomicUsize,
}

/// Input receiving pushed measurements.
pub struct PushConsumer<T> {
    inner: Arc<PushConsumerInner<T>>,
}

impl<T> Clone for PushConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> PushConsumer<T> {
    pub fn new<F>(name: impl Into<String>, owner: PortOwner, handler: F) -> Self
    where
        F: Fn(Measurement<T>) -> DataflowResult<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PushConsumerInner {
                descriptor: PortDescriptor::new::<T>(name, PortKind::PushConsumer),
                owner,
                handler: Box::new(handler),
                queued: AtomicUsize::new(0),
                priority: AtomicU32::new(0),
                suppliers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    /// Events queued for this port but not yet delivered.
    pub fn queued_events(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    /// Run the handler now, logging any error under the owner's span.
    pub fn receive(&self, measurement: Measurement<T>) {
        let _entered = self.inner.owner.span().enter();
        if let Err(err) = (self.inner.handler)(measurement) {
            report_push_error(&self.inner.descriptor.name, &err);
        }
    }

    fn delivery(&self, measurement: Measurement<T>) -> (u32, Delivery) {
        self.inner.queued.fetch_add(1, Ordering::AcqRel);
        let consumer = self.clone();
        let priority = self.inner.priority.load(Ordering::Relaxed);
        (
            priority,
            Box::new(move || {
                consumer.inner.queued.fetch_sub(1, Ordering::AcqRel);
                consumer.receive(measurement);
            }),
        )
    }
}

impl<T: Payload> Port for PushConsumer<T> {
    fn descriptor(&self) -> &PortDescriptor {
        &self.inner.descriptor
    }

    fn owner(&self) -> &PortOwner {
        &self.inner.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bind(&self, peer: &dyn Port) -> DataflowResult<()> {
        match peer.as_any().downcast_ref::<PushSupplier<T>>() {
            Some(supplier) => supplier.connect(self),
            None => Err(bind_error(self, peer)),
        }
    }

    fn disconnect(&self) {
        // suppliers hold the bindings
    }

    fn is_connected(&self) -> bool {
        self.inner.suppliers.load(Ordering::Relaxed) > 0
    }

    fn set_priority(&self, priority: u32) {
        self.inner.priority.store(priority, Ordering::Relaxed);
    }

    fn priority(&self) -> u32 {
        self.inner.priority.load(Ordering::Relaxed)
    }
}

struct PushSupplierInner<T> {
    descriptor: PortDescriptor,
    owner: PortOwner,
    queue: Arc<EventQueue>,
    consumers: RwLock<Vec<PushConsumer<T>>>,
}

/// Output pushing measurements to every bound consumer.
pub struct PushSupplier<T> {
    inner: Arc<PushSupplierInner<T>>,
}

impl<T> Clone for PushSupplier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> PushSupplier<T> {
    pub fn new(name: impl Into<String>, owner: PortOwner, queue: Arc<EventQueue>) -> Self {
        Self {
            inner: Arc::new(PushSupplierInner {
                descriptor: PortDescriptor::new::<T>(name, PortKind::PushSupplier),
                owner,
                queue,
                consumers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    /// Deliver `measurement` to all bound consumers. A no-op when nothing is
    /// bound.
    pub fn send(&self, measurement: Measurement<T>) {
        let deliveries: Vec<(u32, Delivery)> = {
            let consumers = self.inner.consumers.read();
            if consumers.is_empty() {
                return;
            }
            consumers
                .iter()
                .map(|c| c.delivery(measurement.clone()))
                .collect()
        };
        self.inner.queue.schedule(deliveries);
    }

    /// Typed bind.
    pub fn connect(&self, consumer: &PushConsumer<T>) -> DataflowResult<()> {
        let mut consumers = self.inner.consumers.write();
        if consumers
            .iter()
            .any(|c| Arc::ptr_eq(&c.inner, &consumer.inner))
        {
            return Err(DataflowError::AlreadyConnected(consumer.full_name()));
        }
        consumers.push(consumer.clone());
        consumer.inner.suppliers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.read().len()
    }
}

impl<T: Payload> Port for PushSupplier<T> {
    fn descriptor(&self) -> &PortDescriptor {
        &self.inner.descriptor
    }

    fn owner(&self) -> &PortOwner {
        &self.inner.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bind(&self, peer: &dyn Port) -> DataflowResult<()> {
        match peer.as_any().downcast_ref::<PushConsumer<T>>() {
            Some(consumer) => self.connect(consumer),
            None => Err(bind_error(self, peer)),
        }
    }

    fn disconnect(&self) {
        let consumers = std::mem::take(&mut *self.inner.consumers.write());
        for c in consumers {
            c.inner.suppliers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn is_connected(&self) -> bool {
        !self.inner.consumers.read().is_empty()
    }
}

// ==================== Pull ====================

type PullHandler<T> = Box<dyn Fn(Timestamp) -> DataflowResult<Measurement<T>> + Send + Sync>;

struct PullSupplierInner<T> {
    descriptor: PortDescriptor,
    owner: PortOwner,
    handler: PullHandler<T>,
    consumers: AtomicUsize,
}

/// Output computing a measurement on request.
pub struct PullSupplier<T> {
    inner: Arc<PullSupplierInner<T>>,
}

impl<T> Clone for PullSupplier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> PullSupplier<T> {
    pub fn new<F>(name: impl Into<String>, owner: PortOwner, handler: F) -> Self
    where
        F: Fn(Timestamp) -> DataflowResult<Measurement<T>> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PullSupplierInner {
                descriptor: PortDescriptor::new::<T>(name, PortKind::PullSupplier),
                owner,
                handler: Box::new(handler),
                consumers: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    /// Run the handler for `t` under the owner's span. An invalid result is
    /// reported as missing data.
    pub fn pull(&self, t: Timestamp) -> DataflowResult<Measurement<T>> {
        let _entered = self.inner.owner.span().enter();
        let measurement = (self.inner.handler)(t)?;
        if measurement.is_valid() {
            Ok(measurement)
        } else {
            Err(DataflowError::NoData(format!(
                "{} produced an empty measurement",
                self.full_name()
            )))
        }
    }
}

impl<T: Payload> Port for PullSupplier<T> {
    fn descriptor(&self) -> &PortDescriptor {
        &self.inner.descriptor
    }

    fn owner(&self) -> &PortOwner {
        &self.inner.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bind(&self, peer: &dyn Port) -> DataflowResult<()> {
        match peer.as_any().downcast_ref::<PullConsumer<T>>() {
            Some(consumer) => consumer.connect(self),
            None => Err(bind_error(self, peer)),
        }
    }

    fn disconnect(&self) {
        // consumers hold the bindings
    }

    fn is_connected(&self) -> bool {
        self.inner.consumers.load(Ordering::Relaxed) > 0
    }
}

struct PullConsumerInner<T> {
    descriptor: PortDescriptor,
    owner: PortOwner,
    supplier: RwLock<Option<PullSupplier<T>>>,
}

/// Input requesting measurements from its bound supplier.
pub struct PullConsumer<T> {
    inner: Arc<PullConsumerInner<T>>,
}

impl<T> Clone for PullConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> PullConsumer<T> {
    pub fn new(name: impl Into<String>, owner: PortOwner) -> Self {
        Self {
            inner: Arc::new(PullConsumerInner {
                descriptor: PortDescriptor::new::<T>(name, PortKind::PullConsumer),
                owner,
                supplier: RwLock::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    /// Synchronously request the measurement for `t`.
    pub fn get(&self, t: Timestamp) -> DataflowResult<Measurement<T>> {
        let supplier = self
            .inner
            .supplier
            .read()
            .clone()
            .ok_or_else(|| DataflowError::NotConnected(self.full_name()))?;
        supplier.pull(t)
    }

    /// Typed bind. A consumer has at most one supplier.
    pub fn connect(&self, supplier: &PullSupplier<T>) -> DataflowResult<()> {
        let mut slot = self.inner.supplier.write();
        if slot.is_some() {
            return Err(DataflowError::AlreadyConnected(self.full_name()));
        }
        *slot = Some(supplier.clone());
        supplier.inner.consumers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl<T: Payload> Port for PullConsumer<T> {
    fn descriptor(&self) -> &PortDescriptor {
        &self.inner.descriptor
    }

    fn owner(&self) -> &PortOwner {
        &self.inner.owner
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn bind(&self, peer: &dyn Port) -> DataflowResult<()> {
        match peer.as_any().downcast_ref::<PullSupplier<T>>() {
            Some(supplier) => self.connect(supplier),
            None => Err(bind_error(self, peer)),
        }
    }

    fn disconnect(&self) {
        if let Some(supplier) = self.inner.supplier.write().take() {
            supplier.inner.consumers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.supplier.read().is_some()
    }
}

/// Bind an output port to an input port after checking directions.
pub fn connect(output: &dyn Port, input: &dyn Port) -> DataflowResult<()> {
    if output.descriptor().direction() != PortDirection::Output
        || input.descriptor().direction() != PortDirection::Input
    {
        return Err(DataflowError::ModeMismatch {
            from: output.full_name(),
            to: input.full_name(),
            message: "edges run from an output to an input".to_string(),
        });
    }
    output.bind(input)
}
