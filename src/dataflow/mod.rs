//! Event propagation and port scheduling.
//!
//! Components exchange timestamped measurements through typed ports. Push
//! ports deliver producer-driven events through a shared [`EventQueue`];
//! pull ports answer synchronous requests for a given timestamp.
//!
//! # Architecture
//!
//! ```text
//!            push                 push
//! [Source] ──────► [Trigger] ──────────► [Sink]
//!    ▲ thread         │ pull
//!    │                ▼
//! [Module]        [Buffer] ◄──── push ──── [Source]
//! ```
//!
//! # Design
//!
//! - **Priority queue**: push deliveries ordered by (consumer depth, sequence).
//! - **Inline dispatch**: the sending thread drains; re-entrant sends only enqueue.
//! - **Handles, not references**: ports are `Arc` handles; callbacks capture state.
//! - **Stop channels**: background threads end when their crossbeam sender drops.
//! - **Weak module tables**: modules never keep their components alive.

pub mod component;
pub mod error;
pub mod expansion;
pub mod factory;
pub mod module;
pub mod network;
pub mod port;
pub mod scheduler;
pub mod trigger;
pub mod worker;

pub use component::{BuildContext, Component, ComponentCore, Construct, PortSet};
pub use error::{DataflowError, DataflowResult, ErrorCategory};
pub use expansion::{check_correspondences, TimeAccumulator, TimePolicy};
pub use factory::ComponentFactory;
pub use module::{ComponentTable, Module, ModuleHandle, ModuleRegistry};
pub use network::Network;
pub use port::{
    Port, PortDescriptor, PortDirection, PortKind, PortOwner, PullConsumer, PullSupplier,
    PushConsumer, PushSupplier,
};
pub use scheduler::{DispatchMode, EventQueue};
pub use trigger::{ExpansionInPort, ExpansionMode, TriggerComponent, TriggerInPort, TriggerOutPort};
pub use worker::{StopSignal, Worker, WorkerSlot};
