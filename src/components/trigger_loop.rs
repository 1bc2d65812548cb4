//! TriggerLoop: runs a fixed number of trigger/acknowledge iterations.
//!
//! A `LoopTrigger` event carrying `inButton` starts a loop unless one is
//! already running. Each loop sends `IterationTrigger` and waits for
//! `IterationDone`; after `size` acknowledgements (default 100) it sends
//! `LoopDone`. Outgoing events carry the `button` code.

use super::ButtonFilter;
use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{Button, Measurement, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<TriggerLoop>("TriggerLoop");
}

#[derive(Default)]
struct LoopState {
    running: bool,
    counter: u32,
}

pub struct TriggerLoop {
    core: ComponentCore,
    state: Arc<Mutex<LoopState>>,
}

impl TriggerLoop {
    pub fn is_looping(&self) -> bool {
        self.state.lock().running
    }
}

impl Construct for TriggerLoop {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let size: u32 = config.attr_or("size", 100)?;
        let button = ButtonFilter::from_config(config, "button", ' ').code();
        let in_button = ButtonFilter::from_config(config, "inButton", ' ');
        let state = Arc::new(Mutex::new(LoopState::default()));

        let mut core = ComponentCore::new(config, ctx);
        let iteration = core.push_supplier::<Button>("IterationTrigger")?;
        let done = core.push_supplier::<Button>("LoopDone")?;

        let start_state = state.clone();
        let first = iteration.clone();
        core.push_consumer::<Button, _>("LoopTrigger", move |event| {
            if !in_button.matches(*event.value()?) {
                return Ok(());
            }
            {
                let mut state = start_state.lock();
                if state.running {
                    tracing::error!("Received trigger signal while a loop is running. Ignored.");
                    return Ok(());
                }
                state.running = true;
                state.counter = 0;
            }
            tracing::debug!("Starting loop at {}", event.time());
            first.send(Measurement::new(event.time(), button));
            Ok(())
        })?;

        let loop_state = state.clone();
        core.push_consumer::<Button, _>("IterationDone", move |event| {
            let finished = {
                let mut state = loop_state.lock();
                if !state.running {
                    tracing::debug!("Iteration acknowledged outside a loop");
                    return Ok(());
                }
                state.counter += 1;
                tracing::trace!("Iteration {} of {}", state.counter, size);
                if size > 0 && state.counter >= size {
                    state.running = false;
                    true
                } else {
                    false
                }
            };
            if finished {
                tracing::debug!("Loop done");
                done.send(Measurement::new(event.time(), button));
            } else {
                iteration.send(Measurement::new(Timestamp::now(), button));
            }
            Ok(())
        })?;

        Ok(Self { core, state })
    }
}

impl Component for TriggerLoop {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
