//! Synchronizer: re-stamps button events with the time they are forwarded.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowResult};
use crate::measurement::{Button, Timestamp};

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Synchronizer>("Synchronizer");
}

pub struct Synchronizer {
    core: ComponentCore,
}

impl Construct for Synchronizer {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<Button>("DelayedTrigger")?;
        core.push_consumer::<Button, _>("Trigger", move |event| {
            output.send(event.retimed(Timestamp::now()));
            Ok(())
        })?;
        Ok(Self { core })
    }
}

impl Component for Synchronizer {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
