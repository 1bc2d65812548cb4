//! Leaf components.
//!
//! Each file implements one family of components, generic over the payload
//! it carries, and registers its class names with the factory through a
//! `register` function. Class names and port names follow the graph files
//! existing tracking setups already use.

pub mod absolute_orientation;
pub mod aggregator;
pub mod algebra;
pub mod average;
pub mod buffer;
pub mod button_trigger;
pub mod cast;
pub mod collector;
pub mod constant;
pub mod delay;
pub mod gate;
pub mod interpolation;
pub mod list;
pub mod print_sink;
pub mod sampler;
pub mod sources;
pub mod synchronizer;
pub mod time_expansion;
pub mod trigger_loop;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentFactory, DataflowResult, TriggerComponent};
use crate::measurement::Button;
use std::sync::Arc;

/// Register every built-in leaf component.
pub fn register_all(factory: &mut ComponentFactory) {
    absolute_orientation::register(factory);
    aggregator::register(factory);
    algebra::register(factory);
    average::register(factory);
    buffer::register(factory);
    button_trigger::register(factory);
    cast::register(factory);
    collector::register(factory);
    constant::register(factory);
    delay::register(factory);
    gate::register(factory);
    interpolation::register(factory);
    list::register(factory);
    print_sink::register(factory);
    sampler::register(factory);
    sources::register(factory);
    synchronizer::register(factory);
    time_expansion::register(factory);
    trigger_loop::register(factory);
}

/// Builder of a trigger-based component.
pub(crate) type TriggerBuilder = fn(&SubgraphConfig, &BuildContext) -> DataflowResult<TriggerComponent>;

/// Register a class implemented as a configured [`TriggerComponent`].
pub(crate) fn register_trigger(factory: &mut ComponentFactory, class: &str, build: TriggerBuilder) {
    factory.register_fn(class, move |config, ctx| {
        Ok(Arc::new(build(config, ctx)?) as Arc<dyn Component>)
    });
}

/// Button code a component reacts to.
///
/// Configured by the first character of a text attribute. An empty value
/// matches every button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonFilter(Option<Button>);

impl ButtonFilter {
    pub fn any() -> Self {
        ButtonFilter(None)
    }

    pub fn key(c: char) -> Self {
        ButtonFilter(Some(c as Button))
    }

    pub fn from_config(config: &SubgraphConfig, attribute: &str, default: char) -> Self {
        match config.attributes.text(attribute) {
            None => Self::key(default),
            Some(text) => text.chars().next().map_or_else(Self::any, Self::key),
        }
    }

    pub fn matches(&self, button: Button) -> bool {
        self.0.map_or(true, |b| b == button)
    }

    /// The configured code; `-1` when any button matches.
    pub fn code(&self) -> Button {
        self.0.unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_filter() {
        let cfg = SubgraphConfig::new("g", "PoseGate").with_attribute("button", "x");
        let filter = ButtonFilter::from_config(&cfg, "button", ' ');
        assert!(filter.matches('x' as Button));
        assert!(!filter.matches(' ' as Button));

        let any = SubgraphConfig::new("g", "PoseGate").with_attribute("button", "");
        assert!(ButtonFilter::from_config(&any, "button", ' ').matches(7));
        assert_eq!(ButtonFilter::any().code(), -1);

        let default = SubgraphConfig::new("g", "PoseGate");
        assert_eq!(ButtonFilter::from_config(&default, "button", ' ').code(), 32);
    }
}
