//! Gate: releases measurements on button signals.
//!
//! `gateType` selects the behaviour when a matching `Signal` arrives:
//!
//! - `0`: send the last input unchanged
//! - `1`: open the gate; the next input passes and closes it again
//! - `2`: send the last input with the signal's timestamp
//!
//! `button` selects the signal (first character, default space; empty
//! matches every button).

use super::ButtonFilter;
use crate::config::SubgraphConfig;
use crate::dataflow::{
    BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError,
    DataflowResult,
};
use crate::measurement::{
    Button, Distance, ErrorPose, Matrix4x4, Measurement, Payload, Pose, Position, Position2D,
    Rotation,
};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Gate<Pose>>("PoseGate");
    factory.register::<Gate<ErrorPose>>("ErrorPoseGate");
    factory.register::<Gate<Position>>("PositionGate");
    factory.register::<Gate<Position2D>>("Position2DGate");
    factory.register::<Gate<Rotation>>("RotationGate");
    factory.register::<Gate<Button>>("ButtonGate");
    factory.register::<Gate<Distance>>("DistanceGate");
    factory.register::<Gate<Vec<Pose>>>("PoseListGate");
    factory.register::<Gate<Vec<Position>>>("CloudGate");
    factory.register::<Gate<Vec<Position2D>>>("PositionList2Gate");
    factory.register::<Gate<Matrix4x4>>("MatrixGate");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateType {
    SendLast,
    PassNext,
    SendLastRetimed,
}

impl GateType {
    fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
        match config.attr_or::<u32>("gateType", 0)? {
            0 => Ok(GateType::SendLast),
            1 => Ok(GateType::PassNext),
            2 => Ok(GateType::SendLastRetimed),
            other => Err(DataflowError::invalid_attribute(
                &config.id,
                "gateType",
                format!("expected 0, 1 or 2, got {other}"),
            )),
        }
    }
}

struct GateState<T> {
    last: Option<Measurement<T>>,
    open: bool,
}

pub struct Gate<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Construct for Gate<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let gate_type = GateType::from_config(config)?;
        let filter = ButtonFilter::from_config(config, "button", ' ');
        let state = Arc::new(Mutex::new(GateState::<T> {
            last: None,
            open: false,
        }));

        let mut core = ComponentCore::new(config, ctx);
        let output = core.push_supplier::<T>("Output")?;

        let input_state = state.clone();
        let out = output.clone();
        core.push_consumer::<T, _>("Input", move |m| {
            let release = {
                let mut state = input_state.lock();
                state.last = Some(m.clone());
                gate_type == GateType::PassNext && std::mem::take(&mut state.open)
            };
            if release {
                tracing::debug!("Gate passing current measurement");
                out.send(m);
            }
            Ok(())
        })?;

        core.push_consumer::<Button, _>("Signal", move |signal| {
            if !filter.matches(*signal.value()?) {
                return Ok(());
            }
            let pending = {
                let mut state = state.lock();
                if gate_type == GateType::PassNext {
                    state.open = true;
                    return Ok(());
                }
                state.last.clone()
            };
            let last = pending.ok_or_else(|| DataflowError::NoData("Gate has not enough data".to_string()))?;
            match gate_type {
                GateType::SendLastRetimed => output.send(last.retimed(signal.time())),
                _ => output.send(last),
            }
            Ok(())
        })?;

        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload> Component for Gate<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
