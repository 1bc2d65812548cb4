//! Pull sources answering every request with a fixed value.
//!
//! [`Null`] returns the neutral value of its payload. [`StaticMeasurement`]
//! returns a value read from the configuration: the `static` attribute of
//! the `AB` edge or the component, holding whitespace separated numbers,
//! or one of the payload specific keys older graph files use
//! (`staticPosition`, `staticRotation`, `staticMatrix3x4`, ...). Lists are
//! written flat and split into elements.

use crate::config::SubgraphConfig;
use crate::dataflow::{BuildContext, Component, ComponentCore, ComponentFactory, Construct, DataflowError, DataflowResult};
use crate::measurement::{
    Button, Distance, FromNumbers, Matrix3x3, Matrix3x4f, Matrix4x4, Measurement, Neutral, Payload,
    Pose, Position, Position2D, Rotation, Vector4d,
};
use std::marker::PhantomData;

pub(crate) fn register(factory: &mut ComponentFactory) {
    factory.register::<Null<Button>>("NullComponent");
    factory.register::<Null<Pose>>("NullPose");
    factory.register::<Null<Position>>("NullPosition");
    factory.register::<Null<Position2D>>("NullPosition2D");
    factory.register::<Null<Rotation>>("NullRotation");
    factory.register::<Null<Distance>>("NullDistance");
    factory.register::<Null<Vec<Position>>>("NullPositionList");

    factory.register::<StaticMeasurement<Matrix4x4>>("StaticMatrix4x4");
    factory.register::<StaticMeasurement<Matrix3x4f>>("StaticMatrix3x4");
    factory.register::<StaticMeasurement<Matrix3x3>>("StaticMatrix3x3");
    factory.register::<StaticMeasurement<Distance>>("StaticDistance");
    factory.register::<StaticMeasurement<Position2D>>("StaticPosition2D");
    factory.register::<StaticMeasurement<Position>>("StaticPosition");
    factory.register::<StaticMeasurement<Vector4d>>("StaticVector4");
    factory.register::<StaticMeasurement<Rotation>>("StaticRotation");
    factory.register::<StaticMeasurement<Pose>>("StaticPose");
    factory.register::<StaticMeasurement<Button>>("StaticEvent");
    factory.register::<StaticMeasurement<Button>>("StaticButton");
    factory.register::<StaticMeasurement<Vec<Pose>>>("StaticPoseList");
    factory.register::<StaticMeasurement<Vec<Position2D>>>("StaticPositionList2");
    factory.register::<StaticMeasurement<Vec<Position>>>("StaticPositionList");
    factory.register::<StaticMeasurement<Vec<Distance>>>("StaticDistanceList");
}

pub struct Null<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload + Neutral> Construct for Null<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let mut core = ComponentCore::new(config, ctx);
        core.pull_supplier::<T, _>("Output", |t| Ok(Measurement::new(t, T::neutral())))?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: Payload + Neutral> Component for Null<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}

/// Payloads that can be written in a graph file.
pub trait StaticValue: Payload {
    /// Key used by older graph files besides `static`.
    const LEGACY_KEY: &'static str;

    fn from_config(config: &SubgraphConfig) -> DataflowResult<Self>;
}

/// Numbers under `static` or `legacy`, edge first.
fn static_numbers(config: &SubgraphConfig, legacy: &str) -> DataflowResult<(String, Vec<f64>)> {
    for key in ["static", legacy] {
        if let Some(values) = config.numbers("AB", key)? {
            return Ok((key.to_string(), values));
        }
    }
    Err(DataflowError::MissingAttribute {
        component: config.id.clone(),
        attribute: "static".to_string(),
    })
}

fn parse_numbers<T: FromNumbers>(config: &SubgraphConfig, key: &str, values: &[f64]) -> DataflowResult<T> {
    T::from_numbers(values).ok_or_else(|| {
        DataflowError::invalid_attribute(
            &config.id,
            key,
            format!("expected {} numbers, got {}", T::LEN, values.len()),
        )
    })
}

macro_rules! impl_static_value {
    ($($ty:ty => $key:literal),* $(,)?) => {
        $(
            impl StaticValue for $ty {
                const LEGACY_KEY: &'static str = $key;

                fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
                    let (key, values) = static_numbers(config, Self::LEGACY_KEY)?;
                    parse_numbers(config, &key, &values)
                }
            }
        )*
    };
}

impl_static_value! {
    Matrix4x4 => "staticMatrix4x4",
    Matrix3x4f => "staticMatrix3x4",
    Matrix3x3 => "staticMatrix3x3",
    Position => "staticPosition",
    Position2D => "staticPosition2D",
    Distance => "staticDistance",
    Vector4d => "staticVector",
    Rotation => "staticRotation",
}

/// Either seven numbers under `static`, or `staticRotation` and
/// `staticPosition` separately, each defaulting to identity.
impl StaticValue for Pose {
    const LEGACY_KEY: &'static str = "staticPose";

    fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
        match static_numbers(config, Self::LEGACY_KEY) {
            Ok((key, values)) => return parse_numbers(config, &key, &values),
            Err(DataflowError::MissingAttribute { .. }) => {}
            Err(err) => return Err(err),
        }
        let rotation = match config.numbers("AB", Rotation::LEGACY_KEY)? {
            Some(values) => parse_numbers(config, Rotation::LEGACY_KEY, &values)?,
            None => Rotation::identity(),
        };
        let translation = match config.numbers("AB", Position::LEGACY_KEY)? {
            Some(values) => parse_numbers(config, Position::LEGACY_KEY, &values)?,
            None => Position::zeros(),
        };
        Ok(Pose::new(rotation, translation))
    }
}

/// A number under `static`, or the first character of `button`.
impl StaticValue for Button {
    const LEGACY_KEY: &'static str = "button";

    fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
        if let Some(values) = config.numbers("AB", "static")? {
            return parse_numbers(config, "static", &values);
        }
        Ok(config.attr_char(Self::LEGACY_KEY, ' ')? as Button)
    }
}

macro_rules! impl_static_list {
    ($($ty:ty => $key:literal),* $(,)?) => {
        $(
            impl StaticValue for Vec<$ty> {
                const LEGACY_KEY: &'static str = $key;

                fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
                    let (key, values) = static_numbers(config, Self::LEGACY_KEY)?;
                    if values.len() % <$ty>::LEN != 0 {
                        return Err(DataflowError::invalid_attribute(
                            &config.id,
                            &key,
                            format!("{} numbers do not split into elements of {}", values.len(), <$ty>::LEN),
                        ));
                    }
                    values
                        .chunks(<$ty>::LEN)
                        .map(|chunk| parse_numbers::<$ty>(config, &key, chunk))
                        .collect()
                }
            }
        )*
    };
}

impl_static_list! {
    Pose => "staticPoseList",
    Position2D => "staticPositionList2",
    Position => "staticPositionList",
    Distance => "staticDistanceList",
}

pub struct StaticMeasurement<T> {
    core: ComponentCore,
    _payload: PhantomData<fn() -> T>,
}

impl<T: StaticValue> Construct for StaticMeasurement<T> {
    fn construct(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Self> {
        let value = T::from_config(config)?;
        let mut core = ComponentCore::new(config, ctx);
        {
            let _entered = core.span().enter();
            tracing::debug!("Static value {:?}", value);
        }
        core.pull_supplier::<T, _>("AB", move |t| Ok(Measurement::new(t, value.clone())))?;
        Ok(Self {
            core,
            _payload: PhantomData,
        })
    }
}

impl<T: StaticValue> Component for StaticMeasurement<T> {
    fn core(&self) -> &ComponentCore {
        &self.core
    }
}
