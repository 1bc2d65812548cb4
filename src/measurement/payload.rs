//! The closed set of payload types that travel on edges.
//!
//! Ports are generic over a [`Payload`]; the type tag reported by
//! [`Payload::type_tag`] names the payload in configuration errors and log
//! messages, while wiring itself is checked with `TypeId`.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Matrix6, UnitQuaternion, Vector2, Vector3, Vector4};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// 3D position or direction.
pub type Position = Vector3<f64>;
/// Image-plane position.
pub type Position2D = Vector2<f64>;
/// Orientation.
pub type Rotation = UnitQuaternion<f64>;
/// Scalar distance.
pub type Distance = f64;
/// Button or event code; printable keys are their character code.
pub type Button = i32;
pub type Matrix3x3 = Matrix3<f64>;
pub type Matrix3x4f = Matrix3x4<f64>;
pub type Matrix4x4 = Matrix4<f64>;
pub type Vector4d = Vector4<f64>;

/// Rigid transformation: rotate, then translate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Rotation,
    pub translation: Position,
}

/// Pose with a 6x6 covariance (translation first, then rotation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorPose {
    pub pose: Pose,
    pub covariance: Matrix6<f64>,
}

/// Position with a 3x3 covariance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorPosition {
    pub position: Position,
    pub covariance: Matrix3<f64>,
}

/// A value that can travel on an edge.
pub trait Payload: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Name used in configuration errors and logs.
    fn type_tag() -> String;
}

macro_rules! impl_payload {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(
            impl Payload for $ty {
                fn type_tag() -> String {
                    $tag.to_string()
                }
            }
        )*
    };
}

impl_payload! {
    Pose => "Pose",
    ErrorPose => "ErrorPose",
    ErrorPosition => "ErrorPosition",
    Position => "Position",
    Position2D => "Position2D",
    Rotation => "Rotation",
    Distance => "Distance",
    Button => "Button",
    Matrix3x3 => "Matrix3x3",
    Matrix3x4f => "Matrix3x4",
    Matrix4x4 => "Matrix4x4",
    Vector4d => "Vector4",
}

impl<T: Payload> Payload for Vec<T> {
    fn type_tag() -> String {
        format!("{}List", T::type_tag())
    }
}

/// Construction from a flat list of numbers, as written in attributes.
pub trait FromNumbers: Sized {
    /// Number of values expected.
    const LEN: usize;

    /// Build from exactly [`Self::LEN`] numbers.
    fn from_numbers(values: &[f64]) -> Option<Self>;
}

impl FromNumbers for f64 {
    const LEN: usize = 1;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        values.first().copied()
    }
}

impl FromNumbers for i32 {
    const LEN: usize = 1;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        values.first().map(|v| *v as i32)
    }
}

impl FromNumbers for Position {
    const LEN: usize = 3;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        (values.len() == Self::LEN).then(|| Vector3::new(values[0], values[1], values[2]))
    }
}

impl FromNumbers for Position2D {
    const LEN: usize = 2;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        (values.len() == Self::LEN).then(|| Vector2::new(values[0], values[1]))
    }
}

impl FromNumbers for Vector4d {
    const LEN: usize = 4;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        (values.len() == Self::LEN).then(|| Vector4::new(values[0], values[1], values[2], values[3]))
    }
}

/// Quaternion written as `x y z w`.
impl FromNumbers for Rotation {
    const LEN: usize = 4;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        if values.len() != Self::LEN {
            return None;
        }
        let q = nalgebra::Quaternion::new(values[3], values[0], values[1], values[2]);
        (q.norm() > f64::EPSILON).then(|| UnitQuaternion::from_quaternion(q))
    }
}

/// Quaternion `x y z w` followed by translation `x y z`.
impl FromNumbers for Pose {
    const LEN: usize = 7;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        if values.len() != Self::LEN {
            return None;
        }
        Some(Pose {
            rotation: Rotation::from_numbers(&values[..4])?,
            translation: Position::from_numbers(&values[4..])?,
        })
    }
}

/// Row-major.
impl FromNumbers for Matrix3x3 {
    const LEN: usize = 9;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        (values.len() == Self::LEN).then(|| Matrix3::from_row_slice(values))
    }
}

/// Row-major.
impl FromNumbers for Matrix3x4f {
    const LEN: usize = 12;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        (values.len() == Self::LEN).then(|| Matrix3x4::from_row_slice(values))
    }
}

/// Row-major.
impl FromNumbers for Matrix4x4 {
    const LEN: usize = 16;

    fn from_numbers(values: &[f64]) -> Option<Self> {
        (values.len() == Self::LEN).then(|| Matrix4::from_row_slice(values))
    }
}
