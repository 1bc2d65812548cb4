//! Measurement values: timestamps, payload types, pose algebra and the text
//! codec used by files and datagrams.

pub mod codec;
pub mod math;
pub mod payload;
pub mod timed;
pub mod timestamp;

pub use math::{Interpolate, Invert, Mean, Multiply, Neutral};
pub use payload::{
    Button, Distance, ErrorPose, ErrorPosition, FromNumbers, Matrix3x3, Matrix3x4f, Matrix4x4,
    Payload, Pose, Position, Position2D, Rotation, Vector4d,
};
pub use timed::Measurement;
pub use timestamp::{Timestamp, NANOS_PER_MILLI, NANOS_PER_SEC};
