//! Pure functions on payload values.
//!
//! Composition and inversion follow the usual rigid-transform algebra:
//! `compose` is associative and `p.compose(&p.invert())` is the identity
//! within floating point tolerance.

use super::payload::{
    ErrorPose, Matrix3x3, Matrix3x4f, Matrix4x4, Pose, Position, Position2D, Rotation,
};
use nalgebra::{Matrix3, Matrix3x4, Matrix4, Matrix6, Quaternion, UnitQuaternion, Vector3};

impl Pose {
    pub fn new(rotation: Rotation, translation: Position) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation::identity(), Position::zeros())
    }

    pub fn from_translation(translation: Position) -> Self {
        Self::new(Rotation::identity(), translation)
    }

    /// `self * other`: apply `other` first, then `self`.
    #[must_use]
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    #[must_use]
    pub fn invert(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    pub fn transform_point(&self, point: &Position) -> Position {
        self.rotation * point + self.translation
    }

    pub fn approx_eq(&self, other: &Pose, epsilon: f64) -> bool {
        (self.translation - other.translation).norm() <= epsilon
            && self.rotation.angle_to(&other.rotation) <= epsilon
    }

    pub fn to_matrix3x4(&self) -> Matrix3x4f {
        let r = self.rotation.to_rotation_matrix();
        let mut m = Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(r.matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn to_matrix4x4(&self) -> Matrix4x4 {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 4>(0, 0).copy_from(&self.to_matrix3x4());
        m
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}

/// Inverse element under composition.
pub trait Invert {
    #[must_use]
    fn invert(&self) -> Self;
}

impl Invert for Pose {
    fn invert(&self) -> Self {
        Pose::invert(self)
    }
}

impl Invert for Rotation {
    fn invert(&self) -> Self {
        self.inverse()
    }
}

impl Invert for Position {
    fn invert(&self) -> Self {
        -self
    }
}

impl<T: Invert> Invert for Vec<T> {
    fn invert(&self) -> Self {
        self.iter().map(Invert::invert).collect()
    }
}

/// Chained transformation `A->B` times `B->C` giving `A->C`.
pub trait Multiply<Rhs> {
    type Output;

    fn multiply(&self, rhs: &Rhs) -> Self::Output;
}

impl Multiply<Pose> for Pose {
    type Output = Pose;

    fn multiply(&self, rhs: &Pose) -> Pose {
        self.compose(rhs)
    }
}

impl Multiply<Rotation> for Rotation {
    type Output = Rotation;

    fn multiply(&self, rhs: &Rotation) -> Rotation {
        self * rhs
    }
}

impl Multiply<Position> for Pose {
    type Output = Position;

    fn multiply(&self, rhs: &Position) -> Position {
        self.transform_point(rhs)
    }
}

impl Multiply<Position> for Rotation {
    type Output = Position;

    fn multiply(&self, rhs: &Position) -> Position {
        self * rhs
    }
}

/// Positions chain by addition.
impl Multiply<Position> for Position {
    type Output = Position;

    fn multiply(&self, rhs: &Position) -> Position {
        self + rhs
    }
}

impl Multiply<Vec<Position>> for Pose {
    type Output = Vec<Position>;

    fn multiply(&self, rhs: &Vec<Position>) -> Vec<Position> {
        rhs.iter().map(|p| self.transform_point(p)).collect()
    }
}

impl Multiply<Vec<Pose>> for Pose {
    type Output = Vec<Pose>;

    fn multiply(&self, rhs: &Vec<Pose>) -> Vec<Pose> {
        rhs.iter().map(|p| self.compose(p)).collect()
    }
}

impl Multiply<Pose> for Vec<Pose> {
    type Output = Vec<Pose>;

    fn multiply(&self, rhs: &Pose) -> Vec<Pose> {
        self.iter().map(|p| p.compose(rhs)).collect()
    }
}

/// Linear blend: `h = 0` gives `self`, `h = 1` gives `other`. Values outside
/// `[0, 1]` extrapolate.
pub trait Interpolate {
    #[must_use]
    fn interpolate(&self, other: &Self, h: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(&self, other: &Self, h: f64) -> Self {
        self + (other - self) * h
    }
}

impl Interpolate for Position {
    fn interpolate(&self, other: &Self, h: f64) -> Self {
        self + (other - self) * h
    }
}

impl Interpolate for Position2D {
    fn interpolate(&self, other: &Self, h: f64) -> Self {
        self + (other - self) * h
    }
}

impl Interpolate for Rotation {
    fn interpolate(&self, other: &Self, h: f64) -> Self {
        // antipodal quaternions describe the same rotation
        let other = if self.coords.dot(&other.coords) < 0.0 {
            UnitQuaternion::new_unchecked(-other.into_inner())
        } else {
            *other
        };
        match self.try_slerp(&other, h, 1.0e-9) {
            Some(q) => q,
            None => {
                let q = self.into_inner() + (other.into_inner() - self.into_inner()) * h;
                if q.norm() > f64::EPSILON {
                    UnitQuaternion::from_quaternion(q)
                } else {
                    *self
                }
            }
        }
    }
}

impl Interpolate for Pose {
    fn interpolate(&self, other: &Self, h: f64) -> Self {
        Pose {
            rotation: self.rotation.interpolate(&other.rotation, h),
            translation: self.translation.interpolate(&other.translation, h),
        }
    }
}

/// Covariances blend linearly.
impl Interpolate for ErrorPose {
    fn interpolate(&self, other: &Self, h: f64) -> Self {
        ErrorPose {
            pose: self.pose.interpolate(&other.pose, h),
            covariance: self.covariance + (other.covariance - self.covariance) * h,
        }
    }
}

/// Arithmetic mean of a non-empty list.
pub trait Mean: Sized {
    fn mean(items: &[Self]) -> Option<Self>;
}

impl Mean for f64 {
    fn mean(items: &[Self]) -> Option<Self> {
        (!items.is_empty()).then(|| items.iter().sum::<f64>() / items.len() as f64)
    }
}

impl Mean for Position {
    fn mean(items: &[Self]) -> Option<Self> {
        (!items.is_empty())
            .then(|| items.iter().fold(Vector3::zeros(), |acc, p| acc + p) / items.len() as f64)
    }
}

impl Mean for Position2D {
    fn mean(items: &[Self]) -> Option<Self> {
        (!items.is_empty()).then(|| {
            items.iter().fold(Position2D::zeros(), |acc, p| acc + p) / items.len() as f64
        })
    }
}

/// Sign-aligned quaternion average, adequate for clustered rotations.
impl Mean for Rotation {
    fn mean(items: &[Self]) -> Option<Self> {
        let first = items.first()?;
        let sum = items.iter().fold(Quaternion::new(0.0, 0.0, 0.0, 0.0), |acc, q| {
            if first.coords.dot(&q.coords) < 0.0 {
                acc - q.into_inner()
            } else {
                acc + q.into_inner()
            }
        });
        (sum.norm() > f64::EPSILON).then(|| UnitQuaternion::from_quaternion(sum))
    }
}

impl Mean for Pose {
    fn mean(items: &[Self]) -> Option<Self> {
        let rotations: Vec<Rotation> = items.iter().map(|p| p.rotation).collect();
        let translations: Vec<Position> = items.iter().map(|p| p.translation).collect();
        Some(Pose::new(
            Rotation::mean(&rotations)?,
            <Position as Mean>::mean(&translations)?,
        ))
    }
}

/// Neutral value, returned by null sources.
pub trait Neutral {
    fn neutral() -> Self;
}

macro_rules! impl_neutral {
    ($($ty:ty => $value:expr),* $(,)?) => {
        $(
            impl Neutral for $ty {
                fn neutral() -> Self {
                    $value
                }
            }
        )*
    };
}

impl_neutral! {
    Pose => Pose::identity(),
    Rotation => Rotation::identity(),
    Position => Position::zeros(),
    Position2D => Position2D::zeros(),
    f64 => 0.0,
    i32 => 0,
    Matrix3x3 => Matrix3::identity(),
    Matrix3x4f => Matrix3x4::identity(),
    Matrix4x4 => Matrix4::identity(),
    ErrorPose => ErrorPose { pose: Pose::identity(), covariance: Matrix6::zeros() },
}

impl<T> Neutral for Vec<T> {
    fn neutral() -> Self {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pose_strategy() -> impl Strategy<Value = Pose> {
        (
            -3.0..3.0f64,
            -3.0..3.0f64,
            -3.0..3.0f64,
            -10.0..10.0f64,
            -10.0..10.0f64,
            -10.0..10.0f64,
        )
            .prop_map(|(r, p, y, tx, ty, tz)| {
                Pose::new(
                    UnitQuaternion::from_euler_angles(r, p, y),
                    Vector3::new(tx, ty, tz),
                )
            })
    }

    proptest! {
        #[test]
        fn prop_compose_with_inverse_is_identity(p in pose_strategy()) {
            prop_assert!(p.compose(&p.invert()).approx_eq(&Pose::identity(), 1e-9));
            prop_assert!(p.invert().compose(&p).approx_eq(&Pose::identity(), 1e-9));
        }

        #[test]
        fn prop_compose_is_associative(a in pose_strategy(), b in pose_strategy(), c in pose_strategy()) {
            let left = a.compose(&b).compose(&c);
            let right = a.compose(&b.compose(&c));
            prop_assert!(left.approx_eq(&right, 1e-8));
        }
    }

    #[test]
    fn test_pose_times_position() {
        let pose = Pose::new(
            UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(1.0, 0.0, 0.0),
        );
        let p = pose.multiply(&Vector3::new(1.0, 0.0, 0.0));
        assert!((p - Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_position_multiplication_is_addition() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(1.0, 1.0, 1.0);
        assert_eq!(a.multiply(&b), Vector3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = Pose::from_translation(Vector3::new(0.0, 0.0, 0.0));
        let b = Pose::from_translation(Vector3::new(2.0, 0.0, 0.0));
        let mid = a.interpolate(&b, 0.5);
        assert!((mid.translation.x - 1.0).abs() < 1e-12);

        let extrapolated = a.interpolate(&b, 2.0);
        assert!((extrapolated.translation.x - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_interpolation_antipodal() {
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());
        let mid = q.interpolate(&flipped, 0.5);
        assert!(mid.angle_to(&q) < 1e-9);
    }

    #[test]
    fn test_mean() {
        assert_eq!(f64::mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(f64::mean(&[]), None);
        let m = <Position as Mean>::mean(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(2.0, 4.0, 6.0)]).unwrap();
        assert_eq!(m, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_matrix_conversion() {
        let pose = Pose::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let m = pose.to_matrix4x4();
        assert_eq!(m[(0, 3)], 1.0);
        assert_eq!(m[(2, 3)], 3.0);
        assert_eq!(m[(3, 3)], 1.0);
        assert_eq!(m[(0, 0)], 1.0);
    }
}
