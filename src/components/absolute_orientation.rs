//! Absolute orientation: the pose mapping corresponding 3D points of
//! `InputB` onto those of `InputA`.
//!
//! [`absolute_orientation`] is the closed-form least-squares solution via
//! SVD of the cross-covariance. [`ransac`] repeats it on random minimal
//! subsets and refits on the largest consensus set.

use super::register_trigger;
use crate::config::SubgraphConfig;
use crate::dataflow::{
    check_correspondences, BuildContext, ComponentFactory, DataflowError, DataflowResult, ExpansionInPort,
    TriggerComponent,
};
use crate::measurement::{ErrorPose, Mean, Measurement, Pose, Position, Rotation};
use nalgebra::{Matrix3, Matrix6, Rotation3};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(crate) fn register(factory: &mut ComponentFactory) {
    register_trigger(factory, "AbsoluteOrientation", closed_form);
    register_trigger(factory, "AbsoluteOrientationCovar", closed_form_covariance);
    register_trigger(factory, "AbsoluteOrientationRANSAC", robust);
}

/// Pose `p` minimizing `sum |a_i - p * b_i|^2`.
pub fn absolute_orientation(a: &[Position], b: &[Position]) -> DataflowResult<Pose> {
    check_correspondences(a.len(), b.len(), 3)?;
    let not_enough = || DataflowError::NotEnoughData("empty point set".to_string());
    let centroid_a = <Position as Mean>::mean(a).ok_or_else(not_enough)?;
    let centroid_b = <Position as Mean>::mean(b).ok_or_else(not_enough)?;

    let cross = a.iter().zip(b).fold(Matrix3::zeros(), |acc, (pa, pb)| {
        acc + (pb - centroid_b) * (pa - centroid_a).transpose()
    });
    let svd = cross.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(DataflowError::Compute("SVD did not converge".to_string()));
    };
    let v = v_t.transpose();
    // reflection guard
    let d = (v * u.transpose()).determinant().signum();
    let r = v * Matrix3::from_diagonal(&Position::new(1.0, 1.0, d)) * u.transpose();
    let rotation = Rotation::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let translation = centroid_a - rotation * centroid_b;
    Ok(Pose::new(rotation, translation))
}

/// Distance between `a` and the pose applied to `b`.
pub fn residual(pose: &Pose, a: &Position, b: &Position) -> f64 {
    (a - pose.transform_point(b)).norm()
}

/// RANSAC parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacParams {
    pub threshold: f64,
    pub set_size: usize,
    pub min_inliers: usize,
    pub min_runs: usize,
    pub max_runs: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            set_size: 3,
            min_inliers: 3,
            min_runs: 1,
            max_runs: 100,
        }
    }
}

impl RansacParams {
    fn from_config(config: &SubgraphConfig) -> DataflowResult<Self> {
        let d = Self::default();
        let params = Self {
            threshold: config.attr_or("threshold", d.threshold)?,
            set_size: config.attr_or("setSize", d.set_size)?,
            min_inliers: config.attr_or("minInliers", d.min_inliers)?,
            min_runs: config.attr_or("minRuns", d.min_runs)?,
            max_runs: config.attr_or("maxRuns", d.max_runs)?,
        };
        if params.set_size < 3 {
            return Err(DataflowError::invalid_attribute(&config.id, "setSize", "at least 3 points are needed"));
        }
        if params.max_runs == 0 || params.max_runs < params.min_runs {
            return Err(DataflowError::invalid_attribute(
                &config.id,
                "maxRuns",
                format!("must be positive and at least minRuns ({})", params.min_runs),
            ));
        }
        Ok(params)
    }

    /// Runs needed to draw an outlier-free set with 99% confidence at the
    /// given inlier ratio.
    fn needed_runs(&self, inlier_ratio: f64) -> usize {
        let all_inliers = inlier_ratio.powi(self.set_size as i32);
        if all_inliers >= 1.0 {
            return self.min_runs;
        }
        if all_inliers <= 0.0 {
            return self.max_runs;
        }
        let runs = (0.01f64).ln() / (1.0 - all_inliers).ln();
        (runs.ceil() as usize).clamp(self.min_runs, self.max_runs)
    }
}

fn select(points: &[Position], indices: &[usize]) -> Vec<Position> {
    indices.iter().map(|&i| points[i]).collect()
}

/// Robust absolute orientation; returns the pose and the number of runs.
pub fn ransac<R: Rng>(
    a: &[Position],
    b: &[Position],
    params: &RansacParams,
    rng: &mut R,
) -> DataflowResult<(Pose, usize)> {
    check_correspondences(a.len(), b.len(), params.set_size)?;
    let n = a.len();
    let mut best: Vec<usize> = Vec::new();
    let mut runs = 0;
    while runs < params.needed_runs(best.len() as f64 / n as f64) {
        runs += 1;
        let sample = rand::seq::index::sample(rng, n, params.set_size).into_vec();
        let Ok(candidate) = absolute_orientation(&select(a, &sample), &select(b, &sample)) else {
            continue;
        };
        let inliers: Vec<usize> = (0..n)
            .filter(|&i| residual(&candidate, &a[i], &b[i]) < params.threshold)
            .collect();
        if inliers.len() > best.len() {
            best = inliers;
        }
    }
    if best.len() < params.min_inliers.max(3) {
        return Err(DataflowError::Compute(format!(
            "only {} inliers after {} runs, {} required",
            best.len(),
            runs,
            params.min_inliers
        )));
    }
    let pose = absolute_orientation(&select(a, &best), &select(b, &best))?;
    Ok((pose, runs))
}

type Correspondences = (TriggerComponent, ExpansionInPort<Position>, ExpansionInPort<Position>);

fn inputs(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<Correspondences> {
    let mut trig = TriggerComponent::new(config, ctx)?;
    let a = trig.expansion_input::<Position>("InputA")?;
    let b = trig.expansion_input::<Position>("InputB")?;
    Ok((trig, a, b))
}

fn closed_form(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent> {
    let (mut trig, a, b) = inputs(config, ctx)?;
    let output = trig.output::<Pose>("Output")?;
    trig.set_compute(move |t| {
        let pose = absolute_orientation(&a.values()?, &b.values()?)?;
        output.send(Measurement::new(t, pose));
        Ok(())
    });
    Ok(trig)
}

/// As [`closed_form`], with the mean squared residual spread over the
/// translation covariance.
fn closed_form_covariance(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent> {
    let (mut trig, a, b) = inputs(config, ctx)?;
    let output = trig.output::<ErrorPose>("Output")?;
    trig.set_compute(move |t| {
        let (a, b) = (a.values()?, b.values()?);
        let pose = absolute_orientation(&a, &b)?;
        let error = a.iter().zip(&b).map(|(pa, pb)| residual(&pose, pa, pb)).sum::<f64>() / a.len() as f64;
        let mut covariance = Matrix6::zeros();
        for i in 0..3 {
            covariance[(i, i)] = error * error / 3.0;
        }
        output.send(Measurement::new(t, ErrorPose { pose, covariance }));
        Ok(())
    });
    Ok(trig)
}

fn robust(config: &SubgraphConfig, ctx: &BuildContext) -> DataflowResult<TriggerComponent> {
    let params = RansacParams::from_config(config)?;
    let rng = Mutex::new(match config.attr::<u64>("seed")? {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    });
    let (mut trig, a, b) = inputs(config, ctx)?;
    let output = trig.output::<Pose>("Output")?;
    trig.set_compute(move |t| {
        let (pose, runs) = ransac(&a.values()?, &b.values()?, &params, &mut *rng.lock())?;
        tracing::info!("Robust absolute orientation performed with {} iterations", runs);
        output.send(Measurement::new(t, pose));
        Ok(())
    });
    Ok(trig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing::{at, values, Harness};
    use crate::config::EdgeMode;

    fn ground_truth() -> Pose {
        Pose::new(Rotation::from_euler_angles(0.2, -0.4, 1.1), Position::new(0.5, -1.0, 2.0))
    }

    fn cloud() -> Vec<Position> {
        vec![
            Position::new(0.0, 0.0, 0.0),
            Position::new(1.0, 0.0, 0.0),
            Position::new(0.0, 1.0, 0.0),
            Position::new(0.0, 0.0, 1.0),
            Position::new(1.0, 1.0, 0.5),
            Position::new(-0.5, 0.3, 0.8),
        ]
    }

    #[test]
    fn test_recovers_pose() {
        let b = cloud();
        let a: Vec<Position> = b.iter().map(|p| ground_truth().transform_point(p)).collect();
        let pose = absolute_orientation(&a, &b).unwrap();
        assert!(pose.approx_eq(&ground_truth(), 1e-9));
    }

    #[test]
    fn test_correspondence_checks() {
        let b = cloud();
        assert!(matches!(
            absolute_orientation(&b[..2], &b[..2]),
            Err(DataflowError::IllegalCorrespondences(_))
        ));
        assert!(matches!(
            absolute_orientation(&b, &b[..4]),
            Err(DataflowError::IllegalCorrespondences(_))
        ));
    }

    #[test]
    fn test_ransac_ignores_outlier() {
        let b = cloud();
        let mut a: Vec<Position> = b.iter().map(|p| ground_truth().transform_point(p)).collect();
        a[4] += Position::new(3.0, 0.0, 0.0);
        let mut rng = StdRng::seed_from_u64(42);
        let params = RansacParams {
            min_inliers: 5,
            min_runs: 20,
            ..RansacParams::default()
        };
        let (pose, runs) = ransac(&a, &b, &params, &mut rng).unwrap();
        assert!(runs >= 20);
        assert!(pose.approx_eq(&ground_truth(), 1e-9));
    }

    #[test]
    fn test_component_with_list_inputs() {
        let h = Harness::new();
        let config = SubgraphConfig::new("ao", "AbsoluteOrientation")
            .with_open_input("InputA", EdgeMode::Push)
            .with_open_input("InputB", EdgeMode::Push)
            .with_output("Output", EdgeMode::Push);
        let ao = h.build(&config).unwrap();
        let feed_a = h.feed::<Vec<Position>>(ao.as_ref(), "InputA");
        let feed_b = h.feed::<Vec<Position>>(ao.as_ref(), "InputB");
        let out = h.collect::<Pose>(ao.as_ref(), "Output");

        let b = cloud();
        let a: Vec<Position> = b.iter().map(|p| ground_truth().transform_point(p)).collect();
        feed_a.send(at(1, a));
        feed_b.send(at(1, b));
        assert!(values(&out)[0].approx_eq(&ground_truth(), 1e-9));
    }
}
