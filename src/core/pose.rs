// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Relative pose recovery from sparse point correspondences.
//!
//! The essential matrix is estimated with the normalized 8-point algorithm
//! inside a RANSAC loop, then decomposed into the rotation / translation
//! pair placing the triangulated points in front of both cameras.
//! The translation is recovered up to scale and returned with unit norm.

use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::core::camera::{Extrinsics, Intrinsics};
use crate::misc::type_aliases::{Float, Mat3, Point2, Vec3};

/// Minimum number of correspondences required by the 8-point algorithm.
pub const MIN_CORRESPONDENCES: usize = 8;

/// Errors of the pose estimation stage. Both are fatal for the pipeline:
/// without a reliable pose no rectifying basis can be formed.
#[derive(Error, Debug, PartialEq)]
pub enum PoseError {
    /// Fewer correspondences than the minimal sample size.
    #[error("not enough correspondences: {found} found, {MIN_CORRESPONDENCES} required")]
    InsufficientCorrespondences { found: usize },
    /// No consensus set, or no decomposition passes the cheirality test.
    #[error("degenerate point configuration, cannot recover a reliable pose")]
    IllConditioned,
}

/// Configuration of the estimator.
pub struct Config {
    /// RANSAC inlier threshold, in pixels. Values around 0.1 - 1.0 work well,
    /// cf the discussion in the OpenCV findEssentialMat documentation.
    pub threshold: Float,
    /// Number of RANSAC sampling rounds.
    pub max_iterations: usize,
    /// Seed of the sampling rng, fixed to keep the pipeline reproducible.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            threshold: 0.5,
            max_iterations: 500,
            seed: 37,
        }
    }
}

/// Recover the pose of camera 2 relative to camera 1 from index-aligned
/// point correspondences sharing the intrinsics `intrinsics`.
pub fn estimate(
    matches: &[(Point2, Point2)],
    intrinsics: &Intrinsics,
    config: &Config,
) -> Result<Extrinsics, PoseError> {
    if matches.len() < MIN_CORRESPONDENCES {
        return Err(PoseError::InsufficientCorrespondences {
            found: matches.len(),
        });
    }

    // Work in normalized coordinates (K^-1 applied, z = 1).
    let normalized: Vec<(Vec3, Vec3)> = matches
        .iter()
        .map(|(p1, p2)| (normalize(intrinsics, p1), normalize(intrinsics, p2)))
        .collect();
    let mean_focal = 0.5 * (intrinsics.focal.0.abs() + intrinsics.focal.1.abs());
    let threshold = config.threshold / mean_focal;
    let squared_threshold = threshold * threshold;

    // RANSAC over minimal 8-point samples.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_inliers: Vec<usize> = Vec::new();
    for _ in 0..config.max_iterations {
        let sample = sample_indices(&mut rng, normalized.len());
        let pairs: Vec<_> = sample.iter().map(|&i| normalized[i]).collect();
        if let Some(essential) = eight_point(&pairs) {
            let inliers: Vec<usize> = normalized
                .iter()
                .enumerate()
                .filter(|(_, pair)| sampson_squared(&essential, pair) < squared_threshold)
                .map(|(i, _)| i)
                .collect();
            if inliers.len() > best_inliers.len() {
                best_inliers = inliers;
            }
        }
    }
    if best_inliers.len() < MIN_CORRESPONDENCES {
        return Err(PoseError::IllConditioned);
    }
    log::info!(
        "pose: {} / {} correspondences in the consensus set",
        best_inliers.len(),
        normalized.len()
    );

    // Least squares refit on the consensus set, then decomposition.
    let consensus: Vec<_> = best_inliers.iter().map(|&i| normalized[i]).collect();
    let essential = eight_point(&consensus).ok_or(PoseError::IllConditioned)?;
    decompose(&essential, &consensus).ok_or(PoseError::IllConditioned)
}

fn normalize(intrinsics: &Intrinsics, p: &Point2) -> Vec3 {
    Vec3::new(
        (p.x - intrinsics.principal_point.0) / intrinsics.focal.0,
        (p.y - intrinsics.principal_point.1) / intrinsics.focal.1,
        1.0,
    )
}

/// Draw 8 distinct indices in `[0, len)`.
fn sample_indices(rng: &mut StdRng, len: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity(MIN_CORRESPONDENCES);
    while indices.len() < MIN_CORRESPONDENCES {
        let candidate = rng.gen_range(0, len);
        if !indices.contains(&candidate) {
            indices.push(candidate);
        }
    }
    indices
}

/// Linear 8-point estimation of the essential matrix satisfying
/// `x2^T E x1 = 0`, with the rank-2 constraint enforced afterwards.
fn eight_point(pairs: &[(Vec3, Vec3)]) -> Option<Mat3> {
    // One homogeneous constraint row per correspondence. The matrix is
    // padded with zero rows up to 9x9 so that the SVD exposes the full
    // right-singular basis (thin SVDs of an n x 9 matrix would not).
    let rows = pairs.len().max(9);
    let mut constraints = DMatrix::<Float>::zeros(rows, 9);
    for (i, (x1, x2)) in pairs.iter().enumerate() {
        constraints[(i, 0)] = x2.x * x1.x;
        constraints[(i, 1)] = x2.x * x1.y;
        constraints[(i, 2)] = x2.x;
        constraints[(i, 3)] = x2.y * x1.x;
        constraints[(i, 4)] = x2.y * x1.y;
        constraints[(i, 5)] = x2.y;
        constraints[(i, 6)] = x1.x;
        constraints[(i, 7)] = x1.y;
        constraints[(i, 8)] = 1.0;
    }

    let svd = constraints.svd(false, true);
    let v_t = svd.v_t?;
    // The nullspace direction is the right-singular vector associated
    // with the smallest singular value (order is not guaranteed).
    let mut smallest = 0;
    for i in 1..svd.singular_values.len() {
        if svd.singular_values[i] < svd.singular_values[smallest] {
            smallest = i;
        }
    }
    let e = v_t.row(smallest);
    #[rustfmt::skip]
    let essential = Mat3::new(
        e[0], e[1], e[2],
        e[3], e[4], e[5],
        e[6], e[7], e[8],
    );

    // Project onto the essential manifold: singular values (1, 1, 0).
    let (u, _, v_t) = sorted_svd3(&essential)?;
    Some(u * Mat3::from_diagonal(&Vec3::new(1.0, 1.0, 0.0)) * v_t)
}

/// SVD of a 3x3 matrix with singular values sorted in decreasing order.
fn sorted_svd3(mat: &Mat3) -> Option<(Mat3, Vec3, Mat3)> {
    let svd = mat.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let s = svd.singular_values;
    let mut order = [0_usize, 1, 2];
    order.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(std::cmp::Ordering::Equal));
    let u_sorted = Mat3::from_columns(&[
        u.column(order[0]).into_owned(),
        u.column(order[1]).into_owned(),
        u.column(order[2]).into_owned(),
    ]);
    let v_t_sorted = Mat3::from_rows(&[
        v_t.row(order[0]).into_owned(),
        v_t.row(order[1]).into_owned(),
        v_t.row(order[2]).into_owned(),
    ]);
    let s_sorted = Vec3::new(s[order[0]], s[order[1]], s[order[2]]);
    Some((u_sorted, s_sorted, v_t_sorted))
}

/// First order (Sampson) squared distance to the epipolar constraint.
fn sampson_squared(essential: &Mat3, (x1, x2): &(Vec3, Vec3)) -> Float {
    let ex1 = essential * x1;
    let etx2 = essential.transpose() * x2;
    let residual = x2.dot(&ex1);
    let norm = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
    if norm <= 0.0 {
        return Float::MAX;
    }
    residual * residual / norm
}

/// Decompose an essential matrix into the four candidate (R, t) pairs and
/// keep the one placing the most correspondences in front of both cameras.
fn decompose(essential: &Mat3, pairs: &[(Vec3, Vec3)]) -> Option<Extrinsics> {
    let (mut u, _, mut v_t) = sorted_svd3(essential)?;
    if u.determinant() < 0.0 {
        u = -u;
    }
    if v_t.determinant() < 0.0 {
        v_t = -v_t;
    }
    #[rustfmt::skip]
    let w = Mat3::new(
        0.0, -1.0, 0.0,
        1.0,  0.0, 0.0,
        0.0,  0.0, 1.0,
    );
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t = u.column(2).into_owned();

    let candidates = [
        (r1, t),
        (r1, -t),
        (r2, t),
        (r2, -t),
    ];
    let mut best: Option<(usize, &(Mat3, Vec3))> = None;
    for candidate in candidates.iter() {
        let votes = pairs
            .iter()
            .filter(|(x1, x2)| in_front_of_both(&candidate.0, &candidate.1, x1, x2))
            .count();
        match best {
            Some((best_votes, _)) if votes <= best_votes => (),
            _ => best = Some((votes, candidate)),
        }
    }
    match best {
        Some((votes, (rotation, translation))) if votes > 0 => Some(Extrinsics::new(
            *rotation,
            translation.normalize(),
        )),
        _ => None,
    }
}

/// Linear two-view triangulation of a normalized correspondence,
/// checking that the depth is positive in both camera frames.
fn in_front_of_both(rotation: &Mat3, translation: &Vec3, x1: &Vec3, x2: &Vec3) -> bool {
    // z2 * x2 = z1 * R x1 + t, crossed with x2 to eliminate z2.
    let rx1 = rotation * x1;
    let cross = x2.cross(&rx1);
    let denom = cross.norm_squared();
    if denom < 1e-12 {
        return false;
    }
    let z1 = -(x2.cross(translation)).dot(&cross) / denom;
    let z2 = (rx1 * z1 + translation).z;
    z1 > 0.0 && z2 > 0.0
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use nalgebra::UnitQuaternion;

    fn gen_intrinsics() -> Intrinsics {
        Intrinsics {
            focal: (520.0, 520.0),
            principal_point: (320.0, 240.0),
        }
    }

    fn rotation_matrix(roll: Float, pitch: Float, yaw: Float) -> Mat3 {
        let q = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        Mat3::from_columns(&[q * Vec3::x(), q * Vec3::y(), q * Vec3::z()])
    }

    fn project(intrinsics: &Intrinsics, point: &Vec3) -> Point2 {
        let camera_point = crate::core::camera::CameraPoint {
            position: *point / point.z,
            color: (0, 0, 0),
        };
        intrinsics.to_image_space(&camera_point).position
    }

    /// Synthetic two-view scene with a known ground truth pose.
    fn gen_matches(
        intrinsics: &Intrinsics,
        rotation: &Mat3,
        translation: &Vec3,
    ) -> Vec<(Point2, Point2)> {
        let mut matches = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let world = Vec3::new(
                    -0.5 + 0.2 * i as Float,
                    -0.4 + 0.17 * j as Float,
                    3.0 + 0.3 * ((i * 6 + j) % 5) as Float,
                );
                let in_2 = rotation * world + translation;
                matches.push((project(intrinsics, &world), project(intrinsics, &in_2)));
            }
        }
        matches
    }

    #[test]
    fn recovers_a_known_pose() {
        let intrinsics = gen_intrinsics();
        let rotation = rotation_matrix(0.04, -0.03, 0.05);
        let translation = Vec3::new(-1.0, 0.08, 0.02).normalize();
        let matches = gen_matches(&intrinsics, &rotation, &translation);

        let pose = estimate(&matches, &intrinsics, &Config::default()).unwrap();
        assert!(approx::relative_eq!(
            pose.rotation,
            rotation,
            epsilon = 1e-2
        ));
        assert!(pose.translation.dot(&translation) > 0.99);
    }

    #[test]
    fn pure_horizontal_baseline() {
        let intrinsics = gen_intrinsics();
        let rotation = Mat3::identity();
        let translation = Vec3::new(-1.0, 0.0, 0.0);
        let matches = gen_matches(&intrinsics, &rotation, &translation);

        let pose = estimate(&matches, &intrinsics, &Config::default()).unwrap();
        assert!(approx::relative_eq!(
            pose.rotation,
            Mat3::identity(),
            epsilon = 1e-2
        ));
        assert!(pose.translation.dot(&translation) > 0.99);
    }

    #[test]
    fn too_few_correspondences() {
        let intrinsics = gen_intrinsics();
        let matches = vec![(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)); 5];
        assert_eq!(
            Err(PoseError::InsufficientCorrespondences { found: 5 }),
            estimate(&matches, &intrinsics, &Config::default())
        );
    }

    #[test]
    fn estimation_is_deterministic() {
        let intrinsics = gen_intrinsics();
        let rotation = rotation_matrix(0.02, 0.01, -0.03);
        let translation = Vec3::new(-0.9, 0.1, 0.0).normalize();
        let matches = gen_matches(&intrinsics, &rotation, &translation);

        let first = estimate(&matches, &intrinsics, &Config::default()).unwrap();
        let second = estimate(&matches, &intrinsics, &Config::default()).unwrap();
        assert_eq!(first, second);
    }
}
