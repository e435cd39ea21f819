// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera geometry primitives: intrinsic and extrinsic parameters,
//! and pixel points tagged with the coordinate frame they live in.

use crate::misc::type_aliases::{Color, Float, Mat3, Point2, Vec3};

/// One camera of the stereo pair.
#[derive(PartialEq, Debug, Clone)]
pub struct Camera {
    pub intrinsics: Intrinsics,
    pub extrinsics: Extrinsics,
}

impl Camera {
    pub fn new(intrinsics: Intrinsics, extrinsics: Extrinsics) -> Camera {
        Camera {
            intrinsics,
            extrinsics,
        }
    }
}

// POINTS ##################################################

/// A colored point on the image plane of some camera, in pixel coordinates.
///
/// Kept distinct from `CameraPoint` so that a point cannot be fed to a
/// transform expecting the other coordinate frame.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ImagePoint {
    pub position: Point2,
    pub color: Color,
}

/// A colored point in the normalized camera frame (z = 1 plane).
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct CameraPoint {
    pub position: Vec3,
    pub color: Color,
}

// INTRINSICS ##############################################

/// Pinhole intrinsic parameters, no skew, no distortion.
#[derive(PartialEq, Debug, Clone)]
pub struct Intrinsics {
    /// Focal lengths in pixels (fx, fy).
    pub focal: (Float, Float),
    /// Principal point in pixels (cx, cy).
    pub principal_point: (Float, Float),
}

impl Intrinsics {
    /// The usual 3x3 calibration matrix K.
    #[rustfmt::skip]
    pub fn matrix(&self) -> Mat3 {
        Mat3::new(
            self.focal.0, 0.0,          self.principal_point.0,
            0.0,          self.focal.1, self.principal_point.1,
            0.0,          0.0,          1.0,
        )
    }

    /// Back project a pixel onto the z = 1 plane of the camera frame.
    pub fn to_camera_space(&self, point: &ImagePoint) -> CameraPoint {
        CameraPoint {
            position: Vec3::new(
                (point.position.x - self.principal_point.0) / self.focal.0,
                (point.position.y - self.principal_point.1) / self.focal.1,
                1.0,
            ),
            color: point.color,
        }
    }

    /// Project a camera frame point back onto the image plane,
    /// dividing by its z coordinate.
    pub fn to_image_space(&self, point: &CameraPoint) -> ImagePoint {
        ImagePoint {
            position: Point2::new(
                point.position.x * self.focal.0 / point.position.z + self.principal_point.0,
                point.position.y * self.focal.1 / point.position.z + self.principal_point.1,
            ),
            color: point.color,
        }
    }
}

// EXTRINSICS ##############################################

/// Extrinsic parameters, mapping world coordinates into camera coordinates:
/// `x_cam = R * x_world + t`.
///
/// Also used for the recovered relative pose between the two cameras of the
/// pair, in which case the translation is only known up to scale.
#[derive(PartialEq, Debug, Clone)]
pub struct Extrinsics {
    /// Orthonormal rotation matrix.
    pub rotation: Mat3,
    /// Translation vector.
    pub translation: Vec3,
}

impl Extrinsics {
    pub fn new(rotation: Mat3, translation: Vec3) -> Extrinsics {
        Extrinsics {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Extrinsics {
        Extrinsics {
            rotation: Mat3::identity(),
            translation: Vec3::zeros(),
        }
    }

    /// Pose of camera `to` expressed relatively to camera `from`:
    /// a point in `from` coordinates maps to `to` coordinates with
    /// `x_to = R_rel * x_from + t_rel`.
    pub fn relative(from: &Extrinsics, to: &Extrinsics) -> Extrinsics {
        let rotation = to.rotation * from.rotation.transpose();
        let translation = to.translation - rotation * from.translation;
        Extrinsics {
            rotation,
            translation,
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::misc::type_aliases::Float;
    use nalgebra::UnitQuaternion;
    use quickcheck::TestResult;
    use quickcheck_macros;

    const EPSILON_APPROX: Float = 1e-3;

    fn gen_intrinsics() -> Intrinsics {
        Intrinsics {
            focal: (529.0, 531.5),
            principal_point: (320.2, 239.8),
        }
    }

    fn rotation_matrix(roll: Float, pitch: Float, yaw: Float) -> Mat3 {
        let q = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        Mat3::from_columns(&[q * Vec3::x(), q * Vec3::y(), q * Vec3::z()])
    }

    #[quickcheck_macros::quickcheck]
    fn image_camera_roundtrip(x: Float, y: Float) -> TestResult {
        if !x.is_finite() || !y.is_finite() || x.abs() > 1e4 || y.abs() > 1e4 {
            return TestResult::discard();
        }
        let intrinsics = gen_intrinsics();
        let point = ImagePoint {
            position: Point2::new(x, y),
            color: (1, 2, 3),
        };
        let back = intrinsics.to_image_space(&intrinsics.to_camera_space(&point));
        TestResult::from_bool(
            (back.position - point.position).norm() < EPSILON_APPROX && back.color == point.color,
        )
    }

    #[test]
    fn relative_pose_of_identical_cameras_is_identity() {
        let extrinsics = Extrinsics::new(rotation_matrix(0.3, -0.2, 0.7), Vec3::new(1.0, 2.0, 3.0));
        let relative = Extrinsics::relative(&extrinsics, &extrinsics);
        assert!(approx::relative_eq!(
            relative.rotation,
            Mat3::identity(),
            epsilon = EPSILON_APPROX
        ));
        assert!(relative.translation.norm() < EPSILON_APPROX);
    }

    #[quickcheck_macros::quickcheck]
    fn relative_pose_maps_between_camera_frames(
        px: Float,
        py: Float,
        pz: Float,
    ) -> TestResult {
        if ![px, py, pz].iter().all(|v| v.is_finite() && v.abs() < 1e3) {
            return TestResult::discard();
        }
        let cam_a = Extrinsics::new(rotation_matrix(0.1, 0.2, -0.3), Vec3::new(0.5, -1.0, 2.0));
        let cam_b = Extrinsics::new(rotation_matrix(-0.4, 0.0, 0.25), Vec3::new(-2.0, 0.7, 1.1));
        let world = Vec3::new(px, py, pz);
        let in_a = cam_a.rotation * world + cam_a.translation;
        let in_b = cam_b.rotation * world + cam_b.translation;
        let relative = Extrinsics::relative(&cam_a, &cam_b);
        let mapped = relative.rotation * in_a + relative.translation;
        TestResult::from_bool((mapped - in_b).norm() < 1e-2)
    }
}
