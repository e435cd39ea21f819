// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Epipolar rectification of a stereo pair.
//!
//! Every pixel of both images is lifted into its camera frame, rotated by a
//! rectifying basis built from the baseline direction, and projected back
//! onto a shared image plane where corresponding points lie on the same
//! scanline. The warp is a forward scatter of colored points, so the
//! rectified images contain unfilled holes; filling them is out of scope.

use itertools::izip;
use rayon::prelude::*;
use thiserror::Error;

use crate::core::camera::{Camera, CameraPoint, Extrinsics, ImagePoint};
use crate::misc::type_aliases::{Float, Mat3, Point2, RgbMatrix, Vec2, Vec3};

/// Translations shorter than this cannot define a rectifying basis.
const EPSILON_BASELINE: Float = 1e-6;

/// Errors of the rectification stage, all fatal for the pipeline.
#[derive(Error, Debug, PartialEq)]
pub enum RectificationError {
    /// The two input images have different dimensions.
    #[error("input images have different sizes: {left_rows}x{left_cols} vs {right_rows}x{right_cols}")]
    SizeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
    /// Zero-length baseline, or baseline along the optical axis:
    /// the rectifying basis is undefined.
    #[error("degenerate baseline, the rectifying basis is undefined")]
    DegenerateBaseline,
}

/// Where one original left-image pixel landed after rectification.
///
/// The rectified position may fall outside the rectified image bounds;
/// such entries are kept here and only dropped during back-mapping.
#[derive(Debug, Clone, Copy)]
pub struct PixelCorrespondence {
    pub original: ImagePoint,
    pub rectified: ImagePoint,
}

/// Output of the rectification stage. The two images have identical
/// dimensions, equal to the dimensions of the input images.
pub struct Rectified {
    pub left: RgbMatrix,
    pub right: RgbMatrix,
    /// One entry per original left pixel, in row major scan order.
    pub correspondences: Vec<PixelCorrespondence>,
}

/// Build the rectifying rotation basis from a baseline direction:
/// first row along the baseline, second row the in-plane orthogonal
/// direction, third row their cross product.
#[rustfmt::skip]
pub fn rectifying_basis(baseline: &Vec3) -> Result<Mat3, RectificationError> {
    if baseline.norm() < EPSILON_BASELINE {
        return Err(RectificationError::DegenerateBaseline);
    }
    let row1 = baseline.normalize();
    let in_plane = (row1.x * row1.x + row1.y * row1.y).sqrt();
    if in_plane < EPSILON_BASELINE {
        return Err(RectificationError::DegenerateBaseline);
    }
    let row2 = Vec3::new(-row1.y, row1.x, 0.0) / in_plane;
    let row3 = row1.cross(&row2);
    Ok(Mat3::new(
        row1.x, row1.y, row1.z,
        row2.x, row2.y, row2.z,
        row3.x, row3.y, row3.z,
    ))
}

/// Rectify a stereo pair given the pose of the right camera relative to the
/// left one (either recovered by `core::pose` or derived from calibrated
/// extrinsics with `Extrinsics::relative`).
pub fn rectify(
    left_image: &RgbMatrix,
    right_image: &RgbMatrix,
    left_camera: &Camera,
    right_camera: &Camera,
    pose: &Extrinsics,
) -> Result<Rectified, RectificationError> {
    let (rows, cols) = left_image.shape();
    if right_image.shape() != (rows, cols) {
        return Err(RectificationError::SizeMismatch {
            left_rows: rows,
            left_cols: cols,
            right_rows: right_image.nrows(),
            right_cols: right_image.ncols(),
        });
    }
    let basis = rectifying_basis(&pose.translation)?;

    // Rasterize both images into pixel-center points, row major.
    let left_points = rasterize(left_image);
    let right_points = rasterize(right_image);

    // 1. Rotate the right image plane to be parallel with the left one.
    let align = pose.rotation.transpose();
    let right_points: Vec<ImagePoint> = right_points
        .par_iter()
        .map(|point| {
            let camera_point = right_camera.intrinsics.to_camera_space(point);
            right_camera.intrinsics.to_image_space(&CameraPoint {
                position: align * camera_point.position,
                color: camera_point.color,
            })
        })
        .collect();

    // 2. Rotate both image planes by the rectifying basis.
    let left_rectified = apply_basis(&basis, left_camera, &left_points);
    let right_rectified = apply_basis(&basis, right_camera, &right_points);

    // 3. Shared scale and centering offset such that both rectified images
    //    fit the original dimensions. Using the minimum of the two scales
    //    and the average of the two offsets keeps the relative disparity
    //    geometry between the images.
    let left_box = BoundingBox::of(&left_rectified);
    let right_box = BoundingBox::of(&right_rectified);
    let scale = left_box
        .fit_scale(rows, cols)
        .min(right_box.fit_scale(rows, cols))
        .min(1.0);
    let offset = 0.5
        * (left_box.center_offset(scale, rows, cols) + right_box.center_offset(scale, rows, cols));
    let place = |point: &ImagePoint| ImagePoint {
        position: Point2::new(
            scale * point.position.x + offset.x,
            scale * point.position.y + offset.y,
        ),
        color: point.color,
    };
    let left_placed: Vec<ImagePoint> = left_rectified.iter().map(place).collect();
    let right_placed: Vec<ImagePoint> = right_rectified.iter().map(place).collect();

    // 4. Scatter the points into the rectified rasters. Out of bounds
    //    destinations are dropped from the images but never from the
    //    correspondence table.
    let mut left = RgbMatrix::from_element(rows, cols, (0, 0, 0));
    let mut right = RgbMatrix::from_element(rows, cols, (0, 0, 0));
    scatter(&left_placed, &mut left);
    scatter(&right_placed, &mut right);

    let correspondences = izip!(left_points.iter(), left_placed.iter())
        .map(|(original, rectified)| PixelCorrespondence {
            original: *original,
            rectified: *rectified,
        })
        .collect();

    Ok(Rectified {
        left,
        right,
        correspondences,
    })
}

/// Flatten an image into colored pixel-center points, row major.
fn rasterize(image: &RgbMatrix) -> Vec<ImagePoint> {
    let (rows, cols) = image.shape();
    let mut points = Vec::with_capacity(rows * cols);
    for y in 0..rows {
        for x in 0..cols {
            points.push(ImagePoint {
                position: Point2::new(x as Float + 0.5, y as Float + 0.5),
                color: image[(y, x)],
            });
        }
    }
    points
}

/// Rotate image points by the rectifying basis through the camera frame.
fn apply_basis(basis: &Mat3, camera: &Camera, points: &[ImagePoint]) -> Vec<ImagePoint> {
    points
        .par_iter()
        .map(|point| {
            let camera_point = camera.intrinsics.to_camera_space(point);
            camera.intrinsics.to_image_space(&CameraPoint {
                position: basis * camera_point.position,
                color: camera_point.color,
            })
        })
        .collect()
}

/// Write each point's color into the pixel containing it.
/// Pixel-center convention: the destination pixel is the floor of the
/// coordinates. Each input point touches at most one output pixel.
fn scatter(points: &[ImagePoint], target: &mut RgbMatrix) {
    let (rows, cols) = target.shape();
    for point in points {
        let x = point.position.x.floor();
        let y = point.position.y.floor();
        if x >= 0.0 && x < cols as Float && y >= 0.0 && y < rows as Float {
            target[(y as usize, x as usize)] = point.color;
        }
    }
}

// Axis-aligned bounding box of a rectified point set.
struct BoundingBox {
    min_x: Float,
    min_y: Float,
    max_x: Float,
    max_y: Float,
}

impl BoundingBox {
    fn of(points: &[ImagePoint]) -> BoundingBox {
        let mut bounding_box = BoundingBox {
            min_x: Float::MAX,
            min_y: Float::MAX,
            max_x: Float::MIN,
            max_y: Float::MIN,
        };
        for point in points {
            bounding_box.min_x = bounding_box.min_x.min(point.position.x);
            bounding_box.min_y = bounding_box.min_y.min(point.position.y);
            bounding_box.max_x = bounding_box.max_x.max(point.position.x);
            bounding_box.max_y = bounding_box.max_y.max(point.position.y);
        }
        bounding_box
    }

    /// Scale needed to fit the box into a rows x cols raster.
    fn fit_scale(&self, rows: usize, cols: usize) -> Float {
        let extent_x = self.max_x - self.min_x;
        let extent_y = self.max_y - self.min_y;
        (cols as Float / extent_x).min(rows as Float / extent_y)
    }

    /// Offset centering the scaled box inside a rows x cols raster.
    fn center_offset(&self, scale: Float, rows: usize, cols: usize) -> Vec2 {
        Vec2::new(
            (cols as Float - scale * (self.max_x - self.min_x)) / 2.0 - scale * self.min_x,
            (rows as Float - scale * (self.max_y - self.min_y)) / 2.0 - scale * self.min_y,
        )
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::camera::Intrinsics;
    use quickcheck::TestResult;
    use quickcheck_macros;

    const EPSILON_APPROX: Float = 1e-5;

    fn gen_camera() -> Camera {
        Camera::new(
            Intrinsics {
                focal: (100.0, 100.0),
                principal_point: (2.0, 1.5),
            },
            Extrinsics::identity(),
        )
    }

    fn gen_image(rows: usize, cols: usize) -> RgbMatrix {
        RgbMatrix::from_fn(rows, cols, |y, x| (y as u8, x as u8, 7))
    }

    #[quickcheck_macros::quickcheck]
    fn basis_is_orthonormal(bx: Float, by: Float, bz: Float) -> TestResult {
        let baseline = Vec3::new(bx, by, bz);
        if ![bx, by, bz].iter().all(|v| v.is_finite())
            || baseline.norm() < 1e-3
            || (bx * bx + by * by).sqrt() / baseline.norm() < 1e-3
        {
            return TestResult::discard();
        }
        match rectifying_basis(&baseline) {
            Err(_) => TestResult::failed(),
            Ok(basis) => TestResult::from_bool(approx::relative_eq!(
                basis * basis.transpose(),
                Mat3::identity(),
                epsilon = EPSILON_APPROX
            )),
        }
    }

    #[test]
    fn axis_aligned_baseline_gives_identity_basis() {
        let basis = rectifying_basis(&Vec3::new(2.5, 0.0, 0.0)).unwrap();
        assert!(approx::relative_eq!(
            basis,
            Mat3::identity(),
            epsilon = EPSILON_APPROX
        ));
    }

    #[test]
    fn zero_baseline_is_degenerate() {
        assert_eq!(
            Err(RectificationError::DegenerateBaseline),
            rectifying_basis(&Vec3::zeros())
        );
    }

    #[test]
    fn optical_axis_baseline_is_degenerate() {
        assert_eq!(
            Err(RectificationError::DegenerateBaseline),
            rectifying_basis(&Vec3::new(0.0, 0.0, 1.0))
        );
    }

    #[test]
    fn identity_rectification_reproduces_the_inputs() {
        let camera = gen_camera();
        let left_image = gen_image(3, 4);
        let right_image = gen_image(3, 4);
        let pose = Extrinsics::new(Mat3::identity(), Vec3::new(1.0, 0.0, 0.0));
        let rectified = rectify(&left_image, &right_image, &camera, &camera, &pose).unwrap();
        assert_eq!(left_image, rectified.left);
        assert_eq!(right_image, rectified.right);
    }

    #[test]
    fn correspondences_enumerate_every_pixel_in_scan_order() {
        let camera = gen_camera();
        let image = gen_image(3, 4);
        let pose = Extrinsics::new(Mat3::identity(), Vec3::new(1.0, 0.0, 0.0));
        let rectified = rectify(&image, &image, &camera, &camera, &pose).unwrap();
        assert_eq!(12, rectified.correspondences.len());
        for (index, correspondence) in rectified.correspondences.iter().enumerate() {
            let (y, x) = (index / 4, index % 4);
            assert_eq!(
                Point2::new(x as Float + 0.5, y as Float + 0.5),
                correspondence.original.position
            );
            assert_eq!(image[(y, x)], correspondence.original.color);
        }
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let camera = gen_camera();
        let pose = Extrinsics::new(Mat3::identity(), Vec3::new(1.0, 0.0, 0.0));
        let result = rectify(&gen_image(3, 4), &gen_image(4, 3), &camera, &camera, &pose);
        assert_eq!(
            Err(RectificationError::SizeMismatch {
                left_rows: 3,
                left_cols: 4,
                right_rows: 4,
                right_cols: 3,
            }),
            match result {
                Err(error) => Err(error),
                Ok(_) => Ok(()),
            }
        );
    }
}
