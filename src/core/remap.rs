// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Back-mapping of rectified-grid fields into the original pixel grid,
//! and normalization of value fields for display.

use nalgebra::DMatrix;

use crate::core::rectification::PixelCorrespondence;
use crate::misc::helper;
use crate::misc::type_aliases::Float;

/// Value of original pixels with no rectified counterpart.
pub const NO_DATA: Float = -1.0;

/// Pull a field computed on the rectified grid back onto the original
/// image grid, using the per-pixel correspondence table of the rectifier.
///
/// Original pixels whose rectified position fell outside the rectified
/// image, and pixels whose rectified value is itself a sentinel, are set
/// to `NO_DATA`.
pub fn map_back(
    correspondences: &[PixelCorrespondence],
    rows: usize,
    cols: usize,
    rectified_field: &DMatrix<Float>,
) -> DMatrix<Float> {
    let mut field = DMatrix::from_element(rows, cols, NO_DATA);
    for correspondence in correspondences {
        let original = &correspondence.original.position;
        let rectified = &correspondence.rectified.position;
        let (x, y) = (original.x.floor(), original.y.floor());
        let (rx, ry) = (rectified.x.floor(), rectified.y.floor());
        let in_original = x >= 0.0 && x < cols as Float && y >= 0.0 && y < rows as Float;
        let in_rectified = rx >= 0.0
            && rx < rectified_field.ncols() as Float
            && ry >= 0.0
            && ry < rectified_field.nrows() as Float;
        if in_original && in_rectified {
            let value = rectified_field[(ry as usize, rx as usize)];
            if value >= 0.0 {
                field[(y as usize, x as usize)] = value;
            }
        }
    }
    field
}

/// Rescale a field to the `[0, 255]` display range, with a gamma
/// correction brightening the low end. Sentinel cells stay `NO_DATA`.
pub fn normalize_for_display(field: &DMatrix<Float>, gamma: Float) -> DMatrix<Float> {
    let (min, max) = match helper::min_max_valid(field) {
        Some(bounds) => bounds,
        None => return field.clone(),
    };
    let range = max - min;
    field.map(|value| {
        if value < 0.0 {
            NO_DATA
        } else {
            let normalized = if range > 0.0 { (value - min) / range } else { 0.0 };
            let corrected = normalized.powf(gamma);
            (corrected * 256.0 - 0.5).max(0.0).min(255.0)
        }
    })
}

/// Convert a disparity field (in pixels) into a metric depth field,
/// `depth = focal * baseline / disparity`.
///
/// Zero disparities (infinite depth) and sentinels map to `NO_DATA`.
pub fn disparity_to_depth(
    disparities: &DMatrix<Float>,
    focal: Float,
    baseline: Float,
) -> DMatrix<Float> {
    disparities.map(|disparity| {
        if disparity > 0.0 {
            focal * baseline / disparity
        } else {
            NO_DATA
        }
    })
}

/// Widen an integer disparity field into a Float field,
/// keeping sentinels negative.
pub fn to_float_field(disparities: &DMatrix<i32>) -> DMatrix<Float> {
    disparities.map(|disparity| disparity as Float)
}

// TESTS #############################################################
