// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Local block matching on a rectified gray pair.
//!
//! For every left pixel, candidate blocks in the right image are scored
//! along the same scanline at displacements `0..max_disparity`, and the
//! best scoring displacement wins. Rows are independent and processed in
//! parallel.

use nalgebra::DMatrix;
use rayon::prelude::*;
use thiserror::Error;

use crate::misc::type_aliases::Float;

/// Disparity value of pixels where no candidate block fits.
pub const NO_DISPARITY: i32 = -1;

/// Errors of the block matching stage.
#[derive(Error, Debug, PartialEq)]
pub enum MatchingError {
    /// The rectified images have different dimensions.
    #[error("rectified images have different sizes: {left_rows}x{left_cols} vs {right_rows}x{right_cols}")]
    SizeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },
}

/// Block matching parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Half width of the comparison block. The block is a square
    /// of side `2 * window_radius + 1` pixels.
    pub window_radius: usize,
    /// Largest displacement searched, exclusive.
    /// Zero means "search the whole scanline width".
    pub max_disparity: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            window_radius: 5,
            max_disparity: 64,
        }
    }
}

/// Sum of absolute differences matching. Lower scores are better.
pub fn sad(
    left: &DMatrix<u8>,
    right: &DMatrix<u8>,
    config: &Config,
) -> Result<DMatrix<i32>, MatchingError> {
    matching(left, right, config, |left, right, x, rx, y, radius| {
        let mut sum = 0i64;
        for dy in -(radius as i64)..=radius as i64 {
            for dx in -(radius as i64)..=radius as i64 {
                let row = (y as i64 + dy) as usize;
                let left_value = left[(row, (x as i64 + dx) as usize)] as i64;
                let right_value = right[(row, (rx as i64 + dx) as usize)] as i64;
                sum += (left_value - right_value).abs();
            }
        }
        // Negated so that for both matchers higher is better.
        -sum as Float
    })
}

/// Normalized cross correlation matching. Higher scores are better.
/// Insensitive to local brightness and contrast changes, unlike `sad`.
pub fn ncc(
    left: &DMatrix<u8>,
    right: &DMatrix<u8>,
    config: &Config,
) -> Result<DMatrix<i32>, MatchingError> {
    matching(left, right, config, |left, right, x, rx, y, radius| {
        let mut sum_left = 0.0;
        let mut sum_right = 0.0;
        let side = 2 * radius + 1;
        let count = (side * side) as Float;
        for dy in -(radius as i64)..=radius as i64 {
            for dx in -(radius as i64)..=radius as i64 {
                let row = (y as i64 + dy) as usize;
                sum_left += left[(row, (x as i64 + dx) as usize)] as Float;
                sum_right += right[(row, (rx as i64 + dx) as usize)] as Float;
            }
        }
        let mean_left = sum_left / count;
        let mean_right = sum_right / count;
        let mut cross = 0.0;
        let mut var_left = 0.0;
        let mut var_right = 0.0;
        for dy in -(radius as i64)..=radius as i64 {
            for dx in -(radius as i64)..=radius as i64 {
                let row = (y as i64 + dy) as usize;
                let dl = left[(row, (x as i64 + dx) as usize)] as Float - mean_left;
                let dr = right[(row, (rx as i64 + dx) as usize)] as Float - mean_right;
                cross += dl * dr;
                var_left += dl * dl;
                var_right += dr * dr;
            }
        }
        let denominator = (var_left * var_right).sqrt();
        if denominator > 0.0 {
            cross / denominator
        } else {
            // Textureless block, correlation is undefined.
            Float::NEG_INFINITY
        }
    })
}

/// Shared scan loop of the two matchers. The score function receives the
/// left column, the right candidate column, the row, and the block radius,
/// and returns a score where higher is better.
fn matching<S>(
    left: &DMatrix<u8>,
    right: &DMatrix<u8>,
    config: &Config,
    score: S,
) -> Result<DMatrix<i32>, MatchingError>
where
    S: Fn(&DMatrix<u8>, &DMatrix<u8>, usize, usize, usize, usize) -> Float + Sync,
{
    let (rows, cols) = left.shape();
    if right.shape() != (rows, cols) {
        return Err(MatchingError::SizeMismatch {
            left_rows: rows,
            left_cols: cols,
            right_rows: right.nrows(),
            right_cols: right.ncols(),
        });
    }
    let radius = config.window_radius;
    let disparity_range = config.max_disparity;

    // Rows are scored independently, then reassembled into a matrix.
    let disparity_rows: Vec<Vec<i32>> = (0..rows)
        .into_par_iter()
        .map(|y| {
            let mut disparity_row = vec![NO_DISPARITY; cols];
            if y < radius || y + radius >= rows {
                return disparity_row;
            }
            for x in 0..cols {
                if x + radius >= cols {
                    continue;
                }
                // A full row search scores every displacement whose block
                // still fits in the right image; a bounded search requires
                // the whole candidate range to fit.
                let candidates = if disparity_range == 0 {
                    if x < radius {
                        continue;
                    }
                    x - radius + 1
                } else {
                    if x < radius + disparity_range {
                        continue;
                    }
                    disparity_range
                };
                let mut best_score = Float::NEG_INFINITY;
                let mut best_disparity = NO_DISPARITY;
                for disparity in 0..candidates {
                    let candidate = score(left, right, x, x - disparity, y, radius);
                    // Strict comparison: ties keep the smallest disparity.
                    if candidate > best_score {
                        best_score = candidate;
                        best_disparity = disparity as i32;
                    }
                }
                disparity_row[x] = best_disparity;
            }
            disparity_row
        })
        .collect();

    let mut disparities = DMatrix::from_element(rows, cols, NO_DISPARITY);
    for (y, disparity_row) in disparity_rows.iter().enumerate() {
        for (x, &disparity) in disparity_row.iter().enumerate() {
            disparities[(y, x)] = disparity;
        }
    }
    Ok(disparities)
}

// TESTS #############################################################
