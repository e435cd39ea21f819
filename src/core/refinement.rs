// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Global refinement of a raw disparity field.
//!
//! The block matching output is noisy where blocks are ambiguous. This
//! stage re-reads it as a grid labeling problem, a flat penalty for
//! deviating from the observed disparity plus a Potts smoothness term,
//! and minimizes the total energy with `math::labeling`. Refinement is
//! best effort: if the solver rejects the problem, the raw field is
//! returned unchanged.

use nalgebra::DMatrix;

use crate::core::matching::NO_DISPARITY;
use crate::math::labeling::{self, GridProblem};

/// Refinement parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cost of assigning a label different from the observed disparity.
    pub data_penalty: i64,
    /// Potts penalty for neighbor sites with differing labels.
    pub smoothness_penalty: i64,
    /// Upper bound on solver sweeps.
    pub max_iterations: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            data_penalty: 10,
            smoothness_penalty: 15,
            max_iterations: 30,
        }
    }
}

/// Smooth a disparity field. Labels are disparities in `0..n_labels`.
/// Sentinel sites carry no data term and take whatever label their
/// neighborhood prefers.
pub fn refine(disparities: &DMatrix<i32>, n_labels: usize, config: &Config) -> DMatrix<i32> {
    let (rows, cols) = disparities.shape();
    if rows == 0 || cols == 0 || n_labels == 0 {
        return disparities.clone();
    }

    let mut data_cost = vec![0i64; rows * cols * n_labels];
    let mut initial_labels = vec![0usize; rows * cols];
    for y in 0..rows {
        for x in 0..cols {
            let site = y * cols + x;
            let observed = disparities[(y, x)];
            if observed == NO_DISPARITY {
                // No observation, uniform zero cost over all labels.
                continue;
            }
            let observed = observed as usize;
            initial_labels[site] = observed.min(n_labels - 1);
            for label in 0..n_labels {
                if label != observed {
                    data_cost[site * n_labels + label] = config.data_penalty;
                }
            }
        }
    }

    let problem = GridProblem {
        width: cols,
        height: rows,
        n_labels,
        data_cost,
        smoothness_cost: GridProblem::potts_table(n_labels, config.smoothness_penalty),
        initial_labels,
        max_iterations: config.max_iterations,
    };
    match labeling::solve(&problem) {
        Ok(solution) => {
            if let (Some(first), Some(last)) = (
                solution.energy_trace.first(),
                solution.energy_trace.last(),
            ) {
                log::info!("refinement energy: {} -> {}", first, last);
            }
            DMatrix::from_fn(rows, cols, |y, x| solution.labels[y * cols + x] as i32)
        }
        Err(error) => {
            log::warn!("disparity refinement skipped: {}", error);
            disparities.clone()
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    fn gen_config() -> Config {
        Config {
            data_penalty: 10,
            smoothness_penalty: 15,
            max_iterations: 10,
        }
    }

    #[test]
    fn constant_field_is_unchanged() {
        let disparities = DMatrix::from_element(6, 6, 3i32);
        let refined = refine(&disparities, 8, &gen_config());
        assert_eq!(disparities, refined);
    }

    #[test]
    fn isolated_noise_is_smoothed_away() {
        let mut disparities = DMatrix::from_element(6, 6, 3i32);
        disparities[(3, 3)] = 7;
        let refined = refine(&disparities, 8, &gen_config());
        assert_eq!(DMatrix::from_element(6, 6, 3i32), refined);
    }

    #[test]
    fn sentinel_sites_follow_their_neighborhood() {
        let mut disparities = DMatrix::from_element(6, 6, 3i32);
        disparities[(2, 2)] = NO_DISPARITY;
        let refined = refine(&disparities, 8, &gen_config());
        assert_eq!(3, refined[(2, 2)]);
    }

    #[test]
    fn empty_field_is_returned_as_is() {
        let disparities = DMatrix::<i32>::from_element(0, 0, 0);
        let refined = refine(&disparities, 8, &gen_config());
        assert_eq!(disparities, refined);
    }
}
