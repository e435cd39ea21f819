// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Discrete energy minimization on a 4-connected pixel grid.
//!
//! The energy of a labeling is the sum of per-site data costs and of
//! pairwise smoothness costs over horizontal and vertical neighbor pairs:
//!
//! `E(l) = sum_p D(p, l_p) + sum_{(p,q)} V(l_p, l_q)`
//!
//! The solver is iterated conditional modes: full sweeps over the grid,
//! each site greedily switching to its locally cheapest label. Every sweep
//! can only decrease the energy, so the recorded energy trace is monotone
//! non increasing.

use thiserror::Error;

/// Errors of the labeling solver.
#[derive(Error, Debug, PartialEq)]
pub enum SolverError {
    /// A cost table does not have the size implied by the grid
    /// dimensions and label count.
    #[error("cost table of length {found}, expected {expected}")]
    InvalidCostTable { expected: usize, found: usize },
}

/// A labeling problem on a `width` x `height` grid with `n_labels` labels.
#[derive(Debug, Clone)]
pub struct GridProblem {
    pub width: usize,
    pub height: usize,
    pub n_labels: usize,
    /// Data cost of assigning label `l` to site `(x, y)`,
    /// at index `(y * width + x) * n_labels + l`.
    pub data_cost: Vec<i64>,
    /// Smoothness cost of the label pair `(l1, l2)` on a neighbor pair,
    /// at index `l1 * n_labels + l2`. Must be symmetric.
    pub smoothness_cost: Vec<i64>,
    /// Starting labels, one per site, row major.
    pub initial_labels: Vec<usize>,
    /// Upper bound on the number of sweeps.
    pub max_iterations: usize,
}

impl GridProblem {
    /// Potts smoothness table: a constant `penalty` for differing labels.
    pub fn potts_table(n_labels: usize, penalty: i64) -> Vec<i64> {
        let mut table = vec![penalty; n_labels * n_labels];
        for label in 0..n_labels {
            table[label * n_labels + label] = 0;
        }
        table
    }

    fn data(&self, site: usize, label: usize) -> i64 {
        self.data_cost[site * self.n_labels + label]
    }

    fn smoothness(&self, l1: usize, l2: usize) -> i64 {
        self.smoothness_cost[l1 * self.n_labels + l2]
    }

    /// Total energy of a labeling.
    pub fn energy(&self, labels: &[usize]) -> i64 {
        let mut energy = 0;
        for site in 0..self.width * self.height {
            energy += self.data(site, labels[site]);
        }
        for y in 0..self.height {
            for x in 0..self.width {
                let site = y * self.width + x;
                if x + 1 < self.width {
                    energy += self.smoothness(labels[site], labels[site + 1]);
                }
                if y + 1 < self.height {
                    energy += self.smoothness(labels[site], labels[site + self.width]);
                }
            }
        }
        energy
    }
}

/// Labeling found by the solver and the energy after each sweep.
#[derive(Debug, Clone)]
pub struct Solution {
    /// One label per site, row major.
    pub labels: Vec<usize>,
    /// Energy before the first sweep, then after each sweep.
    /// Monotone non increasing.
    pub energy_trace: Vec<i64>,
}

/// Minimize the energy of the problem with iterated conditional modes.
///
/// Stops after a sweep that changed no label, or after
/// `max_iterations` sweeps.
pub fn solve(problem: &GridProblem) -> Result<Solution, SolverError> {
    let n_sites = problem.width * problem.height;
    check_length(n_sites * problem.n_labels, problem.data_cost.len())?;
    check_length(
        problem.n_labels * problem.n_labels,
        problem.smoothness_cost.len(),
    )?;
    check_length(n_sites, problem.initial_labels.len())?;

    let mut labels = problem.initial_labels.clone();
    let mut energy_trace = vec![problem.energy(&labels)];
    for _ in 0..problem.max_iterations {
        let mut changed = false;
        for y in 0..problem.height {
            for x in 0..problem.width {
                let site = y * problem.width + x;
                let best = (0..problem.n_labels)
                    .map(|label| (site_energy(problem, &labels, x, y, label), label))
                    .min();
                if let Some((_, best_label)) = best {
                    if best_label != labels[site] {
                        labels[site] = best_label;
                        changed = true;
                    }
                }
            }
        }
        energy_trace.push(problem.energy(&labels));
        if !changed {
            break;
        }
    }
    Ok(Solution {
        labels,
        energy_trace,
    })
}

/// Local energy of one site under a candidate label:
/// its data cost plus the smoothness terms with its 4 neighbors.
fn site_energy(
    problem: &GridProblem,
    labels: &[usize],
    x: usize,
    y: usize,
    label: usize,
) -> i64 {
    let site = y * problem.width + x;
    let mut energy = problem.data(site, label);
    if x > 0 {
        energy += problem.smoothness(label, labels[site - 1]);
    }
    if x + 1 < problem.width {
        energy += problem.smoothness(label, labels[site + 1]);
    }
    if y > 0 {
        energy += problem.smoothness(label, labels[site - problem.width]);
    }
    if y + 1 < problem.height {
        energy += problem.smoothness(label, labels[site + problem.width]);
    }
    energy
}

fn check_length(expected: usize, found: usize) -> Result<(), SolverError> {
    if expected == found {
        Ok(())
    } else {
        Err(SolverError::InvalidCostTable { expected, found })
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn gen_random_problem(seed: u64) -> GridProblem {
        let mut rng = StdRng::seed_from_u64(seed);
        let (width, height, n_labels) = (8, 6, 5);
        let data_cost = (0..width * height * n_labels)
            .map(|_| rng.gen_range(0, 100))
            .collect();
        let initial_labels = (0..width * height)
            .map(|_| rng.gen_range(0, n_labels))
            .collect();
        GridProblem {
            width,
            height,
            n_labels,
            data_cost,
            smoothness_cost: GridProblem::potts_table(n_labels, 15),
            initial_labels,
            max_iterations: 50,
        }
    }

    #[test]
    fn energy_trace_is_monotone_non_increasing() {
        for seed in 0..10 {
            let problem = gen_random_problem(seed);
            let solution = solve(&problem).unwrap();
            for pair in solution.energy_trace.windows(2) {
                assert!(pair[1] <= pair[0]);
            }
        }
    }

    #[test]
    fn solution_energy_matches_the_trace() {
        let problem = gen_random_problem(42);
        let solution = solve(&problem).unwrap();
        assert_eq!(
            problem.energy(&solution.labels),
            *solution.energy_trace.last().unwrap()
        );
    }

    #[test]
    fn isolated_outlier_is_smoothed_away() {
        // Every site weakly prefers label 0 except the center which
        // weakly prefers label 1. The Potts penalty dominates, so the
        // outlier gets relabeled.
        let (width, height, n_labels) = (5, 5, 2);
        let mut data_cost = vec![0i64; width * height * n_labels];
        for site in 0..width * height {
            data_cost[site * n_labels + 1] = 10;
        }
        let center = 2 * width + 2;
        data_cost[center * n_labels] = 10;
        data_cost[center * n_labels + 1] = 0;
        let mut initial_labels = vec![0; width * height];
        initial_labels[center] = 1;
        let problem = GridProblem {
            width,
            height,
            n_labels,
            data_cost,
            smoothness_cost: GridProblem::potts_table(n_labels, 15),
            initial_labels,
            max_iterations: 10,
        };
        let solution = solve(&problem).unwrap();
        assert_eq!(vec![0; width * height], solution.labels);
    }

    #[test]
    fn invalid_cost_table_is_rejected() {
        let mut problem = gen_random_problem(0);
        problem.data_cost.pop();
        assert_eq!(
            Err(SolverError::InvalidCostTable {
                expected: 8 * 6 * 5,
                found: 8 * 6 * 5 - 1,
            }),
            match solve(&problem) {
                Err(error) => Err(error),
                Ok(_) => Ok(()),
            }
        );
    }
}
