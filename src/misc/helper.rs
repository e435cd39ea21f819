// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

use nalgebra::{DMatrix, Scalar};
use num_traits::Float as NumFloat;

/// Scan a value field for its minimum and maximum,
/// ignoring cells marked with the negative "no data" sentinel.
/// Returns `None` when every cell is a sentinel.
pub fn min_max_valid<T>(mat: &DMatrix<T>) -> Option<(T, T)>
where
    T: Scalar + NumFloat,
{
    let mut min_temp: Option<T> = None;
    let mut max_temp: Option<T> = None;
    mat.iter().for_each(|&value| {
        if value >= T::zero() {
            min_temp = min_temp.map(|x| x.min(value)).or(Some(value));
            max_temp = max_temp.map(|x| x.max(value)).or(Some(value));
        }
    });
    if let (Some(min_value), Some(max_value)) = (min_temp, max_temp) {
        Some((min_value, max_value))
    } else {
        None
    }
}

// TESTS #############################################################
