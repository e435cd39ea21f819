// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dense stereo depth reconstruction in Rust (sdr).
//!
//! Given two images of the same scene taken from unknown relative viewpoints
//! and the cameras' intrinsic parameters, this crate recovers the relative
//! pose between the two views, rectifies both images onto a common epipolar
//! plane, searches dense correspondences with block matching, optionally
//! smooths the disparity field with a grid MRF labeling, and maps the result
//! back into the original pixel grid for visualization.

pub mod core;
pub mod dataset;
pub mod math;
pub mod misc;
