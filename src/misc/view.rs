// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rendering of value fields (disparity, depth) into displayable images.

use image::GrayImage;
use nalgebra::DMatrix;

use crate::misc::interop;
use crate::misc::type_aliases::Float;

/// Render a value field into a gray image.
///
/// Values are expected in the `[0, 255]` range
/// (cf `core::remap::normalize_for_display`) and are clamped otherwise.
/// Sentinel ("no data") cells render black.
pub fn field_image(field: &DMatrix<Float>) -> GrayImage {
    let gray = field.map(|value| {
        if value < 0.0 {
            0u8
        } else if value > 255.0 {
            255u8
        } else {
            value as u8
        }
    });
    interop::image_from_matrix(&gray)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn sentinel_renders_black() {
        let field = DMatrix::from_row_slice(1, 3, &[-1.0_f32, 300.0, 127.4]);
        let img = field_image(&field);
        assert_eq!(0, img.get_pixel(0, 0).data[0]);
        assert_eq!(255, img.get_pixel(1, 0).data[0]);
        assert_eq!(127, img.get_pixel(2, 0).data[0]);
    }
}
