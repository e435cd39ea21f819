// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image and matrix types.

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::DMatrix;

use crate::misc::type_aliases::RgbMatrix;

/// Convert an `u8` matrix into a `GrayImage`.
/// Inverse operation of `matrix_from_image`.
///
/// Performs a transposition to accomodate for the
/// column major matrix into the row major image.
#[allow(clippy::cast_possible_truncation)]
pub fn image_from_matrix(mat: &DMatrix<u8>) -> GrayImage {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = GrayImage::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        *pixel = Luma([mat[(y as usize, x as usize)]]);
    }
    img_buf
}

/// Convert an `(u8,u8,u8)` matrix into an `RgbImage`.
///
/// Performs a transposition to accomodate for the
/// column major matrix into the row major image.
#[allow(clippy::cast_possible_truncation)]
pub fn rgb_from_matrix(mat: &RgbMatrix) -> RgbImage {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = RgbImage::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        let (r, g, b) = mat[(y as usize, x as usize)];
        *pixel = Rgb([r, g, b]);
    }
    img_buf
}

/// Convert a `GrayImage` into an `u8` matrix.
/// Inverse operation of `image_from_matrix`.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Convert an `RgbImage` into an `(u8,u8,u8)` matrix.
/// Inverse operation of `rgb_from_matrix`.
pub fn matrix_from_rgb_image(img: RgbImage) -> RgbMatrix {
    let (width, height) = img.dimensions();
    // into_raw() is a flat buffer of r, g, b channel values, row major.
    let raw = img.into_raw();
    RgbMatrix::from_fn(height as usize, width as usize, |y, x| {
        let idx = 3 * (y * width as usize + x);
        (raw[idx], raw[idx + 1], raw[idx + 2])
    })
}

/// Convert an `(u8,u8,u8)` matrix into an `u8` grayscale matrix
/// with the usual BT.601 luma weights.
pub fn gray_from_rgb_matrix(mat: &RgbMatrix) -> DMatrix<u8> {
    mat.map(|(r, g, b)| {
        let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        luma.round() as u8
    })
}

// TESTS #############################################################
