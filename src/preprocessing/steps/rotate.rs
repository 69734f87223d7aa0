//! Content-preserving rotations.

use crate::engine::Rotation;
use image::imageops;
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// Rotate clockwise by one of the cardinal angles. Lossless; 90 and 270 swap
/// width and height.
pub fn rotate_cardinal(gray: &GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::Deg0 => gray.clone(),
        Rotation::Deg90 => imageops::rotate90(gray),
        Rotation::Deg180 => imageops::rotate180(gray),
        Rotation::Deg270 => imageops::rotate270(gray),
    }
}

/// Rotate clockwise by an arbitrary angle in degrees.
///
/// The canvas grows to the rotated bounding box so no source pixel is
/// clipped; uncovered corners are filled with `background`.
pub fn rotate_bound(gray: &GrayImage, degrees: f32, background: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    if degrees == 0.0 || width == 0 || height == 0 {
        return gray.clone();
    }

    let theta = degrees.to_radians();
    let (w, h) = (width as f32, height as f32);
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let new_w = (h * sin + w * cos).round().max(1.0) as u32;
    let new_h = (h * cos + w * sin).round().max(1.0) as u32;

    let projection = Projection::translate(new_w as f32 / 2.0, new_h as f32 / 2.0)
        * Projection::rotate(theta)
        * Projection::translate(-w / 2.0, -h / 2.0);

    let mut out = GrayImage::from_pixel(new_w, new_h, Luma([background]));
    warp_into(
        gray,
        &projection,
        Interpolation::Bilinear,
        Luma([background]),
        &mut out,
    );
    out
}
