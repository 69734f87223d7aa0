use crate::error::PipelineError;
use crate::preprocessing::config::EdgeParams;
use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};

/// Blend the morphological gradient (dilate minus erode) back into the image
/// at weight `alpha`. Stroke outlines get darker or brighter, flat areas stay put.
pub fn apply(gray: &GrayImage, params: &EdgeParams) -> Result<GrayImage, PipelineError> {
    let gradient = morphological_gradient(gray, params.kernel_size);

    let enhanced = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let original = gray.get_pixel(x, y).0[0] as f32;
        let edge = gradient.get_pixel(x, y).0[0] as f32;
        Luma([(original + params.alpha * edge).round().clamp(0.0, 255.0) as u8])
    });
    Ok(enhanced)
}

/// Local max minus local min over a square of side `kernel_size`
pub fn morphological_gradient(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = (kernel_size / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return GrayImage::new(gray.width(), gray.height());
    }

    let mask = Mask::square(radius);
    let dilated = grayscale_dilate(gray, &mask);
    let eroded = grayscale_erode(gray, &mask);

    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let d = dilated.get_pixel(x, y).0[0];
        let e = eroded.get_pixel(x, y).0[0];
        Luma([d.saturating_sub(e)])
    })
}
