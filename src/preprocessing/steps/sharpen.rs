use crate::error::PipelineError;
use crate::preprocessing::config::SharpenParams;
use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Unsharp mask: `original * (1 + amount) - blurred * amount`, clamped to 0..=255
pub fn apply(gray: &GrayImage, params: &SharpenParams) -> Result<GrayImage, PipelineError> {
    if params.amount == 0.0 {
        return Ok(gray.clone());
    }

    let blurred = gaussian_blur_f32(gray, params.sigma);
    let amount = params.amount;

    let sharpened = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let original = gray.get_pixel(x, y).0[0] as f32;
        let blur = blurred.get_pixel(x, y).0[0] as f32;
        let v = original * (1.0 + amount) - blur * amount;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    });
    Ok(sharpened)
}
