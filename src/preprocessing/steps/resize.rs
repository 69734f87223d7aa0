use crate::error::PipelineError;
use crate::preprocessing::config::ResizeParams;
use image::{imageops, imageops::FilterType, GrayImage, ImageBuffer, Luma};

/// Resize to the target width (aspect ratio preserved) and stretch samples to
/// the full 0..=255 range.
///
/// Running it again on its own output with the same width is a no-op.
pub fn apply(gray: &GrayImage, params: &ResizeParams) -> Result<GrayImage, PipelineError> {
    if params.target_width == 0 {
        return Err(PipelineError::Configuration(
            "resize.target_width must be at least 1".to_string(),
        ));
    }
    let resized = resize_to_width(gray, params.target_width);
    Ok(normalize_range(&resized))
}

/// Height matching `target_width` at the source aspect ratio, rounded half up,
/// never below 1
pub fn target_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    let (w, h, t) = (width as u64, height as u64, target_width as u64);
    ((2 * h * t + w) / (2 * w)).max(1) as u32
}

pub fn resize_to_width(gray: &GrayImage, target_width: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let new_height = target_height(width, height, target_width);
    if (width, height) == (target_width, new_height) {
        return gray.clone();
    }
    if width == 0 || height == 0 {
        return GrayImage::from_pixel(target_width, new_height, Luma([255]));
    }

    let filter = if target_width < width {
        FilterType::Triangle
    } else {
        FilterType::Lanczos3
    };
    imageops::resize(gray, target_width, new_height, filter)
}

/// Normalize image contrast using histogram stretching.
/// Uniform images come back unchanged.
pub fn normalize_range(gray: &GrayImage) -> GrayImage {
    let (min_val, max_val) = find_min_max(gray);
    if max_val <= min_val {
        return gray.clone();
    }

    let range = (max_val - min_val) as u32;
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let offset = (pixel.0[0] - min_val) as u32;
        pixel.0[0] = ((offset * 255 + range / 2) / range) as u8;
    }
    out
}

/// Samples as `f32` in [0, 1], for consumers that want the unit range
pub fn to_unit_range(gray: &GrayImage) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([gray.get_pixel(x, y).0[0] as f32 / 255.0])
    })
}

fn find_min_max(img: &GrayImage) -> (u8, u8) {
    img.pixels()
        .fold((255u8, 0u8), |(min, max), p| (min.min(p.0[0]), max.max(p.0[0])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(target_width: u32) -> ResizeParams {
        ResizeParams { target_width }
    }

    #[test]
    fn test_target_height_rounds_half_up() {
        // 3 * 5 / 2 = 7.5 -> 8
        assert_eq!(target_height(2, 3, 5), 8);
        // 7 * 4 / 10 = 2.8 -> 3
        assert_eq!(target_height(10, 7, 4), 3);
        // 1 * 1 / 1000 rounds to 0, clamped to 1
        assert_eq!(target_height(1000, 1, 1), 1);
    }

    #[test]
    fn test_output_width_is_exact() {
        for width in [1u32, 3, 799, 800, 801, 1234] {
            let img = GrayImage::from_fn(width, 3, |x, y| Luma([((x + y) % 256) as u8]));
            let out = apply(&img, &params(800)).unwrap();
            assert_eq!(out.width(), 800);
            assert!(out.height() >= 1);
        }
    }

    #[test]
    fn test_resize_is_idempotent() {
        let img = GrayImage::from_fn(333, 211, |x, y| Luma([((x * 3 + y * 7) % 200 + 20) as u8]));
        let once = apply(&img, &params(640)).unwrap();
        let twice = apply(&once, &params(640)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_stretches_histogram() {
        let img = GrayImage::from_fn(10, 10, |x, _| {
            let val = 50 + (x as u8 * 15).min(150);
            Luma([val])
        });

        let (min, max) = find_min_max(&normalize_range(&img));
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_normalize_handles_uniform_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));
        assert_eq!(normalize_range(&img).get_pixel(0, 0).0[0], 128);
    }

    #[test]
    fn test_unit_range() {
        let mut img = GrayImage::from_pixel(2, 1, Luma([0]));
        img.put_pixel(1, 0, Luma([255]));
        let unit = to_unit_range(&img);
        assert_eq!(unit.get_pixel(0, 0).0[0], 0.0);
        assert_eq!(unit.get_pixel(1, 0).0[0], 1.0);
    }
}
