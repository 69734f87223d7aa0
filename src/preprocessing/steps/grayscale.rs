use image::{DynamicImage, GrayImage};

/// Convert any decoded image to 8-bit luma.
/// Every other step works on the single-channel result.
pub fn apply(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// True when the image has no pixels at all
pub fn is_empty(gray: &GrayImage) -> bool {
    gray.width() == 0 || gray.height() == 0
}
