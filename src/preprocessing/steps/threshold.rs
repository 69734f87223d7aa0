use crate::error::PipelineError;
use crate::preprocessing::config::{ThresholdMethod, ThresholdParams};
use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};

const R: f32 = 128.0; // Dynamic range / 2

/// Binarize the image. Global cutoff by default, Sauvola when the lighting is uneven.
pub fn apply(gray: &GrayImage, params: &ThresholdParams) -> Result<GrayImage, PipelineError> {
    let binarized = match params.method {
        ThresholdMethod::Global => {
            let kind = if params.invert {
                ThresholdType::BinaryInverted
            } else {
                ThresholdType::Binary
            };
            threshold(gray, params.value, kind)
        }
        ThresholdMethod::Sauvola => {
            let mut out = sauvola_threshold(gray, params.window, params.k);
            if params.invert {
                for p in out.pixels_mut() {
                    p.0[0] = 255 - p.0[0];
                }
            }
            out
        }
    };
    Ok(binarized)
}

/// Sauvola adaptive thresholding
///
/// For each pixel, threshold = mean * (1 + k * (std_dev / R - 1))
/// where R is max standard deviation (128 for 8-bit images)
fn sauvola_threshold(img: &GrayImage, window_size: u32, k: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let half_window = window_size as i64 / 2;
    let stride = width as usize + 1;

    let (integral, integral_sq) = integral_images(img);

    GrayImage::from_fn(width, height, |x, y| {
        let x1 = (x as i64 - half_window).max(0) as usize;
        let y1 = (y as i64 - half_window).max(0) as usize;
        let x2 = (x as i64 + half_window).min(width as i64 - 1) as usize + 1;
        let y2 = (y as i64 + half_window).min(height as i64 - 1) as usize + 1;

        let area = ((x2 - x1) * (y2 - y1)) as f64;
        let window_sum = |t: &[f64]| t[y2 * stride + x2] - t[y1 * stride + x2] - t[y2 * stride + x1] + t[y1 * stride + x1];

        let mean = window_sum(&integral) / area;
        let variance = (window_sum(&integral_sq) / area - mean * mean).max(0.0);
        let cutoff = mean as f32 * (1.0 + k * (variance.sqrt() as f32 / R - 1.0));

        if img.get_pixel(x, y).0[0] as f32 > cutoff {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Summed-area tables of values and squared values, (w+1) x (h+1), row major
fn integral_images(img: &GrayImage) -> (Vec<f64>, Vec<f64>) {
    let (width, height) = img.dimensions();
    let stride = width as usize + 1;
    let mut integral = vec![0f64; stride * (height as usize + 1)];
    let mut integral_sq = vec![0f64; stride * (height as usize + 1)];

    for y in 0..height as usize {
        for x in 0..width as usize {
            let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
            let i = (y + 1) * stride + x + 1;
            integral[i] = val + integral[i - stride] + integral[i - 1] - integral[i - stride - 1];
            integral_sq[i] =
                val * val + integral_sq[i - stride] + integral_sq[i - 1] - integral_sq[i - stride - 1];
        }
    }

    (integral, integral_sq)
}
