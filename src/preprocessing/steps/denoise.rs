use crate::error::PipelineError;
use crate::preprocessing::config::DenoiseParams;
use image::{GrayImage, Luma};

/// Non-local means denoising.
///
/// Every pixel becomes a weighted average of the pixels in its search window,
/// weighted by how similar the surrounding template patches are. Patch
/// distances come from one integral image per search offset, so the cost is
/// `O(search^2 * pixels)` regardless of template size. Fully deterministic.
pub fn apply(gray: &GrayImage, params: &DenoiseParams) -> Result<GrayImage, PipelineError> {
    Ok(non_local_means(
        gray,
        params.strength,
        params.template_window,
        params.search_window,
    ))
}

fn non_local_means(gray: &GrayImage, h: f32, template_window: u32, search_window: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tr = (template_window / 2) as usize;
    let sr = (search_window / 2) as usize;
    let pad = tr + sr;
    let (w, hgt) = (width as usize, height as usize);

    let padded = pad_replicate(gray, pad);
    let pw = w + 2 * pad;

    // Difference image covers every template around every centre
    let dw = w + 2 * tr;
    let dh = hgt + 2 * tr;
    let mut integral = vec![0f64; (dw + 1) * (dh + 1)];

    let mut weight_sum = vec![0f64; w * hgt];
    let mut value_sum = vec![0f64; w * hgt];

    let h2 = (h as f64) * (h as f64);
    let patch_area = ((2 * tr + 1) * (2 * tr + 1)) as f64;

    for dy in -(sr as isize)..=(sr as isize) {
        for dx in -(sr as isize)..=(sr as isize) {
            // Integral of squared differences between the image and its shifted copy
            for v in 0..dh {
                let mut row = 0f64;
                for u in 0..dw {
                    let a = padded[(sr + v) * pw + sr + u];
                    let bx = (sr + u) as isize + dx;
                    let by = (sr + v) as isize + dy;
                    let b = padded[by as usize * pw + bx as usize];
                    let d = a - b;
                    row += d * d;
                    integral[(v + 1) * (dw + 1) + u + 1] = integral[v * (dw + 1) + u + 1] + row;
                }
            }

            for y in 0..hgt {
                for x in 0..w {
                    let x1 = x + 2 * tr + 1;
                    let y1 = y + 2 * tr + 1;
                    let sum = integral[y1 * (dw + 1) + x1] - integral[y * (dw + 1) + x1]
                        - integral[y1 * (dw + 1) + x]
                        + integral[y * (dw + 1) + x];
                    let distance = (sum / patch_area).max(0.0);
                    let weight = (-distance / h2).exp();

                    let nx = (pad + x) as isize + dx;
                    let ny = (pad + y) as isize + dy;
                    let neighbour = padded[ny as usize * pw + nx as usize];

                    let idx = y * w + x;
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * neighbour;
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * w + x as usize;
        let v = value_sum[idx] / weight_sum[idx];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Copy of the image with `pad` pixels of edge replication on every side
fn pad_replicate(gray: &GrayImage, pad: usize) -> Vec<f64> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let pw = w + 2 * pad;
    let ph = h + 2 * pad;

    let mut out = vec![0f64; pw * ph];
    for py in 0..ph {
        let sy = py.saturating_sub(pad).min(h - 1);
        for px in 0..pw {
            let sx = px.saturating_sub(pad).min(w - 1);
            out[py * pw + px] = gray.get_pixel(sx as u32, sy as u32).0[0] as f64;
        }
    }
    out
}
