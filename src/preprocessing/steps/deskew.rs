use crate::error::PipelineError;
use crate::preprocessing::config::DeskewParams;
use crate::preprocessing::steps::rotate::rotate_bound;
use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use serde::Serialize;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const BLUR_SIGMA: f32 = 1.0;

/// A confident skew measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkewEstimate {
    /// Clockwise rotation, in degrees, that levels the dominant lines
    pub correction_degrees: f32,
    /// Line segments supporting the winning angle
    pub lines: usize,
}

/// Deskew image by detecting and correcting rotation.
///
/// Returns the image unchanged when there is no confident estimate or the
/// correction is negligible.
pub fn apply(gray: &GrayImage, params: &DeskewParams) -> Result<(GrayImage, Option<SkewEstimate>), PipelineError> {
    let estimate = estimate(gray, params);
    Ok((correct(gray, estimate.as_ref(), params), estimate))
}

/// Apply a previously measured correction
pub fn correct(gray: &GrayImage, estimate: Option<&SkewEstimate>, params: &DeskewParams) -> GrayImage {
    match estimate {
        Some(e) if e.correction_degrees.abs() >= params.min_correction => {
            tracing::debug!(degrees = e.correction_degrees, "Correcting skew");
            rotate_bound(gray, e.correction_degrees, 255)
        }
        _ => gray.clone(),
    }
}

/// Estimate skew from edge geometry with a Hough accumulator restricted to
/// near-horizontal lines.
///
/// Each angle bin scores the sum of squared votes over its distance bins that
/// clear `min_votes`, so a sharp peak beats the same votes smeared over
/// neighbouring bins. `None` when fewer than `min_lines` segments support the
/// best angle.
pub fn estimate(gray: &GrayImage, params: &DeskewParams) -> Option<SkewEstimate> {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return None;
    }

    let blurred = gaussian_blur_f32(gray, BLUR_SIGMA);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);

    let points: Vec<(f32, f32)> = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect();
    if points.is_empty() {
        tracing::debug!("No edges found; no skew estimate");
        return None;
    }

    let diagonal = ((width as f32).hypot(height as f32)).ceil() as usize;
    let rho_bins = 2 * diagonal + 1;
    let steps = (params.max_angle / params.resolution).floor() as i32;

    let mut accumulator = vec![0u32; rho_bins];
    let mut best: Option<(f32, u64, usize)> = None;

    for k in -steps..=steps {
        let angle = k as f32 * params.resolution;
        let (sin, cos) = angle.to_radians().sin_cos();

        accumulator.iter_mut().for_each(|v| *v = 0);
        for &(x, y) in &points {
            // Distance along the normal of a line tilted by `angle`
            let rho = -x * sin + y * cos;
            let bin = (rho.round() as isize + diagonal as isize) as usize;
            accumulator[bin] += 1;
        }

        let (support, lines) = accumulator
            .iter()
            .filter(|&&votes| votes >= params.min_votes)
            .fold((0u64, 0usize), |(s, n), &votes| {
                (s + votes as u64 * votes as u64, n + 1)
            });

        let better = match best {
            None => support > 0,
            Some((best_angle, best_support, _)) => {
                support > best_support
                    || (support == best_support && angle.abs() < best_angle.abs())
            }
        };
        if better {
            best = Some((angle, support, lines));
        }
    }

    let (angle, _, lines) = best?;
    if lines < params.min_lines {
        tracing::debug!(lines, min_lines = params.min_lines, "Too few lines for a skew estimate");
        return None;
    }

    tracing::debug!(line_angle = angle, lines, "Skew estimated");
    Some(SkewEstimate {
        // Image y points down, so a positive line angle is a clockwise tilt
        correction_degrees: if angle == 0.0 { 0.0 } else { -angle },
        lines,
    })
}
