use crate::engine::{OcrBackend, TextBox};
use crate::error::PipelineError;
use crate::preprocessing::config::CropParams;
use image::{imageops, GrayImage};
use serde::Serialize;

/// Half-open pixel rectangle `[left, right) x [top, bottom)` inside the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRegion {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

/// Bounding rectangle of every box with `confidence >= min_conf`, grown by
/// `margin` on each side and clamped to the image. Falls back to the full
/// image when nothing qualifies or the result would be empty.
pub fn text_region(
    width: u32,
    height: u32,
    boxes: &[TextBox],
    min_conf: f32,
    margin: u32,
) -> CropRegion {
    let full = CropRegion::full(width, height);

    let bounds = boxes
        .iter()
        .filter(|b| b.confidence >= min_conf)
        .map(|b| {
            (
                b.left as i64,
                b.top as i64,
                b.left as i64 + b.width as i64,
                b.top as i64 + b.height as i64,
            )
        })
        .reduce(|(l0, t0, r0, b0), (l1, t1, r1, b1)| {
            (l0.min(l1), t0.min(t1), r0.max(r1), b0.max(b1))
        });

    let Some((left, top, right, bottom)) = bounds else {
        return full;
    };

    let margin = margin as i64;
    let (w, h) = (width as i64, height as i64);
    let left = (left - margin).clamp(0, w);
    let top = (top - margin).clamp(0, h);
    let right = (right + margin).clamp(0, w);
    let bottom = (bottom + margin).clamp(0, h);

    if right <= left || bottom <= top {
        tracing::debug!("Degenerate text region; keeping the full image");
        return full;
    }

    CropRegion {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    }
}

/// Crop the image to the text the backend finds in it
pub fn apply<B>(
    gray: &GrayImage,
    backend: &B,
    language: &str,
    params: &CropParams,
) -> Result<(GrayImage, CropRegion), PipelineError>
where
    B: OcrBackend + ?Sized,
{
    let (width, height) = gray.dimensions();
    let recognition = backend.recognize(gray, language)?;
    let margin = params.margin.clamp(0, u32::MAX as i64) as u32;
    let region = text_region(width, height, &recognition.boxes, params.min_conf, margin);

    if region.is_full(width, height) {
        tracing::debug!("No confident text boxes; identity crop");
        return Ok((gray.clone(), region));
    }

    tracing::info!(
        left = region.left,
        top = region.top,
        right = region.right,
        bottom = region.bottom,
        "Cropped to text region"
    );
    let cropped = imageops::crop_imm(gray, region.left, region.top, region.width(), region.height())
        .to_image();
    Ok((cropped, region))
}
