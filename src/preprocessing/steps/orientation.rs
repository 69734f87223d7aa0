//! Cardinal orientation resolution.
//!
//! Every page is tried at 0, 90, 180 and 270 degrees. Each candidate is scored
//! by how legible the backend finds it, and the detector's orientation hint is
//! trusted only when it is confident and not contradicted by those scores.

use crate::engine::{OcrBackend, OrientationDetector, OsdSignal, Rotation};
use crate::error::PipelineError;
use crate::preprocessing::config::{DeskewParams, OrientationParams};
use crate::preprocessing::steps::deskew::{self, SkewEstimate};
use crate::preprocessing::steps::rotate::rotate_cardinal;
use image::GrayImage;
use serde::Serialize;
use std::cmp::Ordering;

/// Why a rotation was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rationale {
    OsdAgreement,
    OcrScoreWin,
    DefaultFallback,
}

impl Rationale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OsdAgreement => "OSD_AGREEMENT",
            Self::OcrScoreWin => "OCR_SCORE_WIN",
            Self::DefaultFallback => "DEFAULT_FALLBACK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RotationCandidate {
    pub angle: Rotation,
    pub ocr_score: f32,
    /// Detector confidence, attached to every candidate (0 without a signal)
    pub osd_confidence: f32,
    pub osd_reported_angle: Option<Rotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrientationDecision {
    /// Clockwise rotation that makes the page upright
    pub chosen_angle: Rotation,
    pub rationale: Rationale,
    /// Fine correction applied before the cardinal rotation, if any
    pub skew: Option<SkewEstimate>,
    pub candidates: Vec<RotationCandidate>,
}

/// Alphanumeric characters over all non-whitespace characters; 0 for no text
pub fn legibility_score(text: &str) -> f32 {
    let (alnum, total) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(a, t), c| {
            (a + c.is_alphanumeric() as usize, t + 1)
        });
    if total == 0 {
        0.0
    } else {
        alnum as f32 / total as f32
    }
}

/// Higher score wins; equal scores go to the smaller turn, then the smaller angle
fn rank(a: &RotationCandidate, b: &RotationCandidate) -> Ordering {
    b.ocr_score
        .total_cmp(&a.ocr_score)
        .then(a.angle.magnitude().cmp(&b.angle.magnitude()))
        .then(a.angle.degrees().cmp(&b.angle.degrees()))
}

/// Apply the decision rule to scored candidates
pub fn decide(
    candidates: &[RotationCandidate],
    osd: OsdSignal,
    params: &OrientationParams,
) -> (Rotation, Rationale) {
    let Some(best) = candidates.iter().min_by(|a, b| rank(a, b)) else {
        return (Rotation::Deg0, Rationale::DefaultFallback);
    };

    if candidates.iter().all(|c| c.ocr_score <= params.no_text_floor) {
        return (Rotation::Deg0, Rationale::DefaultFallback);
    }

    if let OsdSignal::Detected { angle, confidence } = osd {
        if confidence > params.osd_confidence_threshold {
            if let Some(reported) = candidates.iter().find(|c| c.angle == angle) {
                if best.ocr_score - reported.ocr_score > params.override_margin {
                    tracing::info!(
                        osd_angle = angle.degrees(),
                        osd_score = reported.ocr_score,
                        best_angle = best.angle.degrees(),
                        best_score = best.ocr_score,
                        "Overruling confident OSD reading"
                    );
                    return (best.angle, Rationale::OcrScoreWin);
                }
                return (angle, Rationale::OsdAgreement);
            }
        }
    }

    (best.angle, Rationale::OcrScoreWin)
}

/// Score all four rotations of `gray` and pick one.
///
/// The detector is consulted once, on the unrotated image.
pub fn resolve<B, D>(
    gray: &GrayImage,
    backend: &B,
    detector: &D,
    language: &str,
    params: &OrientationParams,
) -> Result<(Rotation, Rationale, Vec<RotationCandidate>), PipelineError>
where
    B: OcrBackend + ?Sized,
    D: OrientationDetector + ?Sized,
{
    let osd = detector.detect_orientation(gray)?;
    let (osd_confidence, osd_reported_angle) = match osd {
        OsdSignal::Detected { angle, confidence } => (confidence, Some(angle)),
        OsdSignal::NoSignal => (0.0, None),
    };

    let score = |rotation: Rotation| -> Result<f32, PipelineError> {
        let rotated = rotate_cardinal(gray, rotation);
        let recognition = backend.recognize(&rotated, language)?;
        Ok(legibility_score(&recognition.text))
    };

    let score = &score;
    let scores: Vec<f32> = if params.parallel {
        std::thread::scope(|scope| {
            let handles: Vec<_> = Rotation::ALL
                .iter()
                .map(|&rotation| scope.spawn(move || score(rotation)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(PipelineError::Internal(
                            "orientation scoring thread panicked".to_string(),
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?
    } else {
        Rotation::ALL
            .iter()
            .map(|&rotation| score(rotation))
            .collect::<Result<Vec<_>, _>>()?
    };

    let candidates: Vec<RotationCandidate> = Rotation::ALL
        .iter()
        .zip(scores)
        .map(|(&angle, ocr_score)| {
            tracing::debug!(angle = angle.degrees(), ocr_score, "Scored rotation candidate");
            RotationCandidate {
                angle,
                ocr_score,
                osd_confidence,
                osd_reported_angle,
            }
        })
        .collect();

    let (angle, rationale) = decide(&candidates, osd, params);
    Ok((angle, rationale, candidates))
}

/// Deskew (when enabled), resolve the cardinal rotation and apply it
pub fn apply<B, D>(
    gray: &GrayImage,
    backend: &B,
    detector: &D,
    language: &str,
    params: &OrientationParams,
    deskew_params: &DeskewParams,
) -> Result<(GrayImage, OrientationDecision), PipelineError>
where
    B: OcrBackend + ?Sized,
    D: OrientationDetector + ?Sized,
{
    let (level, skew) = if params.deskew {
        deskew::apply(gray, deskew_params)?
    } else {
        (gray.clone(), None)
    };

    let (chosen_angle, rationale, candidates) =
        resolve(&level, backend, detector, language, params)?;

    tracing::info!(
        angle = chosen_angle.degrees(),
        rationale = rationale.as_str(),
        "Orientation resolved"
    );

    let upright = rotate_cardinal(&level, chosen_angle);
    Ok((
        upright,
        OrientationDecision {
            chosen_angle,
            rationale,
            skew,
            candidates,
        },
    ))
}
