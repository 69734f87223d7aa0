use crate::engine::{language_code, OcrBackend, OrientationDetector, Rotation};
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use std::time::Instant;

use super::config::{PipelineConfig, Step};
use super::steps;
use super::steps::crop::CropRegion;
use super::steps::deskew::SkewEstimate;
use super::steps::orientation::{OrientationDecision, Rationale};

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Normalized image plus everything the run decided along the way
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Normalized image (not serialized)
    #[serde(skip)]
    pub image: GrayImage,
    pub width: u32,
    pub height: u32,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Individual step timings, in execution order
    pub steps: Vec<StepTiming>,
    /// Result of the standalone deskew step
    pub skew: Option<SkewEstimate>,
    pub orientation: Option<OrientationDecision>,
    pub crop: Option<CropRegion>,
    /// The input had no pixels; every step was skipped
    pub degenerate_input: bool,
}

/// Runs a validated [`PipelineConfig`] against images.
///
/// The runner holds no per-image state, so one instance can serve concurrent
/// runs on different images.
#[derive(Debug, Clone)]
pub struct PipelineRunner {
    config: PipelineConfig,
}

impl PipelineRunner {
    /// Validate `config` up front; nothing runs with a bad configuration
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Standard step order with default parameters
    pub fn standard() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process an image through the configured steps.
    ///
    /// `backend` and `detector` are only called by `correct_orientation` and
    /// `crop_to_text`; their failures abort the run.
    pub fn run<B, D>(
        &self,
        image: &DynamicImage,
        backend: &B,
        detector: &D,
    ) -> Result<PipelineOutput, PipelineError>
    where
        B: OcrBackend + ?Sized,
        D: OrientationDetector + ?Sized,
    {
        let start = Instant::now();
        let mut timings = Vec::new();
        let mut img = steps::grayscale::apply(image);

        if steps::grayscale::is_empty(&img) {
            tracing::warn!(
                width = img.width(),
                height = img.height(),
                "Empty input image; skipping all steps"
            );
            return Ok(self.degenerate(img, start));
        }

        let config = &self.config;
        let language = language_code(&config.language);
        let mut skew = None;
        let mut orientation = None;
        let mut crop = None;

        for &step in &config.steps {
            img = match step {
                Step::EnhanceContrast => run_step(step, img, &mut timings, |g| {
                    steps::contrast::apply(g, &config.contrast)
                })?,
                Step::Denoise => run_step(step, img, &mut timings, |g| {
                    steps::denoise::apply(g, &config.denoise)
                })?,
                Step::Sharpen => run_step(step, img, &mut timings, |g| {
                    steps::sharpen::apply(g, &config.sharpen)
                })?,
                Step::EdgeEnhance => run_step(step, img, &mut timings, |g| {
                    steps::edges::apply(g, &config.edge)
                })?,
                Step::Threshold => run_step(step, img, &mut timings, |g| {
                    steps::threshold::apply(g, &config.threshold)
                })?,
                Step::Deskew => run_step(step, img, &mut timings, |g| {
                    let (out, estimate) = steps::deskew::apply(g, &config.deskew)?;
                    skew = estimate;
                    Ok(out)
                })?,
                Step::CorrectOrientation => run_step(step, img, &mut timings, |g| {
                    let (out, decision) = steps::orientation::apply(
                        g,
                        backend,
                        detector,
                        &language,
                        &config.orientation,
                        &config.deskew,
                    )?;
                    orientation = Some(decision);
                    Ok(out)
                })?,
                Step::ResizeNormalize => run_step(step, img, &mut timings, |g| {
                    steps::resize::apply(g, &config.resize)
                })?,
                Step::CropToText => run_step(step, img, &mut timings, |g| {
                    let (out, region) = steps::crop::apply(g, backend, &language, &config.crop)?;
                    crop = Some(region);
                    Ok(out)
                })?,
            };
        }

        Ok(PipelineOutput {
            width: img.width(),
            height: img.height(),
            image: img,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: timings,
            skew,
            orientation,
            crop,
            degenerate_input: false,
        })
    }

    /// Output for an image with no pixels: fallback orientation, identity crop
    fn degenerate(&self, img: GrayImage, start: Instant) -> PipelineOutput {
        let has = |step: Step| self.config.steps.contains(&step);
        let orientation = has(Step::CorrectOrientation).then(|| OrientationDecision {
            chosen_angle: Rotation::Deg0,
            rationale: Rationale::DefaultFallback,
            skew: None,
            candidates: Vec::new(),
        });
        let crop = has(Step::CropToText).then(|| CropRegion::full(img.width(), img.height()));

        PipelineOutput {
            width: img.width(),
            height: img.height(),
            image: img,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: Vec::new(),
            skew: None,
            orientation,
            crop,
            degenerate_input: true,
        }
    }
}

fn run_step<F>(
    step: Step,
    img: GrayImage,
    timings: &mut Vec<StepTiming>,
    step_fn: F,
) -> Result<GrayImage, PipelineError>
where
    F: FnOnce(&GrayImage) -> Result<GrayImage, PipelineError>,
{
    let step_start = Instant::now();
    let result = step_fn(&img)?;
    let time_ms = step_start.elapsed().as_millis() as u64;
    tracing::debug!(
        step = step.as_str(),
        time_ms,
        width = result.width(),
        height = result.height(),
        "Step complete"
    );
    timings.push(StepTiming {
        name: step.as_str().to_string(),
        time_ms,
    });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::fake::FakeEngine;
    use crate::preprocessing::config::Preset;
    use image::Luma;

    fn page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(64, 48, |x, y| {
            Luma([if (x / 8 + y / 8) % 2 == 0 { 30 } else { 220 }])
        }))
    }

    #[test]
    fn test_preset_none_returns_grayscale_input() {
        let runner = PipelineRunner::new(PipelineConfig::from_preset(Preset::None)).unwrap();
        let engine = FakeEngine::constant("");
        let output = runner.run(&page(), &engine, &engine).unwrap();
        assert_eq!(output.image, page().to_luma8());
        assert!(output.steps.is_empty());
        assert_eq!(engine.recognize_calls(), 0);
    }

    #[test]
    fn test_timings_follow_step_order() {
        let config = PipelineConfig::default().with_steps(vec![
            Step::ResizeNormalize,
            Step::Sharpen,
            Step::EnhanceContrast,
        ]);
        let runner = PipelineRunner::new(config).unwrap();
        let engine = FakeEngine::constant("");
        let output = runner.run(&page(), &engine, &engine).unwrap();
        let names: Vec<&str> = output.steps.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["resize_normalize", "sharpen", "enhance_contrast"]);
        assert_eq!(output.width, 800);
    }

    #[test]
    fn test_invalid_config_rejected_before_run() {
        let mut config = PipelineConfig::default();
        config.resize.target_width = 0;
        assert!(matches!(
            PipelineRunner::new(config),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_image_is_degenerate_not_error() {
        let runner = PipelineRunner::standard();
        let engine = FakeEngine::unavailable("never called");
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let output = runner.run(&empty, &engine, &engine).unwrap();

        assert!(output.degenerate_input);
        let decision = output.orientation.unwrap();
        assert_eq!(decision.chosen_angle, Rotation::Deg0);
        assert_eq!(decision.rationale, Rationale::DefaultFallback);
        assert_eq!(output.crop, Some(CropRegion::full(0, 0)));
    }

    #[test]
    fn test_backend_failure_aborts_run() {
        let config = PipelineConfig::default().with_steps(vec![Step::CropToText]);
        let runner = PipelineRunner::new(config).unwrap();
        let engine = FakeEngine::unavailable("connection refused");
        let err = runner.run(&page(), &engine, &engine).unwrap_err();
        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }
}
