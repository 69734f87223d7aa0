//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.
//!
//! ocrs has no orientation detector, so [`OrientationDetector`] always
//! reports [`OsdSignal::NoSignal`] and orientation rests on legibility scores.

use crate::config::Config;
use crate::engine::{OcrBackend, OcrEngine, OrientationDetector, OsdSignal, Recognition, TextBox};
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage};
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// OCR Engine wrapping the ocrs library
pub struct OcrsEngine {
    engine: OcrsOcrEngine,
}

impl OcrsEngine {
    /// Create a new OCR processor, downloading models if needed
    pub fn new(_config: &Config) -> Result<Self, PipelineError> {
        tracing::info!("Initializing ocrs OCR engine...");

        let detection_model_path =
            ensure_model_downloaded(DETECTION_MODEL_URL, "text-detection.rten")?;
        let recognition_model_path =
            ensure_model_downloaded(RECOGNITION_MODEL_URL, "text-recognition.rten")?;

        let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
            PipelineError::InitializationError(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
            PipelineError::InitializationError(format!("Failed to load recognition model: {}", e))
        })?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| {
            PipelineError::InitializationError(format!("Failed to create OCR engine: {}", e))
        })?;

        tracing::info!("ocrs engine initialized successfully");

        Ok(Self { engine })
    }
}

impl OcrBackend for OcrsEngine {
    fn recognize(&self, image: &GrayImage, _language: &str) -> Result<Recognition, PipelineError> {
        // ImageSource::from_bytes expects HWC RGB
        let rgb_img = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let dimensions = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions).map_err(|e| {
            PipelineError::InvalidImage(format!("Failed to create image source: {}", e))
        })?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| backend_error("prepare input", e))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| backend_error("detect words", e))?;

        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| backend_error("recognize text", e))?;

        let mut lines = Vec::new();
        let mut boxes = Vec::new();
        for line in line_texts.iter().flatten() {
            let words: Vec<String> = line.words().map(|word| word.to_string()).collect();
            let line_text = words.join(" ");
            let line_confidence = line_quality(&line_text);

            for word in line.words() {
                let word_text = word.to_string();
                let rect = word.bounding_rect();
                let confidence = word_confidence(&word_text, line_confidence);
                boxes.push(
                    TextBox::new(
                        rect.left().max(0) as u32,
                        rect.top().max(0) as u32,
                        rect.width().max(0) as u32,
                        rect.height().max(0) as u32,
                        confidence,
                    )
                    .with_text(word_text),
                );
            }
            lines.push(line_text);
        }

        Ok(Recognition {
            text: lines.join("\n"),
            boxes,
        })
    }
}

impl OrientationDetector for OcrsEngine {
    fn detect_orientation(&self, _image: &GrayImage) -> Result<OsdSignal, PipelineError> {
        Ok(OsdSignal::NoSignal)
    }
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn supported_languages(&self) -> Vec<String> {
        // ocrs currently only supports English/Latin alphabet
        vec!["eng".to_string()]
    }
}

fn backend_error(stage: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::BackendUnavailable(format!("ocrs failed to {}: {}", stage, err))
}

// ============================================================================
// Confidence scoring heuristics
// ============================================================================

/// Per-word confidence on the 0-100 scale.
///
/// Blends the quality of the enclosing line with how much of the word is
/// letters and digits.
fn word_confidence(word: &str, line_confidence: f32) -> f32 {
    let total = word.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alnum = word.chars().filter(|c| c.is_alphanumeric()).count();
    let alnum_ratio = alnum as f32 / total as f32;
    ((0.5 * line_confidence + 0.5 * alnum_ratio) * 100.0).clamp(0.0, 100.0)
}

/// Line quality in [0, 1] from the recognized text alone.
///
/// ocrs reports no per-character scores. Letters and digits count for,
/// symbols outside ASCII punctuation count against, and long runs of one
/// repeated character (`"#####"`, `"llll"`) scale the result down.
fn line_quality(text: &str) -> f32 {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.is_empty() {
        return 0.0;
    }
    let total = chars.len() as f32;

    let alnum = chars.iter().filter(|c| c.is_alphanumeric()).count() as f32;
    let stray = chars
        .iter()
        .filter(|c| !c.is_alphanumeric() && !c.is_ascii_punctuation())
        .count() as f32;
    let stray_penalty = 1.0 - (stray / total * 5.0).min(1.0);

    let mut longest_run = 1;
    let mut run = 1;
    for pair in chars.windows(2) {
        run = if pair[0] == pair[1] { run + 1 } else { 1 };
        longest_run = longest_run.max(run);
    }
    let run_penalty = if longest_run <= 3 {
        1.0
    } else {
        3.0 / longest_run as f32
    };

    ((0.5 * alnum / total + 0.5 * stray_penalty) * run_penalty).clamp(0.0, 1.0)
}

// ============================================================================
// Model download
// ============================================================================

/// Ensure model is downloaded and return its path
fn ensure_model_downloaded(url: &str, filename: &str) -> Result<std::path::PathBuf, PipelineError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docnorm");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        PipelineError::InitializationError(format!("Failed to create cache directory: {}", e))
    })?;

    let model_path = cache_dir.join(filename);

    if !model_path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &model_path)?;
        tracing::info!("Downloaded {} to {:?}", filename, model_path);
    } else {
        tracing::info!("Using cached model from {:?}", model_path);
    }

    Ok(model_path)
}

/// Download a file from URL to path using ureq
fn download_file(url: &str, path: &Path) -> Result<(), PipelineError> {
    let response = ureq::get(url).call().map_err(|e| {
        PipelineError::InitializationError(format!("Failed to download model: {}", e))
    })?;

    let buffer = response.into_body().read_to_vec().map_err(|e| {
        PipelineError::InitializationError(format!("Failed to read response body: {}", e))
    })?;

    let mut file = File::create(path).map_err(|e| {
        PipelineError::InitializationError(format!("Failed to create model file: {}", e))
    })?;

    file.write_all(&buffer).map_err(|e| {
        PipelineError::InitializationError(format!("Failed to write model file: {}", e))
    })?;

    Ok(())
}
