//! Tesseract engine implementation
//!
//! Tesseract-based OCR engine. Better for noisy/messy images like phone photos.
//! Uses tesseract-static crate for static linking (no system dependencies).
//! Downloads tessdata (training data) automatically on first use.

use crate::config::Config;
use crate::engine::{
    is_valid_language, OcrBackend, OcrEngine, OrientationDetector, OsdSignal, Recognition, TextBox,
};
use crate::error::PipelineError;
use image::{GrayImage, ImageFormat};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tesseract_static::tesseract::Tesseract;

/// TSV row level for a single word
const WORD_LEVEL: u32 = 5;

/// Tesseract OCR Engine
pub struct TesseractEngine {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Set when tessdata came from the cache and missing languages may be fetched
    managed: bool,
}

impl TesseractEngine {
    /// Create a new Tesseract-based OCR engine
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let default_language = config.default_language.clone();

        let (tessdata_path, managed) = match &config.tessdata_path {
            Some(path) => (path.clone(), false),
            None => (
                ensure_tessdata_available(&default_language)
                    .map_err(PipelineError::InitializationError)?,
                true,
            ),
        };

        // Fail at startup rather than on the first request
        Tesseract::new(Some(&tessdata_path), Some(&default_language)).map_err(|e| {
            PipelineError::InitializationError(format!("Failed to initialize Tesseract: {}", e))
        })?;

        tracing::info!(
            "Tesseract engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            default_language
        );

        Ok(Self {
            tessdata_path,
            managed,
        })
    }
}

impl OcrBackend for TesseractEngine {
    fn recognize(&self, image: &GrayImage, language: &str) -> Result<Recognition, PipelineError> {
        let (width, height) = image.dimensions();

        if !is_valid_language(language) {
            return Err(PipelineError::InvalidRequest(format!(
                "'{}' is not a valid Tesseract language code",
                language
            )));
        }
        if self.managed {
            ensure_tessdata_available(language).map_err(PipelineError::BackendUnavailable)?;
        }

        // Convert to BMP in memory (BMP is always supported by leptonica)
        let mut bmp_data = Vec::new();
        {
            let mut cursor = std::io::Cursor::new(&mut bmp_data);
            image
                .write_to(&mut cursor, ImageFormat::Bmp)
                .map_err(|e| {
                    PipelineError::InvalidImage(format!("Failed to convert to BMP: {}", e))
                })?;
        }

        tracing::debug!(
            "Processing image: {}x{}, BMP size: {} bytes, language: {}",
            width,
            height,
            bmp_data.len(),
            language
        );

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(language))
            .map_err(|e| backend_error("create Tesseract", e))?;

        tess = tess
            .set_image_from_mem(&bmp_data)
            .map_err(|e| backend_error("set image", e))?;

        tess = tess
            .recognize()
            .map_err(|e| backend_error("recognize text", e))?;

        let text = tess
            .get_text()
            .map_err(|e| backend_error("get text", e))?;

        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| backend_error("get word boxes", e))?;

        Ok(Recognition {
            text: text.trim().to_string(),
            boxes: parse_tsv(&tsv),
        })
    }
}

impl OrientationDetector for TesseractEngine {
    /// The bindings expose no orientation/script detection call
    fn detect_orientation(&self, _image: &GrayImage) -> Result<OsdSignal, PipelineError> {
        Ok(OsdSignal::NoSignal)
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy images like phone photos"
    }

    fn supported_languages(&self) -> Vec<String> {
        // Tesseract supports many languages - return common ones
        vec![
            "eng".to_string(),     // English
            "deu".to_string(),     // German
            "fra".to_string(),     // French
            "pol".to_string(),     // Polish
            "spa".to_string(),     // Spanish
            "ita".to_string(),     // Italian
            "por".to_string(),     // Portuguese
            "nld".to_string(),     // Dutch
            "rus".to_string(),     // Russian
        ]
    }
}

fn backend_error(stage: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::BackendUnavailable(format!("tesseract failed to {}: {}", stage, err))
}

/// Word boxes from Tesseract TSV output.
///
/// Columns: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text. Non-word rows, blank words and malformed rows are
/// skipped; confidences are clamped to [0, 100].
fn parse_tsv(tsv: &str) -> Vec<TextBox> {
    tsv.lines()
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0].parse::<u32>().ok()? != WORD_LEVEL {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            let left = cols[6].parse::<u32>().ok()?;
            let top = cols[7].parse::<u32>().ok()?;
            let width = cols[8].parse::<u32>().ok()?;
            let height = cols[9].parse::<u32>().ok()?;
            let conf = cols[10].parse::<f32>().ok()?.clamp(0.0, 100.0);
            Some(TextBox::new(left, top, width, height, conf).with_text(text))
        })
        .collect()
}

// ============================================================================
// Tessdata download helpers
// ============================================================================

/// Ensure traineddata for every `+`-joined language is cached, downloading
/// missing files. Returns the tessdata directory.
fn ensure_tessdata_available(language: &str) -> Result<String, String> {
    if !is_valid_language(language) {
        return Err(format!("'{}' is not a valid Tesseract language code", language));
    }

    let cache_dir = tessdata_cache_dir();
    std::fs::create_dir_all(&cache_dir)
        .map_err(|e| format!("Failed to create tessdata directory: {}", e))?;

    for code in language.split('+') {
        let traineddata_path = cache_dir.join(format!("{}.traineddata", code));
        if traineddata_path.exists() {
            continue;
        }
        tracing::info!(
            "Downloading tessdata for '{}' (this may take a moment)...",
            code
        );
        download_file(&tessdata_url(code), &traineddata_path)?;
        tracing::info!("Downloaded tessdata to {:?}", traineddata_path);
    }

    // Tesseract expects the directory, not the file
    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "Invalid tessdata path".to_string())
}

fn tessdata_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docnorm")
        .join("tessdata")
}

/// Get tessdata download URL for a language
fn tessdata_url(language: &str) -> String {
    // Use tessdata_fast for smaller, faster downloads
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}

/// Download a file from URL to path using ureq
fn download_file(url: &str, path: &Path) -> Result<(), String> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| format!("Failed to download tessdata: {}", e))?;

    let buffer = response
        .into_body()
        .read_to_vec()
        .map_err(|e| format!("Failed to read tessdata response: {}", e))?;

    let mut file =
        File::create(path).map_err(|e| format!("Failed to create tessdata file: {}", e))?;
    file.write_all(&buffer)
        .map_err(|e| format!("Failed to write tessdata file: {}", e))
}
