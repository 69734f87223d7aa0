//! Capabilities the normalization core consumes from an OCR engine.
//!
//! The core never talks to Tesseract or ocrs directly. It asks for text and
//! word boxes through [`OcrBackend`] and for a coarse orientation hint through
//! [`OrientationDetector`].

use crate::error::PipelineError;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// One of the four cardinal rotations, measured clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Parse a reported angle, accepting negative and >360 values
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    /// Size of the turn regardless of direction (270 clockwise is 90 counter-clockwise)
    pub fn magnitude(self) -> u16 {
        let d = self.degrees();
        d.min(360 - d)
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Rotation::from_degrees(value as i32)
            .ok_or_else(|| format!("{} is not a cardinal rotation", value))
    }
}

/// Word-level bounding box reported by the OCR backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Recognition confidence in [0, 100]
    pub confidence: f32,
    #[serde(default)]
    pub text: String,
}

impl TextBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32, confidence: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            confidence,
            text: String::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// Result of a single recognition call
#[derive(Debug, Clone, Default, Serialize)]
pub struct Recognition {
    pub text: String,
    pub boxes: Vec<TextBox>,
}

impl Recognition {
    /// Mean box confidence, 0 when no boxes were reported
    pub fn mean_confidence(&self) -> f32 {
        if self.boxes.is_empty() {
            return 0.0;
        }
        self.boxes.iter().map(|b| b.confidence).sum::<f32>() / self.boxes.len() as f32
    }

    pub fn stats(&self) -> TextStats {
        TextStats::from_text(&self.text)
    }
}

/// Summary counts over recognized text
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TextStats {
    pub word_count: usize,
    pub character_count: usize,
    pub line_count: usize,
    /// Mean characters per whitespace-separated word, 0 without words
    pub average_word_length: f32,
}

impl TextStats {
    pub fn from_text(text: &str) -> Self {
        let words: Vec<&str> = text.split_whitespace().collect();
        let letters: usize = words.iter().map(|w| w.chars().count()).sum();
        Self {
            word_count: words.len(),
            character_count: text.chars().count(),
            line_count: text.lines().count(),
            average_word_length: if words.is_empty() {
                0.0
            } else {
                letters as f32 / words.len() as f32
            },
        }
    }
}

/// Outcome of orientation/script detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OsdSignal {
    Detected { angle: Rotation, confidence: f32 },
    /// The detector could not decide. Not an error.
    NoSignal,
}

/// Text recognition capability
pub trait OcrBackend: Send + Sync {
    /// Recognize text and word boxes. `language` is an engine language code.
    fn recognize(&self, image: &GrayImage, language: &str) -> Result<Recognition, PipelineError>;
}

/// Coarse orientation detection capability
pub trait OrientationDetector: Send + Sync {
    fn detect_orientation(&self, image: &GrayImage) -> Result<OsdSignal, PipelineError>;
}

/// Trait that all OCR engines must implement
pub trait OcrEngine: OcrBackend + OrientationDetector {
    /// Returns the engine identifier (e.g., "ocrs", "tesseract")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}

/// Map a canonical language name ("english") to the Tesseract code ("eng").
/// Codes and unknown names pass through unchanged.
pub fn language_code(language: &str) -> String {
    match language.to_lowercase().as_str() {
        "english" => "eng".to_string(),
        "french" => "fra".to_string(),
        "german" => "deu".to_string(),
        "polish" => "pol".to_string(),
        other => other.to_string(),
    }
}

/// Language codes are `[A-Za-z0-9_]` names, optionally joined with `+`
/// (Tesseract's multi-language form, e.g. `eng+pol`).
pub fn is_valid_language(language: &str) -> bool {
    !language.is_empty()
        && language.split('+').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_from_degrees_normalizes() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_rotation_magnitude() {
        assert_eq!(Rotation::Deg0.magnitude(), 0);
        assert_eq!(Rotation::Deg90.magnitude(), 90);
        assert_eq!(Rotation::Deg270.magnitude(), 90);
        assert_eq!(Rotation::Deg180.magnitude(), 180);
    }

    #[test]
    fn test_rotation_serializes_as_degrees() {
        let json = serde_json::to_string(&Rotation::Deg270).unwrap();
        assert_eq!(json, "270");
        let parsed: Rotation = serde_json::from_str("90").unwrap();
        assert_eq!(parsed, Rotation::Deg90);
        assert!(serde_json::from_str::<Rotation>("45").is_err());
    }

    #[test]
    fn test_language_code_mapping() {
        assert_eq!(language_code("English"), "eng");
        assert_eq!(language_code("polish"), "pol");
        assert_eq!(language_code("eng"), "eng");
    }

    #[test]
    fn test_text_stats() {
        let stats = TextStats::from_text("INVOICE\nTotal 12345");
        assert_eq!(stats.word_count, 3);
        assert_eq!(stats.character_count, 19);
        assert_eq!(stats.line_count, 2);
        assert!((stats.average_word_length - 17.0 / 3.0).abs() < 1e-5);

        assert_eq!(TextStats::from_text(""), TextStats::default());
    }

    #[test]
    fn test_language_validation() {
        assert!(is_valid_language("eng"));
        assert!(is_valid_language("eng+pol"));
        assert!(is_valid_language("chi_sim"));
        assert!(!is_valid_language(""));
        assert!(!is_valid_language("../../x"));
        assert!(!is_valid_language("eng+"));
        assert!(!is_valid_language("eng pol"));
    }

    #[test]
    fn test_mean_confidence() {
        let rec = Recognition {
            text: "a b".to_string(),
            boxes: vec![TextBox::new(0, 0, 1, 1, 80.0), TextBox::new(0, 0, 1, 1, 60.0)],
        };
        assert_eq!(rec.mean_confidence(), 70.0);
        assert_eq!(Recognition::default().mean_confidence(), 0.0);
    }
}
