//! Pipeline configuration: step order plus per-step parameters.
//!
//! A [`PipelineConfig`] is immutable for the duration of a run. Build one in
//! code, from a [`Preset`], or deserialize it from JSON.

use crate::engine::{is_valid_language, language_code};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Step {
    EnhanceContrast,
    Denoise,
    Sharpen,
    EdgeEnhance,
    Threshold,
    Deskew,
    CorrectOrientation,
    ResizeNormalize,
    CropToText,
}

impl Step {
    /// Standard order used when the caller does not supply one
    pub const STANDARD: [Step; 7] = [
        Step::EnhanceContrast,
        Step::Denoise,
        Step::Sharpen,
        Step::EdgeEnhance,
        Step::CorrectOrientation,
        Step::ResizeNormalize,
        Step::CropToText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnhanceContrast => "enhance_contrast",
            Self::Denoise => "denoise",
            Self::Sharpen => "sharpen",
            Self::EdgeEnhance => "edge_enhance",
            Self::Threshold => "threshold",
            Self::Deskew => "deskew",
            Self::CorrectOrientation => "correct_orientation",
            Self::ResizeNormalize => "resize_normalize",
            Self::CropToText => "crop_to_text",
        }
    }

    /// Parse a comma separated step list, e.g. "denoise, sharpen,crop"
    pub fn parse_list(list: &str) -> Result<Vec<Step>, PipelineError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Step::from_str)
            .collect()
    }
}

impl FromStr for Step {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "enhance_contrast" | "contrast" => Ok(Self::EnhanceContrast),
            "denoise" => Ok(Self::Denoise),
            "sharpen" => Ok(Self::Sharpen),
            "edge_enhance" | "edge_enhancement" => Ok(Self::EdgeEnhance),
            "threshold" => Ok(Self::Threshold),
            "deskew" => Ok(Self::Deskew),
            "correct_orientation" | "orientation" => Ok(Self::CorrectOrientation),
            "resize_normalize" | "resize" => Ok(Self::ResizeNormalize),
            "crop_to_text" | "crop" => Ok(Self::CropToText),
            other => Err(PipelineError::Configuration(format!(
                "unknown pipeline step '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Step {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.as_str().to_string()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preprocessing preset names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Skip all preprocessing
    None,
    /// Contrast enhancement and resize only
    Minimal,
    /// The standard order
    #[default]
    Default,
    /// Standard order plus deskew and binarization, for poor photos
    Aggressive,
}

impl Preset {
    /// Parse from query parameter string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "minimal" => Some(Self::Minimal),
            "default" => Some(Self::Default),
            "aggressive" => Some(Self::Aggressive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Default => "default",
            Self::Aggressive => "aggressive",
        }
    }

    pub fn steps(&self) -> Vec<Step> {
        match self {
            Self::None => vec![],
            Self::Minimal => vec![Step::EnhanceContrast, Step::ResizeNormalize],
            Self::Default => Step::STANDARD.to_vec(),
            Self::Aggressive => vec![
                Step::EnhanceContrast,
                Step::Denoise,
                Step::Sharpen,
                Step::EdgeEnhance,
                Step::Deskew,
                Step::Threshold,
                Step::CorrectOrientation,
                Step::ResizeNormalize,
                Step::CropToText,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastParams {
    pub use_gamma: bool,
    pub gamma: f32,
    pub use_clahe: bool,
    pub clip_limit: f32,
    /// Tiles across and down
    pub tile_grid: (u32, u32),
}

impl Default for ContrastParams {
    fn default() -> Self {
        Self {
            use_gamma: true,
            gamma: 0.5,
            use_clahe: true,
            clip_limit: 4.0,
            tile_grid: (8, 8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseParams {
    /// Filter strength; larger removes more noise and more detail
    pub strength: f32,
    pub template_window: u32,
    pub search_window: u32,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            strength: 5.0,
            template_window: 9,
            search_window: 31,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenParams {
    /// Gaussian sigma of the blurred copy
    pub sigma: f32,
    /// Weight of the subtracted blur
    pub amount: f32,
}

impl Default for SharpenParams {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            amount: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    pub alpha: f32,
    pub kernel_size: u32,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            kernel_size: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    #[default]
    Global,
    Sauvola,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    pub method: ThresholdMethod,
    /// Global cutoff; pixels above it become white
    pub value: u8,
    pub invert: bool,
    /// Sauvola window size
    pub window: u32,
    /// Sauvola sensitivity
    pub k: f32,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            method: ThresholdMethod::Global,
            value: 80,
            invert: false,
            window: 15,
            k: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewParams {
    /// Largest tilt considered, in degrees
    pub max_angle: f32,
    /// Accumulator resolution, in degrees
    pub resolution: f32,
    /// Votes a line needs before it counts as evidence
    pub min_votes: u32,
    /// Fewer detected lines than this means no confident estimate
    pub min_lines: usize,
    /// Estimates smaller than this are treated as already straight
    pub min_correction: f32,
}

impl Default for DeskewParams {
    fn default() -> Self {
        Self {
            max_angle: 45.0,
            resolution: 0.5,
            min_votes: 40,
            min_lines: 3,
            min_correction: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationParams {
    /// OSD confidence above which the detector is trusted
    pub osd_confidence_threshold: f32,
    /// How far the OSD pick may trail the best OCR score before it is overruled
    pub override_margin: f32,
    /// Scores at or below this count as no legible text
    pub no_text_floor: f32,
    /// Deskew before resolving the cardinal rotation
    pub deskew: bool,
    /// Score the four candidates on scoped threads
    pub parallel: bool,
}

impl Default for OrientationParams {
    fn default() -> Self {
        Self {
            osd_confidence_threshold: 2.0,
            override_margin: 0.25,
            no_text_floor: 0.1,
            deskew: true,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeParams {
    pub target_width: u32,
}

impl Default for ResizeParams {
    fn default() -> Self {
        Self { target_width: 800 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropParams {
    pub min_conf: f32,
    pub margin: i64,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            min_conf: 60.0,
            margin: 100,
        }
    }
}

/// Full description of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub steps: Vec<Step>,
    /// Language passed to the OCR backend (canonical name or engine code)
    pub language: String,
    pub contrast: ContrastParams,
    pub denoise: DenoiseParams,
    pub sharpen: SharpenParams,
    pub edge: EdgeParams,
    pub threshold: ThresholdParams,
    pub deskew: DeskewParams,
    pub orientation: OrientationParams,
    pub resize: ResizeParams,
    pub crop: CropParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Default)
    }
}

impl PipelineConfig {
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            steps: preset.steps(),
            language: "eng".to_string(),
            contrast: ContrastParams::default(),
            denoise: DenoiseParams::default(),
            sharpen: SharpenParams::default(),
            edge: EdgeParams::default(),
            threshold: ThresholdParams::default(),
            deskew: DeskewParams::default(),
            // The aggressive order runs a dedicated deskew step first
            orientation: OrientationParams {
                deskew: preset != Preset::Aggressive,
                ..OrientationParams::default()
            },
            resize: ResizeParams::default(),
            crop: CropParams::default(),
        }
    }

    /// Replace the step order, keeping parameters
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// Reject out-of-range parameters before anything runs.
    ///
    /// Upper bounds keep a single run's work and memory proportional to the
    /// image; configs may arrive from untrusted clients.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !is_valid_language(&language_code(&self.language)) {
            return invalid(format!("language '{}' is not a valid language code", self.language));
        }

        let c = &self.contrast;
        positive("contrast.gamma", c.gamma)?;
        positive("contrast.clip_limit", c.clip_limit)?;
        let (tiles_x, tiles_y) = c.tile_grid;
        if !(1..=MAX_TILE_GRID).contains(&tiles_x) || !(1..=MAX_TILE_GRID).contains(&tiles_y) {
            return invalid(format!(
                "contrast.tile_grid must be between 1x1 and {0}x{0}, got {1}x{2}",
                MAX_TILE_GRID, tiles_x, tiles_y
            ));
        }

        let d = &self.denoise;
        positive("denoise.strength", d.strength)?;
        odd_window("denoise.template_window", d.template_window, MAX_TEMPLATE_WINDOW)?;
        odd_window("denoise.search_window", d.search_window, MAX_SEARCH_WINDOW)?;

        positive("sharpen.sigma", self.sharpen.sigma)?;
        non_negative("sharpen.amount", self.sharpen.amount)?;

        if !(0.0..=1.0).contains(&self.edge.alpha) {
            return invalid(format!(
                "edge.alpha must be in [0, 1], got {}",
                self.edge.alpha
            ));
        }
        if !(1..=MAX_EDGE_KERNEL).contains(&self.edge.kernel_size) {
            return invalid(format!(
                "edge.kernel_size must be in [1, {}], got {}",
                MAX_EDGE_KERNEL, self.edge.kernel_size
            ));
        }

        if !self.threshold.k.is_finite() {
            return invalid(format!("threshold.k must be finite, got {}", self.threshold.k));
        }
        if self.threshold.method == ThresholdMethod::Sauvola {
            odd_window("threshold.window", self.threshold.window, MAX_SAUVOLA_WINDOW)?;
        }

        let s = &self.deskew;
        if !(s.max_angle > 0.0 && s.max_angle <= 45.0) {
            return invalid(format!(
                "deskew.max_angle must be in (0, 45], got {}",
                s.max_angle
            ));
        }
        if !(s.resolution >= MIN_DESKEW_RESOLUTION && s.resolution <= s.max_angle) {
            return invalid(format!(
                "deskew.resolution must be in [{}, max_angle], got {}",
                MIN_DESKEW_RESOLUTION, s.resolution
            ));
        }
        non_negative("deskew.min_correction", s.min_correction)?;

        let o = &self.orientation;
        non_negative("orientation.osd_confidence_threshold", o.osd_confidence_threshold)?;
        non_negative("orientation.override_margin", o.override_margin)?;
        non_negative("orientation.no_text_floor", o.no_text_floor)?;

        if !(1..=MAX_TARGET_WIDTH).contains(&self.resize.target_width) {
            return invalid(format!(
                "resize.target_width must be in [1, {}], got {}",
                MAX_TARGET_WIDTH, self.resize.target_width
            ));
        }

        if !(0..=MAX_CROP_MARGIN).contains(&self.crop.margin) {
            return invalid(format!(
                "crop.margin must be in [0, {}], got {}",
                MAX_CROP_MARGIN, self.crop.margin
            ));
        }
        if !(0.0..=100.0).contains(&self.crop.min_conf) {
            return invalid(format!(
                "crop.min_conf must be in [0, 100], got {}",
                self.crop.min_conf
            ));
        }

        Ok(())
    }
}

const MAX_TILE_GRID: u32 = 64;
const MAX_TEMPLATE_WINDOW: u32 = 21;
const MAX_SEARCH_WINDOW: u32 = 63;
const MAX_EDGE_KERNEL: u32 = 31;
const MAX_SAUVOLA_WINDOW: u32 = 255;
const MIN_DESKEW_RESOLUTION: f32 = 0.05;
const MAX_TARGET_WIDTH: u32 = 10_000;
const MAX_CROP_MARGIN: i64 = 10_000;

fn invalid(message: String) -> Result<(), PipelineError> {
    Err(PipelineError::Configuration(message))
}

fn positive(name: &str, value: f32) -> Result<(), PipelineError> {
    if !(value > 0.0 && value.is_finite()) {
        return invalid(format!("{} must be positive and finite, got {}", name, value));
    }
    Ok(())
}

fn non_negative(name: &str, value: f32) -> Result<(), PipelineError> {
    if !(value >= 0.0 && value.is_finite()) {
        return invalid(format!("{} must be non-negative and finite, got {}", name, value));
    }
    Ok(())
}

fn odd_window(name: &str, size: u32, max: u32) -> Result<(), PipelineError> {
    if size == 0 || size % 2 == 0 || size > max {
        return invalid(format!(
            "{} must be an odd number in [1, {}], got {}",
            name, max, size
        ));
    }
    Ok(())
}
