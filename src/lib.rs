//! Document image normalization and orientation correction for OCR.
//!
//! [`PipelineRunner`] turns a photographed or scanned page into clean,
//! upright, text-focused grayscale pixels, consulting an OCR engine through
//! the [`OcrBackend`] and [`OrientationDetector`] capabilities.

pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod preprocessing;
pub mod server;

pub use engine::{
    OcrBackend, OcrEngine, OrientationDetector, OsdSignal, Recognition, Rotation, TextBox,
    TextStats,
};
pub use error::PipelineError;
pub use preprocessing::{
    CropRegion, OrientationDecision, PipelineConfig, PipelineOutput, PipelineRunner, Preset,
    Rationale, Step,
};
