//! Image normalization for OCR
//!
//! Filters, skew and orientation correction, resizing and text cropping,
//! composed by a [`PipelineRunner`] from an immutable [`PipelineConfig`].

pub mod config;
pub mod pipeline;
pub mod steps;

pub use config::{PipelineConfig, Preset, Step};
pub use pipeline::{PipelineOutput, PipelineRunner, StepTiming};
pub use steps::crop::CropRegion;
pub use steps::orientation::{OrientationDecision, Rationale, RotationCandidate};
