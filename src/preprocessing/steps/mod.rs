//! Individual preprocessing steps

pub mod contrast;
pub mod crop;
pub mod denoise;
pub mod deskew;
pub mod edges;
pub mod grayscale;
pub mod orientation;
pub mod resize;
pub mod rotate;
pub mod sharpen;
pub mod threshold;
