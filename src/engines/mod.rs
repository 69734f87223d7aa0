//! OCR engine implementations
//!
//! This module contains implementations of the OcrEngine trait for different
//! OCR backends. Engines are conditionally compiled based on feature flags;
//! the deterministic [`fake`] engine is always available.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-leptess")]
pub mod tesseract;

pub mod fake;

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::PipelineError;
use serde::Serialize;
use std::sync::Arc;

/// Information about an available engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<String>,
}

/// Registry of available OCR engines
pub struct EngineRegistry {
    engines: Vec<Arc<dyn OcrEngine>>,
    default_engine: String,
}

impl EngineRegistry {
    /// Create a new engine registry with all available engines initialized
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        #[allow(unused_mut)]
        let mut engines: Vec<Arc<dyn OcrEngine>> = Vec::new();

        #[cfg(feature = "engine-ocrs")]
        {
            if config.wants("ocrs") {
                tracing::info!("Initializing ocrs engine...");
                engines.push(Arc::new(ocrs::OcrsEngine::new(config)?));
            }
        }

        #[cfg(feature = "engine-leptess")]
        {
            if config.wants("tesseract") {
                tracing::info!("Initializing tesseract engine...");
                engines.push(Arc::new(tesseract::TesseractEngine::new(config)?));
            }
        }

        if engines.is_empty() {
            return Err(PipelineError::InitializationError(match &config.engine {
                Some(name) => format!("OCR engine '{}' is not available in this build", name),
                None => "No OCR engines available. Build with --features engine-ocrs or --features engine-leptess".to_string(),
            }));
        }

        Ok(Self::from_engines(engines))
    }

    /// Registry over already constructed engines; the first one is the default
    pub fn from_engines(engines: Vec<Arc<dyn OcrEngine>>) -> Self {
        let default_engine = engines
            .first()
            .map(|e| e.name().to_string())
            .unwrap_or_default();
        Self {
            engines,
            default_engine,
        }
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn OcrEngine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Get the default engine
    pub fn default(&self) -> Option<Arc<dyn OcrEngine>> {
        self.get(&self.default_engine)
    }

    /// Get the default engine name
    pub fn default_name(&self) -> &str {
        &self.default_engine
    }

    /// List all available engine names
    pub fn list(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Get info about all available engines
    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                name: e.name(),
                description: e.description(),
                supported_languages: e.supported_languages(),
            })
            .collect()
    }
}
