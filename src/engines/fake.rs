//! Deterministic in-process engine for tests and demos.
//!
//! Recognition is driven by a closure over the pixels it is handed, and the
//! orientation signal is scripted, so the scoring rules can be exercised
//! without a real OCR engine.

use crate::engine::{OcrBackend, OcrEngine, OrientationDetector, OsdSignal, Recognition, TextBox};
use crate::error::PipelineError;
use image::{GrayImage, Luma};
use std::sync::atomic::{AtomicUsize, Ordering};

type RecognizeFn = dyn Fn(&GrayImage) -> Result<Recognition, PipelineError> + Send + Sync;

pub struct FakeEngine {
    recognizer: Box<RecognizeFn>,
    osd: Result<OsdSignal, String>,
    recognize_calls: AtomicUsize,
    osd_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new<F>(recognizer: F) -> Self
    where
        F: Fn(&GrayImage) -> Result<Recognition, PipelineError> + Send + Sync + 'static,
    {
        Self {
            recognizer: Box::new(recognizer),
            osd: Ok(OsdSignal::NoSignal),
            recognize_calls: AtomicUsize::new(0),
            osd_calls: AtomicUsize::new(0),
        }
    }

    /// Same text for every image, no boxes
    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| {
            Ok(Recognition {
                text: text.clone(),
                boxes: Vec::new(),
            })
        })
    }

    /// Every call fails as if the engine process died
    pub fn unavailable(reason: &str) -> Self {
        let reason = reason.to_string();
        let osd_reason = reason.clone();
        let mut engine =
            Self::new(move |_| Err(PipelineError::BackendUnavailable(reason.clone())));
        engine.osd = Err(osd_reason);
        engine
    }

    /// Reads text only when the page's dark corner marker sits top-left,
    /// i.e. when the page is upright. See [`marker_page`].
    pub fn upright_marker() -> Self {
        Self::new(|image| Ok(read_marker_page(image)))
    }

    pub fn with_osd(mut self, osd: OsdSignal) -> Self {
        self.osd = Ok(osd);
        self
    }

    pub fn recognize_calls(&self) -> usize {
        self.recognize_calls.load(Ordering::SeqCst)
    }

    pub fn osd_calls(&self) -> usize {
        self.osd_calls.load(Ordering::SeqCst)
    }
}

impl OcrBackend for FakeEngine {
    fn recognize(&self, image: &GrayImage, _language: &str) -> Result<Recognition, PipelineError> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        (self.recognizer)(image)
    }
}

impl OrientationDetector for FakeEngine {
    fn detect_orientation(&self, _image: &GrayImage) -> Result<OsdSignal, PipelineError> {
        self.osd_calls.fetch_add(1, Ordering::SeqCst);
        self.osd
            .clone()
            .map_err(PipelineError::BackendUnavailable)
    }
}

impl OcrEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn description(&self) -> &'static str {
        "Deterministic scripted engine"
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

/// White page with a dark block near the top-left corner and a dark text bar
/// across the middle. Rotating it moves the block to another corner.
pub fn marker_page(width: u32, height: u32) -> GrayImage {
    let (block, bar) = marker_layout(width, height);
    GrayImage::from_fn(width, height, |x, y| {
        if contains(block, x, y) || contains(bar, x, y) {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

type Rect = (u32, u32, u32, u32);

fn marker_layout(width: u32, height: u32) -> (Rect, Rect) {
    let block = (width / 16, height / 16, width / 4, height / 4);
    let bar = (width / 4, height / 2, 3 * width / 4, height / 2 + (height / 20).max(1));
    (block, bar)
}

fn contains((l, t, r, b): Rect, x: u32, y: u32) -> bool {
    x >= l && x < r && y >= t && y < b
}

fn read_marker_page(image: &GrayImage) -> Recognition {
    let (width, height) = image.dimensions();
    let (cw, ch) = ((width / 4).max(1), (height / 4).max(1));
    let corner_mean = |x0: u32, y0: u32| {
        let mut sum = 0u64;
        for y in y0..(y0 + ch).min(height) {
            for x in x0..(x0 + cw).min(width) {
                sum += image.get_pixel(x, y).0[0] as u64;
            }
        }
        sum as f64 / (cw as f64 * ch as f64)
    };

    let top_left = corner_mean(0, 0);
    let others = [
        corner_mean(width.saturating_sub(cw), 0),
        corner_mean(0, height.saturating_sub(ch)),
        corner_mean(width.saturating_sub(cw), height.saturating_sub(ch)),
    ];
    let upright = others.iter().all(|&m| m - top_left > 50.0);

    if !upright {
        return Recognition {
            text: "~ |/ ~ .:".to_string(),
            boxes: Vec::new(),
        };
    }

    let (block, bar) = marker_layout(width, height);
    let to_box = |(l, t, r, b): Rect, conf: f32, word: &str| {
        TextBox::new(l, t, r - l, b - t, conf).with_text(word)
    };
    Recognition {
        text: "INVOICE\nTotal 12345".to_string(),
        boxes: vec![
            to_box(block, 92.0, "INVOICE"),
            to_box(bar, 88.0, "Total 12345"),
        ],
    }
}
