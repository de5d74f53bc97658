//! # Recognition Port
//!
//! The seam between batch orchestration and the OCR engine. The orchestrator
//! only ever sees `Arc<dyn RecognitionEngine>`; the production implementation
//! is [`crate::ocr::TesseractEngine`], tests plug in scripted fakes.

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::ocr_errors::OcrError;

/// Pixel rectangle of a recognized word, origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    /// Build from corner coordinates as reported by hOCR (`bbox x0 y0 x1 y1`)
    pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0),
            height: (y1 - y0).max(0),
        }
    }
}

/// A recognized text fragment and where it was found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub text: String,
    /// Engine confidence normalized to `[0, 1]`
    pub confidence: f64,
    #[serde(rename = "bbox")]
    pub bbox: BoundingBox,
}

/// Full recognition result for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedResult {
    pub full_text: String,
    pub boxes: Vec<TextBox>,
    pub total_lines: usize,
    pub language: String,
}

impl DetailedResult {
    /// Assemble a result from boxes; text is the box texts joined by single spaces
    pub fn from_boxes(boxes: Vec<TextBox>, language: impl Into<String>) -> Self {
        let full_text = boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let total_lines = boxes.len();
        Self {
            full_text,
            boxes,
            total_lines,
            language: language.into(),
        }
    }
}

/// OCR engine capability shared across requests.
///
/// Implementations must be safe to call concurrently; the batch orchestrator
/// bounds how many calls are in flight at once. Deadlines and cancellation are
/// imposed by the caller, so an implementation only needs to return once the
/// engine has answered.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &str;

    /// Recognize text in an already decoded image
    async fn recognize(&self, image: DynamicImage) -> Result<DetailedResult, OcrError>;
}
