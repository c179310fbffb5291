//! OCR coordination module.
//! A recognizer turns a captured image into word-level results with positions and the
//! engine's block/paragraph/line structure, which the grouper relies on.

pub mod tesseract;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tesseract::TesseractEngine;

/// One recognized word. Coordinates are image-local pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// Engine confidence, 0-100. Non-positive values mark noise rows.
    pub confidence: f32,
    pub block_id: u32,
    pub paragraph_id: u32,
    pub line_id: u32,
}

impl Word {
    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("OCR processing failed: {0}")]
    ProcessingFailed(String),
    #[error("malformed OCR output at line {line}: {reason}")]
    MalformedOutput { line: usize, reason: String },
}

/// OCR engine adapter.
pub trait TextRecognizer: Send + Sync {
    /// Recognize words in engine-native order.
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<Word>, RecognitionError>;

    fn is_available(&self) -> bool {
        true
    }
}
