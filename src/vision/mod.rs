//! Vision/OCR Layer
//!
//! Turns uploaded image bytes into recognized text. Preprocessing happens
//! in-process; character recognition is delegated to an external engine
//! behind the [`OcrEngine`] trait.

pub mod error;
pub mod ocr;
pub mod preprocess;
pub mod tesseract;
pub mod tsv;

#[cfg(test)]
pub mod testing;

use serde::Serialize;

pub use error::{ErrorKind, OcrError};
pub use ocr::{OcrConfig, OcrEngine, OcrInvoker};
pub use tesseract::TesseractCli;

/// Pixel rectangle in source-image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// True if the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One recognized token from structured OCR output
#[derive(Debug, Clone, PartialEq)]
pub struct WordRecord {
    /// Recognized text, trimmed
    pub text: String,
    /// Engine confidence (0 - 100)
    pub confidence: f32,
    /// Block index assigned by the engine
    pub block_num: u32,
    /// Paragraph index within the block
    pub par_num: u32,
    /// Line index within the paragraph
    pub line_num: u32,
    /// Word index within the line
    pub word_num: u32,
    /// Word bounds
    pub bounds: BoundingBox,
}
