//! Errors raised while turning image bytes into text

use thiserror::Error;

/// How a failure should be reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The uploaded content is at fault
    BadInput,
    /// The service itself failed
    Internal,
}

#[derive(Debug, Error)]
pub enum OcrError {
    /// Bytes did not decode to an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The OCR engine ran and reported a failure
    #[error("Tesseract OCR failed: {0}")]
    OcrEngine(String),

    /// Anything else: engine missing, timeout, unreadable engine output
    #[error("{0}")]
    Unexpected(String),
}

impl OcrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // An engine that ran and failed counts as a bad upload
            OcrError::InvalidImage(_) | OcrError::OcrEngine(_) => ErrorKind::BadInput,
            OcrError::Unexpected(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for OcrError {
    fn from(err: std::io::Error) -> Self {
        OcrError::Unexpected(err.to_string())
    }
}

impl From<tokio::task::JoinError> for OcrError {
    fn from(err: tokio::task::JoinError) -> Self {
        OcrError::Unexpected(format!("worker task failed: {}", err))
    }
}
