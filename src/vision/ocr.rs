//! OCR invocation
//!
//! [`OcrInvoker`] owns the engine configuration and hands preprocessed images
//! to an [`OcrEngine`] in plain-text or structured mode.

use async_trait::async_trait;
use image::GrayImage;
use std::sync::Arc;
use tracing::debug;

use super::tsv::{self, LenientSplit, StrictColumns, TableStrategy};
use super::{OcrError, WordRecord};
use crate::config::OcrSettings;

/// Output mode requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Recognized text, newline-separated lines
    Text,
    /// One tab-separated row per recognized element, with header
    Tsv,
}

/// Per-call engine options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Language models ("deu+eng"); `None` uses the engine default
    pub languages: Option<String>,
    /// Page segmentation mode
    pub page_segmentation_mode: u8,
    /// Restrict recognition to these characters
    pub char_whitelist: Option<String>,
}

/// Engine configuration shared by every call of one invoker
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Options for whole preprocessed pages
    pub page: RecognitionOptions,
    /// Options for re-reading a cropped amount region
    pub roi: RecognitionOptions,
    /// Structured words at or below this confidence are dropped
    pub min_confidence: f32,
}

impl OcrConfig {
    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self {
            page: RecognitionOptions {
                languages: Some(settings.languages.clone()),
                page_segmentation_mode: settings.page_segmentation_mode,
                char_whitelist: None,
            },
            roi: RecognitionOptions {
                languages: None,
                page_segmentation_mode: settings.roi_page_segmentation_mode,
                char_whitelist: Some(settings.roi_char_whitelist.clone()),
            },
            min_confidence: settings.min_confidence,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_settings(&OcrSettings::default())
    }
}

/// An external character recognition engine
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize `image`, returning the engine's raw output
    async fn recognize(
        &self,
        image: &GrayImage,
        options: &RecognitionOptions,
        format: OutputFormat,
    ) -> Result<String, OcrError>;
}

/// Runs an engine with a fixed configuration
#[derive(Clone)]
pub struct OcrInvoker {
    engine: Arc<dyn OcrEngine>,
    config: OcrConfig,
}

impl OcrInvoker {
    pub fn new(engine: Arc<dyn OcrEngine>, config: OcrConfig) -> Self {
        Self { engine, config }
    }

    #[cfg(test)]
    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Plain-text recognition of a whole page
    pub async fn recognize_text(&self, image: &GrayImage) -> Result<String, OcrError> {
        self.engine
            .recognize(image, &self.config.page, OutputFormat::Text)
            .await
    }

    /// Structured recognition of a whole page, cleaned into word records
    pub async fn recognize_structured(&self, image: &GrayImage) -> Result<Vec<WordRecord>, OcrError> {
        let raw = self
            .engine
            .recognize(image, &self.config.page, OutputFormat::Tsv)
            .await?;

        let strategies: [&dyn TableStrategy; 2] = [&StrictColumns, &LenientSplit];
        let table = tsv::parse_with_fallback(&raw, &strategies)
            .map_err(|e| OcrError::Unexpected(format!("unreadable OCR table: {}", e)))?;
        let words = tsv::clean_words(&table, self.config.min_confidence)?;

        debug!("Structured OCR: {} rows, {} words kept", table.rows.len(), words.len());
        Ok(words)
    }

    /// Single-line, whitelisted recognition of a cropped region
    pub async fn recognize_roi(&self, image: &GrayImage) -> Result<String, OcrError> {
        self.engine
            .recognize(image, &self.config.roi, OutputFormat::Text)
            .await
    }
}
