//! Request pipeline
//!
//! Ties preprocessing, OCR and receipt parsing together. Every call works
//! on its own bytes; decoding and thresholding run on the blocking pool so
//! they never stall the async workers.

use anyhow::{Context, Result};
use image::GrayImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::receipt::{ReceiptParseResult, ReceiptParser, TextCorrector};
use crate::vision::preprocess::preprocess;
use crate::vision::{OcrConfig, OcrEngine, OcrError, OcrInvoker, WordRecord};

/// Shared, immutable OCR service
pub struct OcrService {
    invoker: OcrInvoker,
    parser: ReceiptParser,
    corrector: Option<TextCorrector>,
}

impl OcrService {
    /// Build the service around `engine` with settings from `config`
    pub fn new(engine: Arc<dyn OcrEngine>, config: &AppConfig) -> Result<Self> {
        let invoker = OcrInvoker::new(engine, OcrConfig::from_settings(&config.ocr));
        let parser = ReceiptParser::new(&config.receipt, config.ocr.roi_margin);

        let corrector = if config.text.apply_corrections {
            let corrector = TextCorrector::new(&config.text.corrections)
                .context("invalid pattern in text.corrections")?;
            if corrector.is_empty() {
                warn!("text.apply_corrections is set but text.corrections is empty");
            } else {
                info!("Applying {} text corrections to plain OCR output", corrector.len());
            }
            Some(corrector)
        } else {
            None
        };

        Ok(Self {
            invoker,
            parser,
            corrector,
        })
    }

    /// Plain text of the whole image
    pub async fn extract_text(&self, bytes: Arc<[u8]>) -> Result<String, OcrError> {
        let image = preprocess_blocking(bytes).await?;
        let text = self.invoker.recognize_text(&image).await?;

        Ok(match &self.corrector {
            Some(corrector) => corrector.apply(&text),
            None => text,
        })
    }

    /// Cleaned word table of the whole image
    pub async fn extract_words(&self, bytes: Arc<[u8]>) -> Result<Vec<WordRecord>, OcrError> {
        let image = preprocess_blocking(bytes).await?;
        self.invoker.recognize_structured(&image).await
    }

    /// Total amount, date and raw text of a receipt
    pub async fn extract_receipt(&self, bytes: Arc<[u8]>) -> Result<ReceiptParseResult, OcrError> {
        let words = self.extract_words(bytes.clone()).await?;
        debug!("Receipt word table has {} entries", words.len());
        self.parser.parse(&words, &bytes, &self.invoker).await
    }
}

async fn preprocess_blocking(bytes: Arc<[u8]>) -> Result<GrayImage, OcrError> {
    tokio::task::spawn_blocking(move || preprocess(&bytes)).await?
}

/// Words grouped into text lines, in table order
pub fn group_lines(words: &[WordRecord]) -> Vec<String> {
    let mut lines: Vec<((u32, u32, u32), Vec<&str>)> = Vec::new();
    for word in words {
        let key = (word.block_num, word.par_num, word.line_num);
        match lines.iter_mut().find(|(k, _)| *k == key) {
            Some((_, texts)) => texts.push(word.text.as_str()),
            None => lines.push((key, vec![word.text.as_str()])),
        }
    }
    lines.into_iter().map(|(_, texts)| texts.join(" ")).collect()
}
